//! Per-user click analytics.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::db::{LinkRepository, LinkWithAnalytics, RepoResult};

/// Number of links reported in `top_links`.
pub const TOP_LINKS: usize = 5;

/// Number of days reported in `clicks_over_time`.
pub const DAYS_REPORTED: usize = 30;

/// Number of calendar months in the dashboard chart.
pub const MONTHS_CHARTED: usize = 12;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Aggregated analytics across every link of one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_clicks: i64,
    pub total_links: usize,
    pub device_stats: BTreeMap<String, u64>,
    pub browser_stats: BTreeMap<String, u64>,
    pub os_stats: BTreeMap<String, u64>,
    pub top_links: Vec<TopLink>,
    pub clicks_over_time: Vec<DailyClicks>,
    pub analytics: Vec<LinkSummary>,
    pub total_stats: TotalStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLink {
    pub key: String,
    pub url: String,
    pub clicks: i64,
}

/// Click events on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyClicks {
    pub date: NaiveDate,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSummary {
    pub link_key: String,
    pub url: String,
    pub clicks: i64,
    /// Distinct devices seen; no visitor identity is stored
    pub unique_visitors: usize,
    pub top_device: Option<String>,
    pub last_click: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub total_clicks: i64,
    pub total_links: usize,
    pub avg_clicks_per_link: f64,
}

/// Recent activity across every link of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub stats: DashboardTotals,
    pub chart_data: Vec<MonthlyClicks>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub total_links: usize,
    pub total_clicks: i64,
    /// Distinct device and browser pairs across all events
    pub active_users: usize,
    pub clicks_today: u64,
    pub clicks_this_week: u64,
    pub clicks_this_month: u64,
}

/// Click events in one UTC calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyClicks {
    pub month: &'static str,
    pub clicks: u64,
}

/// Builds analytics reports from the relational store.
pub struct AnalyticsService {
    repository: Arc<dyn LinkRepository>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsService {
    pub fn new(repository: Arc<dyn LinkRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a specific clock for the dashboard's "today" and "this month".
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report for every link owned by `user_id`.
    pub async fn report(&self, user_id: Uuid) -> RepoResult<AnalyticsReport> {
        let links = self.repository.links_with_analytics(user_id).await?;
        debug!(user_id = %user_id, links = links.len(), "Building analytics report");
        Ok(summarize(&links))
    }

    /// Dashboard counters for every link owned by `user_id`.
    pub async fn dashboard(&self, user_id: Uuid) -> RepoResult<DashboardStats> {
        let links = self.repository.links_with_analytics(user_id).await?;
        debug!(user_id = %user_id, links = links.len(), "Building dashboard stats");
        Ok(dashboard_stats(&links, self.clock.now()))
    }
}

/// Aggregate links whose events are ordered newest first.
pub fn summarize(links: &[LinkWithAnalytics]) -> AnalyticsReport {
    let total_clicks: i64 = links.iter().map(|l| l.link.clicks).sum();
    let total_links = links.len();

    let mut device_stats = BTreeMap::new();
    let mut browser_stats = BTreeMap::new();
    let mut os_stats = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for event in links.iter().flat_map(|l| &l.analytics) {
        *device_stats.entry(event.device.clone()).or_insert(0) += 1;
        *browser_stats.entry(event.browser.clone()).or_insert(0) += 1;
        *os_stats.entry(event.os.clone()).or_insert(0) += 1;
        *by_day.entry(event.timestamp.date_naive()).or_insert(0) += 1;
    }

    let mut ranked: Vec<&LinkWithAnalytics> = links.iter().collect();
    ranked.sort_by(|a, b| b.link.clicks.cmp(&a.link.clicks));
    let top_links = ranked
        .into_iter()
        .take(TOP_LINKS)
        .map(|l| TopLink {
            key: l.link.key.clone(),
            url: l.link.url.clone(),
            clicks: l.link.clicks,
        })
        .collect();

    let skip = by_day.len().saturating_sub(DAYS_REPORTED);
    let clicks_over_time = by_day
        .into_iter()
        .skip(skip)
        .map(|(date, clicks)| DailyClicks { date, clicks })
        .collect();

    let analytics = links
        .iter()
        .map(|l| LinkSummary {
            link_key: l.link.key.clone(),
            url: l.link.url.clone(),
            clicks: l.link.clicks,
            unique_visitors: l
                .analytics
                .iter()
                .map(|e| e.device.as_str())
                .collect::<HashSet<_>>()
                .len(),
            top_device: most_common(l.analytics.iter().map(|e| e.device.as_str())),
            last_click: l.analytics.first().map(|e| e.timestamp),
        })
        .collect();

    let avg_clicks_per_link = if total_links > 0 {
        total_clicks as f64 / total_links as f64
    } else {
        0.0
    };

    AnalyticsReport {
        total_clicks,
        total_links,
        device_stats,
        browser_stats,
        os_stats,
        top_links,
        clicks_over_time,
        analytics,
        total_stats: TotalStats {
            total_clicks,
            total_links,
            avg_clicks_per_link,
        },
    }
}

/// Dashboard counters relative to `now`. Days and months are UTC.
pub fn dashboard_stats(links: &[LinkWithAnalytics], now: DateTime<Utc>) -> DashboardStats {
    let today = now.date_naive();
    let week_start = now - Duration::days(7);
    let this_month = month_index(now);

    let mut clicks_today = 0;
    let mut clicks_this_week = 0;
    let mut clicks_this_month = 0;
    let mut visitors = HashSet::new();
    let mut by_month = [0u64; MONTHS_CHARTED];

    for event in links.iter().flat_map(|l| &l.analytics) {
        if event.timestamp.date_naive() >= today {
            clicks_today += 1;
        }
        if event.timestamp >= week_start {
            clicks_this_week += 1;
        }

        let month = month_index(event.timestamp);
        if month >= this_month {
            clicks_this_month += 1;
        }
        let age = this_month - month;
        if (0..MONTHS_CHARTED as i32).contains(&age) {
            by_month[MONTHS_CHARTED - 1 - age as usize] += 1;
        }

        visitors.insert((event.device.as_str(), event.browser.as_str()));
    }

    let first_month = this_month - (MONTHS_CHARTED as i32 - 1);
    let chart_data = by_month
        .iter()
        .enumerate()
        .map(|(offset, &clicks)| MonthlyClicks {
            month: MONTH_NAMES[(first_month + offset as i32).rem_euclid(12) as usize],
            clicks,
        })
        .collect();

    DashboardStats {
        stats: DashboardTotals {
            total_links: links.len(),
            total_clicks: links.iter().map(|l| l.link.clicks).sum(),
            active_users: visitors.len(),
            clicks_today,
            clicks_this_week,
            clicks_this_month,
        },
        chart_data,
    }
}

/// Months since year 0, so consecutive months differ by one.
fn month_index(at: DateTime<Utc>) -> i32 {
    at.year() * 12 + at.month0() as i32
}

/// Most frequent value; ties go to the value seen first.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in values.enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ClickEvent, ShortLink};
    use chrono::{Duration, TimeZone};

    fn link(key: &str, clicks: i64, events: Vec<ClickEvent>) -> LinkWithAnalytics {
        let id = Uuid::new_v4();
        let analytics = events
            .into_iter()
            .map(|mut e| {
                e.link_id = id;
                e
            })
            .collect();
        LinkWithAnalytics {
            link: ShortLink {
                id,
                domain: "clickgate.link".to_string(),
                key: key.to_string(),
                url: format!("https://example.com/{}", key),
                password: None,
                clicks,
                last_clicked: None,
                user_id: Uuid::nil(),
                created_at: Utc::now(),
            },
            analytics,
        }
    }

    fn event(device: &str, browser: &str, os: &str, at: DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            id: Uuid::new_v4(),
            link_id: Uuid::nil(),
            device: device.to_string(),
            browser: browser.to_string(),
            os: os.to_string(),
            referer: None,
            timestamp: at,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_report() {
        let report = summarize(&[]);
        assert_eq!(report.total_clicks, 0);
        assert_eq!(report.total_links, 0);
        assert_eq!(report.total_stats.avg_clicks_per_link, 0.0);
        assert!(report.top_links.is_empty());
        assert!(report.clicks_over_time.is_empty());
    }

    #[test]
    fn test_totals_and_breakdowns() {
        let links = vec![
            link(
                "a",
                3,
                vec![
                    event("Mobile", "Safari", "iOS", day(3)),
                    event("Mobile", "Chrome", "Android", day(2)),
                    event("Desktop", "Chrome", "Windows", day(2)),
                ],
            ),
            link("b", 1, vec![event("Desktop", "Firefox", "Linux", day(1))]),
            link("c", 0, vec![]),
        ];

        let report = summarize(&links);
        assert_eq!(report.total_clicks, 4);
        assert_eq!(report.total_links, 3);
        assert!((report.total_stats.avg_clicks_per_link - 4.0 / 3.0).abs() < f64::EPSILON);

        assert_eq!(report.device_stats["Mobile"], 2);
        assert_eq!(report.device_stats["Desktop"], 2);
        assert_eq!(report.browser_stats["Chrome"], 2);
        assert_eq!(report.os_stats["Linux"], 1);

        assert_eq!(
            report.clicks_over_time,
            vec![
                DailyClicks { date: day(1).date_naive(), clicks: 1 },
                DailyClicks { date: day(2).date_naive(), clicks: 2 },
                DailyClicks { date: day(3).date_naive(), clicks: 1 },
            ]
        );

        let a = &report.analytics[0];
        assert_eq!(a.link_key, "a");
        assert_eq!(a.top_device.as_deref(), Some("Mobile"));
        assert_eq!(a.last_click, Some(day(3)));
        assert_eq!(a.unique_visitors, 2);
        assert_eq!(report.analytics[1].unique_visitors, 1);
        assert_eq!(report.analytics[2].unique_visitors, 0);
        assert_eq!(report.analytics[2].top_device, None);
        assert_eq!(report.analytics[2].last_click, None);
    }

    #[test]
    fn test_top_links_limited_and_ordered() {
        let links: Vec<_> = (0..8).map(|i| link(&format!("k{}", i), i, vec![])).collect();
        let report = summarize(&links);

        let keys: Vec<_> = report.top_links.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["k7", "k6", "k5", "k4", "k3"]);
    }

    #[test]
    fn test_clicks_over_time_keeps_latest_days() {
        let start = day(1);
        let events = (0..40)
            .rev()
            .map(|i| event("Desktop", "Chrome", "Linux", start + Duration::days(i)))
            .collect();
        let report = summarize(&[link("busy", 40, events)]);

        assert_eq!(report.clicks_over_time.len(), DAYS_REPORTED);
        assert_eq!(
            report.clicks_over_time.first().map(|d| d.date),
            Some((start + Duration::days(10)).date_naive())
        );
        assert_eq!(
            report.clicks_over_time.last().map(|d| d.date),
            Some((start + Duration::days(39)).date_naive())
        );
    }

    #[test]
    fn test_most_common_tie_goes_to_first_seen() {
        assert_eq!(
            most_common(["Tablet", "Desktop", "Desktop", "Tablet"].into_iter()).as_deref(),
            Some("Tablet")
        );
        assert_eq!(most_common(std::iter::empty()), None);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let json = serde_json::to_value(summarize(&[link("a", 2, vec![])])).unwrap();
        assert_eq!(json["totalClicks"], 2);
        assert_eq!(json["totalStats"]["avgClicksPerLink"], 2.0);
        assert_eq!(json["analytics"][0]["linkKey"], "a");
        assert_eq!(json["analytics"][0]["uniqueVisitors"], 0);
    }

    #[test]
    fn test_dashboard_counters() {
        // Wednesday 2024-03-20 18:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 18, 0, 0).unwrap();
        let links = vec![
            link(
                "a",
                7,
                vec![
                    event("Mobile", "Safari", "iOS", now - Duration::hours(1)),
                    event("Mobile", "Safari", "iOS", Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap()),
                    event("Desktop", "Chrome", "Linux", now - Duration::days(3)),
                    event("Desktop", "Chrome", "Linux", Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                ],
            ),
            link(
                "b",
                3,
                vec![
                    event("Desktop", "Firefox", "Linux", Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()),
                    event("Desktop", "Chrome", "Windows", Utc.with_ymd_and_hms(2023, 4, 15, 0, 0, 0).unwrap()),
                    event("Desktop", "Chrome", "Windows", Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap()),
                ],
            ),
        ];

        let dashboard = dashboard_stats(&links, now);
        assert_eq!(
            dashboard.stats,
            DashboardTotals {
                total_links: 2,
                total_clicks: 10,
                active_users: 3,
                clicks_today: 2,
                clicks_this_week: 3,
                clicks_this_month: 4,
            }
        );

        let months: Vec<_> = dashboard.chart_data.iter().map(|m| m.month).collect();
        assert_eq!(
            months,
            vec!["Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar"]
        );
        let clicks: Vec<_> = dashboard.chart_data.iter().map(|m| m.clicks).collect();
        // The March 2023 event falls outside the twelve months charted
        assert_eq!(clicks, vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 4]);
    }

    #[test]
    fn test_dashboard_without_links() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let dashboard = dashboard_stats(&[], now);
        assert_eq!(dashboard.stats.total_links, 0);
        assert_eq!(dashboard.stats.active_users, 0);
        assert_eq!(dashboard.chart_data.len(), MONTHS_CHARTED);
        assert_eq!(dashboard.chart_data.first().map(|m| m.month), Some("Feb"));
        assert_eq!(dashboard.chart_data.last().map(|m| m.month), Some("Jan"));

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["stats"]["clicksThisMonth"], 0);
        assert_eq!(json["chartData"][11]["month"], "Jan");
    }

    #[tokio::test]
    async fn test_service_reads_owner_links() {
        use crate::db::{InMemoryRepository, NewLink};

        let repo = Arc::new(InMemoryRepository::new());
        let owner = Uuid::new_v4();
        repo.create_link(NewLink {
            domain: "clickgate.link".to_string(),
            key: "mine".to_string(),
            url: "https://example.com/".to_string(),
            password_hash: None,
            user_id: owner,
        })
        .await
        .unwrap();

        let clock = Arc::new(crate::clock::ManualClock::new(1_710_000_000_000));
        let service = AnalyticsService::new(repo).with_clock(clock);
        assert_eq!(service.report(owner).await.unwrap().total_links, 1);
        assert_eq!(service.report(Uuid::new_v4()).await.unwrap().total_links, 0);

        let dashboard = service.dashboard(owner).await.unwrap();
        assert_eq!(dashboard.stats.total_links, 1);
        // 1_710_000_000_000 ms is 2024-03-09
        assert_eq!(dashboard.chart_data.last().map(|m| m.month), Some("Mar"));
    }
}
