//! Client classification from request metadata.

use serde::Serialize;

/// Browser markers, checked in order.
const BROWSERS: [&str; 4] = ["Chrome", "Firefox", "Safari", "Edge"];

/// Operating system markers and their reported names, checked in order.
const OPERATING_SYSTEMS: [(&str, &str); 5] = [
    ("Windows", "Windows"),
    ("Mac", "macOS"),
    ("Linux", "Linux"),
    ("Android", "Android"),
    ("iOS", "iOS"),
];

const UNKNOWN: &str = "Unknown";

/// Metadata of the request being redirected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    /// `User-Agent` header, if sent
    pub user_agent: Option<String>,
    /// `Referer` header, if sent
    pub referer: Option<String>,
}

impl ClientMeta {
    pub fn new(user_agent: Option<String>, referer: Option<String>) -> Self {
        Self {
            user_agent,
            referer,
        }
    }
}

/// Device class derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Device {
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "Desktop",
            Device::Mobile => "Mobile",
            Device::Tablet => "Tablet",
        }
    }
}

/// Classification attached to a click event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub device: Device,
    pub browser: &'static str,
    pub os: &'static str,
    pub referer: Option<String>,
}

impl ClientInfo {
    /// Classify a request.
    pub fn classify(meta: &ClientMeta) -> Self {
        let agent = meta.user_agent.as_deref().unwrap_or("");

        Self {
            device: classify_device(agent),
            browser: classify_browser(agent),
            os: classify_os(agent),
            referer: meta.referer.clone().filter(|r| !r.is_empty()),
        }
    }
}

/// Mobile is checked first and Tablet second; an agent matching both is a tablet.
fn classify_device(agent: &str) -> Device {
    let agent = agent.to_ascii_lowercase();
    let mut device = Device::Desktop;
    if agent.contains("mobile") {
        device = Device::Mobile;
    }
    if agent.contains("tablet") {
        device = Device::Tablet;
    }
    device
}

fn classify_browser(agent: &str) -> &'static str {
    BROWSERS
        .iter()
        .find(|marker| agent.contains(*marker))
        .copied()
        .unwrap_or(UNKNOWN)
}

fn classify_os(agent: &str) -> &'static str {
    OPERATING_SYSTEMS
        .iter()
        .find(|(marker, _)| agent.contains(marker))
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(agent: &str) -> ClientInfo {
        ClientInfo::classify(&ClientMeta::new(Some(agent.to_string()), None))
    }

    #[test]
    fn test_mobile_device() {
        let info = classify("Mozilla/5.0 (Linux; Android 14) Mobile Safari/537.36");
        assert_eq!(info.device, Device::Mobile);
    }

    #[test]
    fn test_tablet_wins_over_mobile() {
        let info = classify("SomeBrowser Tablet Mobile");
        assert_eq!(info.device, Device::Tablet);
    }

    #[test]
    fn test_device_match_is_case_insensitive() {
        assert_eq!(classify("foo MOBILE bar").device, Device::Mobile);
        assert_eq!(classify("foo tablet bar").device, Device::Tablet);
    }

    #[test]
    fn test_chrome_on_windows() {
        let info = classify(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.os, "Windows");
        assert_eq!(info.device, Device::Desktop);
    }

    #[test]
    fn test_safari_on_mac() {
        let info = classify(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        );
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.os, "macOS");
    }

    #[test]
    fn test_firefox_on_linux() {
        let info = classify("Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0");
        assert_eq!(info.browser, "Firefox");
        assert_eq!(info.os, "Linux");
    }

    #[test]
    fn test_unrecognized_agent() {
        let info = classify("curl/8.4.0");
        assert_eq!(info.device, Device::Desktop);
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.os, "Unknown");
    }

    #[test]
    fn test_missing_agent_and_referer() {
        let info = ClientInfo::classify(&ClientMeta::default());
        assert_eq!(info.device, Device::Desktop);
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.referer, None);
    }

    #[test]
    fn test_referer_kept_verbatim_and_empty_dropped() {
        let info = ClientInfo::classify(&ClientMeta::new(
            None,
            Some("https://news.example.com/item?id=1".to_string()),
        ));
        assert_eq!(info.referer.as_deref(), Some("https://news.example.com/item?id=1"));

        let info = ClientInfo::classify(&ClientMeta::new(None, Some(String::new())));
        assert_eq!(info.referer, None);
    }
}
