//! Clickgate - URL Shortener Redirect and Analytics Service
//!
//! This crate implements the serving core of a URL shortener: a public
//! redirect endpoint that admits requests under a sliding-window rate limit
//! kept in a shared counter store, resolves short keys, and records a click
//! and an analytics event for every successful redirect. Rate limiting
//! fails open when the counter store is missing or unreachable.

pub mod accounts;
pub mod analytics;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod links;
pub mod password;
pub mod ratelimit;
