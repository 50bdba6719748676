use std::{collections::HashMap, time::Duration};

/// Request headers as a plain string map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// A byte-range request, inclusive start, exclusive end when present.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    #[must_use]
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// `Range` header value. HTTP ranges are end-inclusive.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end.saturating_sub(1)),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Transport configuration.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Total per-attempt budget, connect included.
    pub request_timeout: Duration,
    /// TCP/TLS connect budget.
    pub connect_timeout: Duration,
    /// Retry attempts after the first; `None` retries forever.
    pub max_retry: Option<u32>,
    /// First backoff delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retry: Some(4),
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(3),
        }
    }
}
