use chrono::NaiveDate;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::data::types::Forecast;

/// TTL cache for NOAA forecasts, keyed by location and target date.
/// Forecast offices update a handful of times per day, so a scan loop
/// re-running every few minutes should not re-fetch each time.
pub struct ForecastCache {
    cache: DashMap<String, CachedForecast>,
    ttl: Duration,
}

struct CachedForecast {
    forecast: Forecast,
    stored_at: Instant,
}

impl ForecastCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    fn key(location: &str, date: NaiveDate) -> String {
        format!("{}|{}", location.to_lowercase(), date.format("%Y-%m-%d"))
    }

    pub fn insert(&self, location: &str, date: NaiveDate, forecast: Forecast) {
        self.cache.insert(
            Self::key(location, date),
            CachedForecast {
                forecast,
                stored_at: Instant::now(),
            },
        );
    }

    /// Get forecast if not expired (evict on read)
    pub fn get(&self, location: &str, date: NaiveDate) -> Option<Forecast> {
        let key = Self::key(location, date);
        self.cache.get(&key).and_then(|entry| {
            if entry.stored_at.elapsed() > self.ttl {
                drop(entry); // Drop the read lock
                self.cache.remove(&key);
                None
            } else {
                Some(entry.forecast.clone())
            }
        })
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
