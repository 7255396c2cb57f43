use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::data::types::Forecast;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_SECS: f64 = 1.0;

/// Client for the NOAA Weather API (api.weather.gov).
///
/// Two-step flow: /points/{lat},{lon} resolves the forecast office and
/// grid cell, then /gridpoints/{office}/{x},{y}/forecast returns the
/// 7-day outlook. Grid lookups never change for a coordinate, so they
/// are cached for the process lifetime.
pub struct NoaaClient {
    client: Client,
    base_url: String,
    user_agent: String,
    grid_cache: HashMap<String, GridInfo>,
}

#[derive(Debug, Clone)]
struct GridInfo {
    office: String,
    grid_x: i64,
    grid_y: i64,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointsProperties {
    #[serde(default)]
    grid_id: String,
    #[serde(default)]
    grid_x: i64,
    #[serde(default)]
    grid_y: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastProperties {
    #[serde(default)]
    update_time: String,
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastPeriod {
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default = "default_true")]
    is_daytime: bool,
    #[serde(default)]
    probability_of_precipitation: Option<PrecipValue>,
    #[serde(default)]
    detailed_forecast: String,
}

#[derive(Debug, Deserialize)]
struct PrecipValue {
    #[serde(default)]
    value: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl NoaaClient {
    pub fn new(base_url: String, user_agent: String) -> Self {
        info!("NOAA client initialized");
        Self {
            client: Client::new(),
            base_url,
            user_agent,
            grid_cache: HashMap::new(),
        }
    }

    /// Fetch the forecast for a location on a target date. Returns
    /// None when the API is unreachable or has no period for the date.
    pub async fn get_forecast(
        &mut self,
        lat: f64,
        lon: f64,
        target_date: NaiveDate,
    ) -> Option<Forecast> {
        let grid = self.grid_info(lat, lon).await?;

        let path = format!(
            "/gridpoints/{}/{},{}/forecast",
            grid.office, grid.grid_x, grid.grid_y
        );
        let response: ForecastResponse = self.get_with_retry(&path).await?;

        parse_forecast(&response.properties, lat, lon, target_date, Utc::now())
    }

    async fn grid_info(&mut self, lat: f64, lon: f64) -> Option<GridInfo> {
        let cache_key = format!("{lat:.4},{lon:.4}");
        if let Some(grid) = self.grid_cache.get(&cache_key) {
            debug!(cache_key, "grid cache hit");
            return Some(grid.clone());
        }

        info!(lat, lon, "fetching grid info");
        let response: PointsResponse = self.get_with_retry(&format!("/points/{lat},{lon}")).await?;

        let props = response.properties;
        if props.grid_id.is_empty() {
            error!(lat, lon, "points response has no grid office");
            return None;
        }

        let grid = GridInfo {
            office: props.grid_id,
            grid_x: props.grid_x,
            grid_y: props.grid_y,
        };
        info!(office = %grid.office, grid_x = grid.grid_x, grid_y = grid.grid_y, "grid info cached");
        self.grid_cache.insert(cache_key, grid.clone());
        Some(grid)
    }

    /// GET with exponential backoff. NOAA rate limits aggressively and
    /// the occasional 503 is normal.
    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, path: &str) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..MAX_RETRIES {
            let result = self
                .client
                .get(&url)
                .header("User-Agent", &self.user_agent)
                .header("Accept", "application/geo+json")
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    match response.json::<T>().await {
                        Ok(parsed) => return Some(parsed),
                        Err(e) => {
                            warn!(path, error = %e, "NOAA response parse failed");
                            return None;
                        }
                    }
                }
                Ok(response) => {
                    warn!(path, status = %response.status(), attempt = attempt + 1, "NOAA request failed");
                }
                Err(e) => {
                    warn!(path, error = %e, attempt = attempt + 1, "NOAA request error");
                }
            }

            if attempt < MAX_RETRIES - 1 {
                let delay = BASE_DELAY_SECS * 2f64.powi(attempt as i32);
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }

        error!(path, max_retries = MAX_RETRIES, "NOAA request exhausted retries");
        None
    }
}

/// Pick out the target date's periods: daytime temperature is the
/// high, nighttime the low, and the precipitation probability comes
/// back as a percentage.
fn parse_forecast(
    props: &ForecastProperties,
    lat: f64,
    lon: f64,
    target_date: NaiveDate,
    retrieved_at: DateTime<Utc>,
) -> Option<Forecast> {
    let mut temperature_high = None;
    let mut temperature_low = None;
    let mut precip_probability = None;
    let mut narrative = String::new();

    for period in &props.periods {
        let Ok(start) = DateTime::parse_from_rfc3339(&period.start_time) else {
            continue;
        };
        if start.date_naive() != target_date {
            continue;
        }

        if let Some(temp) = period.temperature {
            if period.is_daytime {
                temperature_high = Some(temp);
            } else {
                temperature_low = Some(temp);
            }
        }

        if let Some(precip) = &period.probability_of_precipitation {
            if let Some(value) = precip.value {
                precip_probability = Some(value / 100.0);
            }
        }

        if !period.detailed_forecast.is_empty() {
            if !narrative.is_empty() {
                narrative.push_str(" | ");
            }
            narrative.push_str(&period.detailed_forecast);
        }
    }

    if temperature_high.is_none() && temperature_low.is_none() && precip_probability.is_none() {
        warn!(%target_date, "no forecast data for date");
        return None;
    }

    let update_time = DateTime::parse_from_rfc3339(&props.update_time)
        .map(|dt| dt.with_timezone(&Utc))
        .ok();

    Some(Forecast {
        location: format!("{lat:.2},{lon:.2}"),
        forecast_date: target_date,
        retrieved_at,
        temperature_high,
        temperature_low,
        precip_probability,
        narrative,
        update_time,
    })
}
