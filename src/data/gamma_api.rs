use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::data::types::{Comparison, Metric, OutcomeBucket, WeatherEvent, WeatherMarket};

const TAG_SLUGS: [&str; 4] = ["temperature", "precipitation", "snowfall", "weather"];
const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 5;

const WEATHER_KEYWORDS: [&str; 12] = [
    "temperature",
    "temp",
    "precipitation",
    "precip",
    "snowfall",
    "snow",
    "rain",
    "weather",
    "°f",
    "°c",
    "inches of rain",
    "inches of snow",
];

// City lookup for question parsing. Matched longest-name-first so
// "las vegas" wins over "vegas" and abbreviations never shadow full
// names.
const CITY_COORDS: [(&str, f64, f64); 48] = [
    ("new york", 40.7128, -74.0060),
    ("nyc", 40.7128, -74.0060),
    ("los angeles", 34.0522, -118.2437),
    ("la", 34.0522, -118.2437),
    ("chicago", 41.8781, -87.6298),
    ("houston", 29.7604, -95.3698),
    ("phoenix", 33.4484, -112.0740),
    ("philadelphia", 39.9526, -75.1652),
    ("philly", 39.9526, -75.1652),
    ("san antonio", 29.4241, -98.4936),
    ("san diego", 32.7157, -117.1611),
    ("dallas", 32.7767, -96.7970),
    ("miami", 25.7617, -80.1918),
    ("atlanta", 33.7490, -84.3880),
    ("boston", 42.3601, -71.0589),
    ("seattle", 47.6062, -122.3321),
    ("denver", 39.7392, -104.9903),
    ("washington", 38.9072, -77.0369),
    ("dc", 38.9072, -77.0369),
    ("san francisco", 37.7749, -122.4194),
    ("sf", 37.7749, -122.4194),
    ("nashville", 36.1627, -86.7816),
    ("detroit", 42.3314, -83.0458),
    ("minneapolis", 44.9778, -93.2650),
    ("portland", 45.5152, -122.6784),
    ("las vegas", 36.1699, -115.1398),
    ("vegas", 36.1699, -115.1398),
    ("baltimore", 39.2904, -76.6122),
    ("milwaukee", 43.0389, -87.9065),
    ("st. louis", 38.6270, -90.1994),
    ("st louis", 38.6270, -90.1994),
    ("austin", 30.2672, -97.7431),
    ("kansas city", 39.0997, -94.5786),
    ("new orleans", 29.9511, -90.0715),
    ("tampa", 27.9506, -82.4572),
    ("orlando", 28.5384, -81.3789),
    ("sacramento", 38.5816, -121.4944),
    ("pittsburgh", 40.4406, -79.9959),
    ("cleveland", 41.4993, -81.6944),
    ("albuquerque", 35.0844, -106.6504),
    ("honolulu", 21.3069, -157.8583),
    ("anchorage", 61.2181, -149.9003),
    ("buffalo", 42.8864, -78.8784),
    ("des moines", 41.5868, -93.6250),
    ("salt lake city", 40.7608, -111.8910),
    ("fargo", 46.8772, -96.7898),
    ("reno", 39.5296, -119.8138),
    ("colorado springs", 38.8339, -104.8214),
];

pub struct PolymarketClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GammaEvent {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    #[serde(default)]
    condition_id: String,
    #[serde(default)]
    question: String,
    /// JSON-encoded string, e.g. "[\"0.4\", \"0.6\"]"
    #[serde(default)]
    outcome_prices: String,
    /// JSON-encoded string of token ids, YES first
    #[serde(default)]
    clob_token_ids: String,
    #[serde(default)]
    volume: serde_json::Value,
    #[serde(default)]
    end_date: String,
    #[serde(default)]
    created_at: String,
}

impl PolymarketClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Fetch active weather markets from the Gamma events endpoint,
    /// flattened across every weather tag with duplicates removed.
    pub async fn fetch_weather_markets(&self, today: NaiveDate) -> Result<Vec<WeatherMarket>> {
        let mut seen = std::collections::HashSet::new();
        let mut markets = Vec::new();

        for tag_slug in TAG_SLUGS {
            for event in self.fetch_events(tag_slug).await? {
                for gm in event.markets {
                    if gm.condition_id.is_empty() || !seen.insert(gm.condition_id.clone()) {
                        continue;
                    }
                    if let Some(market) = convert_market(&gm, today) {
                        markets.push(market);
                    }
                }
            }
        }

        info!(count = markets.len(), "weather markets found");
        Ok(markets)
    }

    /// Fetch weather events with their full bucket structure, for
    /// multi-outcome markets ("What will the high be in NYC?").
    pub async fn fetch_weather_events(&self, today: NaiveDate) -> Result<Vec<WeatherEvent>> {
        let mut seen = std::collections::HashSet::new();
        let mut events = Vec::new();

        for tag_slug in TAG_SLUGS {
            for raw in self.fetch_events(tag_slug).await? {
                let event_id = match &raw.id {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                if event_id.is_empty() || !seen.insert(event_id.clone()) {
                    continue;
                }
                if let Some(event) = convert_event(&event_id, &raw, today) {
                    events.push(event);
                }
            }
        }

        info!(count = events.len(), "weather events found");
        Ok(events)
    }

    async fn fetch_events(&self, tag_slug: &str) -> Result<Vec<GammaEvent>> {
        let mut all_events = Vec::new();
        let mut offset = 0;

        for page in 0..MAX_PAGES {
            info!(tag_slug, offset, page = page + 1, "fetching gamma events");
            let url = format!("{}/events", self.base_url);
            let limit = PAGE_LIMIT.to_string();
            let offset_param = offset.to_string();
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("tag_slug", tag_slug),
                    ("active", "true"),
                    ("closed", "false"),
                    ("limit", limit.as_str()),
                    ("offset", offset_param.as_str()),
                ])
                .send()
                .await
                .context("Failed to fetch gamma events")?;

            let events: Vec<GammaEvent> = match response.json().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(tag_slug, error = %e, "gamma events parse failed");
                    break;
                }
            };

            let count = events.len();
            all_events.extend(events);
            if count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        Ok(all_events)
    }
}

fn is_weather_question(question: &str) -> bool {
    let q_lower = question.to_lowercase();
    WEATHER_KEYWORDS.iter().any(|kw| q_lower.contains(kw))
}

fn convert_market(gm: &GammaMarket, today: NaiveDate) -> Option<WeatherMarket> {
    if !is_weather_question(&gm.question) {
        return None;
    }

    let (yes_price, no_price) = parse_outcome_prices(&gm.outcome_prices)?;
    let parsed = parse_weather_question(&gm.question, today)?;
    let close_date = parse_iso_datetime(&gm.end_date)?;
    let token_id = first_token_id(&gm.clob_token_ids)?;

    Some(WeatherMarket {
        market_id: gm.condition_id.clone(),
        token_id,
        question: gm.question.clone(),
        location: parsed.location,
        lat: parsed.lat,
        lon: parsed.lon,
        event_date: parsed.event_date,
        metric: parsed.metric,
        threshold: parsed.threshold,
        comparison: parsed.comparison,
        yes_price,
        no_price,
        volume: parse_volume(&gm.volume),
        close_date,
        created_at: parse_iso_datetime(&gm.created_at),
    })
}

fn convert_event(event_id: &str, raw: &GammaEvent, today: NaiveDate) -> Option<WeatherEvent> {
    if !is_weather_question(&raw.title) {
        return None;
    }

    // Location and metric come from the event title, falling back to
    // the first bucket's question when the title alone will not parse.
    let parsed = parse_weather_question(&raw.title, today).or_else(|| {
        raw.markets
            .first()
            .and_then(|m| parse_weather_question(&m.question, today))
    })?;

    let mut buckets = Vec::new();
    let mut close_date = None;

    for gm in &raw.markets {
        let Some((yes_price, no_price)) = parse_outcome_prices(&gm.outcome_prices) else {
            continue;
        };
        let Some(token_id) = first_token_id(&gm.clob_token_ids) else {
            continue;
        };
        let (lower, upper) = parse_outcome_label(&gm.question);

        buckets.push(OutcomeBucket {
            token_id,
            label: gm.question.clone(),
            yes_price,
            no_price,
            lower,
            upper,
        });

        if close_date.is_none() {
            close_date = parse_iso_datetime(&gm.end_date);
        }
    }

    if buckets.is_empty() {
        return None;
    }

    Some(WeatherEvent {
        event_id: event_id.to_string(),
        title: raw.title.clone(),
        location: parsed.location,
        lat: parsed.lat,
        lon: parsed.lon,
        event_date: parsed.event_date,
        metric: parsed.metric,
        buckets,
        close_date: close_date?,
    })
}

fn parse_outcome_prices(raw: &str) -> Option<(f64, f64)> {
    let prices: Vec<String> = serde_json::from_str(raw).ok()?;
    if prices.len() < 2 {
        return None;
    }
    let yes = prices[0].parse::<f64>().ok()?;
    let no = prices[1].parse::<f64>().ok()?;
    Some((yes, no))
}

fn first_token_id(raw: &str) -> Option<String> {
    let ids: Vec<String> = serde_json::from_str(raw).ok()?;
    ids.into_iter().next().filter(|id| !id.is_empty())
}

fn parse_volume(raw: &serde_json::Value) -> f64 {
    match raw {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[derive(Debug, Clone)]
pub struct ParsedQuestion {
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub event_date: NaiveDate,
    pub metric: Metric,
    pub threshold: f64,
    pub comparison: Comparison,
}

/// Extract structured fields from a weather market question like
/// "Will the high temp in NYC exceed 60°F on February 17?".
///
/// Returns None when no known city or no event date can be found;
/// threshold defaults to 0.0 for bucket-style questions that carry
/// their number in the outcome labels instead.
pub fn parse_weather_question(question: &str, today: NaiveDate) -> Option<ParsedQuestion> {
    let q_lower = question.to_lowercase();

    // Longest city name first so "las vegas" never resolves as "la"
    let mut cities: Vec<&(&str, f64, f64)> = CITY_COORDS.iter().collect();
    cities.sort_by_key(|(name, _, _)| std::cmp::Reverse(name.len()));

    let mut location = None;
    for (city, lat, lon) in cities {
        let pattern = format!(r"\b{}\b", regex::escape(city));
        if Regex::new(&pattern).ok()?.is_match(&q_lower) {
            location = Some((title_case(canonical_city(city)), *lat, *lon));
            break;
        }
    }
    let (location, lat, lon) = location?;

    // Precip and snow checked before temperature so "below" in a snow
    // question cannot read as a low-temperature market
    let metric = if q_lower.contains("precip") || q_lower.contains("rain") {
        Metric::Precipitation
    } else if q_lower.contains("snow") {
        Metric::Snowfall
    } else if q_lower.contains("low temp")
        || q_lower.contains("temperature low")
        || Regex::new(r"\blow\b").ok()?.is_match(&q_lower)
    {
        Metric::TemperatureLow
    } else {
        Metric::TemperatureHigh
    };

    // Numbers with unit markers first, so a bare date never reads as a
    // threshold
    let unit_re = Regex::new(r"(\d+\.?\d*)\s*(?:°[fFcC]|degrees|inches|in\b)").ok()?;
    let threshold = match unit_re.captures(question) {
        Some(cap) => cap[1].parse().unwrap_or(0.0),
        None => {
            let fallback =
                Regex::new(r"(?:above|below|exceed|over|under|reach|than)\s+(\d+\.?\d*)").ok()?;
            fallback
                .captures(&q_lower)
                .and_then(|cap| cap[1].parse().ok())
                .unwrap_or(0.0)
        }
    };

    let comparison = if q_lower.contains("below")
        || q_lower.contains("under")
        || q_lower.contains("less than")
    {
        Comparison::Below
    } else if q_lower.contains("between") {
        Comparison::Between
    } else {
        Comparison::Above
    };

    let event_date = parse_event_date(question, today)?;

    Some(ParsedQuestion {
        location,
        lat,
        lon,
        event_date,
        metric,
        threshold,
        comparison,
    })
}

/// Month-name date with optional year. Missing years are inferred from
/// today: a date more than six months in the past rolls to next year.
fn parse_event_date(question: &str, today: NaiveDate) -> Option<NaiveDate> {
    let date_re =
        Regex::new(r"(?i)(?:on\s+)?([a-z]+)\s+(\d{1,2})(?:st|nd|rd|th)?(?:\s*,?\s*(\d{4}))?")
            .ok()?;

    for cap in date_re.captures_iter(question) {
        let Some(month) = month_number(&cap[1].to_lowercase()) else {
            continue;
        };
        let day: u32 = cap[2].parse().ok()?;

        let year = match cap.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => {
                let mut year = today.year();
                if let Some(candidate) = NaiveDate::from_ymd_opt(year, month, day) {
                    if (today - candidate).num_days() > 180 {
                        year += 1;
                    }
                }
                year
            }
        };

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    match name {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}

/// Abbreviations resolve to the full city name, so "NYC" and
/// "New York" markets share one location string and one correlation
/// key.
fn canonical_city(name: &str) -> &str {
    match name {
        "nyc" => "new york",
        "la" => "los angeles",
        "philly" => "philadelphia",
        "dc" => "washington",
        "sf" => "san francisco",
        "vegas" => "las vegas",
        "st louis" => "st. louis",
        _ => name,
    }
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse bucket bounds from an outcome label.
///
/// "48-49°F" gives (48, 49); "47°F or below" gives (None, 47);
/// "55°F or above" gives (55, None); unparsable labels give
/// (None, None).
pub fn parse_outcome_label(label: &str) -> (Option<f64>, Option<f64>) {
    let l_lower = label.to_lowercase();

    if let Ok(re) = Regex::new(r"(\d+\.?\d*)\s*(?:°[fFcC]?\s*)?(?:-|to)\s*(\d+\.?\d*)") {
        if let Some(cap) = re.captures(label) {
            if let (Ok(lo), Ok(hi)) = (cap[1].parse(), cap[2].parse()) {
                return (Some(lo), Some(hi));
            }
        }
    }

    if let Ok(re) =
        Regex::new(r"(?i)(\d+\.?\d*)\s*(?:°[fFcC]?)?\s*(?:or\s+)?(?:below|under|less|lower)")
    {
        if let Some(cap) = re.captures(label) {
            if let Ok(hi) = cap[1].parse() {
                return (None, Some(hi));
            }
        }
    }
    if let Ok(re) = Regex::new(r"(?:below|under|less than)\s+(\d+\.?\d*)") {
        if let Some(cap) = re.captures(&l_lower) {
            if let Ok(hi) = cap[1].parse() {
                return (None, Some(hi));
            }
        }
    }

    if let Ok(re) =
        Regex::new(r"(?i)(\d+\.?\d*)\s*(?:°[fFcC]?)?\s*(?:or\s+)?(?:above|over|more|higher)")
    {
        if let Some(cap) = re.captures(label) {
            if let Ok(lo) = cap[1].parse() {
                return (Some(lo), None);
            }
        }
    }
    if let Ok(re) = Regex::new(r"(?:above|over|more than|at least)\s+(\d+\.?\d*)") {
        if let Some(cap) = re.captures(&l_lower) {
            if let Ok(lo) = cap[1].parse() {
                return (Some(lo), None);
            }
        }
    }

    (None, None)
}
