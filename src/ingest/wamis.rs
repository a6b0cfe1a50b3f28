/// WAMIS (Water Management Information System) open API client.
///
/// Two products feed the drought series:
///
/// - dam hourly data (`wkd/mn_hrdata`): storage rate per dam, hourly tags
///   `yyyyMMddHH` with hours 01..24;
/// - flow daily data (`wkd/flowdtd`): daily mean discharge per gauging
///   station, dated `yyyyMMdd`.
///
/// The API takes inclusive whole-day ranges; each adapter trims the
/// response back to the requested `[from, to)` timestamp window.
///
/// Base URL: http://www.wamis.go.kr:8080/

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::calendar;
use crate::error::{PipelineError, Result};
use crate::model::{ObservationPoint, StepUnit};
use crate::store::SourceAdapter;

pub const WAMIS_API_BASE: &str = "http://www.wamis.go.kr:8080/";

/// Raw source tags under which WAMIS readings are persisted.
pub const SOURCE_DAM: &str = "wamis_dam";
pub const SOURCE_FLOW: &str = "wamis_flow";

// ---------------------------------------------------------------------------
// Response structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WamisResponse<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
    #[serde(rename = "resultCode")]
    result_code: Option<String>,
    #[serde(rename = "resultMsg")]
    result_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DamHourlyItem {
    #[serde(default)]
    damcd: Option<String>,
    obsdh: String,
    #[serde(default)]
    rsrt: Value,
}

#[derive(Debug, Deserialize)]
struct FlowDailyItem {
    #[serde(default)]
    obscd: Option<String>,
    ymd: String,
    #[serde(default)]
    flow: Value,
}

/// WAMIS numbers come as JSON numbers, numeric strings, or "-" / "" for
/// missing values.
fn numeric_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn check_result<T>(entity: &str, response: &WamisResponse<T>) -> Result<()> {
    match response.result_code.as_deref() {
        None | Some("success") | Some("00") | Some("0") => Ok(()),
        Some(code) => Err(PipelineError::parse(
            entity,
            format!(
                "API returned {}: {}",
                code,
                response.result_msg.as_deref().unwrap_or("no message")
            ),
        )),
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a dam hourly response into hourly readings for `entity`.
///
/// # Errors
/// `PipelineError::Parse` for malformed JSON, an error envelope, or a
/// record whose `obsdh` is not `yyyyMMddHH`.
pub fn parse_dam_hourly(entity: &str, json: &str) -> Result<Vec<ObservationPoint>> {
    let response: WamisResponse<DamHourlyItem> = serde_json::from_str(json)
        .map_err(|e| PipelineError::parse(entity, format!("JSON deserialization failed: {}", e)))?;
    check_result(entity, &response)?;

    response
        .list
        .iter()
        .map(|item| {
            let (date, hour) = calendar::parse_yyyymmddhh(&item.obsdh)
                .ok_or_else(|| PipelineError::parse(entity, format!("bad obsdh '{}'", item.obsdh)))?;
            let code = item.damcd.as_deref().unwrap_or(entity);
            Ok(ObservationPoint::hourly(code, date, hour, numeric_field(&item.rsrt)))
        })
        .collect()
}

/// Parses a flow daily response into date-only readings for `entity`.
pub fn parse_flow_daily(entity: &str, json: &str) -> Result<Vec<ObservationPoint>> {
    let response: WamisResponse<FlowDailyItem> = serde_json::from_str(json)
        .map_err(|e| PipelineError::parse(entity, format!("JSON deserialization failed: {}", e)))?;
    check_result(entity, &response)?;

    response
        .list
        .iter()
        .map(|item| {
            let date = calendar::parse_yyyymmdd(&item.ymd)
                .ok_or_else(|| PipelineError::parse(entity, format!("bad ymd '{}'", item.ymd)))?;
            let code = item.obscd.as_deref().unwrap_or(entity);
            Ok(ObservationPoint::daily(code, date, numeric_field(&item.flow)))
        })
        .collect()
}

/// Keeps readings timestamped in `[from, to)`.
fn within(readings: Vec<ObservationPoint>, from: NaiveDateTime, to: NaiveDateTime) -> Vec<ObservationPoint> {
    readings
        .into_iter()
        .filter(|r| {
            let ts = r.time.as_timestamp();
            ts >= from && ts < to
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Shared HTTP plumbing for both WAMIS products.
pub struct WamisClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl WamisClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { http, base_url, api_key: api_key.to_string() })
    }

    pub fn dam_hourly_url(&self, dam: &str, from: NaiveDateTime, to: NaiveDateTime) -> String {
        format!(
            "{}wamis/openapi/wkd/mn_hrdata?damcd={}&startdt={}&enddt={}&authKey={}",
            self.base_url,
            urlencoding::encode(dam),
            calendar::format_yyyymmdd(from.date()),
            calendar::format_yyyymmdd(to.date()),
            urlencoding::encode(&self.api_key)
        )
    }

    pub fn flow_daily_url(&self, station: &str, from: NaiveDateTime, to: NaiveDateTime) -> String {
        format!(
            "{}wamis/openapi/wkd/flowdtd?obscd={}&startymd={}&endymd={}&authKey={}",
            self.base_url,
            urlencoding::encode(station),
            calendar::format_yyyymmdd(from.date()),
            calendar::format_yyyymmdd(to.date()),
            urlencoding::encode(&self.api_key)
        )
    }

    fn get(&self, entity: &str, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(|source| PipelineError::Transport { entity: entity.to_string(), source })?;

        if !response.status().is_success() {
            return Err(PipelineError::HttpStatus {
                entity: entity.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .map_err(|source| PipelineError::Transport { entity: entity.to_string(), source })
    }
}

// ---------------------------------------------------------------------------
// Source adapters
// ---------------------------------------------------------------------------

/// Hourly dam storage rate.
pub struct WamisDamAdapter {
    client: WamisClient,
}

impl WamisDamAdapter {
    pub fn new(client: WamisClient) -> Self {
        Self { client }
    }
}

impl SourceAdapter for WamisDamAdapter {
    fn source(&self) -> &str {
        SOURCE_DAM
    }

    fn step(&self) -> StepUnit {
        StepUnit::Hourly
    }

    fn fetch(&self, entity: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<ObservationPoint>> {
        let url = self.client.dam_hourly_url(entity, from, to);
        let body = self.client.get(entity, &url)?;
        Ok(within(parse_dam_hourly(entity, &body)?, from, to))
    }
}

/// Daily river discharge.
pub struct WamisFlowAdapter {
    client: WamisClient,
}

impl WamisFlowAdapter {
    pub fn new(client: WamisClient) -> Self {
        Self { client }
    }
}

impl SourceAdapter for WamisFlowAdapter {
    fn source(&self) -> &str {
        SOURCE_FLOW
    }

    fn step(&self) -> StepUnit {
        StepUnit::Daily
    }

    fn fetch(&self, entity: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<ObservationPoint>> {
        let url = self.client.flow_daily_url(entity, from, to);
        let body = self.client.get(entity, &url)?;
        Ok(within(parse_flow_daily(entity, &body)?, from, to))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
