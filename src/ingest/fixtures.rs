//! Test fixtures: representative JSON payloads from the WAMIS open API.
//!
//! Structurally complete but cut down to the handful of records needed to
//! exercise the parsers. Envelope shape for both endpoints:
//!
//!   { "list": [ {...}, ... ], "resultCode": "...", "resultMsg": "..." }
//!
//! Dam hourly (`wkd/mn_hrdata`) items:
//!   damcd  — dam code
//!   obsdh  — observation time, `yyyyMMddHH`, hour 01..24
//!   rsrt   — storage rate (%); also swl / inf / tototf, unused here
//!
//! Flow daily (`wkd/flowdtd`) items:
//!   obscd  — gauging station code
//!   ymd    — `yyyyMMdd`
//!   flow   — daily mean discharge (m³/s)
//!
//! Numeric fields arrive as numbers, as strings, or as "-" / "" for
//! missing values depending on the station. Parsers must handle all three.

/// Soyang River dam, one day of readings including hour 24, a blank storage
/// rate and a stringly-typed number.
#[cfg(test)]
pub(crate) fn fixture_dam_hourly_json() -> &'static str {
    r#"{
      "list": [
        { "damcd": "1012110", "obsdh": "2024050106", "swl": "183.21", "rsrt": 52.3, "inf": "40.1", "tototf": "35.0" },
        { "damcd": "1012110", "obsdh": "2024050112", "swl": "183.25", "rsrt": "52.4", "inf": "41.0", "tototf": "35.0" },
        { "damcd": "1012110", "obsdh": "2024050118", "swl": "-", "rsrt": "-", "inf": "-", "tototf": "-" },
        { "damcd": "1012110", "obsdh": "2024050124", "swl": "183.30", "rsrt": "52.6", "inf": "39.7", "tototf": "35.0" }
      ],
      "resultCode": "success",
      "resultMsg": "정상 처리되었습니다."
    }"#
}

/// Flow station with one missing day and one zero-flow day.
#[cfg(test)]
pub(crate) fn fixture_flow_daily_json() -> &'static str {
    r#"{
      "list": [
        { "obscd": "2004690", "ymd": "20240501", "flow": "12.43" },
        { "obscd": "2004690", "ymd": "20240502", "flow": "" },
        { "obscd": "2004690", "ymd": "20240503", "flow": 0 },
        { "obscd": "2004690", "ymd": "20240504", "flow": 11.9 }
      ],
      "resultCode": "success",
      "resultMsg": "정상 처리되었습니다."
    }"#
}

/// Station with no data in the requested window: the list key is absent.
#[cfg(test)]
pub(crate) fn fixture_empty_json() -> &'static str {
    r#"{ "resultCode": "success", "resultMsg": "데이터가 없습니다." }"#
}

/// Rejected request (bad key).
#[cfg(test)]
pub(crate) fn fixture_error_json() -> &'static str {
    r#"{ "resultCode": "fail", "resultMsg": "인증키가 유효하지 않습니다." }"#
}

/// Record whose timestamp cannot be parsed.
#[cfg(test)]
pub(crate) fn fixture_bad_timestamp_json() -> &'static str {
    r#"{
      "list": [
        { "damcd": "1012110", "obsdh": "2024-05-01 06", "rsrt": "52.3" }
      ],
      "resultCode": "success",
      "resultMsg": "정상 처리되었습니다."
    }"#
}
