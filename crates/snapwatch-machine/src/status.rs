//! Status document types and display normalization.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool head mounted on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolHead {
    /// Single-nozzle 3D printing head.
    Extruder,
    /// Dual-nozzle 3D printing head.
    DualExtruder,
    /// CNC carving head.
    Cnc,
    /// Laser engraving head.
    Laser,
    /// Anything this crate does not recognize, passed through verbatim.
    Other(String),
}

impl ToolHead {
    /// Display label substituted into the forwarded document.
    pub fn label(&self) -> &str {
        match self {
            ToolHead::Extruder => "Extruder",
            ToolHead::DualExtruder => "Dual Extruder",
            ToolHead::Cnc => "CNC",
            ToolHead::Laser => "Laser",
            ToolHead::Other(s) => s,
        }
    }
}

/// Status document as returned by the machine's API.
///
/// Only the fields the agent normalizes are typed; everything else rides
/// along in `extra` and is forwarded untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatus {
    /// Free-form machine state string (`IDLE`, `RUNNING`, ...).
    pub status: Option<String>,
    /// Tool head identifier (`TOOLHEAD_3DPRINTING_1`, ...).
    pub tool_head: Option<String>,
    /// Nozzle temperature. Dual-extruder heads omit this.
    pub nozzle_temperature: Option<f64>,
    /// Nozzle target temperature.
    pub nozzle_target_temperature: Option<f64>,
    /// First-extruder temperature, reported by dual-extruder heads.
    pub nozzle_temperature1: Option<f64>,
    /// First-extruder target temperature, reported by dual-extruder heads.
    pub nozzle_target_temperature1: Option<f64>,
    /// Job progress as a 0..1 fraction.
    pub progress: Option<f64>,
    /// Estimated total job time in seconds.
    pub estimated_time: Option<u64>,
    /// Elapsed job time in seconds.
    pub elapsed_time: Option<u64>,
    /// Remaining job time in seconds.
    pub remaining_time: Option<u64>,
    /// Remaining fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized status document forwarded to sinks.
///
/// Progress and the time fields become display strings, the tool head
/// becomes its label, and the queried address is attached. A failed fetch
/// produces the degraded `UNAVAILABLE` shape instead.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Machine state string, or `UNAVAILABLE` when the fetch failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Error detail carried by `UNAVAILABLE` reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Address the status was queried from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Tool head display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_head: Option<String>,
    /// Nozzle temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nozzle_temperature: Option<f64>,
    /// Nozzle target temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nozzle_target_temperature: Option<f64>,
    /// Progress as a percentage string with one decimal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Estimated total job time as `H:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// Elapsed job time as `H:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    /// Remaining job time as `H:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<String>,
    /// Passthrough fields from the raw document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusReport {
    /// Normalize a raw document for dispatch.
    pub fn from_raw(raw: RawStatus, ip: Ipv4Addr) -> Self {
        let mut nozzle_temperature = raw.nozzle_temperature;
        let mut nozzle_target_temperature = raw.nozzle_target_temperature;

        let tool_head = raw.tool_head.map(|head| {
            if head == "TOOLHEAD_3DPRINTING_1" {
                if nozzle_temperature.is_none() {
                    // Dual extruders report per-extruder fields instead.
                    nozzle_temperature = raw.nozzle_temperature1;
                    nozzle_target_temperature = raw.nozzle_target_temperature1;
                    ToolHead::DualExtruder
                } else {
                    ToolHead::Extruder
                }
            } else if head == "TOOLHEAD_CNC_1" {
                ToolHead::Cnc
            } else if head == "TOOLHEAD_LASER_1" {
                ToolHead::Laser
            } else {
                ToolHead::Other(head)
            }
        });

        Self {
            status: raw.status,
            error: None,
            ip: Some(ip.to_string()),
            tool_head: tool_head.map(|head| head.label().to_string()),
            nozzle_temperature,
            nozzle_target_temperature,
            progress: Some(format_progress(raw.progress.unwrap_or(0.0))),
            estimated_time: Some(format_duration(raw.estimated_time.unwrap_or(0))),
            elapsed_time: Some(format_duration(raw.elapsed_time.unwrap_or(0))),
            remaining_time: Some(format_duration(raw.remaining_time.unwrap_or(0))),
            extra: raw.extra,
        }
    }

    /// Degraded report for a failed fetch or an unreachable machine.
    pub fn unavailable(error: impl std::fmt::Display) -> Self {
        Self {
            status: Some("UNAVAILABLE".to_string()),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Format a 0..1 fraction as a percentage string with one decimal.
fn format_progress(fraction: f64) -> String {
    format!("{:.1}", fraction * 100.0)
}

/// Format seconds as `H:MM:SS`, with a day count past 24 hours.
fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    match days {
        0 => format!("{hours}:{minutes:02}:{secs:02}"),
        1 => format!("1 day, {hours}:{minutes:02}:{secs:02}"),
        n => format!("{n} days, {hours}:{minutes:02}:{secs:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawStatus {
        serde_json::from_value(json).unwrap()
    }

    const IP: Ipv4Addr = Ipv4Addr::new(172, 16, 1, 5);

    #[test]
    fn test_single_extruder_label() {
        let report = StatusReport::from_raw(
            raw(serde_json::json!({
                "toolHead": "TOOLHEAD_3DPRINTING_1",
                "nozzleTemperature": 210.0,
                "nozzleTargetTemperature": 215.0,
            })),
            IP,
        );
        assert_eq!(report.tool_head.as_deref(), Some("Extruder"));
        assert_eq!(report.nozzle_temperature, Some(210.0));
    }

    #[test]
    fn test_dual_extruder_substitutes_per_extruder_fields() {
        let report = StatusReport::from_raw(
            raw(serde_json::json!({
                "toolHead": "TOOLHEAD_3DPRINTING_1",
                "nozzleTemperature1": 200.0,
                "nozzleTargetTemperature1": 205.0,
            })),
            IP,
        );
        assert_eq!(report.tool_head.as_deref(), Some("Dual Extruder"));
        assert_eq!(report.nozzle_temperature, Some(200.0));
        assert_eq!(report.nozzle_target_temperature, Some(205.0));
    }

    #[test]
    fn test_cnc_and_laser_labels() {
        let cnc = StatusReport::from_raw(raw(serde_json::json!({"toolHead": "TOOLHEAD_CNC_1"})), IP);
        assert_eq!(cnc.tool_head.as_deref(), Some("CNC"));

        let laser =
            StatusReport::from_raw(raw(serde_json::json!({"toolHead": "TOOLHEAD_LASER_1"})), IP);
        assert_eq!(laser.tool_head.as_deref(), Some("Laser"));
    }

    #[test]
    fn test_unknown_tool_head_passes_through() {
        let report =
            StatusReport::from_raw(raw(serde_json::json!({"toolHead": "TOOLHEAD_FUTURE_9"})), IP);
        assert_eq!(report.tool_head.as_deref(), Some("TOOLHEAD_FUTURE_9"));
    }

    #[test]
    fn test_progress_percentage() {
        let report = StatusReport::from_raw(raw(serde_json::json!({"progress": 0.456})), IP);
        assert_eq!(report.progress.as_deref(), Some("45.6"));
    }

    #[test]
    fn test_missing_progress_defaults_to_zero() {
        let report = StatusReport::from_raw(raw(serde_json::json!({})), IP);
        assert_eq!(report.progress.as_deref(), Some("0.0"));
        assert_eq!(report.estimated_time.as_deref(), Some("0:00:00"));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(59), "0:00:59");
        assert_eq!(format_duration(3_661), "1:01:01");
        assert_eq!(format_duration(90_061), "1 day, 1:01:01");
        assert_eq!(format_duration(180_000), "2 days, 2:00:00");
    }

    #[test]
    fn test_estimated_time_normalized() {
        let report = StatusReport::from_raw(raw(serde_json::json!({"estimatedTime": 3661})), IP);
        assert_eq!(report.estimated_time.as_deref(), Some("1:01:01"));
    }

    #[test]
    fn test_address_attached_and_extras_preserved() {
        let report = StatusReport::from_raw(
            raw(serde_json::json!({
                "status": "RUNNING",
                "heatedBedTemperature": 60.5,
                "fileName": "benchy.gcode",
            })),
            IP,
        );
        assert_eq!(report.ip.as_deref(), Some("172.16.1.5"));
        assert_eq!(report.status.as_deref(), Some("RUNNING"));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["heatedBedTemperature"], 60.5);
        assert_eq!(value["fileName"], "benchy.gcode");
        assert_eq!(value["ip"], "172.16.1.5");
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let report = StatusReport::from_raw(
            raw(serde_json::json!({
                "toolHead": "TOOLHEAD_CNC_1",
                "estimatedTime": 60,
            })),
            IP,
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["toolHead"], "CNC");
        assert_eq!(value["estimatedTime"], "0:01:00");
    }

    #[test]
    fn test_unavailable_shape() {
        let report = StatusReport::unavailable("connection refused");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "UNAVAILABLE");
        assert_eq!(value["error"], "connection refused");
        assert!(value.get("ip").is_none());
        assert!(value.get("progress").is_none());
    }
}
