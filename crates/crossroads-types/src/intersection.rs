//! Typed view of controller reports and manual commands.
//!
//! The bridge forwards device JSON verbatim and never depends on these
//! types for routing. They exist for logging, for the status endpoint,
//! and for the signal simulator, which has to speak the same dialect as
//! the physical controller.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of lanes on the intersection.
pub const LANE_COUNT: u8 = 4;

/// Timestamp layout used in controller reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A signal head color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalColor {
    /// Stop.
    Red,
    /// Prepare to stop.
    Yellow,
    /// Go.
    Green,
}

impl SignalColor {
    /// Parse the wire spelling (`"RED"`, `"YELLOW"`, `"GREEN"`).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "RED" => Some(Self::Red),
            "YELLOW" => Some(Self::Yellow),
            "GREEN" => Some(Self::Green),
            _ => None,
        }
    }

    /// The wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
        }
    }
}

impl core::fmt::Display for SignalColor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of one lane in a report. Lanes are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStatus {
    /// 1-based lane number.
    pub lane: u8,
    /// Current color of the lane's signal head.
    pub status: SignalColor,
}

/// A full-intersection report as sent by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionReport {
    /// Local wall-clock time, formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    /// One entry per lane, in lane order.
    pub intersection: Vec<LaneStatus>,
}

impl IntersectionReport {
    /// Build a report stamped with the current local time.
    pub fn now(statuses: &[SignalColor]) -> Self {
        Self::with_timestamp(Local::now().format(TIMESTAMP_FORMAT).to_string(), statuses)
    }

    /// Build a report with an explicit timestamp.
    pub fn with_timestamp(timestamp: String, statuses: &[SignalColor]) -> Self {
        let intersection = (1..=LANE_COUNT)
            .zip(statuses.iter().copied())
            .map(|(lane, status)| LaneStatus { lane, status })
            .collect();
        Self {
            timestamp,
            intersection,
        }
    }

    /// Try to read a device value as a report. Returns `None` for any
    /// other shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Compact one-line rendering for logs, e.g. `1=GREEN 2=RED 3=RED 4=RED`.
    pub fn summary(&self) -> String {
        self.intersection
            .iter()
            .map(|l| format!("{}={}", l.lane, l.status))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a controller does with a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualDirective {
    /// Hold `lane` at `color`; every other lane goes red.
    Override {
        /// 1-based lane number.
        lane: u8,
        /// Color to hold.
        color: SignalColor,
    },
    /// Leave manual mode and resume the automatic cycle.
    Resume,
    /// The control field is set but the lane or color is unusable.
    Invalid(String),
}

impl ManualDirective {
    /// Interpret a command object.
    ///
    /// A truthy `manual_control` (non-null, non-false, non-zero, non-empty)
    /// requests an override and then requires `lane` in `1..=LANE_COUNT` and
    /// a valid `color`. Anything else means resume.
    pub fn interpret(command: &Map<String, Value>) -> Self {
        if !command.get(crate::CONTROL_FIELD).is_some_and(is_truthy) {
            return Self::Resume;
        }

        let lane = command
            .get("lane")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok())
            .filter(|n| (1..=LANE_COUNT).contains(n));
        let color = command
            .get("color")
            .and_then(Value::as_str)
            .and_then(SignalColor::from_wire);

        match (lane, color) {
            (Some(lane), Some(color)) => Self::Override { lane, color },
            (None, _) => Self::Invalid(format!(
                "lane must be an integer in 1..={LANE_COUNT}, got {}",
                describe(command.get("lane"))
            )),
            (_, None) => Self::Invalid(format!(
                "color must be RED, YELLOW or GREEN, got {}",
                describe(command.get("color"))
            )),
        }
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "nothing".to_owned(), Value::to_string)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn report_serializes_like_controller() {
        let report = IntersectionReport::with_timestamp(
            "2025-03-01 08:00:00".to_owned(),
            &[SignalColor::Green, SignalColor::Red, SignalColor::Red, SignalColor::Red],
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": "2025-03-01 08:00:00",
                "intersection": [
                    {"lane": 1, "status": "GREEN"},
                    {"lane": 2, "status": "RED"},
                    {"lane": 3, "status": "RED"},
                    {"lane": 4, "status": "RED"}
                ]
            })
        );
        assert_eq!(report.summary(), "1=GREEN 2=RED 3=RED 4=RED");
    }

    #[test]
    fn from_value_rejects_other_shapes() {
        assert!(IntersectionReport::from_value(&json!({"a": 1})).is_none());
        assert!(IntersectionReport::from_value(&json!({
            "timestamp": "t",
            "intersection": [{"lane": 1, "status": "BLUE"}]
        }))
        .is_none());
    }

    #[test]
    fn override_requires_lane_and_color() {
        let d = ManualDirective::interpret(&obj(json!({"manual_control": true, "lane": 2, "color": "YELLOW"})));
        assert_eq!(d, ManualDirective::Override { lane: 2, color: SignalColor::Yellow });

        let d = ManualDirective::interpret(&obj(json!({"manual_control": true, "lane": 2})));
        assert!(matches!(d, ManualDirective::Invalid(_)));

        let d = ManualDirective::interpret(&obj(json!({"manual_control": true, "lane": 5, "color": "RED"})));
        assert!(matches!(d, ManualDirective::Invalid(_)));

        let d = ManualDirective::interpret(&obj(json!({"manual_control": 1, "lane": 0, "color": "RED"})));
        assert!(matches!(d, ManualDirective::Invalid(_)));
    }

    #[test]
    fn falsy_control_means_resume() {
        for v in [json!(false), json!(null), json!(0), json!(""), json!([])] {
            let d = ManualDirective::interpret(&obj(json!({"manual_control": v, "lane": 1, "color": "RED"})));
            assert_eq!(d, ManualDirective::Resume);
        }
        assert_eq!(ManualDirective::interpret(&Map::new()), ManualDirective::Resume);
    }

    #[test]
    fn color_wire_spelling() {
        assert_eq!(SignalColor::from_wire("GREEN"), Some(SignalColor::Green));
        assert_eq!(SignalColor::from_wire("green"), None);
        assert_eq!(SignalColor::Yellow.to_string(), "YELLOW");
    }
}
