//! Field validation for the action surface
//!
//! Every action declares its fields in a static rule table. [`validate`] walks
//! the table for the requested action, coerces and range-checks each value,
//! fills in defaults and collects every violation it finds. It has no side
//! effects and holds no state, so it runs on the caller's task before a
//! request is routed to a station.

use crate::action::ActionKind;
use crate::command::{MAX_CURRENT_A, MAX_OUTPUT_VALUE, MIN_CURRENT_A};
use crate::error::{KebaError, Result};
use crate::station::StationId;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field every action must carry
pub const STATION_FIELD: &str = "station";

/// Longest text the station display accepts
pub const DISPLAY_MAX_CHARS: usize = 23;

// Tolerance for float noise when snapping to a step grid
const STEP_EPSILON: f64 = 1e-9;

/// Constraint attached to a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Number in `[min, max]` snapped down to `step`. `sentinel` is accepted
    /// as-is even outside the range.
    Number {
        min: f64,
        max: f64,
        step: f64,
        sentinel: Option<f64>,
    },
    /// Whole number in `[min, max]`; fractional input is rejected
    Integer { min: i64, max: i64 },
    /// One of an enumerated set of whole numbers
    Choice { values: &'static [i64] },
    /// Canonical JSON boolean
    Bool,
    /// Non-empty free text
    Text { max_chars: Option<usize> },
}

/// Default applied when an optional field is absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Number(f64),
    Bool(bool),
}

/// One row of an action's schema
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

impl FieldRule {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    const fn defaulted(name: &'static str, kind: FieldKind, default: FieldDefault) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
        }
    }
}

const CURRENT: FieldKind = FieldKind::Number {
    min: MIN_CURRENT_A as f64,
    max: MAX_CURRENT_A as f64,
    step: 1.0,
    sentinel: None,
};
const TEXT: FieldKind = FieldKind::Text { max_chars: None };

static START_RULES: [FieldRule; 2] = [
    FieldRule::optional("rfid", TEXT),
    FieldRule::optional("rfid_class", TEXT),
];

static STOP_RULES: [FieldRule; 1] = [FieldRule::optional("rfid", TEXT)];

static SET_ENERGY_RULES: [FieldRule; 1] = [FieldRule::optional(
    "energy",
    FieldKind::Number {
        min: 0.0,
        max: 100.0,
        step: 0.1,
        sentinel: None,
    },
)];

static SET_CURRENT_RULES: [FieldRule; 2] = [
    FieldRule::defaulted("current", CURRENT, FieldDefault::Number(6.0)),
    FieldRule::defaulted(
        "delay",
        FieldKind::Number {
            min: 0.0,
            max: 300.0,
            step: 1.0,
            sentinel: None,
        },
        FieldDefault::Number(0.0),
    ),
];

static SET_FAILSAFE_RULES: [FieldRule; 3] = [
    FieldRule::defaulted(
        "failsafe_timeout",
        FieldKind::Number {
            min: 1.0,
            max: 3600.0,
            step: 1.0,
            sentinel: Some(0.0),
        },
        FieldDefault::Number(30.0),
    ),
    FieldRule::defaulted(
        "failsafe_fallback",
        FieldKind::Number {
            min: MIN_CURRENT_A as f64,
            max: MAX_CURRENT_A as f64,
            step: 1.0,
            sentinel: Some(0.0),
        },
        FieldDefault::Number(6.0),
    ),
    FieldRule::defaulted("failsafe_persist", FieldKind::Bool, FieldDefault::Bool(false)),
];

static SET_CHARGING_POWER_RULES: [FieldRule; 3] = [
    FieldRule::defaulted(
        "power",
        FieldKind::Number {
            min: 0.0,
            max: 44.0,
            step: 0.1,
            sentinel: None,
        },
        FieldDefault::Number(11.0),
    ),
    FieldRule::defaulted("round_up", FieldKind::Bool, FieldDefault::Bool(false)),
    FieldRule::defaulted(
        "stop_below_6_ampere",
        FieldKind::Bool,
        FieldDefault::Bool(false),
    ),
];

static SET_OUTPUT_RULES: [FieldRule; 1] = [FieldRule::required(
    "out",
    FieldKind::Integer {
        min: 0,
        max: MAX_OUTPUT_VALUE,
    },
)];

static X2SRC_RULES: [FieldRule; 1] = [FieldRule::required(
    "source",
    FieldKind::Choice {
        values: &[0, 1, 2, 3, 4],
    },
)];

static X2_RULES: [FieldRule; 1] = [FieldRule::required("three_phases", FieldKind::Bool)];

static DISPLAY_RULES: [FieldRule; 1] = [FieldRule::required(
    "text",
    FieldKind::Text {
        max_chars: Some(DISPLAY_MAX_CHARS),
    },
)];

/// Field rules of an action, excluding the station reference
pub fn rules_for(action: ActionKind) -> &'static [FieldRule] {
    match action {
        ActionKind::RequestData
        | ActionKind::Enable
        | ActionKind::Disable
        | ActionKind::UnlockSocket => &[],
        ActionKind::Start => &START_RULES,
        ActionKind::Stop => &STOP_RULES,
        ActionKind::SetEnergy => &SET_ENERGY_RULES,
        ActionKind::SetCurrent => &SET_CURRENT_RULES,
        ActionKind::SetFailsafe => &SET_FAILSAFE_RULES,
        ActionKind::SetChargingPower => &SET_CHARGING_POWER_RULES,
        ActionKind::SetOutput => &SET_OUTPUT_RULES,
        ActionKind::X2src => &X2SRC_RULES,
        ActionKind::X2 => &X2_RULES,
        ActionKind::Display => &DISPLAY_RULES,
    }
}

/// What was wrong with a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    Unknown,
    WrongType { expected: &'static str },
    OutOfRange { min: f64, max: f64 },
    NotAllowed { allowed: Vec<i64> },
    Empty,
    TooLong { max_chars: usize },
    Requires { field: &'static str },
    Invalid { message: String },
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new<S: Into<String>>(field: S, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn invalid(field: String, message: String) -> Self {
        Self::new(field, ViolationKind::Invalid { message })
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.field)?;
        match &self.kind {
            ViolationKind::Missing => f.write_str("is required"),
            ViolationKind::Unknown => f.write_str("is not a field of this action"),
            ViolationKind::WrongType { expected } => write!(f, "expected {}", expected),
            ViolationKind::OutOfRange { min, max } => {
                write!(f, "must be within [{}, {}]", min, max)
            }
            ViolationKind::NotAllowed { allowed } => write!(f, "must be one of {:?}", allowed),
            ViolationKind::Empty => f.write_str("must not be empty"),
            ViolationKind::TooLong { max_chars } => {
                write!(f, "must be at most {} characters", max_chars)
            }
            ViolationKind::Requires { field } => write!(f, "requires {}", field),
            ViolationKind::Invalid { message } => f.write_str(message),
        }
    }
}

/// Normalized value of a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

/// Normalized field set of one action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedFields {
    action: ActionKind,
    station: StationId,
    values: BTreeMap<&'static str, FieldValue>,
}

impl ValidatedFields {
    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn station(&self) -> &StationId {
        &self.station
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub(crate) fn require_number(&self, name: &str) -> Result<f64> {
        self.number(name)
            .ok_or_else(|| KebaError::validation(name, "missing after validation"))
    }

    pub(crate) fn require_integer(&self, name: &str) -> Result<i64> {
        self.integer(name)
            .ok_or_else(|| KebaError::validation(name, "missing after validation"))
    }

    pub(crate) fn require_bool(&self, name: &str) -> Result<bool> {
        self.boolean(name)
            .ok_or_else(|| KebaError::validation(name, "missing after validation"))
    }
}

/// Outcome of validating one request
pub type ValidationResult = std::result::Result<ValidatedFields, Vec<FieldViolation>>;

/// Validate a raw field map for `action`
pub fn validate(action: ActionKind, raw: &serde_json::Map<String, Value>) -> ValidationResult {
    let rules = rules_for(action);
    let mut violations = Vec::new();
    let mut values = BTreeMap::new();

    let station = match raw.get(STATION_FIELD) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(STATION_FIELD, ViolationKind::Missing));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            violations.push(FieldViolation::new(STATION_FIELD, ViolationKind::Empty));
            None
        }
        Some(Value::String(s)) => Some(StationId::new(s.trim())),
        Some(_) => {
            violations.push(FieldViolation::new(
                STATION_FIELD,
                ViolationKind::WrongType { expected: "string" },
            ));
            None
        }
    };

    for key in raw.keys() {
        if key != STATION_FIELD && !rules.iter().any(|r| r.name == key) {
            violations.push(FieldViolation::new(key.as_str(), ViolationKind::Unknown));
        }
    }

    for rule in rules {
        match raw.get(rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    violations.push(FieldViolation::new(rule.name, ViolationKind::Missing));
                } else if let Some(default) = rule.default {
                    values.insert(rule.name, default_value(default));
                }
            }
            Some(value) => match check_field(rule, value) {
                Ok(v) => {
                    values.insert(rule.name, v);
                }
                Err(kind) => violations.push(FieldViolation::new(rule.name, kind)),
            },
        }
    }

    cross_field_checks(action, &values, &mut violations);

    match station {
        Some(station) if violations.is_empty() => Ok(ValidatedFields {
            action,
            station,
            values,
        }),
        _ => Err(violations),
    }
}

/// [`validate`] mapped onto the crate error type
pub fn validate_request(
    action: ActionKind,
    raw: &serde_json::Map<String, Value>,
) -> Result<ValidatedFields> {
    validate(action, raw).map_err(KebaError::violations)
}

fn default_value(default: FieldDefault) -> FieldValue {
    match default {
        FieldDefault::Number(v) => FieldValue::Number(v),
        FieldDefault::Bool(v) => FieldValue::Bool(v),
    }
}

fn check_field(rule: &FieldRule, value: &Value) -> std::result::Result<FieldValue, ViolationKind> {
    match rule.kind {
        FieldKind::Number {
            min,
            max,
            step,
            sentinel,
        } => {
            let v = coerce_number(value)?;
            if sentinel.is_some_and(|s| v == s) {
                return Ok(FieldValue::Number(v));
            }
            if v < min || v > max {
                return Err(ViolationKind::OutOfRange { min, max });
            }
            Ok(FieldValue::Number(snap_down(v, min, step)))
        }
        FieldKind::Integer { min, max } => {
            let v = coerce_integer(value)?;
            if v < min || v > max {
                return Err(ViolationKind::OutOfRange {
                    min: min as f64,
                    max: max as f64,
                });
            }
            Ok(FieldValue::Integer(v))
        }
        FieldKind::Choice { values } => {
            let v = coerce_integer(value)?;
            if values.contains(&v) {
                Ok(FieldValue::Integer(v))
            } else {
                Err(ViolationKind::NotAllowed {
                    allowed: values.to_vec(),
                })
            }
        }
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            _ => Err(ViolationKind::WrongType { expected: "boolean" }),
        },
        FieldKind::Text { max_chars } => match value {
            Value::String(s) if s.trim().is_empty() => Err(ViolationKind::Empty),
            Value::String(s) => match max_chars {
                Some(max) if s.chars().count() > max => {
                    Err(ViolationKind::TooLong { max_chars: max })
                }
                _ => Ok(FieldValue::Text(s.trim().to_string())),
            },
            _ => Err(ViolationKind::WrongType { expected: "string" }),
        },
    }
}

fn coerce_number(value: &Value) -> std::result::Result<f64, ViolationKind> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ViolationKind::WrongType { expected: "number" }),
    }
}

fn coerce_integer(value: &Value) -> std::result::Result<i64, ViolationKind> {
    if let Value::Number(n) = value
        && let Some(i) = n.as_i64()
    {
        return Ok(i);
    }
    let v = coerce_number(value).map_err(|_| ViolationKind::WrongType { expected: "integer" })?;
    if v.fract() != 0.0 || v < i64::MIN as f64 || v > i64::MAX as f64 {
        return Err(ViolationKind::WrongType { expected: "integer" });
    }
    Ok(v as i64)
}

/// Snap `value` down onto the grid `min + k * step`
pub fn snap_down(value: f64, min: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let steps = ((value - min) / step + STEP_EPSILON).floor();
    let snapped = min + steps * step;
    // Drop float noise such as 0.30000000000000004
    (snapped * 1e6).round() / 1e6
}

fn cross_field_checks(
    action: ActionKind,
    values: &BTreeMap<&'static str, FieldValue>,
    violations: &mut Vec<FieldViolation>,
) {
    match action {
        ActionKind::Start => {
            if values.contains_key("rfid_class") && !values.contains_key("rfid") {
                violations.push(FieldViolation::new(
                    "rfid_class",
                    ViolationKind::Requires { field: "rfid" },
                ));
            }
        }
        ActionKind::SetFailsafe => {
            let timeout = values.get("failsafe_timeout");
            let fallback = values.get("failsafe_fallback");
            let persist = values.get("failsafe_persist");
            let zero_value = FieldValue::Number(0.0);
            let off_value = FieldValue::Bool(false);
            let zero = Some(&zero_value);
            let disabling = timeout == zero && fallback == zero && persist == Some(&off_value);
            if !disabling {
                for (name, value) in [("failsafe_timeout", timeout), ("failsafe_fallback", fallback)]
                {
                    if value == zero {
                        violations.push(FieldViolation::invalid(
                            name.to_string(),
                            "0 is only allowed when disabling the failsafe".to_string(),
                        ));
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> serde_json::Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn snap_down_handles_float_noise() {
        assert_eq!(snap_down(0.3, 0.0, 0.1), 0.3);
        assert_eq!(snap_down(7.9, 6.0, 1.0), 7.0);
        assert_eq!(snap_down(11.05, 0.0, 0.1), 11.0);
    }

    #[test]
    fn defaults_are_applied() {
        let v = validate(ActionKind::SetFailsafe, &fields(json!({"station": "a"}))).unwrap();
        assert_eq!(v.number("failsafe_timeout"), Some(30.0));
        assert_eq!(v.number("failsafe_fallback"), Some(6.0));
        assert_eq!(v.boolean("failsafe_persist"), Some(false));
    }

    #[test]
    fn every_violation_is_reported() {
        let errs = validate(
            ActionKind::SetCurrent,
            &fields(json!({"current": 70, "delay": "soon", "speed": 1})),
        )
        .unwrap_err();
        let names: Vec<_> = errs.iter().map(|v| v.field.as_str()).collect();
        assert!(names.contains(&"station"));
        assert!(names.contains(&"current"));
        assert!(names.contains(&"delay"));
        assert!(names.contains(&"speed"));
    }
}
