use serde::Deserialize;
use serde::Serialize;

/// The kinds of parameter a model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Integer,
    Float,
    Range,
    Boolean,
    String,
    Select,
}

/// A submitted parameter value, tagged with its kind.
///
/// The wire representation is `{"type": "<kind>", "value": <json>}`, with a
/// range value spelled `{"start": ..., "end": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Integer(i64),
    Float(f64),
    Range { start: f64, end: f64 },
    Boolean(bool),
    String(String),
    Select(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Integer(_) => ParameterKind::Integer,
            Self::Float(_) => ParameterKind::Float,
            Self::Range { .. } => ParameterKind::Range,
            Self::Boolean(_) => ParameterKind::Boolean,
            Self::String(_) => ParameterKind::String,
            Self::Select(_) => ParameterKind::Select,
        }
    }

    /// The untagged representation written into the executable's parameter
    /// file. Executables see plain values, not the wire envelope.
    pub fn as_plain_json(&self) -> serde_json::Value {
        match self {
            Self::Integer(v) => serde_json::json!(v),
            Self::Float(v) => serde_json::json!(v),
            Self::Range { start, end } => serde_json::json!({"start": start, "end": end}),
            Self::Boolean(v) => serde_json::json!(v),
            Self::String(v) | Self::Select(v) => serde_json::json!(v),
        }
    }

    /// Human-readable rendering for the result report, with the spec's unit
    /// label appended where one is declared.
    pub fn display_with(
        &self,
        spec: &ParameterSpec,
    ) -> String {
        let bare = match self {
            Self::Integer(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Range { start, end } => format!("{start} to {end}"),
            Self::Boolean(true) => "yes".to_string(),
            Self::Boolean(false) => "no".to_string(),
            Self::String(v) | Self::Select(v) => v.clone(),
        };
        match (&spec.units, self) {
            (Some(units), Self::Integer(_) | Self::Float(_) | Self::Range { .. }) => {
                format!("{bare} {units}")
            }
            _ => bare,
        }
    }
}

/// Everything that can go wrong between a submitted form/task and a
/// validated parameter set. Rendered back to the submitter verbatim, so the
/// messages name the offending parameter.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("unknown version '{version}' of model '{model}'")]
    UnknownVersion { model: String, version: String },
    #[error("missing value for parameter '{0}'")]
    MissingParameter(String),
    #[error("unexpected parameter '{0}'")]
    UnknownParameter(String),
    #[error("parameter '{name}' expects a {expected:?} value")]
    KindMismatch {
        name: String,
        expected: ParameterKind,
    },
    #[error("could not parse '{value}' as a value for parameter '{name}'")]
    Unparseable { name: String, value: String },
    #[error("parameter '{name}' must lie between {lo} and {hi}")]
    OutOfRange { name: String, lo: f64, hi: f64 },
    #[error("parameter '{name}' must have its start before its end")]
    EmptyRange { name: String },
    #[error("'{value}' is not an allowed choice for parameter '{name}'")]
    UnknownChoice { name: String, value: String },
    #[error("{0}")]
    BadEmail(String),
}

/// The declared schema of a single model parameter, as read from a model
/// descriptor. `range_start`/`range_end` bound numeric and range values;
/// `step` and `help_text` only inform form rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
    /// Plain (untagged) default, interpreted according to `kind`
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub range_start: Option<f64>,
    #[serde(default)]
    pub range_end: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub help_text: Option<String>,
}

impl ParameterSpec {
    /// The declared default as a tagged value, if there is one that matches
    /// this parameter's kind.
    pub fn default_value(&self) -> Option<ParameterValue> {
        let raw = self.default.as_ref()?;
        match self.kind {
            ParameterKind::Integer => raw.as_i64().map(ParameterValue::Integer),
            ParameterKind::Float => raw.as_f64().map(ParameterValue::Float),
            ParameterKind::Range => {
                let start = raw.get("start")?.as_f64()?;
                let end = raw.get("end")?.as_f64()?;
                Some(ParameterValue::Range { start, end })
            }
            ParameterKind::Boolean => raw.as_bool().map(ParameterValue::Boolean),
            ParameterKind::String => raw.as_str().map(|s| ParameterValue::String(s.to_string())),
            ParameterKind::Select => raw.as_str().map(|s| ParameterValue::Select(s.to_string())),
        }
    }

    /// Check a tagged value against this schema: kind, numeric bounds,
    /// range orientation, select membership.
    pub fn validate(
        &self,
        value: &ParameterValue,
    ) -> Result<(), ValidationError> {
        if value.kind() != self.kind {
            return Err(ValidationError::KindMismatch {
                name: self.name.clone(),
                expected: self.kind,
            });
        }
        match value {
            ParameterValue::Integer(v) => self.check_bounds(*v as f64),
            ParameterValue::Float(v) => self.check_bounds(*v),
            ParameterValue::Range { start, end } => {
                if start > end {
                    return Err(ValidationError::EmptyRange {
                        name: self.name.clone(),
                    });
                }
                self.check_bounds(*start)?;
                self.check_bounds(*end)
            }
            ParameterValue::Select(choice) => {
                if self.choices.iter().any(|c| c == choice) {
                    Ok(())
                } else {
                    Err(ValidationError::UnknownChoice {
                        name: self.name.clone(),
                        value: choice.clone(),
                    })
                }
            }
            ParameterValue::Boolean(_) | ParameterValue::String(_) => Ok(()),
        }
    }

    fn check_bounds(
        &self,
        v: f64,
    ) -> Result<(), ValidationError> {
        let lo = self.range_start.unwrap_or(f64::NEG_INFINITY);
        let hi = self.range_end.unwrap_or(f64::INFINITY);
        if v < lo || v > hi {
            return Err(ValidationError::OutOfRange {
                name: self.name.clone(),
                lo,
                hi,
            });
        }
        Ok(())
    }

    /// Parse a raw form field into a validated value. An absent field means
    /// `false` for booleans (unchecked checkbox) and otherwise falls back to
    /// the declared default.
    pub fn parse_form_value(
        &self,
        raw: Option<&str>,
    ) -> Result<ParameterValue, ValidationError> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        let value = match raw {
            None => match self.kind {
                ParameterKind::Boolean => ParameterValue::Boolean(false),
                _ => self
                    .default_value()
                    .ok_or_else(|| ValidationError::MissingParameter(self.name.clone()))?,
            },
            Some(raw) => self.parse_raw(raw)?,
        };
        self.validate(&value)?;
        Ok(value)
    }

    fn parse_raw(
        &self,
        raw: &str,
    ) -> Result<ParameterValue, ValidationError> {
        let unparseable = || ValidationError::Unparseable {
            name: self.name.clone(),
            value: raw.to_string(),
        };
        Ok(match self.kind {
            ParameterKind::Integer => {
                ParameterValue::Integer(raw.parse().map_err(|_| unparseable())?)
            }
            ParameterKind::Float => ParameterValue::Float(raw.parse().map_err(|_| unparseable())?),
            // ranges arrive from the form as "start:end"
            ParameterKind::Range => {
                let (start, end) = raw.split_once(':').ok_or_else(unparseable)?;
                ParameterValue::Range {
                    start: start.trim().parse().map_err(|_| unparseable())?,
                    end: end.trim().parse().map_err(|_| unparseable())?,
                }
            }
            ParameterKind::Boolean => {
                ParameterValue::Boolean(matches!(raw, "on" | "true" | "1" | "yes"))
            }
            ParameterKind::String => ParameterValue::String(raw.to_string()),
            ParameterKind::Select => ParameterValue::Select(raw.to_string()),
        })
    }
}
