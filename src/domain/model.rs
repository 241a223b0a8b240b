use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::domain::ParameterSpec;
use crate::domain::ParameterValue;
use crate::domain::ValidationError;

/// A named, versioned model definition, loaded from a descriptor file and
/// immutable afterwards. The executable is opaque to us: it is launched in
/// the task's working directory after the parameter file has been written
/// there, and is expected to leave the declared attachments behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Stable identifier used in URLs and on the wire (e.g. `abmb_c`)
    pub short_name: String,
    pub full_name: String,
    #[serde(default)]
    pub subtitle: String,
    pub version: String,
    /// Ordered: form rendering and the report table follow this order
    pub parameters: Vec<ParameterSpec>,
    /// Result files the executable must produce, attached to the result mail
    #[serde(default)]
    pub attachments: Vec<String>,
    pub executable: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Name of the parameter-value JSON file written into the working
    /// directory before the executable is spawned
    #[serde(default = "default_parameter_file")]
    pub parameter_file: String,
}

fn default_parameter_file() -> String { "params.json".to_string() }

impl ModelSpec {
    pub fn parameter(
        &self,
        name: &str,
    ) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check a complete submitted parameter set against this schema: every
    /// declared parameter present and valid, nothing extra.
    pub fn validate_parameters(
        &self,
        values: &BTreeMap<String, ParameterValue>,
    ) -> Result<(), ValidationError> {
        for spec in &self.parameters {
            let value = values
                .get(&spec.name)
                .ok_or_else(|| ValidationError::MissingParameter(spec.name.clone()))?;
            spec.validate(value)?;
        }
        for name in values.keys() {
            if self.parameter(name).is_none() {
                return Err(ValidationError::UnknownParameter(name.clone()));
            }
        }
        Ok(())
    }
}
