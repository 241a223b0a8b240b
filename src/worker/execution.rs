//! Running one model task in its working directory.
//!
//! A model executable is opaque: we write the parameter file it expects,
//! launch it with the working directory as its cwd, capture its output
//! streams, and afterwards collect the attachments it declared. The text
//! report sent alongside the attachments is assembled here too.

use std::path::Path;

use tokio::process::Command;

use crate::domain::ModelSpec;
use crate::domain::Task;
use crate::email_client::Attachment;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("could not stage the model run")]
    Io(#[from] std::io::Error),
    #[error("could not serialize the parameter file")]
    Parameters(#[from] serde_json::Error),
    #[error("model executable exited with status {code:?}")]
    BadExit { code: Option<i32> },
    #[error("model did not produce expected attachment '{0}'")]
    MissingAttachment(String),
}

#[derive(Debug)]
pub struct RunOutput {
    pub report: String,
    pub attachments: Vec<Attachment>,
}

/// Write the parameter file, run the executable to completion, collect the
/// declared attachments. The child's stdout/stderr are fully consumed and
/// logged before this returns.
pub async fn run_model(
    spec: &ModelSpec,
    task: &Task,
    working_directory: &Path,
) -> Result<RunOutput, ExecutionError> {
    let mut parameter_file = serde_json::Map::new();
    for (name, value) in &task.model_parameters {
        parameter_file.insert(name.clone(), value.as_plain_json());
    }
    tokio::fs::write(
        working_directory.join(&spec.parameter_file),
        serde_json::to_vec_pretty(&serde_json::Value::Object(parameter_file))?,
    )
    .await?;

    tracing::info!(
        executable = %spec.executable.display(),
        "launching model executable"
    );
    let output = Command::new(&spec.executable)
        .args(&spec.arguments)
        .current_dir(working_directory)
        .output()
        .await?;
    tracing::info!(
        stdout = %String::from_utf8_lossy(&output.stdout),
        stderr = %String::from_utf8_lossy(&output.stderr),
        "model executable finished"
    );
    if !output.status.success() {
        return Err(ExecutionError::BadExit {
            code: output.status.code(),
        });
    }

    let mut attachments = Vec::with_capacity(spec.attachments.len());
    for name in &spec.attachments {
        let content = tokio::fs::read(working_directory.join(name))
            .await
            .map_err(|_| ExecutionError::MissingAttachment(name.clone()))?;
        attachments.push(Attachment::new(name.clone(), content));
    }

    Ok(RunOutput {
        report: build_report(spec, task),
        attachments,
    })
}

/// The plain-text body of the result mail: what ran, and with which
/// parameters, in the model's declared order.
pub fn build_report(
    spec: &ModelSpec,
    task: &Task,
) -> String {
    let mut report = String::new();
    report.push_str(&format!("Model run results: {}\n", spec.full_name));
    if !spec.subtitle.is_empty() {
        report.push_str(&format!("{}\n", spec.subtitle));
    }
    report.push_str(&format!("Version {}\n\nParameters:\n", spec.version));
    for parameter in &spec.parameters {
        if let Some(value) = task.model_parameters.get(&parameter.name) {
            report.push_str(&format!(
                "  {}: {}\n",
                parameter.description,
                value.display_with(parameter)
            ));
        }
    }
    if !spec.attachments.is_empty() {
        report.push_str("\nThe result files produced by this run are attached.\n");
    }
    report
}
