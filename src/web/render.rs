//! Inline HTML pages for the front-end. Pages are small and few, so they
//! are built with `format!` rather than a template engine; everything
//! interpolated from user input or descriptors goes through `escape`.

use crate::domain::ModelSpec;
use crate::domain::ParameterKind;
use crate::domain::ParameterSpec;
use crate::domain::ParameterValue;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(
    title: &str,
    body: &str,
) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta http-equiv="content-type" content="text/html; charset=utf-8" />
    <title>{title}</title>
  </head>
  <body>
{body}
  </body>
</html>"#,
        title = escape(title),
    )
}

pub fn message_page(
    title: &str,
    text: &str,
) -> String {
    page(
        title,
        &format!(
            "    <h1>{}</h1>\n    <p>{}</p>",
            escape(title),
            escape(text)
        ),
    )
}

pub fn index_page(models: &[ModelSpec]) -> String {
    let mut items = String::new();
    for model in models {
        items.push_str(&format!(
            r#"      <li><a href="/models/{name}">{full}</a> &mdash; {subtitle}</li>
"#,
            name = escape(&model.short_name),
            full = escape(&model.full_name),
            subtitle = escape(&model.subtitle),
        ));
    }
    page(
        "Available models",
        &format!("    <h1>Available models</h1>\n    <ul>\n{items}    </ul>"),
    )
}

/// The value pre-filled into a form field, in the same format the submit
/// handler parses back.
fn form_default(spec: &ParameterSpec) -> Option<String> {
    match spec.default_value() {
        Some(ParameterValue::Integer(v)) => Some(v.to_string()),
        Some(ParameterValue::Float(v)) => Some(v.to_string()),
        Some(ParameterValue::Range { start, end }) => Some(format!("{start}:{end}")),
        Some(ParameterValue::String(v)) | Some(ParameterValue::Select(v)) => Some(v),
        Some(ParameterValue::Boolean(_)) | None => None,
    }
}

fn parameter_row(spec: &ParameterSpec) -> String {
    let name = escape(&spec.name);
    let description = escape(&spec.description);
    let units = spec
        .units
        .as_deref()
        .map(|u| format!(" ({})", escape(u)))
        .unwrap_or_default();
    let value_attr = form_default(spec)
        .map(|v| format!(r#" value="{}""#, escape(&v)))
        .unwrap_or_default();

    let input = match spec.kind {
        ParameterKind::Integer | ParameterKind::Float => {
            let mut attrs = String::new();
            if let Some(lo) = spec.range_start {
                attrs.push_str(&format!(r#" min="{lo}""#));
            }
            if let Some(hi) = spec.range_end {
                attrs.push_str(&format!(r#" max="{hi}""#));
            }
            if let Some(step) = spec.step {
                attrs.push_str(&format!(r#" step="{step}""#));
            }
            format!(r#"<input type="number" name="{name}"{value_attr}{attrs} />"#)
        }
        ParameterKind::Range => {
            let placeholder = match (spec.range_start, spec.range_end) {
                (Some(lo), Some(hi)) => format!(r#" placeholder="{lo}:{hi}""#),
                _ => String::new(),
            };
            format!(r#"<input type="text" name="{name}"{value_attr}{placeholder} />"#)
        }
        ParameterKind::Boolean => {
            let checked = match spec.default_value() {
                Some(ParameterValue::Boolean(true)) => " checked",
                _ => "",
            };
            format!(r#"<input type="checkbox" name="{name}"{checked} />"#)
        }
        ParameterKind::Select => {
            let mut options = String::new();
            for choice in &spec.choices {
                options.push_str(&format!(
                    r#"<option value="{c}">{c}</option>"#,
                    c = escape(choice)
                ));
            }
            format!(r#"<select name="{name}">{options}</select>"#)
        }
        ParameterKind::String => {
            format!(r#"<input type="text" name="{name}"{value_attr} />"#)
        }
    };

    let help = spec
        .help_text
        .as_deref()
        .map(|h| format!("\n        <small>{}</small>", escape(h)))
        .unwrap_or_default();

    format!(
        r#"      <label>
        {description}{units}
        {input}{help}
      </label>
"#
    )
}

pub fn model_form_page(
    spec: &ModelSpec,
    error_text: Option<&str>,
) -> String {
    let error = error_text
        .map(|e| format!("    <p><i>{}</i></p>\n", escape(e)))
        .unwrap_or_default();
    let mut rows = String::new();
    for parameter in &spec.parameters {
        rows.push_str(&parameter_row(parameter));
    }
    let body = format!(
        r#"    <h1>{full}</h1>
    <p>{subtitle}</p>
{error}    <form action="/models/{name}" method="post">
      <input hidden type="text" name="modelVersion" value="{version}">
      <label>
        Email address for the results
        <input type="email" name="email" />
      </label>
{rows}      <button type="submit">Submit model run</button>
    </form>"#,
        full = escape(&spec.full_name),
        subtitle = escape(&spec.subtitle),
        name = escape(&spec.short_name),
        version = escape(&spec.version),
    );
    page(&spec.full_name, &body)
}

pub fn confirmation_sent_page(email: &str) -> String {
    message_page(
        "Confirmation required",
        &format!(
            "We have sent a confirmation link to {email}. Your model run will \
             begin once you visit it."
        ),
    )
}
