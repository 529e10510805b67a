//! Shared output formatting for taskboard CLI commands.
//!
//! Commands either print a JSON envelope (`--json`) or a human block with a
//! header, a summary, and optional details, warnings and next steps.

use std::fmt;

use serde::Serialize;

use crate::error::Result;

const SCHEMA_VERSION: &str = "taskboard.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

impl fmt::Display for HumanOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;
        if !self.summary.is_empty() {
            write!(f, "\n\nSummary:")?;
            for (key, value) in &self.summary {
                if value.is_empty() {
                    write!(f, "\n- {key}")?;
                } else {
                    write!(f, "\n- {key}: {value}")?;
                }
            }
        }
        for (title, items) in [
            ("Details", &self.details),
            ("Warnings", &self.warnings),
            ("Next steps", &self.next_steps),
        ] {
            if items.is_empty() {
                continue;
            }
            write!(f, "\n\n{title}:")?;
            for item in items {
                write!(f, "\n- {item}")?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a, B: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(flatten)]
    body: B,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<&'a str>,
}

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    data: &'a T,
}

#[derive(Serialize)]
struct Failure<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn borrowed(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

fn print_envelope<B: Serialize>(envelope: &Envelope<'_, B>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            body: Success { data },
            warnings: human.map(|h| borrowed(&h.warnings)).unwrap_or_default(),
            next_steps: human.map(|h| borrowed(&h.next_steps)).unwrap_or_default(),
        });
    }

    match human {
        Some(human) if !options.quiet => println!("{human}"),
        _ => {}
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &crate::error::Error, json: bool) -> Result<()> {
    let hint = error_hint(err);
    if json {
        let message = err.to_string();
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            body: Failure {
                error: ErrorBody {
                    message: &message,
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                },
            },
            warnings: Vec::new(),
            next_steps: hint.into_iter().collect(),
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

fn error_kind(err: &crate::error::Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "policy_blocked",
        _ => "operation_failed",
    }
}

/// Command to suggest after a failure, if any.
fn error_hint(err: &crate::error::Error) -> Option<&'static str> {
    use crate::error::Error;

    let hint = match err {
        Error::NotAuthenticated => "taskboard login --username <name> --password <password>",
        Error::NotFound { kind: "task", .. } => "taskboard task list",
        Error::NotFound { kind: "user", .. } => "taskboard user list",
        Error::AssignmentRejected(_) => "taskboard user available",
        Error::DeleteRefused(_) => "taskboard task unassign <task-id>",
        Error::InvalidConfig(_) | Error::TomlParse(_) => "fix taskboard.toml then retry",
        Error::QuotaExceeded { .. } => "taskboard task clear",
        _ => return None,
    };
    Some(hint)
}
