use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::types::ExitCode;

/// Result of a command, rendered either as text or as one JSON object.
pub trait Report: Serialize + fmt::Display {
    fn exit_code(&self) -> ExitCode;
}

pub struct Writer<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// JSON reports always carry the numeric `exit_code` next to `status`.
    pub fn render<R: Report>(&mut self, report: &R) -> io::Result<ExitCode> {
        let exit_code = report.exit_code();

        if self.json {
            let mut value = serde_json::to_value(report)?;
            if let Value::Object(fields) = &mut value {
                fields.insert(String::from("exit_code"), Value::from(exit_code.code()));
            }
            writeln!(self.out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            write!(self.out, "{}", report)?;
        }
        self.out.flush()?;

        Ok(exit_code)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
    #[serde(skip)]
    exit_code: ExitCode,
}

impl ErrorReport {
    pub fn new(error: &anyhow::Error, exit_code: ExitCode, with_causes: bool) -> Self {
        let causes = match with_causes {
            true => error.chain().skip(1).map(|cause| cause.to_string()).collect(),
            false => Vec::new(),
        };

        Self {
            status: "error",
            message: format!("{:#}", error),
            causes,
            exit_code,
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.message)?;
        for cause in &self.causes {
            writeln!(f, "  Caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl Report for ErrorReport {
    fn exit_code(&self) -> ExitCode {
        self.exit_code
    }
}

/// Two aligned columns, one line per output.
pub fn outputs_table(outputs: &BTreeMap<String, String>) -> String {
    let width = outputs.keys().map(String::len).max().unwrap_or(0);

    outputs.iter().fold(String::new(), |mut acc, (key, value)| {
        acc.push_str(&format!("  {:<width$}  {}\n", key, value, width = width));
        acc
    })
}

/// Stores stack outputs as a flat JSON object for other tooling.
pub fn write_outputs(path: &Path, outputs: &BTreeMap<String, String>) -> io::Result<()> {
    let file_contents = serde_json::to_string_pretty(outputs)?;
    fs::write(path, file_contents)
}
