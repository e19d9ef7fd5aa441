//! User interaction and structured output.
//!
//! Human-readable text goes through [`console`]; in JSON mode every
//! command instead emits one serde-serialized object on stdout, errors
//! included, so scripts can consume results without scraping.

use std::io::IsTerminal;

use console::style;
use serde::Serialize;

use crate::error::Error;

/// Asks the user yes/no questions.
pub trait Confirm {
    /// Show `prompt` and return the answer. The default answer, used when
    /// stdin is not a tty or the user just presses enter, is "no".
    fn confirm(&self, prompt: &str) -> bool;
}

/// Interactive confirmation on the controlling terminal, honoring
/// `--assumeyes` / `--assumeno`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtyConfirm {
    /// Answer yes without asking.
    pub assume_yes: bool,
    /// Answer no without asking.
    pub assume_no: bool,
}

impl Confirm for TtyConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_no {
            return false;
        }
        if self.assume_yes {
            return true;
        }
        if !std::io::stdin().is_terminal() {
            return false;
        }
        eprint!("{prompt}");
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes" | "YES" | "Yes")
    }
}

/// A fixed answer, for tests and `--assumeyes` shortcuts.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysAnswer(pub bool);

impl Confirm for AlwaysAnswer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Plain text for humans.
    #[default]
    Text,
    /// One JSON document per command on stdout.
    Json,
}

/// The JSON error object.
#[derive(Debug, Serialize)]
pub struct JsonError<'a> {
    /// Stable numeric code.
    #[serde(rename = "Error")]
    pub error: u32,
    /// Human-readable message.
    #[serde(rename = "ErrorMessage")]
    pub error_message: &'a str,
}

/// Emit an error in the selected mode. Text mode writes to stderr, JSON
/// mode writes the structured object to stdout.
pub fn emit_error(mode: OutputMode, error: &Error) {
    match mode {
        OutputMode::Text => {
            eprintln!("{} {}", style("Error:").red().bold(), error);
        }
        OutputMode::Json => {
            let message = error.to_string();
            let object = JsonError {
                error: error.code(),
                error_message: &message,
            };
            match serde_json::to_string(&object) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("Error({}): {error}", error.code()),
            }
        }
    }
}

/// Emit a command result in the selected mode. Text output is produced
/// by `render`, JSON output serializes `value`.
pub fn emit<T: Serialize>(mode: OutputMode, value: &T, render: impl FnOnce(&T)) {
    match mode {
        OutputMode::Text => render(value),
        OutputMode::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("Error: failed to serialize output: {err}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_answers() {
        assert!(AlwaysAnswer(true).confirm("?"));
        assert!(!AlwaysAnswer(false).confirm("?"));
    }

    #[test]
    fn assume_flags_short_circuit() {
        let yes = TtyConfirm {
            assume_yes: true,
            assume_no: false,
        };
        assert!(yes.confirm("?"));
        // assume_no wins over assume_yes
        let no = TtyConfirm {
            assume_yes: true,
            assume_no: true,
        };
        assert!(!no.confirm("?"));
    }

    #[test]
    fn json_error_shape() {
        let err = Error::NoEnabledRepos;
        let object = JsonError {
            error: err.code(),
            error_message: "x",
        };
        let json = serde_json::to_string(&object).unwrap();
        assert!(json.contains("\"Error\":1304"));
        assert!(json.contains("\"ErrorMessage\""));
    }
}
