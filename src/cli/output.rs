use crate::error::Result;
use colored::Colorize;
use serde::Serialize;

/// Terminal output for the CLI handlers
///
/// In JSON mode the human-readable helpers stay silent and only
/// [`print_json`](Self::print_json) writes to stdout.
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    json: bool,
}

impl OutputFormatter {
    #[must_use]
    pub fn new(json: bool, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { json }
    }

    #[must_use]
    pub const fn is_json(&self) -> bool {
        self.json
    }

    pub fn success(&self, message: &str) {
        if !self.json {
            println!("{} {}", "✓".green().bold(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.json {
            println!("{message}");
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.json {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Errors are printed in every mode
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Section heading
    pub fn heading(&self, title: &str) {
        if !self.json {
            println!("{}", title.bold().underline());
        }
    }

    /// Write `value` as pretty JSON regardless of mode
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Write `value` as pretty JSON when in JSON mode
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        if self.json {
            self.json(value)?;
        }
        Ok(())
    }
}
