//! Output formatting for CLI commands

use serde::Serialize;

use crate::storage;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl From<storage::OutputFormat> for OutputFormat {
    fn from(format: storage::OutputFormat) -> Self {
        match format {
            storage::OutputFormat::Text => OutputFormat::Text,
            storage::OutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Reports a failed command on stdout in JSON mode.
    ///
    /// Text mode prints nothing here; `main` reports the error on stderr.
    pub fn error(&self, code: &str, message: &str) {
        if self.format == OutputFormat::Json {
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "code": code,
                    "error": message
                })
            );
        }
    }

    /// Prints structured data; a value that cannot be serialized is
    /// reported on stderr
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.render(data) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: Failed to serialize output: {}", e),
        }
    }

    fn render<T: Serialize>(&self, data: &T) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Text => serde_json::to_string_pretty(data),
            OutputFormat::Json => serde_json::to_string(data),
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn render_compact_and_pretty() {
        let value = serde_json::json!({ "id": "t-0000001" });
        assert_eq!(
            Output::new(OutputFormat::Json).render(&value).unwrap(),
            r#"{"id":"t-0000001"}"#
        );
        assert!(Output::new(OutputFormat::Text).render(&value).unwrap().contains('\n'));
    }

    #[test]
    fn render_reports_unserializable_data() {
        // JSON object keys must be strings
        let mut value = BTreeMap::new();
        value.insert((1, 2), "pair");
        assert!(Output::new(OutputFormat::Json).render(&value).is_err());
    }
}
