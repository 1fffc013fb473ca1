use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity a rule assigns to its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A review rule. `code` is the merge key across configuration levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

impl Rule {
    pub fn new(code: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            severity,
        }
    }

    /// A rule with a blank code or description cannot be sent to a reviewer.
    pub fn is_usable(&self) -> bool {
        !self.code.trim().is_empty() && !self.description.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Critical).expect("serialize");
        assert_eq!(json, "\"CRITICAL\"");
        let parsed: Severity = serde_json::from_str("\"WARNING\"").expect("deserialize");
        assert_eq!(parsed, Severity::Warning);
    }

    #[test]
    fn test_blank_rules_are_not_usable() {
        assert!(Rule::new("R1", "desc", Severity::Info).is_usable());
        assert!(!Rule::new("  ", "desc", Severity::Info).is_usable());
        assert!(!Rule::new("R1", "", Severity::Info).is_usable());
    }
}
