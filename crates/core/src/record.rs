//! The prompt record — the unit everything else resolves, caches, and
//! compiles.

use serde::{Deserialize, Serialize};

/// A named, optionally versioned system-prompt body plus metadata.
///
/// Identity is `name` + `version`; multiple `(name, version)` pairs may
/// coexist for the same name. An "unversioned" pointer per name acts as a
/// convenience alias and is overwritten whenever any version of that name
/// is written. Records are only ever replaced whole — no partial field
/// update, no individual delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRecord {
    /// The prompt name (non-empty, not unique on its own)
    pub name: String,

    /// The system prompt body
    pub system: String,

    /// Version label ("v1", "2", "beta"); absent for unversioned records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Raw template body, distinct from `system`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl PromptRecord {
    /// Create a minimal record with just a name and system body.
    pub fn new(name: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            version: None,
            description: None,
            template: None,
        }
    }

    /// Attach a version label.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let rec = PromptRecord::new("summarizer", "You summarize text.")
            .with_version("v2")
            .with_description("terse summaries");
        assert_eq!(rec.name, "summarizer");
        assert_eq!(rec.version.as_deref(), Some("v2"));
        assert_eq!(rec.description.as_deref(), Some("terse summaries"));
        assert!(rec.template.is_none());
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let rec = PromptRecord::new("greeter", "Say hello.");
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("greeter"));
        assert!(!json.contains("version"));
        assert!(!json.contains("description"));
    }

    #[test]
    fn roundtrip() {
        let rec = PromptRecord::new("greeter", "Say hello.").with_version("v1");
        let json = serde_json::to_string(&rec).unwrap();
        let back: PromptRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
