//! Workflow-job label classification.
//!
//! Two kinds of labels travel on a job: ordinary capability labels
//! (`self-hosted`, `linux`, ...) that express scheduling requirements, and
//! directive labels of the form `@<key>:<value>` that carry routing metadata
//! for this service (currently only `@machine:<type>`). Directives are
//! always considered satisfied when matching required labels and never
//! reported as missing.

/// Directive keys this service understands.
const DIRECTIVE_KEYS: &[&str] = &["machine"];

/// Directive key selecting the machine type of the runner VM.
pub const MACHINE_DIRECTIVE: &str = "machine";

/// A classified job label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// An ordinary capability label, matched verbatim.
    Capability(String),
    /// A `@<key>:<value>` routing directive.
    Directive {
        /// Directive key.
        key: String,
        /// Directive value.
        value: String,
    },
}

impl Label {
    /// Classify a raw label string.
    ///
    /// Only known directive keys with a non-empty value parse as directives;
    /// everything else is a capability label.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix('@') {
            if let Some((key, value)) = rest.split_once(':') {
                if DIRECTIVE_KEYS.contains(&key) && !value.is_empty() {
                    return Self::Directive {
                        key: key.to_string(),
                        value: value.to_string(),
                    };
                }
            }
        }
        Self::Capability(raw.to_string())
    }

    /// Whether a raw label string is a known directive.
    #[must_use]
    pub fn is_directive(raw: &str) -> bool {
        matches!(Self::parse(raw), Self::Directive { .. })
    }
}

/// Check that every required label is satisfied by the job's labels.
///
/// A required label is satisfied if present verbatim (exact, case-sensitive,
/// order-independent) or if it is a directive. Returns whether all were
/// satisfied together with the missing ones, in required order.
#[must_use]
pub fn has_all_labels(labels: &[String], required: &[String]) -> (bool, Vec<String>) {
    let mut missing = Vec::new();
    for req in required {
        if Label::is_directive(req) {
            continue;
        }
        if !labels.iter().any(|l| l == req) {
            missing.push(req.clone());
        }
    }
    (missing.is_empty(), missing)
}

/// Extract the value of the first `@<key>:<value>` directive for `key`.
///
/// Unlike [`Label::parse`], this looks up any key by name, so callers can
/// probe for keys that are not (yet) registered directives.
#[must_use]
pub fn directive_value<'a>(labels: &'a [String], key: &str) -> Option<&'a str> {
    let prefix = format!("@{key}:");
    labels
        .iter()
        .find_map(|l| l.strip_prefix(prefix.as_str()).filter(|v| !v.is_empty()))
}
