//! Admission rules configuration.
//!
//! A rules file names the resources callers may ask about and the policy
//! each one is guarded by. Rules are loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::policy::PolicySpec;
use crate::error::{FloodgateError, Result};

/// A complete set of admission rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionRules {
    /// Guarded resources, in file order
    #[serde(default)]
    pub resources: Vec<ResourceRule>,
}

/// The policy guarding one resource.
///
/// Every distinct caller key of the resource gets its own limiter built from
/// `policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRule {
    /// Resource name, unique within the rules
    pub name: String,
    /// Limiter parameters
    pub policy: PolicySpec,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
}

impl AdmissionRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// Accepts either a bare list of resources or a mapping with a
    /// `resources` key.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // Pick the shape from the document so errors come from the right parse.
        let document: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;
        let rules = if document.is_sequence() {
            AdmissionRules {
                resources: serde_yaml::from_str(yaml).map_err(parse_error)?,
            }
        } else {
            serde_yaml::from_str::<AdmissionRules>(yaml).map_err(parse_error)?
        };

        rules.validate()?;
        Ok(rules)
    }

    /// Check names are unique and non-empty and every policy is valid.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.resources {
            if rule.name.is_empty() {
                return Err(FloodgateError::Config(
                    "resource name must not be empty".to_string(),
                ));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(FloodgateError::Config(format!(
                    "duplicate resource: {}",
                    rule.name
                )));
            }
            rule.policy.validate()?;
        }
        Ok(())
    }

    /// Find the rule for a resource, for callers inspecting a loaded rule set.
    pub fn find(&self, name: &str) -> Option<&ResourceRule> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Add a rule, rejecting duplicates and invalid policies.
    pub fn insert(&mut self, name: impl Into<String>, policy: PolicySpec) -> Result<()> {
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(FloodgateError::Config(format!("duplicate resource: {}", name)));
        }
        policy.validate()?;
        self.resources.push(ResourceRule {
            name,
            policy,
            description: None,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn parse_error(e: serde_yaml::Error) -> FloodgateError {
    FloodgateError::Config(format!("Failed to parse admission rules: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::policy::{InitialFill, PolicyKind};

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
resources:
  - name: login
    description: per-client login attempts
    policy:
      type: fixed_window
      rate: 3
      window_ms: 1000
  - name: search
    policy:
      type: leaky_bucket
      leak_rate: 1.0
      capacity: 3.0
  - name: upload
    policy:
      type: token_bucket
      fill_rate: 3.0
      capacity: 5.0
      initial: empty
"#;
        let rules = AdmissionRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 3);

        let login = rules.find("login").unwrap();
        assert_eq!(login.policy.kind(), PolicyKind::FixedWindow);
        assert_eq!(login.description.as_deref(), Some("per-client login attempts"));

        let upload = rules.find("upload").unwrap();
        assert_eq!(
            upload.policy,
            PolicySpec::TokenBucket {
                fill_rate: 3.0,
                capacity: 5.0,
                initial: InitialFill::Empty,
            }
        );
    }

    #[test]
    fn test_parse_bare_list() {
        let yaml = r#"
- name: api
  policy:
    type: token_bucket
    fill_rate: 10
    capacity: 20
"#;
        let rules = AdmissionRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.find("api").unwrap().policy.kind(), PolicyKind::TokenBucket);
    }

    #[test]
    fn test_bare_list_reports_entry_error() {
        let yaml = r#"
- name: api
  policy:
    type: fixed_window
    rate: -1
    window_ms: 1000
"#;
        let err = AdmissionRules::from_yaml(yaml).unwrap_err();
        let msg = match err {
            FloodgateError::Config(msg) => msg,
            other => panic!("unexpected error: {:?}", other),
        };
        assert!(msg.contains("expected u64"), "{}", msg);
        assert!(!msg.contains("sequence"), "{}", msg);
    }

    #[test]
    fn test_mapping_reports_entry_error() {
        let yaml = r#"
resources:
  - name: api
    policy: { type: fixed_window, rate: -1, window_ms: 1000 }
"#;
        let err = AdmissionRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FloodgateError::Config(ref msg) if msg.contains("expected u64")));
    }

    #[test]
    fn test_empty_document() {
        let rules = AdmissionRules::from_yaml("resources: []\n").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let yaml = r#"
resources:
  - name: api
    policy: { type: fixed_window, rate: 1, window_ms: 10 }
  - name: api
    policy: { type: fixed_window, rate: 2, window_ms: 10 }
"#;
        let err = AdmissionRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let yaml = r#"
resources:
  - name: api
    policy: { type: leaky_bucket, leak_rate: 0, capacity: 3 }
"#;
        let err = AdmissionRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FloodgateError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unknown_policy_type_rejected() {
        let yaml = r#"
resources:
  - name: api
    policy: { type: sliding_log, rate: 3 }
"#;
        let err = AdmissionRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_insert() {
        let mut rules = AdmissionRules::new();
        rules
            .insert(
                "api",
                PolicySpec::FixedWindow {
                    rate: 5,
                    window_ms: 1000,
                },
            )
            .unwrap();

        assert!(rules
            .insert(
                "api",
                PolicySpec::FixedWindow {
                    rate: 5,
                    window_ms: 1000,
                },
            )
            .is_err());
        assert!(rules
            .insert(
                "other",
                PolicySpec::FixedWindow {
                    rate: 0,
                    window_ms: 1000,
                },
            )
            .is_err());
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_example_rules_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/rules.example.yaml");
        let rules = AdmissionRules::from_file(path).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.find("upload").is_some());
    }

    #[test]
    fn test_from_file_missing() {
        let err = AdmissionRules::from_file("/nonexistent/floodgate-rules.yaml").unwrap_err();
        assert!(matches!(err, FloodgateError::Io(_)));
    }
}
