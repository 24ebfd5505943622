//! Per-client quota rules.
//!
//! A rule set holds a default quota plus overrides for individual clients or
//! groups of clients sharing an identifier prefix. Rules are typically loaded
//! from YAML:
//!
//! ```yaml
//! default:
//!   window_size_seconds: 60
//!   max_requests: 100
//! clients:
//!   - client_id: batch-importer
//!     quota:
//!       window_size_seconds: 60
//!       max_requests: 10
//!   - prefix: "premium:"
//!     quota:
//!       window_size_seconds: 60
//!       max_requests: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};

use super::quota::{Algorithm, Quota};
use super::validator;

/// A complete set of quota rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRules {
    /// Quota applied to clients no rule matches
    pub default: Quota,
    /// Client-specific overrides
    #[serde(default)]
    pub clients: Vec<ClientRule>,
}

/// An override matching a single client or a family of clients.
///
/// Exactly one of `client_id` and `prefix` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRule {
    /// Exact client identifier to match
    #[serde(default)]
    pub client_id: Option<String>,
    /// Identifier prefix to match
    #[serde(default)]
    pub prefix: Option<String>,
    /// Quota for matching clients
    pub quota: Quota,
    /// Optional name/description for this rule
    #[serde(default)]
    pub name: Option<String>,
}

impl ClientRule {
    /// A rule for one specific client.
    pub fn exact(client_id: impl Into<String>, quota: impl Into<Quota>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            prefix: None,
            quota: quota.into(),
            name: None,
        }
    }

    /// A rule for every client whose identifier starts with `prefix`.
    pub fn prefix(prefix: impl Into<String>, quota: impl Into<Quota>) -> Self {
        Self {
            client_id: None,
            prefix: Some(prefix.into()),
            quota: quota.into(),
            name: None,
        }
    }

    /// Attach a name to this rule.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn label(&self) -> String {
        match (&self.name, &self.client_id, &self.prefix) {
            (Some(name), _, _) => name.clone(),
            (None, Some(id), _) => format!("client_id={}", id),
            (None, None, Some(prefix)) => format!("prefix={}", prefix),
            (None, None, None) => "<unnamed>".to_string(),
        }
    }
}

impl QuotaRules {
    /// A rule set with only a default quota.
    pub fn new(default: impl Into<Quota>) -> Self {
        Self {
            default: default.into(),
            clients: Vec::new(),
        }
    }

    /// Add an override.
    pub fn with_rule(mut self, rule: ClientRule) -> Self {
        self.clients.push(rule);
        self
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading quota rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse quota rules: {}", e)))
    }

    /// Check that every quota is well formed and drives `algorithm`.
    pub fn validate(&self, algorithm: Algorithm) -> Result<()> {
        check_quota(&self.default, algorithm, "default")?;

        for rule in &self.clients {
            let label = rule.label();
            match (&rule.client_id, &rule.prefix) {
                (Some(id), None) if !validator::validate_client_id(id) => {
                    return Err(TurnstileError::Config(format!(
                        "rule {}: client_id must not be empty",
                        label
                    )));
                }
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(TurnstileError::Config(format!(
                        "rule {}: exactly one of client_id and prefix must be set",
                        label
                    )));
                }
            }
            check_quota(&rule.quota, algorithm, &label)?;
        }
        Ok(())
    }

    /// Shortest idle period after which dropping a client's record cannot
    /// hand it quota back early.
    ///
    /// A window record stays live until the window after it has ended, so it
    /// needs twice the window size. A drained bucket needs
    /// `capacity / refill_rate_per_second` to fill back up.
    pub fn min_retention_secs(&self) -> f64 {
        std::iter::once(&self.default)
            .chain(self.clients.iter().map(|rule| &rule.quota))
            .map(|quota| match quota {
                Quota::Window(q) => 2.0 * q.window_size_seconds as f64,
                Quota::Bucket(q) => q.capacity / q.refill_rate_per_second,
            })
            .fold(0.0, f64::max)
    }

    /// Find the quota that applies to `client_id`.
    ///
    /// An exact match wins; otherwise the longest matching prefix; otherwise
    /// the default.
    pub fn quota_for(&self, client_id: &str) -> &Quota {
        let mut best_prefix: Option<(&str, &Quota)> = None;

        for rule in &self.clients {
            if rule.client_id.as_deref() == Some(client_id) {
                return &rule.quota;
            }

            if let Some(prefix) = rule.prefix.as_deref() {
                if !client_id.starts_with(prefix) {
                    continue;
                }
                let longer = best_prefix.map_or(true, |(best, _)| prefix.len() > best.len());
                if longer {
                    best_prefix = Some((prefix, &rule.quota));
                }
            }
        }

        best_prefix.map_or(&self.default, |(_, quota)| quota)
    }
}

fn check_quota(quota: &Quota, algorithm: Algorithm, label: &str) -> Result<()> {
    if !quota.fits(algorithm) {
        return Err(TurnstileError::Config(format!(
            "rule {}: quota does not apply to the {} algorithm",
            label, algorithm
        )));
    }

    let valid = match quota {
        Quota::Window(q) => validator::validate_window_quota(q),
        Quota::Bucket(q) => validator::validate_bucket_quota(q),
    };
    if !valid {
        return Err(TurnstileError::Config(format!(
            "rule {}: quota values must be greater than 0",
            label
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::quota::{BucketQuota, WindowQuota};

    fn window(max: u64) -> WindowQuota {
        WindowQuota::new(60, max)
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
default:
  window_size_seconds: 60
  max_requests: 100
clients:
  - client_id: batch-importer
    name: importer
    quota:
      window_size_seconds: 60
      max_requests: 10
  - prefix: "premium:"
    quota:
      window_size_seconds: 60
      max_requests: 1000
"#;
        let rules = QuotaRules::from_yaml(yaml).unwrap();

        assert_eq!(rules.default, Quota::Window(window(100)));
        assert_eq!(rules.clients.len(), 2);
        assert_eq!(rules.clients[0].name.as_deref(), Some("importer"));
        assert_eq!(rules.clients[1].prefix.as_deref(), Some("premium:"));
        rules.validate(Algorithm::SlidingWindow).unwrap();
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = QuotaRules::from_yaml("default: [1, 2]").unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_exact_match_wins() {
        let rules = QuotaRules::new(window(100))
            .with_rule(ClientRule::prefix("premium:", window(1000)))
            .with_rule(ClientRule::exact("premium:abuser", window(1)));

        assert_eq!(rules.quota_for("premium:abuser"), &Quota::Window(window(1)));
        assert_eq!(rules.quota_for("premium:alice"), &Quota::Window(window(1000)));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let rules = QuotaRules::new(window(100))
            .with_rule(ClientRule::prefix("org:", window(200)))
            .with_rule(ClientRule::prefix("org:acme:", window(300)))
            .with_rule(ClientRule::prefix("o", window(50)));

        assert_eq!(rules.quota_for("org:acme:bob"), &Quota::Window(window(300)));
        assert_eq!(rules.quota_for("org:globex:bob"), &Quota::Window(window(200)));
        assert_eq!(rules.quota_for("other"), &Quota::Window(window(50)));
    }

    #[test]
    fn test_default_when_nothing_matches() {
        let rules = QuotaRules::new(window(100)).with_rule(ClientRule::exact("alice", window(5)));

        assert_eq!(rules.quota_for("bob"), &Quota::Window(window(100)));
        assert_eq!(rules.quota_for(""), &Quota::Window(window(100)));
    }

    #[test]
    fn test_min_retention_covers_longest_quota() {
        let windows = QuotaRules::new(window(100))
            .with_rule(ClientRule::exact("slow", WindowQuota::new(600, 10)));
        assert_eq!(windows.min_retention_secs(), 1200.0);

        let buckets = QuotaRules::new(BucketQuota::new(10.0, 2.0))
            .with_rule(ClientRule::prefix("bulk:", BucketQuota::new(100.0, 0.5)));
        assert_eq!(buckets.min_retention_secs(), 200.0);
    }

    #[test]
    fn test_validate_rejects_wrong_algorithm() {
        let rules = QuotaRules::new(window(100));
        assert!(rules.validate(Algorithm::FixedWindow).is_ok());
        assert!(matches!(
            rules.validate(Algorithm::TokenBucket),
            Err(TurnstileError::Config(_))
        ));

        let mixed = QuotaRules::new(BucketQuota::new(10.0, 1.0))
            .with_rule(ClientRule::exact("alice", window(5)).named("alice"));
        let err = mixed.validate(Algorithm::TokenBucket).unwrap_err();
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn test_validate_rejects_bad_rules() {
        let zero = QuotaRules::new(window(0));
        assert!(zero.validate(Algorithm::FixedWindow).is_err());

        let mut both = ClientRule::exact("alice", window(5));
        both.prefix = Some("a".to_string());
        assert!(QuotaRules::new(window(1))
            .with_rule(both)
            .validate(Algorithm::FixedWindow)
            .is_err());

        let mut neither = ClientRule::exact("alice", window(5));
        neither.client_id = None;
        assert!(QuotaRules::new(window(1))
            .with_rule(neither)
            .validate(Algorithm::FixedWindow)
            .is_err());

        assert!(QuotaRules::new(window(1))
            .with_rule(ClientRule::exact("", window(5)))
            .validate(Algorithm::FixedWindow)
            .is_err());
    }
}
