//! Access checks for the relay's inbound routes

mod ip_filter;

pub use ip_filter::IpFilter;

use std::net::IpAddr;

use subtle::ConstantTimeEq;

use crate::config::AccessConfig;

/// Password and remote address requirements, either of which may be absent
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    password: Option<String>,
    ip_filter: Option<IpFilter>,
}

impl AccessPolicy {
    pub fn new(password: Option<String>, ip_filter: Option<IpFilter>) -> Self {
        Self {
            password,
            ip_filter,
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(
            config.password.clone().filter(|p| !p.is_empty()),
            config
                .ip_filter
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .map(IpFilter::parse),
        )
    }

    /// Whether `remote` may call the relay's routes
    pub fn remote_allowed(&self, remote: Option<IpAddr>) -> bool {
        match &self.ip_filter {
            Some(filter) => filter.matches(remote),
            None => true,
        }
    }

    /// Whether the supplied password satisfies the configured one
    pub fn password_matches(&self, supplied: Option<&str>) -> bool {
        match (&self.password, supplied) {
            (None, _) => true,
            (Some(expected), Some(supplied)) => {
                expected.as_bytes().ct_eq(supplied.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_policy_allows_everything() {
        let policy = AccessPolicy::default();
        assert!(policy.remote_allowed(None));
        assert!(policy.password_matches(None));
    }

    #[test]
    fn test_password() {
        let policy = AccessPolicy::new(Some("s3cret".into()), None);
        assert!(policy.password_matches(Some("s3cret")));
        assert!(!policy.password_matches(Some("s3cret!")));
        assert!(!policy.password_matches(Some("")));
        assert!(!policy.password_matches(None));
    }

    #[test]
    fn test_from_config_ignores_blank_values() {
        let policy = AccessPolicy::from_config(&AccessConfig {
            password: Some(String::new()),
            ip_filter: Some("  ".into()),
        });
        assert!(policy.password_matches(None));
        assert!(policy.remote_allowed(None));

        let policy = AccessPolicy::from_config(&AccessConfig {
            password: None,
            ip_filter: Some("127.0.0.1".into()),
        });
        assert!(policy.remote_allowed(Some("127.0.0.1".parse().unwrap())));
        assert!(!policy.remote_allowed(Some("10.0.0.1".parse().unwrap())));
        assert!(!policy.remote_allowed(None));
    }
}
