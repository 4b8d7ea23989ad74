//! Connection and credential configuration.

use std::time::Duration;

/// Default OAuth2 grant type.
const DEFAULT_GRANT_TYPE: &str = "password";

/// Default REST API version.
const DEFAULT_API_VERSION: &str = "54.0";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials and connection settings for a Salesforce org.
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    /// Org domain used for authentication, e.g.
    /// `mydomain.my.salesforce.com`.
    pub domain: String,
    /// Connected-app client id.
    pub client_id: String,
    /// Connected-app client secret.
    pub client_secret: String,
    /// Username for the password grant.
    pub username: String,
    /// Password (plus security token, if the org requires one).
    pub password: String,
    /// OAuth2 grant type. Defaults to `password`.
    pub grant_type: String,
    /// REST API version selecting the query endpoint path.
    pub api_version: String,
    /// Per-request timeout; elapsed requests surface as transport errors.
    pub timeout: Duration,
}

impl SalesforceConfig {
    /// Creates a configuration with default grant type, API version, and
    /// timeout.
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            username: username.into(),
            password: password.into(),
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Names of required fields that are empty, in declaration order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("domain", &self.domain),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("username", &self.username),
            ("password", &self.password),
            ("grant_type", &self.grant_type),
            ("api_version", &self.api_version),
        ] {
            if value.is_empty() {
                missing.push(name);
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SalesforceConfig::new("d.my.salesforce.com", "id", "secret", "user", "pw");
        assert_eq!(config.grant_type, "password");
        assert_eq!(config.api_version, "54.0");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.missing_fields().is_empty());
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let config = SalesforceConfig::new("", "id", "", "user", "pw");
        assert_eq!(config.missing_fields(), vec!["domain", "client_secret"]);
    }
}
