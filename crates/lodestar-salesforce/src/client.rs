//! The REST client implementing [`RecordSource`].
//!
//! Queries go to `/services/data/vXX.X/query`; continuations are the
//! server-relative `nextRecordsUrl` paths it hands back. Session expiry
//! and revoked continuations are classified from the error payload so the
//! engine can react to each specifically.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use lodestar_core::source::{QueryPage, RecordSource, SourceError, SourceRecord};

use crate::config::SalesforceConfig;

/// Errors from client construction and authentication.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Required configuration fields are empty.
    #[error("invalid salesforce configuration: missing {0}")]
    Config(String),

    /// The HTTP client could not be built or a request failed outright.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered, but not with a usable session.
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// An authenticated session: bearer token plus the org's instance URL.
#[derive(Debug, Clone, Deserialize)]
struct Session {
    access_token: String,
    instance_url: String,
}

/// Salesforce record source over the SOQL REST interface.
pub struct SalesforceSource {
    http: reqwest::Client,
    config: SalesforceConfig,
    session: RwLock<Option<Session>>,
    /// Single-flight guard: the first worker to observe an expired session
    /// refreshes it; concurrent observers skip and retry next poll.
    reauth: Mutex<()>,
}

impl SalesforceSource {
    /// Builds the client and performs the initial authentication.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for empty required fields,
    /// [`ClientError::Http`] when the client cannot be built or the token
    /// endpoint is unreachable, and [`ClientError::Auth`] when the
    /// endpoint rejects the credentials.
    pub async fn connect(config: SalesforceConfig) -> Result<Self, ClientError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ClientError::Config(missing.join(", ")));
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let source = Self {
            http,
            config,
            session: RwLock::new(None),
            reauth: Mutex::new(()),
        };
        source.authenticate().await?;
        Ok(source)
    }

    /// Runs the OAuth2 password-grant flow and stores the new session.
    async fn authenticate(&self) -> Result<(), ClientError> {
        let url = format!("https://{}/services/oauth2/token", self.config.domain);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", self.config.grant_type.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        let session: Session = response.json().await?;
        if session.access_token.is_empty() {
            return Err(ClientError::Auth("token endpoint returned an empty access token".into()));
        }
        info!(instance_url = %session.instance_url, "authenticated with salesforce");
        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Snapshot of the current session.
    async fn session(&self) -> Result<Session, SourceError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(SourceError::SessionExpired)
    }

    /// Issues an authenticated GET and decodes the page, classifying
    /// query failures by status and error payload.
    async fn get_page(&self, url: &str, soql: Option<&str>) -> Result<QueryPage, SourceError> {
        let session = self.session().await?;
        let mut request = self.http.get(url).bearer_auth(&session.access_token);
        if let Some(soql) = soql {
            request = request.query(&[("q", soql)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_query_failure(status, &body));
        }
        let decoded: SoqlResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        decoded.into_page()
    }
}

#[async_trait]
impl RecordSource for SalesforceSource {
    async fn execute(&self, soql: &str) -> Result<QueryPage, SourceError> {
        let session = self.session().await?;
        let url = query_url(&session.instance_url, &self.config.api_version);
        self.get_page(&url, Some(soql)).await
    }

    async fn fetch_next(&self, next_url: &str) -> Result<QueryPage, SourceError> {
        let session = self.session().await?;
        let url = format!("{}{next_url}", session.instance_url);
        self.get_page(&url, None).await
    }

    async fn reauthenticate(&self) {
        let Ok(_guard) = self.reauth.try_lock() else {
            debug!("reauthentication already in flight, skipping");
            return;
        };
        if let Err(e) = self.authenticate().await {
            // Deliberately no panic: polling continues and every execute
            // keeps reporting SessionExpired until a refresh succeeds.
            error!(error = %e, "salesforce reauthentication failed");
        }
    }
}

/// The REST query endpoint for an instance and API version.
fn query_url(instance_url: &str, api_version: &str) -> String {
    format!("{instance_url}/services/data/v{api_version}/query")
}

/// Maps a failed query response to the engine's error taxonomy.
///
/// Salesforce reports machine-readable `errorCode`s in the body; matching
/// on the code substring also covers replies whose JSON shape varies by
/// endpoint.
fn classify_query_failure(status: StatusCode, body: &str) -> SourceError {
    if status == StatusCode::UNAUTHORIZED || body.contains("INVALID_SESSION_ID") {
        SourceError::SessionExpired
    } else if body.contains("INVALID_QUERY_LOCATOR") {
        SourceError::InvalidContinuation(body.to_string())
    } else {
        SourceError::Transport(format!("query returned {status}: {body}"))
    }
}

/// Wire shape of a query response page.
#[derive(Debug, Deserialize)]
struct SoqlResponse {
    done: bool,
    #[serde(rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

impl SoqlResponse {
    fn into_page(self) -> Result<QueryPage, SourceError> {
        let records = self
            .records
            .into_iter()
            .map(SourceRecord::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryPage {
            records,
            done: self.done,
            next_url: self.next_records_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_query_url_layout() {
        assert_eq!(
            query_url("https://na1.salesforce.com", "54.0"),
            "https://na1.salesforce.com/services/data/v54.0/query"
        );
    }

    #[test]
    fn test_classify_unauthorized_status() {
        assert!(matches!(
            classify_query_failure(StatusCode::UNAUTHORIZED, ""),
            SourceError::SessionExpired
        ));
    }

    #[test]
    fn test_classify_expired_session_body() {
        let body = r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#;
        assert!(matches!(
            classify_query_failure(StatusCode::BAD_REQUEST, body),
            SourceError::SessionExpired
        ));
    }

    #[test]
    fn test_classify_revoked_locator() {
        let body = r#"[{"message":"invalid query locator","errorCode":"INVALID_QUERY_LOCATOR"}]"#;
        assert!(matches!(
            classify_query_failure(StatusCode::BAD_REQUEST, body),
            SourceError::InvalidContinuation(_)
        ));
    }

    #[test]
    fn test_classify_other_failure_is_transport() {
        assert!(matches!(
            classify_query_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            SourceError::Transport(_)
        ));
    }

    #[test]
    fn test_response_decodes_into_page() {
        let raw = r#"{
            "totalSize": 2,
            "done": false,
            "nextRecordsUrl": "/services/data/v54.0/query/01g-2000",
            "records": [
                {"Id": "001A", "LastModifiedDate": "2024-01-01T00:00:00.000+0000"},
                {"Id": "001B", "LastModifiedDate": "2024-01-01T00:00:01.000+0000"}
            ]
        }"#;
        let decoded: SoqlResponse = serde_json::from_str(raw).unwrap();
        let page = decoded.into_page().unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(!page.done);
        assert_eq!(
            page.next_url.as_deref(),
            Some("/services/data/v54.0/query/01g-2000")
        );
        assert_eq!(page.records[0].id, "001A");
        assert_eq!(
            page.records[1].last_modified_at,
            "2024-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_response_without_records_field() {
        let decoded: SoqlResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        let page = decoded.into_page().unwrap();
        assert!(page.records.is_empty());
        assert!(page.done);
        assert!(page.next_url.is_none());
    }

    #[test]
    fn test_response_with_malformed_record_fails() {
        let raw = r#"{"done": true, "records": [{"Name": "no id"}]}"#;
        let decoded: SoqlResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            decoded.into_page(),
            Err(SourceError::BadRecord(_))
        ));
    }

    #[test]
    fn test_session_deserializes_token_response() {
        let raw = r#"{
            "access_token": "00D...!AR8AQ",
            "instance_url": "https://na1.salesforce.com",
            "id": "https://login.salesforce.com/id/00D/005",
            "token_type": "Bearer",
            "issued_at": "1718000000000",
            "signature": "sig"
        }"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.access_token, "00D...!AR8AQ");
        assert_eq!(session.instance_url, "https://na1.salesforce.com");
    }
}
