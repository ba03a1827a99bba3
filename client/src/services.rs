//! HTTP collaborators: the identity endpoint and the match-result sink

use arcade_shared::Identity;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Terminal scores as persisted by the results endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub winner_id: Option<u64>,
    pub score_a: u32,
    pub score_b: u32,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    id: u64,
    username: String,
}

impl From<IdentityResponse> for Identity {
    fn from(response: IdentityResponse) -> Self {
        Identity {
            username: response.username,
            user_id: Some(response.id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}

#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    url: String,
}

impl IdentityClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<Identity, ServiceError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ServiceError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let identity: IdentityResponse = response.json().await.map_err(ServiceError::Parse)?;
        Ok(identity.into())
    }
}

/// Looks the identity up, falling back to a guest with the given name.
pub async fn resolve_identity(url: Option<&str>, fallback: &str) -> Identity {
    let Some(url) = url else {
        return Identity::guest(fallback);
    };

    match IdentityClient::new(url).fetch().await {
        Ok(identity) => {
            info!("Signed in as {} ({:?})", identity.username, identity.user_id);
            identity
        }
        Err(e) => {
            warn!("Identity lookup failed, playing as guest {}: {}", fallback, e);
            Identity::guest(fallback)
        }
    }
}

#[derive(Clone)]
pub struct ResultReporter {
    client: Client,
    url: String,
}

impl ResultReporter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub async fn report(&self, result: &MatchResult) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(result)
            .send()
            .await
            .map_err(ServiceError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Posts in the background; failures are only logged.
    pub fn spawn_report(&self, handle: &Handle, result: MatchResult) -> JoinHandle<()> {
        let reporter = self.clone();
        handle.spawn(async move {
            match reporter.report(&result).await {
                Ok(()) => info!("Reported result {:?}", result),
                Err(e) => warn!("Failed to report result {:?}: {}", result, e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_camel_case() {
        let result = MatchResult {
            winner_id: Some(7),
            score_a: 3,
            score_b: 1,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "winnerId": 7, "scoreA": 3, "scoreB": 1 })
        );
    }

    #[test]
    fn test_identity_response_converts() {
        let response: IdentityResponse =
            serde_json::from_str(r#"{"id": 42, "username": "ada"}"#).unwrap();
        let identity: Identity = response.into();
        assert_eq!(identity.user_id, Some(42));
        assert_eq!(identity.username, "ada");
    }

    #[test]
    fn test_missing_url_falls_back_to_guest() {
        let identity = tokio_test::block_on(resolve_identity(None, "player"));
        assert_eq!(identity, Identity::guest("player"));
    }

    #[tokio::test]
    async fn test_unreachable_identity_falls_back() {
        let identity = resolve_identity(Some("http://127.0.0.1:9/me"), "player").await;
        assert_eq!(identity, Identity::guest("player"));
    }
}
