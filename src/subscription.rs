//! Subscription requests
//!
//! After a fresh session welcome the overlay asks a backend service to
//! create EventSub subscriptions bound to the new session id. The request is
//! sent once; failures are logged and never retried.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SubscriptionSettings;
use crate::error::{Error, Result};
use crate::protocol::SubscribeRequest;

/// Status and body of a subscribe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub status: u16,
    pub body: String,
}

impl SubscribeOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can create subscriptions for a session
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeOutcome>;
}

/// Posts subscribe requests to the configured HTTP endpoint
#[derive(Debug, Clone)]
pub struct SubscriptionRequester {
    client: reqwest::Client,
    endpoint: String,
}

impl SubscriptionRequester {
    pub fn new(settings: &SubscriptionSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn failed(&self, e: reqwest::Error) -> Error {
        Error::SubscribeFailed {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Subscriber for SubscriptionRequester {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeOutcome> {
        info!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            username = %request.username,
            types = ?request.types,
            "Requesting subscriptions"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.failed(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.failed(e))?;
        let outcome = SubscribeOutcome { status, body };

        if outcome.is_success() {
            info!(status, body = %outcome.body, "Subscribe response");
        } else {
            warn!(status, body = %outcome.body, "Subscribe request rejected");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(endpoint: String) -> SubscriptionSettings {
        SubscriptionSettings {
            endpoint,
            ..SubscriptionSettings::default()
        }
    }

    fn request() -> SubscribeRequest {
        SubscribeRequest {
            types: vec!["channel.follow".to_string(), "channel.subscribe".to_string()],
            username: "bpafoshizle".to_string(),
            session_id: "AQoQexAWVYKSTIu4ec_2VAxyuhAB".to_string(),
        }
    }

    #[tokio::test]
    async fn test_posts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "types": ["channel.follow", "channel.subscribe"],
                "username": "bpafoshizle",
                "session_id": "AQoQexAWVYKSTIu4ec_2VAxyuhAB"
            })))
            .respond_with(ResponseTemplate::new(202).set_body_string(r#"{"created":2}"#))
            .expect(1)
            .mount(&server)
            .await;

        let requester = SubscriptionRequester::new(&settings(format!("{}/subscribe", server.uri()))).unwrap();

        let outcome = requester.subscribe(&request()).await.unwrap();
        assert_eq!(outcome.status, 202);
        assert!(outcome.is_success());
        assert_eq!(outcome.body, r#"{"created":2}"#);

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let sent: SubscribeRequest = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent, request());
    }

    #[tokio::test]
    async fn test_error_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let requester = SubscriptionRequester::new(&settings(format!("{}/subscribe", server.uri()))).unwrap();

        let outcome = requester.subscribe(&request()).await.unwrap();
        assert_eq!(outcome.status, 500);
        assert!(!outcome.is_success());
        assert_eq!(outcome.body, "boom");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Bound then released, so nothing listens on the port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/subscribe", listener.local_addr().unwrap());
        drop(listener);

        let requester = SubscriptionRequester::new(&settings(endpoint)).unwrap();
        let err = requester.subscribe(&request()).await.unwrap_err();
        assert!(matches!(err, Error::SubscribeFailed { .. }));
    }
}
