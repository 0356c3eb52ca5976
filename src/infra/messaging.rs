//! Outbound change notifications.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::application::ports::{MessagePublisher, PublishError};

const TARGET: &str = "shelfmark::messaging";

/// Posts each event as JSON to `<base_url>/<topic>`.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: Client,
    base: Url,
}

impl WebhookPublisher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let mut base =
            Url::parse(base_url).map_err(|err| PublishError::Transport(err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| PublishError::Transport(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("shelfmark/", env!("CARGO_PKG_VERSION"))
    }

    pub fn topic_url(&self, topic: &str) -> Result<Url, PublishError> {
        self.base
            .join(topic)
            .map_err(|err| PublishError::Transport(err.to_string()))
    }
}

#[async_trait]
impl MessagePublisher for WebhookPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PublishError> {
        let url = self.topic_url(topic)?;
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| PublishError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        debug!(target: TARGET, topic, status = status.as_u16(), "webhook accepted event");
        Ok(())
    }
}

/// Writes events to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl MessagePublisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PublishError> {
        info!(target: TARGET, topic, payload = %payload, "event published to log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::Path, http::StatusCode, routing::post};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    type Received = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_receiver(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let app = Router::new().route(
            "/hooks/{topic}",
            post(move |Path(topic): Path<String>, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().expect("sink").push((topic, body));
                    status
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/hooks"), received)
    }

    #[tokio::test]
    async fn posts_payload_to_topic_path() {
        let (base, received) = spawn_receiver(StatusCode::ACCEPTED).await;
        let publisher = WebhookPublisher::new(&base, Duration::from_secs(5)).expect("publisher");

        publisher
            .publish("book-created", &json!({ "bookId": "42" }))
            .await
            .expect("publish");

        let received = received.lock().expect("received");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "book-created");
        assert_eq!(received[0].1["bookId"], "42");
    }

    #[tokio::test]
    async fn non_success_status_is_a_rejection() {
        let (base, _received) = spawn_receiver(StatusCode::SERVICE_UNAVAILABLE).await;
        let publisher = WebhookPublisher::new(&base, Duration::from_secs(5)).expect("publisher");

        let err = publisher
            .publish("book-deleted", &json!({}))
            .await
            .expect_err("rejected");
        assert!(matches!(err, PublishError::Rejected { topic, .. } if topic == "book-deleted"));
    }

    #[test]
    fn topic_urls_extend_the_base_path() {
        let publisher =
            WebhookPublisher::new("http://broker.local/events", Duration::from_secs(1)).expect("publisher");
        assert_eq!(
            publisher.topic_url("book-updated").expect("url").as_str(),
            "http://broker.local/events/book-updated"
        );
    }

    #[tokio::test]
    async fn log_publisher_always_succeeds() {
        LogPublisher
            .publish("book-created", &json!({ "bookId": "1" }))
            .await
            .expect("logged");
    }
}
