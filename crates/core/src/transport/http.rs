use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::{Result, TelemetryError},
    events::Event,
    transport::Transport,
};

#[derive(Serialize)]
struct IngestBody<'a> {
    events: &'a [Event],
}

/// POSTs `{"events": [...]}` to a fixed URL. Only the status is inspected.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[Event]) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&IngestBody { events: batch })
            .send()
            .await
            .map_err(|source| TelemetryError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::{ANONYMOUS_USER, Attributes};

    #[test]
    fn body_wraps_events_in_an_events_array() {
        let events = vec![Event::new(
            "page_view",
            Attributes::new().with("path", "/contacts"),
            "s",
            ANONYMOUS_USER,
            Utc::now(),
        )];

        let json = serde_json::to_value(IngestBody { events: &events }).unwrap();
        assert_eq!(json["events"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["events"][0]["name"], "page_view");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9/api/analytics/events");
        let err = transport.send(&[]).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Transport { .. }));
    }
}
