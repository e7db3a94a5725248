use scribe_common::step::DeliveryPayload;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_DESTINATION: &str = "http://localhost:5678/webhook/user-manual";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Destination answered HTTP {0}")]
    Status(u16),
}

/// Sends a finished session to its destination. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct Delivery {
    client: reqwest::Client,
    default_destination: String,
}

impl Delivery {
    pub fn new(default_destination: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_destination: default_destination.into(),
        }
    }

    pub fn default_destination(&self) -> &str {
        &self.default_destination
    }

    /// The override when one is given and non-blank, otherwise the default.
    pub fn resolve<'a>(&'a self, destination: Option<&'a str>) -> &'a str {
        destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(self.default_destination.as_str())
    }

    /// POST `payload` as JSON. Any non-2xx status is an error.
    pub async fn deliver(
        &self,
        payload: &DeliveryPayload,
        destination: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let url = self.resolve(destination);
        info!(
            session_id = %payload.session_id,
            destination = %url,
            total_steps = payload.metadata.total_steps,
            steps_with_screenshots = payload.metadata.steps_with_screenshots,
            "Delivering session"
        );

        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl Default for Delivery {
    fn default() -> Self {
        Self::new(DEFAULT_DESTINATION)
    }
}
