use std::fmt;

use pilot_protocol::PowerControl;
use tracing::info;

/// The outbound side of the relay connection. The coordinator is the only
/// writer; implementations do not retry, reconnecting is the relay's job.
pub trait RelayLink {
    async fn announce(&self, url: &str) -> Result<(), LinkError>;
    async fn send_power(&self, control: &PowerControl) -> Result<(), LinkError>;
    async fn ensure_connection(&self) -> Result<(), LinkError>;
}

#[derive(Debug)]
pub enum LinkError {
    Transport(reqwest::Error),
    Status(reqwest::StatusCode),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Transport(error) => write!(f, "relay transport error: {error}"),
            LinkError::Status(status) => write!(f, "relay answered {status}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<reqwest::Error> for LinkError {
    fn from(error: reqwest::Error) -> Self {
        LinkError::Transport(error)
    }
}

pub struct HttpRelayLink {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayLink {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn check(response: reqwest::Response) -> Result<(), LinkError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LinkError::Status(response.status()))
        }
    }
}

impl RelayLink for HttpRelayLink {
    async fn announce(&self, url: &str) -> Result<(), LinkError> {
        let endpoint = format!("{}/api/v1/pilots/announce", self.base_url);
        let response = self
            .http
            .post(endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        Self::check(response)
    }

    async fn send_power(&self, control: &PowerControl) -> Result<(), LinkError> {
        let endpoint = format!("{}/api/v1/pilots/power", self.base_url);
        let response = self.http.post(endpoint).json(control).send().await?;
        Self::check(response)
    }

    async fn ensure_connection(&self) -> Result<(), LinkError> {
        let endpoint = format!("{}/healthz", self.base_url);
        let response = self.http.get(endpoint).send().await?;
        Self::check(response)
    }
}

/// Replay link: commands end up in the log instead of on the track.
pub struct LoggingLink;

impl RelayLink for LoggingLink {
    async fn announce(&self, url: &str) -> Result<(), LinkError> {
        info!(url, "announce (not sent, replay)");
        Ok(())
    }

    async fn send_power(&self, control: &PowerControl) -> Result<(), LinkError> {
        info!(power = control.power, "power (not sent, replay)");
        Ok(())
    }

    async fn ensure_connection(&self) -> Result<(), LinkError> {
        Ok(())
    }
}
