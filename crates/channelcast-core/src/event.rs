//! Inbound event and outbound response shapes.
//!
//! The transport adapter that produces these is not part of this crate; it
//! hands over an already-decoded [`InboundEvent`] and expects a [`Response`].

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, ValidationError};

/// Which handler an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Session opened and wants to join a channel
    #[serde(rename = "$connect")]
    Connect,
    /// Session closed (best-effort, arrives after the fact)
    #[serde(rename = "$disconnect")]
    Disconnect,
    /// Session posted a message to a channel
    #[serde(rename = "sendmessage")]
    SendMessage,
}

/// Structured request produced by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Channel to join or post to
    #[serde(default)]
    pub channel: Option<String>,
    /// Message body (send only)
    #[serde(default)]
    pub message: Option<String>,
    /// Transport session id
    pub connection_id: String,
    /// Push endpoint host
    pub domain_name: String,
    /// Push endpoint stage
    pub stage: String,
}

impl InboundEvent {
    /// Push endpoint for the session: `domainName/stage`.
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.domain_name, self.stage)
    }

    /// Channel, if present and non-empty.
    pub fn channel(&self) -> Result<&str, ValidationError> {
        ValidationError::require("channel", self.channel.as_deref())
    }

    /// Message, if present and non-empty.
    pub fn message(&self) -> Result<&str, ValidationError> {
        ValidationError::require("message", self.message.as_deref())
    }
}

/// Response handed back to the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// 200, 400 or 500
    pub status_code: u16,
    /// Human-readable body
    pub body: String,
}

impl Response {
    /// 200 response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status_code: 200, body: body.into() }
    }

    /// 500 response.
    pub fn internal(body: impl Into<String>) -> Self {
        Self { status_code: 500, body: body.into() }
    }

    /// Response for a failed operation, status taken from the error.
    pub fn from_error(context: &str, err: &RelayError) -> Self {
        Self { status_code: err.status_code(), body: format!("{context}: {err}") }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
