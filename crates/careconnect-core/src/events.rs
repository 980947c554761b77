//! Named realtime events exchanged with the backend.
//!
//! Every frame is an envelope `{"event": "<name>", "data": {...}}`; events
//! without a payload omit `data`.

use serde::{Deserialize, Serialize};

use crate::query::SubmissionRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub message: String,
}

/// Payload of the terminal `final_res` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl FinalResponse {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_msg: None,
        }
    }

    #[must_use]
    pub fn failure(error_msg: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error_msg: Some(error_msg.into()),
        }
    }

    /// The backend error, if one was reported. An empty `error_msg` counts as none.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error_msg.as_deref().filter(|msg| !msg.is_empty())
    }
}

/// Events the backend (or the transport itself) delivers to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Connect,
    Disconnect,
    Update(ProgressUpdate),
    FinalRes(FinalResponse),
}

impl InboundEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Connect => "connect",
            InboundEvent::Disconnect => "disconnect",
            InboundEvent::Update(_) => "update",
            InboundEvent::FinalRes(_) => "final_res",
        }
    }

    #[must_use]
    pub fn update(message: impl Into<String>) -> Self {
        InboundEvent::Update(ProgressUpdate {
            message: message.into(),
        })
    }
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "on_submit_query")]
    SubmitQuery(SubmissionRequest),
}

impl OutboundEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SubmitQuery(_) => "on_submit_query",
        }
    }
}
