use crate::step::RawStep;
use serde::{Deserialize, Serialize};

/// Requests accepted on the command channel (control surface and observers).
///
/// Wire names match the browser extension's message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartRecording,
    StopRecording {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<StopOptions>,
    },
    #[serde(rename = "NEW_STEP")]
    SubmitStep { payload: RawStep },
    GetStatus,
}

impl Command {
    pub fn stop(destination: Option<String>) -> Self {
        Command::StopRecording {
            data: Some(StopOptions {
                webhook_url: destination,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartRecording => "START_RECORDING",
            Command::StopRecording { .. } => "STOP_RECORDING",
            Command::SubmitStep { .. } => "NEW_STEP",
            Command::GetStatus => "GET_STATUS",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub session_id: Option<String>,
    pub step_count: usize,
}

/// Replies on the command channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(RecordingStatus),
    #[serde(rename_all = "camelCase")]
    Started {
        success: bool,
        session_id: String,
    },
    Ack {
        success: bool,
    },
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack { success: true }
    }

    pub fn rejected() -> Self {
        Response::Ack { success: false }
    }

    pub fn started(session_id: impl Into<String>) -> Self {
        Response::Started {
            success: true,
            session_id: session_id.into(),
        }
    }
}

/// Signals broadcast to interaction observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverSignal {
    #[serde(rename = "START_RECORDING")]
    BeginObserving,
    #[serde(rename = "STOP_RECORDING")]
    EndObserving,
    /// Liveness probe; an installed observer answers it.
    #[serde(rename = "PING")]
    Ping,
}

/// A page (tab) the observer can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub id: i64,
    #[serde(default)]
    pub url: String,
}

const UNINSTRUMENTABLE_SCHEMES: [&str; 2] = ["chrome://", "chrome-extension://"];

impl Surface {
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }

    /// Browser-internal pages cannot host an observer.
    pub fn is_instrumentable(&self) -> bool {
        !UNINSTRUMENTABLE_SCHEMES
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

// ============================================================
// Extension bridge
// ============================================================

/// Calls the recorder makes into the browser extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BridgeCall {
    CaptureVisible,
    ListSurfaces,
    ActiveSurface,
    Signal {
        surface_id: i64,
        message: ObserverSignal,
    },
    InstallObserver {
        surface_id: i64,
    },
    KeepAlive,
}

impl BridgeCall {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCall::CaptureVisible => "capture_visible",
            BridgeCall::ListSurfaces => "list_surfaces",
            BridgeCall::ActiveSurface => "active_surface",
            BridgeCall::Signal { .. } => "signal",
            BridgeCall::InstallObserver { .. } => "install_observer",
            BridgeCall::KeepAlive => "keep_alive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: u64,
    #[serde(flatten)]
    pub call: BridgeCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeReply {
    pub reply_to: u64,
    pub ok: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A command sent by the extension; `rid` correlates the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<u64>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub rid: u64,
    pub response: Response,
}
