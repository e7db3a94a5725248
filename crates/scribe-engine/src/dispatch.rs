use crate::session::Recorder;
use scribe_common::protocol::{Command, Response};
use tracing::{debug, warn};

/// Execute one command-channel request against the recorder.
///
/// Start, stop and step submissions always acknowledge once the transition
/// has been attempted; delivery and enrichment failures stay inside the
/// recorder.
pub async fn dispatch(recorder: &Recorder, command: Command) -> Response {
    debug!("Command received: {}", command.name());
    match command {
        Command::StartRecording => Response::started(recorder.start().await),
        Command::StopRecording { data } => {
            let destination = data.and_then(|d| d.webhook_url);
            recorder.stop(destination.as_deref()).await;
            Response::ack()
        }
        Command::SubmitStep { payload } => {
            recorder.submit_step(payload).await;
            Response::ack()
        }
        Command::GetStatus => Response::Status(recorder.status().await),
    }
}

/// Like [`dispatch`], for requests that have not been parsed yet. Unknown or
/// malformed commands are logged and rejected without touching state.
pub async fn dispatch_value(recorder: &Recorder, value: serde_json::Value) -> Response {
    match serde_json::from_value::<Command>(value.clone()) {
        Ok(command) => dispatch(recorder, command).await,
        Err(e) => {
            let kind = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("<missing>");
            warn!("Unknown message type: {} ({})", kind, e);
            Response::rejected()
        }
    }
}
