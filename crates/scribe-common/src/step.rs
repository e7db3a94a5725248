use crate::label::ElementInfo;
use serde::{Deserialize, Serialize};

/// Kind of interaction an observer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Input,
    Submit,
    Select,
    Toggle,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Input => "input",
            ActionKind::Submit => "submit",
            ActionKind::Select => "select",
            ActionKind::Toggle => "toggle",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw interaction event as emitted by the interaction observer.
///
/// Everything except the action may be missing; the recorder fills the
/// gaps when it turns the event into a [`Step`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_element_type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementInfo>,
}

fn default_element_type() -> String {
    "unknown".to_string()
}

impl RawStep {
    pub fn new(action: ActionKind, label: impl Into<String>) -> Self {
        Self {
            event_id: None,
            action,
            label: Some(label.into()),
            timestamp: None,
            url: String::new(),
            element_type: default_element_type(),
            element: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_element_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = element_type.into();
        self
    }
}

/// One recorded interaction, enriched with an optional snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub event_id: String,
    pub action: ActionKind,
    pub label: String,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub url: String,
    pub element_type: String,
    /// Encoded image (data URL); `null` when absent or suppressed as a duplicate.
    pub screenshot: Option<String>,
    /// 1-based, dense within a session, assigned when enrichment completes.
    pub step_number: usize,
}

impl Step {
    pub fn has_screenshot(&self) -> bool {
        self.screenshot.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    pub total_steps: usize,
    pub steps_with_screenshots: usize,
    pub end_time: i64,
}

/// The body delivered to the destination when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub session_id: String,
    pub steps: Vec<Step>,
    pub metadata: PayloadMetadata,
}

impl DeliveryPayload {
    pub fn new(session_id: impl Into<String>, steps: Vec<Step>, end_time: i64) -> Self {
        let metadata = PayloadMetadata {
            total_steps: steps.len(),
            steps_with_screenshots: steps.iter().filter(|s| s.has_screenshot()).count(),
            end_time,
        };
        Self {
            session_id: session_id.into(),
            steps,
            metadata,
        }
    }
}
