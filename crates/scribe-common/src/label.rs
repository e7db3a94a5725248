//! Human-readable labels for recorded elements.
//!
//! Observers may send a ready-made label, a description of the element, or
//! both. When the label is missing it is derived from the description by
//! trying [`LabelSource::PRIORITY`] in order; the first non-empty result wins.

use serde::{Deserialize, Serialize};

pub const MAX_LABEL_CHARS: usize = 100;
pub const UNKNOWN_ELEMENT: &str = "Unknown element";

/// The attributes of an element an observer can report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    #[serde(default)]
    pub tag: String,
    /// Visible text (`innerText`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Visible text of the closest enclosing button or link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_testid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    VisibleText,
    AriaLabel,
    Placeholder,
    Name,
    Id,
    ImageAlt,
    ParentControl,
    DataAttribute,
    TagAndClass,
}

impl LabelSource {
    pub const PRIORITY: [LabelSource; 9] = [
        LabelSource::VisibleText,
        LabelSource::AriaLabel,
        LabelSource::Placeholder,
        LabelSource::Name,
        LabelSource::Id,
        LabelSource::ImageAlt,
        LabelSource::ParentControl,
        LabelSource::DataAttribute,
        LabelSource::TagAndClass,
    ];

    pub fn extract(&self, el: &ElementInfo) -> Option<String> {
        match self {
            LabelSource::VisibleText => non_empty(&el.text).map(String::from),
            LabelSource::AriaLabel => non_empty(&el.aria_label).map(String::from),
            LabelSource::Placeholder => non_empty(&el.placeholder).map(|p| format!("Input: {}", p)),
            LabelSource::Name => non_empty(&el.name).map(|n| format!("Field: {}", n)),
            LabelSource::Id => non_empty(&el.id).map(|id| format!("#{}", id)),
            LabelSource::ImageAlt => {
                if el.tag.eq_ignore_ascii_case("img") {
                    non_empty(&el.alt).map(|alt| format!("Image: {}", alt))
                } else {
                    None
                }
            }
            LabelSource::ParentControl => non_empty(&el.parent_text).map(String::from),
            LabelSource::DataAttribute => non_empty(&el.data_label)
                .or_else(|| non_empty(&el.data_testid))
                .map(String::from),
            LabelSource::TagAndClass => {
                let tag = el.tag.trim().to_lowercase();
                if tag.is_empty() {
                    return None;
                }
                let class = el
                    .class_name
                    .as_deref()
                    .and_then(|c| c.split_whitespace().next())
                    .map(|c| format!(".{}", c))
                    .unwrap_or_default();
                Some(format!("{}{}", tag, class))
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Derive a label for an element using the fixed strategy order.
pub fn extract_label(el: &ElementInfo) -> String {
    LabelSource::PRIORITY
        .iter()
        .find_map(|source| source.extract(el))
        .map(|label| truncate_label(&label))
        .unwrap_or_else(|| UNKNOWN_ELEMENT.to_string())
}

/// Cut a label to [`MAX_LABEL_CHARS`] characters, marking the cut with `...`.
pub fn truncate_label(label: &str) -> String {
    let trimmed = label.trim();
    match trimmed.char_indices().nth(MAX_LABEL_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Pick the label for a step: an explicit non-blank label wins, then the
/// element description, then [`UNKNOWN_ELEMENT`].
pub fn resolve_label(label: Option<&str>, element: Option<&ElementInfo>) -> String {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(l) => truncate_label(l),
        None => element
            .map(extract_label)
            .unwrap_or_else(|| UNKNOWN_ELEMENT.to_string()),
    }
}
