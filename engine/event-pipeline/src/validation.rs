//! Required-field validation, run before enrichment

use crate::events::{
    EventKind, InboundEvent, RawBase, RawClick, RawPageView, RawScroll, RawSession,
    SESSION_EVENT_TYPES,
};
use serde::Serialize;

/// A single rejected event, reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Position within the event's own kind array
    pub index: usize,
    pub kind: EventKind,
    #[serde(rename = "error")]
    pub message: String,
}

/// Per-kind validation rules
pub trait Validate: InboundEvent {
    fn validate(&self) -> Result<(), String>;
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn missing_fields(fields: &[(&'static str, bool)]) -> Result<(), String> {
    let missing: Vec<&str> =
        fields.iter().filter(|(_, blank)| *blank).map(|(name, _)| *name).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Missing required fields: {}", missing.join(", ")))
    }
}

fn require_session_and_page(base: &RawBase) -> Result<(), String> {
    missing_fields(&[
        ("session_id", is_blank(&base.session_id)),
        ("page_url", is_blank(&base.page_url)),
    ])
}

impl Validate for RawPageView {
    fn validate(&self) -> Result<(), String> {
        require_session_and_page(&self.base)
    }
}

impl Validate for RawClick {
    fn validate(&self) -> Result<(), String> {
        require_session_and_page(&self.base)
    }
}

impl Validate for RawScroll {
    fn validate(&self) -> Result<(), String> {
        require_session_and_page(&self.base)
    }
}

impl Validate for RawSession {
    fn validate(&self) -> Result<(), String> {
        missing_fields(&[
            ("session_id", is_blank(&self.base.session_id)),
            ("event_type", is_blank(&self.event_type)),
        ])?;

        let event_type = self.event_type.as_deref().unwrap_or_default();
        if !SESSION_EVENT_TYPES.contains(&event_type) {
            return Err(format!("Invalid session event type: {event_type}"));
        }
        Ok(())
    }
}
