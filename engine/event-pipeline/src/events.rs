//! # Clickstream Event Definitions
//!
//! Two families of types live here. The `Raw*` types mirror untrusted client
//! input: every field is optional and nothing has been checked. The enriched
//! types (`PageView`, `Click`, `Scroll`, `Session`) are built once by the
//! enricher with every default filled in and are never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind-agnostic row, keyed by column name. Keys iterate in sorted order.
pub type EventRow = BTreeMap<String, serde_json::Value>;

/// The four telemetry event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    Click,
    Scroll,
    Session,
}

impl EventKind {
    /// Processing order within a single request
    pub const ALL: [EventKind; 4] =
        [EventKind::PageView, EventKind::Click, EventKind::Scroll, EventKind::Session];

    /// Table name shared by the primary store and the warehouse
    pub fn table_name(&self) -> &'static str {
        match self {
            EventKind::PageView => "page_view_events",
            EventKind::Click => "click_events",
            EventKind::Scroll => "scroll_events",
            EventKind::Session => "session_events",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PageView => "page_view",
            EventKind::Click => "click",
            EventKind::Scroll => "scroll",
            EventKind::Session => "session",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every inbound event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBase {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub page_url: Option<String>,
    pub timestamp: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPageView {
    #[serde(flatten)]
    pub base: RawBase,
    pub page_title: Option<String>,
    #[serde(alias = "page_load_time")]
    pub load_time: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClick {
    #[serde(flatten)]
    pub base: RawBase,
    pub element_id: Option<String>,
    pub element_text: Option<String>,
    pub click_x: Option<i32>,
    pub click_y: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScroll {
    #[serde(flatten)]
    pub base: RawBase,
    pub scroll_depth: Option<i32>,
    pub scroll_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSession {
    #[serde(flatten)]
    pub base: RawBase,
    pub event_type: Option<String>,
    #[serde(alias = "session_duration")]
    pub duration: Option<i32>,
    pub page_count: Option<i32>,
}

/// Session lifecycle values accepted in `event_type`
pub const SESSION_EVENT_TYPES: [&str; 3] = ["session_start", "session_end", "session_update"];

/// Enriched fields shared by every event kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBase {
    pub session_id: String,
    pub user_id: Option<String>,
    pub page_url: String,
    pub timestamp: String,
    pub user_agent: String,
    pub ip_address: String,
    pub browser: String,
    pub os: String,
    pub device_type: String,
    pub country: String,
    pub city: String,
    pub referrer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    #[serde(flatten)]
    pub base: EventBase,
    pub page_title: String,
    pub load_time: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Click {
    #[serde(flatten)]
    pub base: EventBase,
    pub element_id: String,
    pub element_text: String,
    pub click_x: i32,
    pub click_y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scroll {
    #[serde(flatten)]
    pub base: EventBase,
    pub scroll_depth: i32,
    pub scroll_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    #[serde(flatten)]
    pub base: EventBase,
    pub event_type: String,
    pub duration: i32,
    pub page_count: i32,
}

impl From<EventBase> for RawBase {
    fn from(base: EventBase) -> Self {
        Self {
            session_id: Some(base.session_id),
            user_id: base.user_id,
            page_url: Some(base.page_url),
            timestamp: Some(base.timestamp),
            user_agent: Some(base.user_agent),
            ip_address: Some(base.ip_address),
            browser: Some(base.browser),
            os: Some(base.os),
            device_type: Some(base.device_type),
            country: Some(base.country),
            city: Some(base.city),
            referrer: Some(base.referrer),
        }
    }
}

impl From<PageView> for RawPageView {
    fn from(event: PageView) -> Self {
        Self {
            base: event.base.into(),
            page_title: Some(event.page_title),
            load_time: Some(event.load_time),
        }
    }
}

impl From<Click> for RawClick {
    fn from(event: Click) -> Self {
        Self {
            base: event.base.into(),
            element_id: Some(event.element_id),
            element_text: Some(event.element_text),
            click_x: Some(event.click_x),
            click_y: Some(event.click_y),
        }
    }
}

impl From<Scroll> for RawScroll {
    fn from(event: Scroll) -> Self {
        Self {
            base: event.base.into(),
            scroll_depth: Some(event.scroll_depth),
            scroll_percentage: Some(event.scroll_percentage),
        }
    }
}

impl From<Session> for RawSession {
    fn from(event: Session) -> Self {
        Self {
            base: event.base.into(),
            event_type: Some(event.event_type),
            duration: Some(event.duration),
            page_count: Some(event.page_count),
        }
    }
}

/// Ties a raw inbound type to its kind and enriched counterpart
pub trait InboundEvent: Sized {
    const KIND: EventKind;
    type Enriched: Serialize + Send + Sync + 'static;

    fn base(&self) -> &RawBase;

    /// Wrap enriched events of this kind into a batch
    fn into_batch(events: Vec<Self::Enriched>) -> EventBatch;
}

impl InboundEvent for RawPageView {
    const KIND: EventKind = EventKind::PageView;
    type Enriched = PageView;

    fn base(&self) -> &RawBase {
        &self.base
    }

    fn into_batch(events: Vec<PageView>) -> EventBatch {
        EventBatch::PageViews(events)
    }
}

impl InboundEvent for RawClick {
    const KIND: EventKind = EventKind::Click;
    type Enriched = Click;

    fn base(&self) -> &RawBase {
        &self.base
    }

    fn into_batch(events: Vec<Click>) -> EventBatch {
        EventBatch::Clicks(events)
    }
}

impl InboundEvent for RawScroll {
    const KIND: EventKind = EventKind::Scroll;
    type Enriched = Scroll;

    fn base(&self) -> &RawBase {
        &self.base
    }

    fn into_batch(events: Vec<Scroll>) -> EventBatch {
        EventBatch::Scrolls(events)
    }
}

impl InboundEvent for RawSession {
    const KIND: EventKind = EventKind::Session;
    type Enriched = Session;

    fn base(&self) -> &RawBase {
        &self.base
    }

    fn into_batch(events: Vec<Session>) -> EventBatch {
        EventBatch::Sessions(events)
    }
}

/// A non-empty, same-kind batch of enriched events
#[derive(Debug, Clone, PartialEq)]
pub enum EventBatch {
    PageViews(Vec<PageView>),
    Clicks(Vec<Click>),
    Scrolls(Vec<Scroll>),
    Sessions(Vec<Session>),
}

impl EventBatch {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBatch::PageViews(_) => EventKind::PageView,
            EventBatch::Clicks(_) => EventKind::Click,
            EventBatch::Scrolls(_) => EventKind::Scroll,
            EventBatch::Sessions(_) => EventKind::Session,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EventBatch::PageViews(events) => events.len(),
            EventBatch::Clicks(events) => events.len(),
            EventBatch::Scrolls(events) => events.len(),
            EventBatch::Sessions(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert every event to a kind-agnostic row
    pub fn rows(&self) -> Result<Vec<EventRow>, serde_json::Error> {
        match self {
            EventBatch::PageViews(events) => events.iter().map(to_row).collect(),
            EventBatch::Clicks(events) => events.iter().map(to_row).collect(),
            EventBatch::Scrolls(events) => events.iter().map(to_row).collect(),
            EventBatch::Sessions(events) => events.iter().map(to_row).collect(),
        }
    }
}

fn to_row<T: Serialize>(event: &T) -> Result<EventRow, serde_json::Error> {
    match serde_json::to_value(event)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        other => Ok(BTreeMap::from([("value".to_string(), other)])),
    }
}

/// Inbound ingestion request, grouped by kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    pub page_views: Option<Vec<RawPageView>>,
    pub clicks: Option<Vec<RawClick>>,
    pub scrolls: Option<Vec<RawScroll>>,
    pub sessions: Option<Vec<RawSession>>,
}

impl IngestRequest {
    /// Total events across every kind
    pub fn total_event_count(&self) -> usize {
        self.page_views.as_ref().map_or(0, Vec::len)
            + self.clicks.as_ref().map_or(0, Vec::len)
            + self.scrolls.as_ref().map_or(0, Vec::len)
            + self.sessions.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.total_event_count() == 0
    }
}
