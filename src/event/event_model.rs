use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::locator::locator_model::ElementAttributes;

// ============================================================================
// Events
// ============================================================================

/// One observation emitted by the on-device agent. Immutable once recorded.
///
/// Wire form is a flat JSON object with a `kind` discriminator:
/// `{"session_id":"s1","timestamp_ms":0,"kind":"ui","action":"tap","element":{..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "sessionId")]
    pub session_id: String,

    /// Milliseconds since the epoch (or since session start; only order matters)
    #[serde(alias = "timestamp")]
    pub timestamp_ms: u64,

    /// Insertion sequence, assigned by the store. Tie-breaks equal timestamps.
    #[serde(default)]
    pub seq: u64,

    #[serde(
        default,
        alias = "correlationTag",
        alias = "correlation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_tag: Option<String>,

    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A user action on an element (tap, input, swipe, ...)
    Ui {
        action: String,
        #[serde(default)]
        element: ElementAttributes,
        #[serde(default, alias = "threadId", skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen: Option<String>,
    },

    /// The app moved to another screen.
    Navigation {
        #[serde(default, alias = "fromScreen", skip_serializing_if = "Option::is_none")]
        from_screen: Option<String>,
        #[serde(alias = "toScreen")]
        to_screen: String,
        #[serde(default, alias = "threadId", skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    /// A backend request issued by the app.
    Network {
        method: String,
        url: String,
        #[serde(default, alias = "requestShape", skip_serializing_if = "Option::is_none")]
        request_shape: Option<serde_json::Value>,
        #[serde(default, alias = "statusCode", skip_serializing_if = "Option::is_none")]
        response_code: Option<u16>,
        #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, alias = "threadId", skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    /// A structural dump of the elements currently on screen.
    Hierarchy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen: Option<String>,
        #[serde(default)]
        nodes: Vec<ElementAttributes>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ui,
    Navigation,
    Network,
    Hierarchy,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Ui { .. } => EventKind::Ui,
            EventPayload::Navigation { .. } => EventKind::Navigation,
            EventPayload::Network { .. } => EventKind::Network,
            EventPayload::Hierarchy { .. } => EventKind::Hierarchy,
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            EventPayload::Ui { thread_id, .. }
            | EventPayload::Navigation { thread_id, .. }
            | EventPayload::Network { thread_id, .. } => thread_id.as_deref(),
            EventPayload::Hierarchy { .. } => None,
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Total order used everywhere events are compared.
    pub fn order_key(&self) -> (u64, u64) {
        (self.timestamp_ms, self.seq)
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, alias = "deviceModel", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, alias = "osVersion", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, alias = "appVersion", skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// "android" or "ios"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// An ordered, append-only run of events from one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub device_info: DeviceInfo,
    /// Sorted by `(timestamp_ms, seq)`.
    pub events: Vec<Event>,
    #[serde(default)]
    pub sealed: bool,
}

impl Session {
    pub fn new(session_id: &str, start_time: DateTime<Utc>, device_info: DeviceInfo) -> Self {
        Self {
            session_id: session_id.to_string(),
            start_time,
            device_info,
            events: Vec::new(),
            sealed: false,
        }
    }

    /// Build a sealed session directly from events, ordering them the way the
    /// store would. Sequence numbers follow input order.
    pub fn from_events(session_id: &str, events: Vec<Event>) -> Self {
        let start_time = events
            .iter()
            .map(|e| e.timestamp_ms)
            .min()
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            .unwrap_or_else(Utc::now);

        let mut events: Vec<Event> = events
            .into_iter()
            .enumerate()
            .map(|(i, mut e)| {
                e.session_id = session_id.to_string();
                e.seq = i as u64;
                e
            })
            .collect();
        events.sort_by_key(Event::order_key);

        Self {
            session_id: session_id.to_string(),
            start_time,
            device_info: DeviceInfo::default(),
            events,
            sealed: true,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind() == kind)
    }
}
