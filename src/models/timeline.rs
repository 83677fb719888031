//! Timeline event data models.
//!
//! A timeline is the merged, timestamped stream the backend produces for a
//! day or a single session: focus transitions between apps, window lifecycle
//! events and screenshots.

use serde::{Deserialize, Serialize};

/// Focus moved from one application to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTransition {
    pub from_app: String,
    pub to_app: String,
    /// Unix epoch seconds.
    pub ts: i64,
    pub transition_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowEventKind {
    Minimize,
    Maximize,
    Close,
}

impl WindowEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowEventKind::Minimize => "minimize",
            WindowEventKind::Maximize => "maximize",
            WindowEventKind::Close => "close",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minimize" => Some(WindowEventKind::Minimize),
            "maximize" => Some(WindowEventKind::Maximize),
            "close" => Some(WindowEventKind::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEvent {
    pub event_type: WindowEventKind,
    pub window_title: String,
    pub app_id: String,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub path: String,
    pub ts: i64,
}

/// One entry of the unified timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TimelineEvent {
    AppTransition(AppTransition),
    WindowEvent(WindowEvent),
    Screenshot(Screenshot),
}

impl TimelineEvent {
    pub fn ts(&self) -> i64 {
        match self {
            TimelineEvent::AppTransition(t) => t.ts,
            TimelineEvent::WindowEvent(w) => w.ts,
            TimelineEvent::Screenshot(s) => s.ts,
        }
    }
}

/// Non-transition events that get attached to the focus interval they fall in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachedEvent {
    Window(WindowEvent),
    Screenshot(Screenshot),
}

impl AttachedEvent {
    pub fn ts(&self) -> i64 {
        match self {
            AttachedEvent::Window(w) => w.ts,
            AttachedEvent::Screenshot(s) => s.ts,
        }
    }
}

/// Put a backend batch into ascending order.
///
/// The backend returns either order; a batch whose first entry is newer than
/// its last is treated as newest-first and reversed. Entries are otherwise
/// left exactly as delivered.
pub fn into_chronological(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    let descending = match (events.first(), events.last()) {
        (Some(first), Some(last)) => first.ts() > last.ts(),
        _ => false,
    };
    if descending {
        events.reverse();
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(ts: i64) -> TimelineEvent {
        TimelineEvent::Screenshot(Screenshot {
            path: format!("/shots/{ts}.png"),
            ts,
        })
    }

    #[test]
    fn serializes_with_type_and_payload_tags() {
        let event = TimelineEvent::WindowEvent(WindowEvent {
            event_type: WindowEventKind::Minimize,
            window_title: "Inbox".into(),
            app_id: "mail".into(),
            ts: 42,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "WindowEvent");
        assert_eq!(value["payload"]["event_type"], "minimize");
        assert_eq!(value["payload"]["ts"], 42);
    }

    #[test]
    fn parses_backend_transition_payload() {
        let raw = r#"{"type":"AppTransition","payload":{"from_app":"A","to_app":"B","ts":100,"transition_type":"switch"}}"#;
        let event: TimelineEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.ts(), 100);
        assert!(matches!(event, TimelineEvent::AppTransition(ref t) if t.to_app == "B"));
    }

    #[test]
    fn reverses_newest_first_batches() {
        let events = into_chronological(vec![shot(30), shot(20), shot(10)]);
        let stamps: Vec<i64> = events.iter().map(TimelineEvent::ts).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
    }

    #[test]
    fn keeps_ascending_and_flat_batches() {
        let events = into_chronological(vec![shot(10), shot(10), shot(20)]);
        let stamps: Vec<i64> = events.iter().map(TimelineEvent::ts).collect();
        assert_eq!(stamps, vec![10, 10, 20]);
        assert!(into_chronological(Vec::new()).is_empty());
    }
}
