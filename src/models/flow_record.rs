//! App-to-app flow records and the live transition notice.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// One recorded app-to-app transition as served by the flow endpoints.
///
/// Records arrive as an unordered bag; the same pair may repeat many times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub from_app: String,
    pub to_app: String,
    pub transition_type: String,
    /// Display time of the transition (`HH:MM:SS`).
    pub time: String,
    /// Unix epoch seconds.
    pub created_at: i64,
}

/// Payload of the `app-transition` push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTransitionNotice {
    pub from_app: String,
    pub to_app: String,
    pub transition_type: String,
    pub timestamp: i64,
}

impl AppTransitionNotice {
    /// Calendar day (local time) the transition happened on.
    pub fn local_date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.timestamp, 0)
            .map(|utc| utc.with_timezone(&Local).date_naive())
    }
}
