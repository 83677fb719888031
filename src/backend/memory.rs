use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;

use crate::icons::IconSource;
use crate::models::{FlowRecord, TimelineEvent};

use super::TimelineBackend;

#[derive(Default)]
struct MemoryData {
    timeline: Vec<TimelineEvent>,
    sessions: HashMap<i64, Vec<TimelineEvent>>,
    flows_by_date: HashMap<NaiveDate, Vec<FlowRecord>>,
    current_session_flow: Vec<FlowRecord>,
    icons: HashMap<String, String>,
    failure: Option<String>,
}

/// Backend held entirely in memory, for fixtures and offline demos.
///
/// Timeline queries answer newest-first, the way the SQLite store does.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<MemoryData>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push_event(&self, event: TimelineEvent) {
        self.lock().timeline.push(event);
    }

    pub fn set_session_events(&self, session_id: i64, events: Vec<TimelineEvent>) {
        self.lock().sessions.insert(session_id, events);
    }

    pub fn set_flows_for_date(&self, date: NaiveDate, records: Vec<FlowRecord>) {
        self.lock().flows_by_date.insert(date, records);
    }

    pub fn set_session_flow(&self, records: Vec<FlowRecord>) {
        self.lock().current_session_flow = records;
    }

    pub fn set_icon(&self, app_id: &str, base64_png: &str) {
        self.lock()
            .icons
            .insert(app_id.to_string(), base64_png.to_string());
    }

    /// Make every subsequent call fail with `message`; `None` heals it.
    pub fn set_failure(&self, message: Option<&str>) {
        self.lock().failure = message.map(String::from);
    }

    /// Number of backend calls served so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self) -> Result<MutexGuard<'_, MemoryData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.lock();
        if let Some(message) = &guard.failure {
            bail!("{message}");
        }
        Ok(guard)
    }
}

fn newest_first(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    events.sort_by_key(|event| std::cmp::Reverse(event.ts()));
    events
}

impl TimelineBackend for MemoryBackend {
    async fn fetch_timeline_events(&self, from: i64, to: i64) -> Result<Vec<TimelineEvent>> {
        let events: Vec<TimelineEvent> = self
            .begin_call()?
            .timeline
            .iter()
            .filter(|event| (from..=to).contains(&event.ts()))
            .cloned()
            .collect();
        Ok(newest_first(events))
    }

    async fn fetch_timeline_events_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<TimelineEvent>> {
        let events = self
            .begin_call()?
            .sessions
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        Ok(newest_first(events))
    }

    async fn fetch_app_lifecycle_flow(&self, date: NaiveDate) -> Result<Vec<FlowRecord>> {
        Ok(self
            .begin_call()?
            .flows_by_date
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_session_flow(&self) -> Result<Vec<FlowRecord>> {
        Ok(self.begin_call()?.current_session_flow.clone())
    }
}

impl IconSource for MemoryBackend {
    async fn fetch_icon(&self, app_id: &str) -> Result<String> {
        self.begin_call()?
            .icons
            .get(app_id)
            .cloned()
            .ok_or_else(|| anyhow!("no icon for {app_id}"))
    }
}
