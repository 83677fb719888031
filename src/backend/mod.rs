//! Backend RPC surface the flow views consume.
//!
//! Every method is a suspension point; implementations decide where the
//! data lives (SQLite store, in-memory fixture, remote service).

mod memory;

pub use memory::MemoryBackend;

use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{FlowRecord, TimelineEvent};

pub trait TimelineBackend: Send + Sync + 'static {
    /// Unified timeline for `[from, to]` (Unix seconds), in either
    /// chronological direction.
    fn fetch_timeline_events(
        &self,
        from: i64,
        to: i64,
    ) -> impl Future<Output = Result<Vec<TimelineEvent>>> + Send;

    fn fetch_timeline_events_for_session(
        &self,
        session_id: i64,
    ) -> impl Future<Output = Result<Vec<TimelineEvent>>> + Send;

    fn fetch_app_lifecycle_flow(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<FlowRecord>>> + Send;

    /// Flow records of the session currently being tracked.
    fn fetch_session_flow(&self) -> impl Future<Output = Result<Vec<FlowRecord>>> + Send;
}
