//! Fetch → build → publish controllers for the two flow graphs.
//!
//! Each view owns a `watch` channel holding its latest snapshot. A rebuilt
//! graph replaces the previous one in a single send, so observers never see
//! a half-built graph. Every load takes a generation number and a response
//! that is older than the latest issued load is discarded.

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::TimelineBackend;
use crate::flow::aggregate::{build_aggregate_flow, AppNodeData, FlowStats};
use crate::flow::config::{AggregateLayout, Orientation};
use crate::flow::session::{build_session_flow, FocusNodeData};
use crate::graph::FlowGraph;
use crate::models::{into_chronological, AppTransitionNotice};
use crate::utils::time::local_day_bounds;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Window a view is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum FlowScope {
    Day(NaiveDate),
    Session(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum FlowLoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Backend call failed; the previous graph stays visible.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot<T> {
    pub scope: Option<FlowScope>,
    pub state: FlowLoadState,
    pub graph: FlowGraph<T>,
    pub stats: FlowStats,
}

impl<T> Default for FlowSnapshot<T> {
    fn default() -> Self {
        Self {
            scope: None,
            state: FlowLoadState::Idle,
            graph: FlowGraph::default(),
            stats: FlowStats::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Published,
    /// A newer load was issued while this one was in flight.
    Stale,
}

struct FlowPublisher<T> {
    generation: AtomicU64,
    sender: watch::Sender<FlowSnapshot<T>>,
}

impl<T> FlowPublisher<T> {
    fn new() -> Self {
        let (sender, _) = watch::channel(FlowSnapshot::default());
        Self {
            generation: AtomicU64::new(0),
            sender,
        }
    }

    fn begin(&self, scope: FlowScope) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.sender.send_modify(|snapshot| {
            snapshot.scope = Some(scope);
            snapshot.state = FlowLoadState::Loading;
        });
        generation
    }

    fn finish(
        &self,
        generation: u64,
        scope: FlowScope,
        result: Result<(FlowGraph<T>, FlowStats)>,
    ) -> Result<LoadOutcome> {
        let mut failure = None;
        let mut built = Some(result);

        // Generation is checked under the channel's write lock so a slower,
        // older response can never land after a newer one.
        let published = self.sender.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match built.take() {
                Some(Ok((graph, stats))) => {
                    *snapshot = FlowSnapshot {
                        scope: Some(scope),
                        state: FlowLoadState::Loaded,
                        graph,
                        stats,
                    };
                }
                Some(Err(err)) => {
                    snapshot.state = FlowLoadState::Failed(format!("{err:#}"));
                    failure = Some(err);
                }
                None => return false,
            }
            true
        });

        if let Some(err) = failure {
            return Err(err);
        }
        if !published {
            match built {
                Some(Err(err)) => log_debug!(
                    "discarding stale flow failure for {scope:?} (generation {generation}): {err:#}"
                ),
                _ => log_debug!(
                    "discarding stale flow response for {scope:?} (generation {generation})"
                ),
            }
            return Ok(LoadOutcome::Stale);
        }
        Ok(LoadOutcome::Published)
    }

    fn scope(&self) -> Option<FlowScope> {
        self.sender.borrow().scope
    }
}

/// Literal focus path for a day or a single session.
pub struct SessionFlowView<B> {
    backend: Arc<B>,
    orientation: Orientation,
    publisher: Arc<FlowPublisher<FocusNodeData>>,
}

impl<B> Clone for SessionFlowView<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            orientation: self.orientation,
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<B: TimelineBackend> SessionFlowView<B> {
    pub fn new(backend: Arc<B>, orientation: Orientation) -> Self {
        Self {
            backend,
            orientation,
            publisher: Arc::new(FlowPublisher::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot<FocusNodeData>> {
        self.publisher.sender.subscribe()
    }

    pub fn snapshot(&self) -> FlowSnapshot<FocusNodeData> {
        self.publisher.sender.borrow().clone()
    }

    /// Fetch the timeline for `scope` and publish the rebuilt graph.
    ///
    /// Backend failures are published as `Failed` and returned.
    pub async fn load(&self, scope: FlowScope) -> Result<LoadOutcome> {
        let generation = self.publisher.begin(scope);
        let result = self.fetch_and_build(scope).await;
        self.publisher.finish(generation, scope, result)
    }

    pub async fn refresh(&self) -> Result<Option<LoadOutcome>> {
        match self.publisher.scope() {
            Some(scope) => self.load(scope).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_and_build(
        &self,
        scope: FlowScope,
    ) -> Result<(FlowGraph<FocusNodeData>, FlowStats)> {
        let events = match scope {
            FlowScope::Day(date) => {
                let (from, to) = local_day_bounds(date)?;
                self.backend.fetch_timeline_events(from, to).await?
            }
            FlowScope::Session(session_id) => {
                self.backend
                    .fetch_timeline_events_for_session(session_id)
                    .await?
            }
        };

        let events = into_chronological(events);
        let graph = build_session_flow(&events, self.orientation);
        let apps: HashSet<&str> = graph
            .nodes
            .iter()
            .map(|node| node.data.app_name.as_str())
            .collect();
        let stats = FlowStats {
            apps: apps.len(),
            transitions: graph.edges.len(),
        };
        Ok((graph, stats))
    }
}

/// Deduplicated app-to-app summary for a day or the current session.
pub struct AggregateFlowView<B> {
    backend: Arc<B>,
    layout: AggregateLayout,
    publisher: Arc<FlowPublisher<AppNodeData>>,
}

impl<B> Clone for AggregateFlowView<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            layout: self.layout.clone(),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<B: TimelineBackend> AggregateFlowView<B> {
    pub fn new(backend: Arc<B>, layout: AggregateLayout) -> Self {
        Self {
            backend,
            layout,
            publisher: Arc::new(FlowPublisher::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot<AppNodeData>> {
        self.publisher.sender.subscribe()
    }

    pub fn snapshot(&self) -> FlowSnapshot<AppNodeData> {
        self.publisher.sender.borrow().clone()
    }

    /// Session scope always reads the backend's current session flow.
    pub async fn load(&self, scope: FlowScope) -> Result<LoadOutcome> {
        let generation = self.publisher.begin(scope);
        let result = match scope {
            FlowScope::Day(date) => self.backend.fetch_app_lifecycle_flow(date).await,
            FlowScope::Session(_) => self.backend.fetch_session_flow().await,
        }
        .map(|records| {
            let graph = build_aggregate_flow(&records, &self.layout);
            (graph, FlowStats::from_records(&records))
        });
        self.publisher.finish(generation, scope, result)
    }

    pub async fn refresh(&self) -> Result<Option<LoadOutcome>> {
        match self.publisher.scope() {
            Some(scope) => self.load(scope).await.map(Some),
            None => Ok(None),
        }
    }

    /// Whether a live transition changes what this view shows.
    pub fn is_relevant(&self, notice: &AppTransitionNotice) -> bool {
        match self.publisher.scope() {
            Some(FlowScope::Session(_)) => true,
            Some(FlowScope::Day(date)) => notice.local_date() == Some(date),
            None => false,
        }
    }

    /// Refresh if `notice` is relevant; `None` when it was ignored.
    pub async fn handle_notice(&self, notice: &AppTransitionNotice) -> Result<Option<LoadOutcome>> {
        if !self.is_relevant(notice) {
            return Ok(None);
        }
        self.refresh().await
    }
}

/// Fan-out channel for `app-transition` notifications.
#[derive(Clone)]
pub struct TransitionBus {
    sender: broadcast::Sender<AppTransitionNotice>,
}

impl TransitionBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many listeners received the notice.
    pub fn publish(&self, notice: AppTransitionNotice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppTransitionNotice> {
        self.sender.subscribe()
    }
}

/// Keep `view` current with live transitions until cancelled or the bus closes.
pub fn spawn_transition_listener<B: TimelineBackend>(
    view: AggregateFlowView<B>,
    mut notices: broadcast::Receiver<AppTransitionNotice>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = notices.recv() => {
                    let result = match received {
                        Ok(notice) => view.handle_notice(&notice).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log_warn!("transition listener lagged by {skipped} notices; refreshing");
                            view.refresh().await
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if let Err(err) = result {
                        log_error!("live flow refresh failed: {err:#}");
                    }
                }
            }
        }
        log_info!("transition listener stopped");
    })
}
