use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::backend::TimelineBackend;
use crate::db::Database;
use crate::models::{
    AppTransition, FlowRecord, Screenshot, TimelineEvent, WindowEvent, WindowEventKind,
};
use crate::utils::time::{clock_time, local_day_bounds};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Which rows a timeline query covers.
#[derive(Debug, Clone, Copy)]
pub enum TimelineFilter {
    /// Inclusive Unix-second range.
    Range { from: i64, to: i64 },
    Session(i64),
}

impl TimelineFilter {
    fn clause(&self) -> &'static str {
        match self {
            TimelineFilter::Range { .. } => "ts BETWEEN ?1 AND ?2",
            TimelineFilter::Session(_) => "session_id = ?1",
        }
    }

    fn values(&self) -> Vec<i64> {
        match *self {
            TimelineFilter::Range { from, to } => vec![from, to],
            TimelineFilter::Session(session_id) => vec![session_id],
        }
    }
}

pub struct TimelineRepository<'a> {
    conn: &'a Connection,
}

impl<'a> TimelineRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_transition(&self, session_id: i64, transition: &AppTransition) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO app_transitions (session_id, from_app, to_app, transition_type, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id,
                    transition.from_app,
                    transition.to_app,
                    transition.transition_type,
                    transition.ts,
                ],
            )
            .context("failed to insert app transition")?;
        Ok(())
    }

    pub fn insert_window_event(&self, session_id: i64, event: &WindowEvent) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO window_events (session_id, event_type, window_title, app_id, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id,
                    event.event_type.as_str(),
                    event.window_title,
                    event.app_id,
                    event.ts,
                ],
            )
            .context("failed to insert window event")?;
        Ok(())
    }

    pub fn insert_screenshot(&self, session_id: i64, screenshot: &Screenshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO screenshots (session_id, path, ts) VALUES (?1, ?2, ?3)",
                params![session_id, screenshot.path, screenshot.ts],
            )
            .context("failed to insert screenshot")?;
        Ok(())
    }

    /// All three event tables merged, newest first.
    pub fn unified_events(&self, filter: TimelineFilter) -> Result<Vec<TimelineEvent>> {
        let mut events: Vec<TimelineEvent> = self
            .transitions(filter)?
            .into_iter()
            .map(TimelineEvent::AppTransition)
            .collect();
        events.extend(self.window_events(filter)?.into_iter().map(TimelineEvent::WindowEvent));
        events.extend(self.screenshots(filter)?.into_iter().map(TimelineEvent::Screenshot));

        // Stable sort keeps each table's own id order among equal timestamps
        events.sort_by(|a, b| b.ts().cmp(&a.ts()));
        Ok(events)
    }

    fn transitions(&self, filter: TimelineFilter) -> Result<Vec<AppTransition>> {
        let sql = format!(
            "SELECT from_app, to_app, ts, transition_type FROM app_transitions
             WHERE {} ORDER BY ts DESC, id DESC",
            filter.clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values()), |row| {
                Ok(AppTransition {
                    from_app: row.get(0)?,
                    to_app: row.get(1)?,
                    ts: row.get(2)?,
                    transition_type: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn window_events(&self, filter: TimelineFilter) -> Result<Vec<WindowEvent>> {
        let sql = format!(
            "SELECT event_type, window_title, app_id, ts FROM window_events
             WHERE {} ORDER BY ts DESC, id DESC",
            filter.clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(filter.values()))?;

        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_kind: String = row.get(0)?;
            // Unknown lifecycle types are not part of the timeline
            let Some(event_type) = WindowEventKind::parse(&raw_kind) else {
                log_debug!("skipping window event with type '{raw_kind}'");
                continue;
            };
            events.push(WindowEvent {
                event_type,
                window_title: row.get(1)?,
                app_id: row.get(2)?,
                ts: row.get(3)?,
            });
        }
        Ok(events)
    }

    fn screenshots(&self, filter: TimelineFilter) -> Result<Vec<Screenshot>> {
        let sql = format!(
            "SELECT path, ts FROM screenshots WHERE {} ORDER BY ts DESC, id DESC",
            filter.clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values()), |row| {
                Ok(Screenshot {
                    path: row.get(0)?,
                    ts: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Transitions as flow records, oldest first.
    pub fn flow_records(&self, filter: TimelineFilter) -> Result<Vec<FlowRecord>> {
        let sql = format!(
            "SELECT from_app, to_app, transition_type, ts FROM app_transitions
             WHERE {} ORDER BY ts ASC, id ASC",
            filter.clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values()), |row| {
                let ts: i64 = row.get(3)?;
                Ok(FlowRecord {
                    from_app: row.get(0)?,
                    to_app: row.get(1)?,
                    transition_type: row.get(2)?,
                    time: clock_time(ts),
                    created_at: ts,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest session id with any recorded transition.
    pub fn latest_session_id(&self) -> Result<Option<i64>> {
        let latest = self
            .conn
            .query_row("SELECT MAX(session_id) FROM app_transitions", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        Ok(latest)
    }
}

// Database async wrappers for timeline operations
impl Database {
    pub async fn record_transition(&self, session_id: i64, transition: AppTransition) -> Result<()> {
        self.execute(move |conn| {
            TimelineRepository::new(conn).insert_transition(session_id, &transition)
        })
        .await
    }

    pub async fn record_window_event(&self, session_id: i64, event: WindowEvent) -> Result<()> {
        self.execute(move |conn| TimelineRepository::new(conn).insert_window_event(session_id, &event))
            .await
    }

    pub async fn record_screenshot(&self, session_id: i64, screenshot: Screenshot) -> Result<()> {
        self.execute(move |conn| {
            TimelineRepository::new(conn).insert_screenshot(session_id, &screenshot)
        })
        .await
    }

    pub async fn current_session_id(&self) -> Result<Option<i64>> {
        self.execute(|conn| TimelineRepository::new(conn).latest_session_id())
            .await
    }
}

impl TimelineBackend for Database {
    async fn fetch_timeline_events(&self, from: i64, to: i64) -> Result<Vec<TimelineEvent>> {
        self.execute(move |conn| {
            TimelineRepository::new(conn).unified_events(TimelineFilter::Range { from, to })
        })
        .await
        .context("failed to load timeline events")
    }

    async fn fetch_timeline_events_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<TimelineEvent>> {
        self.execute(move |conn| {
            TimelineRepository::new(conn).unified_events(TimelineFilter::Session(session_id))
        })
        .await
        .with_context(|| format!("failed to load timeline for session {session_id}"))
    }

    async fn fetch_app_lifecycle_flow(&self, date: NaiveDate) -> Result<Vec<FlowRecord>> {
        let (from, to) = local_day_bounds(date)?;
        self.execute(move |conn| {
            TimelineRepository::new(conn).flow_records(TimelineFilter::Range { from, to })
        })
        .await
        .with_context(|| format!("failed to load app flow for {date}"))
    }

    async fn fetch_session_flow(&self) -> Result<Vec<FlowRecord>> {
        self.execute(|conn| {
            let repo = TimelineRepository::new(conn);
            match repo.latest_session_id()? {
                Some(session_id) => repo.flow_records(TimelineFilter::Session(session_id)),
                None => Ok(Vec::new()),
            }
        })
        .await
        .context("failed to load current session flow")
    }
}
