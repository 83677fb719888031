//! `focusflow` command line: builds flow graphs from an activity database
//! and prints them as JSON.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use serde::Serialize;

use crate::db::Database;
use crate::flow::{
    AggregateFlow, AggregateFlowView, AppNodeData, FlowLoadState, FlowScope, FlowSnapshot,
    FlowStats, Orientation, SessionFlowView,
};
use crate::icons::{IconCache, IconState};
use crate::settings::{FlowSettings, SettingsStore};

#[derive(Parser)]
#[command(name = "focusflow")]
#[command(about = "Focus-flow graphs from recorded app activity")]
#[command(version)]
struct Cli {
    /// SQLite activity database
    #[arg(long, value_name = "PATH")]
    db: PathBuf,

    /// Flow settings JSON (defaults are used when omitted)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the literal focus path as a graph
    Session {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Fill the grid column by column
        #[arg(long)]
        vertical: bool,
    },

    /// Print the deduplicated app-to-app graph with stats
    Aggregate {
        /// Day to summarise (local time, defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "session")]
        date: Option<NaiveDate>,

        /// Summarise the current session instead of a day
        #[arg(long)]
        session: bool,
    },

    /// Resolve app icons through a shared cache
    Icon {
        #[arg(value_name = "APP_ID", required = true)]
        app_ids: Vec<String>,
    },
}

#[derive(Args)]
struct ScopeArgs {
    /// Day to show (local time, defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "session")]
    date: Option<NaiveDate>,

    /// Session id to show
    #[arg(long, value_name = "N")]
    session: Option<i64>,
}

impl ScopeArgs {
    fn scope(&self) -> FlowScope {
        match (self.session, self.date) {
            (Some(session_id), _) => FlowScope::Session(session_id),
            (None, Some(date)) => FlowScope::Day(date),
            (None, None) => FlowScope::Day(Local::now().date_naive()),
        }
    }
}

fn init_logging() {
    let debug = std::env::var("FOCUSFLOW_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // RUST_LOG still applies on top of the default level.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => SettingsStore::new(path.clone())?.flow(),
        None => FlowSettings::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let db = Database::new(cli.db.clone())?;
        match cli.command {
            Commands::Session { scope, vertical } => {
                let orientation = if vertical {
                    Orientation::Vertical
                } else {
                    settings.orientation
                };
                print_session(db, scope.scope(), orientation).await
            }
            Commands::Aggregate { date, session } => {
                let scope = if session {
                    let current = db.current_session_id().await?.unwrap_or_default();
                    FlowScope::Session(current)
                } else {
                    FlowScope::Day(date.unwrap_or_else(|| Local::now().date_naive()))
                };
                print_aggregate(db, scope, settings).await
            }
            Commands::Icon { app_ids } => print_icons(db, app_ids).await,
        }
    })
}

async fn print_session(db: Database, scope: FlowScope, orientation: Orientation) -> Result<()> {
    let view = SessionFlowView::new(Arc::new(db), orientation);
    view.load(scope).await?;
    let snapshot = view.snapshot();
    info!(
        "session flow for {scope:?}: {} nodes, {} edges",
        snapshot.graph.nodes.len(),
        snapshot.graph.edges.len()
    );
    print_json(&snapshot.graph)
}

async fn print_aggregate(db: Database, scope: FlowScope, settings: FlowSettings) -> Result<()> {
    let view = AggregateFlowView::new(Arc::new(db), settings.aggregate);
    view.load(scope).await?;
    let snapshot = view.snapshot();
    info!(
        "aggregate flow for {scope:?}: {} apps, {} transitions",
        snapshot.stats.apps, snapshot.stats.transitions
    );
    print_json(&AggregateOutput::from(&snapshot))
}

async fn print_icons(db: Database, app_ids: Vec<String>) -> Result<()> {
    let cache = IconCache::spawn(db);
    let subscriptions = app_ids
        .iter()
        .map(|app_id| cache.subscribe(app_id))
        .collect::<Result<Vec<_>>>()?;

    for subscription in subscriptions {
        let app_id = subscription.app_id().to_string();
        match subscription.resolved().await {
            Some(IconState::Resolved(data_url)) => println!("{app_id}: {data_url}"),
            Some(IconState::Unavailable) | None => println!("{app_id}: unavailable"),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AggregateOutput<'a> {
    graph: &'a AggregateFlow,
    stats: FlowStats,
    state: &'a FlowLoadState,
}

impl<'a> From<&'a FlowSnapshot<AppNodeData>> for AggregateOutput<'a> {
    fn from(snapshot: &'a FlowSnapshot<AppNodeData>) -> Self {
        Self {
            graph: &snapshot.graph,
            stats: snapshot.stats,
            state: &snapshot.state,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
