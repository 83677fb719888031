use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::flow::config::{AggregateLayout, Orientation};

/// User-facing flow preferences, persisted as pretty JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    pub orientation: Orientation,
    pub aggregate: AggregateLayout,
    /// Refresh the aggregate view on live `app-transition` notices.
    pub realtime: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Horizontal,
            aggregate: AggregateLayout::default(),
            realtime: true,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<FlowSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                FlowSettings::default()
            })
        } else {
            FlowSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, FlowSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FlowSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn flow(&self) -> FlowSettings {
        self.read().clone()
    }

    pub fn update_flow(&self, settings: FlowSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        let mut guard = self.write();
        guard.orientation = orientation;
        self.persist(&guard)
    }

    fn persist(&self, data: &FlowSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
