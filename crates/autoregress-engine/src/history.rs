//! The evaluation history store.
//!
//! A single JSON file holding recent evaluation runs, newest first. Pinned
//! entries survive retention; unpinned entries beyond the cap age out. The
//! store is deliberately lenient on read: a missing, corrupt or partially
//! invalid file degrades to whatever entries can be salvaged, never an error,
//! so a damaged history cannot brick the app.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::eval::{EVAL_METRICS_FILE, EvalSummary};
use crate::events::MetricSet;
use crate::paths::history_path;
use crate::schema::local_timestamp;
use crate::utils::{read_json, write_json_atomic};

/// Unpinned entries kept after each insertion.
pub const DEFAULT_KEEP: usize = 20;

/// One remembered evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Run directory basename; unique per entry.
    pub id: String,
    pub run_dir: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub model_dir: Option<String>,
    #[serde(default)]
    pub csv_path: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_present: bool,
    #[serde(default)]
    pub n_rows: Option<usize>,
    #[serde(default)]
    pub metrics: MetricSet,
    #[serde(default)]
    pub pinned: bool,
}

/// Handle on one history file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// The shared per-user store.
    pub fn open_default() -> Result<Self> {
        Ok(Self {
            path: history_path()?,
        })
    }

    /// A store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all valid entries; never fails.
    pub fn load(&self) -> Vec<HistoryItem> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let Ok(raw) = serde_json::from_str::<Vec<serde_json::Value>>(&text) else {
            warn!(path = %self.path.display(), "history file is not a JSON array; starting fresh");
            return Vec::new();
        };
        raw.into_iter()
            .filter_map(|v| serde_json::from_value::<HistoryItem>(v).ok())
            .filter(|item| !item.id.is_empty() && !item.run_dir.is_empty())
            .collect()
    }

    pub fn save(&self, items: &[HistoryItem]) -> Result<()> {
        write_json_atomic(&self.path, &items)
    }

    /// Record a finished evaluation run and apply retention.
    ///
    /// Reads the run's summary leniently; an unreadable summary still yields
    /// an entry with just the id and directory. Returns the stored list,
    /// pinned entries first, then unpinned newest first up to `keep`.
    pub fn add_from_run_dir(&self, run_dir: &Path, keep: usize) -> Result<Vec<HistoryItem>> {
        let id = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let summary: Option<EvalSummary> = read_json(&run_dir.join(EVAL_METRICS_FILE)).ok();
        let new_item = match summary {
            Some(s) => HistoryItem {
                id,
                run_dir: run_dir.display().to_string(),
                created_at: s.created_at,
                model_dir: Some(s.model_dir.display().to_string()),
                csv_path: Some(s.csv_path.display().to_string()),
                target: s.target,
                target_present: s.target_present,
                n_rows: Some(s.n_rows),
                metrics: s.metrics,
                pinned: false,
            },
            None => HistoryItem {
                id,
                run_dir: run_dir.display().to_string(),
                created_at: local_timestamp(),
                model_dir: None,
                csv_path: None,
                target: None,
                target_present: false,
                n_rows: None,
                metrics: MetricSet::absent(),
                pinned: false,
            },
        };

        let mut items = self.load();
        items.retain(|it| it.id != new_item.id);
        items.insert(0, new_item);

        let (pinned, non_pinned): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|it| it.pinned);
        let room = keep.saturating_sub(pinned.len());
        let mut items = pinned;
        items.extend(non_pinned.into_iter().take(room));

        self.save(&items)?;
        Ok(items)
    }

    /// Flip an entry's pin. Unknown ids are a no-op.
    pub fn toggle_pin(&self, item_id: &str) -> Result<Vec<HistoryItem>> {
        let mut items = self.load();
        if let Some(item) = items.iter_mut().find(|it| it.id == item_id) {
            item.pinned = !item.pinned;
        }
        self.save(&items)?;
        Ok(items)
    }

    /// Delete one entry. Unknown ids are a no-op.
    pub fn remove(&self, item_id: &str) -> Result<Vec<HistoryItem>> {
        let mut items = self.load();
        items.retain(|it| it.id != item_id);
        self.save(&items)?;
        Ok(items)
    }

    /// Delete everything.
    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }
}
