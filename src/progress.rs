// Per-player, per-level progress kept in flat store hashes.
//
// Keys:
//   player:{id}                 createdAt
//   progress:{id}:level:{n}     one field per task ("1"/"0")
//   progress:{id}:level:2:manifest   yaml (last manifest that passed)

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::manifest::ValidationReport;
use crate::store::{KvStore, StoreError};

pub const LEVEL_ONE_TASKS: [&str; 3] = ["pull", "run", "logs"];
pub const VALID_YAML_TASK: &str = "validYaml";
/// Field of the manifest hash holding the last manifest that passed
/// validation. Kept apart from the task hash so no task name can overwrite it.
pub const MANIFEST_FIELD: &str = "yaml";
pub const MANIFEST_LEVEL: i64 = 2;

/// A stored task flag. Only the exact text `"1"` counts as set; `"0"`, any
/// other text and a missing field are all unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlag {
    Set,
    Unset,
}

impl TaskFlag {
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            Some("1") => TaskFlag::Set,
            _ => TaskFlag::Unset,
        }
    }

    pub fn as_stored(self) -> &'static str {
        match self {
            TaskFlag::Set => "1",
            TaskFlag::Unset => "0",
        }
    }

    pub fn is_set(self) -> bool {
        self == TaskFlag::Set
    }
}

impl From<bool> for TaskFlag {
    fn from(completed: bool) -> Self {
        if completed {
            TaskFlag::Set
        } else {
            TaskFlag::Unset
        }
    }
}

/// What a client sees for one (player, level) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub player_id: String,
    pub level: i64,
    pub tasks: BTreeMap<String, bool>,
    pub done: bool,
    #[serde(rename = "yaml")]
    pub manifest: Option<String>,
}

pub fn player_key(player_id: &str) -> String {
    format!("player:{player_id}")
}

pub fn progress_key(player_id: &str, level: i64) -> String {
    format!("progress:{player_id}:level:{level}")
}

pub fn manifest_key(player_id: &str) -> String {
    format!("{}:manifest", progress_key(player_id, MANIFEST_LEVEL))
}

/// Task names that always appear in a level's view, completed or not.
pub fn recognized_tasks(level: i64) -> &'static [&'static str] {
    match level {
        1 => &LEVEL_ONE_TASKS,
        MANIFEST_LEVEL => &[VALID_YAML_TASK],
        _ => &[],
    }
}

/// Level 1 is done when every level 1 task is complete; every other level
/// is done exactly when `validYaml` is set.
pub fn is_done(level: i64, tasks: &BTreeMap<String, bool>) -> bool {
    let flag = |name: &str| tasks.get(name).copied().unwrap_or(false);
    if level == 1 {
        LEVEL_ONE_TASKS.iter().all(|t| flag(t))
    } else {
        flag(VALID_YAML_TASK)
    }
}

/// Merge stored fields over the level defaults. Stored values win.
fn build_view(
    player_id: &str,
    level: i64,
    stored: &HashMap<String, String>,
    manifest: Option<String>,
) -> ProgressView {
    let mut tasks: BTreeMap<String, bool> = recognized_tasks(level)
        .iter()
        .map(|t| (t.to_string(), false))
        .collect();
    for (name, raw) in stored {
        tasks.insert(name.clone(), TaskFlag::from_stored(Some(raw)).is_set());
    }
    let done = is_done(level, &tasks);
    ProgressView {
        player_id: player_id.to_string(),
        level,
        tasks,
        done,
        manifest,
    }
}

/// Create the player record if it does not exist yet.
pub async fn ensure_player(store: &dyn KvStore, player_id: &str) -> Result<(), StoreError> {
    let key = player_key(player_id);
    if !store.exists(&key).await? {
        let created_at = chrono::Utc::now().to_rfc3339();
        store
            .hset_multiple(&key, &[("createdAt", created_at.as_str())])
            .await?;
        tracing::info!(player_id, "created player");
    }
    Ok(())
}

pub async fn get_progress(
    store: &dyn KvStore,
    player_id: &str,
    level: i64,
) -> Result<ProgressView, StoreError> {
    let stored = store.hgetall(&progress_key(player_id, level)).await?;
    let manifest = if level == MANIFEST_LEVEL {
        store.hget(&manifest_key(player_id), MANIFEST_FIELD).await?
    } else {
        None
    };
    Ok(build_view(player_id, level, &stored, manifest))
}

/// Set one task flag and return the recomputed view. The task name is not
/// checked against the level's recognized set.
pub async fn update_task(
    store: &dyn KvStore,
    player_id: &str,
    level: i64,
    task: &str,
    completed: bool,
) -> Result<ProgressView, StoreError> {
    let key = progress_key(player_id, level);
    let flag = TaskFlag::from(completed);
    store.hset_multiple(&key, &[(task, flag.as_stored())]).await?;
    tracing::debug!(player_id, level, task, completed, "task updated");

    let stored = store.hgetall(&key).await?;
    Ok(build_view(player_id, level, &stored, None))
}

/// Persist a passing level 2 manifest along with `validYaml`. A failing
/// report leaves the record untouched, including any previously stored
/// manifest.
pub async fn record_validation(
    store: &dyn KvStore,
    player_id: &str,
    manifest_text: &str,
    report: &ValidationReport,
) -> Result<(), StoreError> {
    if !report.ok {
        return Ok(());
    }
    // Manifest first, so `validYaml` is never set without its manifest.
    store
        .hset_multiple(&manifest_key(player_id), &[(MANIFEST_FIELD, manifest_text)])
        .await?;
    store
        .hset_multiple(
            &progress_key(player_id, MANIFEST_LEVEL),
            &[(VALID_YAML_TASK, TaskFlag::Set.as_stored())],
        )
        .await?;
    tracing::info!(player_id, "level 2 manifest accepted");
    Ok(())
}
