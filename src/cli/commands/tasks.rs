//! Tasks command: inspect the task store from the CLI.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::GranskaError;
use crate::task::{TaskFilter, TaskStore};

/// List task records, optionally sweeping stale Processing rows first.
#[allow(clippy::too_many_arguments)]
pub fn run_tasks(
    owner: &str,
    kind: Option<&str>,
    status: Option<&str>,
    limit: usize,
    offset: usize,
    sweep_stale_hours: Option<i64>,
    settings: &Settings,
) -> anyhow::Result<()> {
    let store = TaskStore::new(&settings.sqlite_path())?;

    if let Some(hours) = sweep_stale_hours {
        let swept = store.sweep_stale(chrono::Duration::hours(hours))?;
        if swept > 0 {
            Output::warning(&format!("Failed out {} stale processing task(s)", swept));
        }
    }

    let filter = TaskFilter {
        kind: kind
            .map(str::parse)
            .transpose()
            .map_err(GranskaError::InvalidInput)?,
        status: status
            .map(str::parse)
            .transpose()
            .map_err(GranskaError::InvalidInput)?,
    };

    let (tasks, total) = store.list(owner, &filter, limit, offset)?;

    Output::header(&format!("Tasks for {} ({} total)", owner, total));
    if tasks.is_empty() {
        Output::info("No tasks found.");
        return Ok(());
    }

    for task in &tasks {
        Output::task_row(
            &task.id.to_string(),
            &task.kind.to_string(),
            &task.status.to_string(),
            &task.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            &task.input,
        );
    }

    Ok(())
}
