// Progress Estimator
// Derives coarse per-stage status, the loop counter, and a completion
// percentage from the observed trace. Pure: display state only.

use muse_types::{StageRole, StageSnapshot, StageStatus, TraceStep};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static LOOP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"loop:(\d+)").unwrap());

/// Heuristic for the stage currently running, given the most recent step's
/// role. The observed pipeline alternates between the two drafting
/// participants; Planner and Reviewer both hand off to the Writer. This is
/// an approximation for display and never feeds control flow.
pub fn current_stage(last_role: StageRole) -> StageRole {
    match last_role {
        StageRole::Planner => StageRole::Writer,
        StageRole::Writer => StageRole::Editor,
        StageRole::Editor => StageRole::Writer,
        StageRole::Reviewer => StageRole::Writer,
    }
}

/// Per-stage display status over the fixed, ordered stage set.
///
/// A stage with any observed step is `Completed`; `roles_seen` is
/// cumulative, so completion is monotonic across polls. While the session
/// runs, the heuristic current stage shows `Running` unless it already
/// completed; everything else is `Waiting`.
pub fn stage_statuses(
    roles_seen: &HashSet<StageRole>,
    last_role: Option<StageRole>,
    running: bool,
) -> Vec<StageSnapshot> {
    let current = if running {
        last_role.map(current_stage)
    } else {
        None
    };

    StageRole::ALL
        .iter()
        .map(|&role| {
            let status = if roles_seen.contains(&role) {
                StageStatus::Completed
            } else if current == Some(role) {
                StageStatus::Running
            } else {
                StageStatus::Waiting
            };
            StageSnapshot { role, status }
        })
        .collect()
}

/// Loop counter for loop-bound display.
///
/// The structured `loop_index` field is authoritative; the `loop:<n>` tag
/// embedded in free-text notes is read as a wire-compatibility shim for
/// pipelines that predate the field. The count is the maximum seen,
/// defaulting to 0.
pub fn loop_count(trace: &[TraceStep]) -> u32 {
    trace
        .iter()
        .map(|step| {
            let structured = step.loop_index.unwrap_or(0);
            let tagged = LOOP_TAG
                .captures_iter(&step.notes)
                .filter_map(|c| c[1].parse::<u32>().ok())
                .max()
                .unwrap_or(0);
            structured.max(tagged)
        })
        .max()
        .unwrap_or(0)
}

/// Completion percentage for the task planner, rounded to nearest integer
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}
