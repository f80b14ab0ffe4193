// Coordinator Configuration

use serde::{Deserialize, Serialize};

/// Policy for a submit arriving while another session is still running.
///
/// The coordinator never silently orphans a running session: either the new
/// submission is rejected, or the prior poller is cancelled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    /// Reject the new submission with `MuseError::SessionBusy`
    Reject,
    /// Cancel the running session's poller, then submit
    Replace,
}

/// Configuration for the session and task-planner coordinators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Poll cadence for the agent session, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Poll cadence for the task planner, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub planner_poll_interval_ms: u64,
    /// Apply reconciled patches without operator approval
    #[serde(default)]
    pub auto_accept: bool,
    #[serde(default = "default_submit_policy")]
    pub submit_policy: SubmitPolicy,
    /// Loop bound shown when the pipeline does not report one
    #[serde(default = "default_max_loops")]
    pub max_loops_default: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_submit_policy() -> SubmitPolicy {
    SubmitPolicy::Reject
}

fn default_max_loops() -> u32 {
    3
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            planner_poll_interval_ms: default_poll_interval_ms(),
            auto_accept: false,
            submit_policy: default_submit_policy(),
            max_loops_default: default_max_loops(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.planner_poll_interval_ms, 1000);
        assert!(!config.auto_accept);
        assert_eq!(config.submit_policy, SubmitPolicy::Reject);
    }
}
