// Task-Planner Types

use serde::{Deserialize, Serialize};

/// Status of a single to-do item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

/// One unit of work in the task-planner workflow.
///
/// Items are mutated in place by id; the coordinator never deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    /// IDs of items that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Acceptance criteria
    #[serde(default)]
    pub accepts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_minutes: Option<u32>,
}

/// Partial update applied to exactly one item by id. Absent fields are left
/// untouched, which makes retries idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TodoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TodoPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_minutes: Option<u32>,
}

impl TodoItem {
    /// Apply a partial update in place
    pub fn apply_patch(&mut self, patch: &TodoItemPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(estimate) = patch.estimate_minutes {
            self.estimate_minutes = Some(estimate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> TodoItem {
        TodoItem {
            id: "t1".to_string(),
            title: "Draft chapter outline".to_string(),
            status: TodoStatus::Pending,
            priority: TodoPriority::Medium,
            depends_on: Vec::new(),
            accepts: Vec::new(),
            estimate_minutes: None,
        }
    }

    #[test]
    fn patch_is_idempotent() {
        let mut a = item();
        let patch = TodoItemPatch {
            status: Some(TodoStatus::Completed),
            estimate_minutes: Some(30),
            ..TodoItemPatch::default()
        };

        a.apply_patch(&patch);
        let after_first = a.clone();
        a.apply_patch(&patch);

        assert_eq!(a.status, after_first.status);
        assert_eq!(a.title, after_first.title);
        assert_eq!(a.estimate_minutes, after_first.estimate_minutes);
    }

    #[test]
    fn absent_fields_left_untouched() {
        let mut a = item();
        a.apply_patch(&TodoItemPatch::default());
        assert_eq!(a.title, "Draft chapter outline");
        assert_eq!(a.status, TodoStatus::Pending);
    }
}
