// Trace Reducer
// Cursor-based reduction of the append-only trace into user-visible
// messages, exactly once per step.

use muse_types::{AgentAction, StageRole, TraceStep};

/// Kind of message a step reduced to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Internal stage reasoning, labeled with the role
    StageThought,
    /// Planner chat with a user-facing message
    Plan,
}

/// A message derived from one new trace step
#[derive(Debug, Clone)]
pub struct ReducedMessage {
    pub role: StageRole,
    pub kind: MessageKind,
    pub label: String,
    pub content: String,
}

/// Reduce the unseen suffix `trace[cursor..]` into messages.
///
/// Returns the messages in step order and the advanced cursor. Re-delivery
/// of an already-seen prefix yields no messages: the cursor never moves
/// backwards, and a shorter-than-cursor trace (which the pipeline contract
/// rules out) reduces to nothing.
pub fn reduce_new_steps(trace: &[TraceStep], cursor: usize) -> (Vec<ReducedMessage>, usize) {
    if cursor >= trace.len() {
        return (Vec::new(), cursor);
    }

    let mut messages = Vec::new();
    for step in &trace[cursor..] {
        if let Some(thought) = step.action.thought() {
            if !thought.is_empty() {
                messages.push(ReducedMessage {
                    role: step.role,
                    kind: MessageKind::StageThought,
                    label: step.role.label().to_string(),
                    content: thought.to_string(),
                });
            }
        }

        if step.role == StageRole::Planner {
            if let AgentAction::Chat {
                message: Some(message),
                ..
            } = &step.action
            {
                if !message.is_empty() {
                    messages.push(ReducedMessage {
                        role: step.role,
                        kind: MessageKind::Plan,
                        label: step.role.label().to_string(),
                        content: message.clone(),
                    });
                }
            }
        }
    }

    (messages, trace.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_step(role: StageRole, thought: Option<&str>, message: Option<&str>) -> TraceStep {
        TraceStep {
            role,
            action: AgentAction::Chat {
                thought: thought.map(String::from),
                message: message.map(String::from),
            },
            notes: String::new(),
            loop_index: None,
        }
    }

    #[test]
    fn reduces_only_the_new_suffix() {
        let trace = vec![
            chat_step(StageRole::Planner, Some("outline first"), Some("plan: 3 acts")),
            chat_step(StageRole::Writer, Some("drafting act one"), None),
        ];

        let (messages, cursor) = reduce_new_steps(&trace, 0);
        // planner thought + planner plan + writer thought
        assert_eq!(messages.len(), 3);
        assert_eq!(cursor, 2);
        assert_eq!(messages[0].kind, MessageKind::StageThought);
        assert_eq!(messages[0].label, "Planner");
        assert_eq!(messages[1].kind, MessageKind::Plan);
        assert_eq!(messages[1].content, "plan: 3 acts");
        assert_eq!(messages[2].label, "Writer");
    }

    #[test]
    fn redelivery_of_same_trace_emits_nothing() {
        let trace = vec![
            chat_step(StageRole::Planner, Some("outline first"), Some("plan")),
            chat_step(StageRole::Writer, Some("drafting"), None),
        ];

        let (_, cursor) = reduce_new_steps(&trace, 0);
        let (again, cursor_again) = reduce_new_steps(&trace, cursor);
        assert!(again.is_empty());
        assert_eq!(cursor_again, cursor);
    }

    #[test]
    fn grown_trace_emits_only_appended_steps() {
        let mut trace = vec![chat_step(StageRole::Planner, Some("outline"), None)];
        let (_, cursor) = reduce_new_steps(&trace, 0);

        trace.push(chat_step(StageRole::Editor, Some("tightening prose"), None));
        let (messages, cursor) = reduce_new_steps(&trace, cursor);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].label, "Editor");
        assert_eq!(cursor, 2);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let trace = vec![chat_step(StageRole::Writer, Some("draft"), None)];
        let (messages, cursor) = reduce_new_steps(&trace, 5);
        assert!(messages.is_empty());
        assert_eq!(cursor, 5);
    }

    #[test]
    fn non_planner_chat_message_is_not_a_plan() {
        let trace = vec![chat_step(StageRole::Writer, None, Some("done with act one"))];
        let (messages, _) = reduce_new_steps(&trace, 0);
        assert!(messages.is_empty());
    }

    #[test]
    fn empty_thought_is_skipped() {
        let trace = vec![chat_step(StageRole::Reviewer, Some(""), None)];
        let (messages, _) = reduce_new_steps(&trace, 0);
        assert!(messages.is_empty());
    }
}
