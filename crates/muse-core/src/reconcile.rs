// Patch Reconciler
// Applies a proposed original/new content pair against live document
// content by exact substring match. Deliberately conservative: a miss is a
// miss, never a guess.

/// Outcome of reconciling a proposal against live content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The patched document content
    Applied(String),
    /// `original` was non-empty and not present in the live content;
    /// nothing was mutated and the proposal needs manual review
    NotFound,
}

/// Reconcile `original -> new_content` against `current`.
///
/// Non-empty `original` found in `current` replaces the first occurrence.
/// Empty `original` means a full overwrite with `new_content`.
pub fn reconcile(current: &str, original: &str, new_content: &str) -> ReconcileOutcome {
    if original.is_empty() {
        return ReconcileOutcome::Applied(new_content.to_string());
    }

    if current.contains(original) {
        ReconcileOutcome::Applied(current.replacen(original, new_content, 1))
    } else {
        ReconcileOutcome::NotFound
    }
}
