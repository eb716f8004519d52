//! Per-learner, per-category session history.
//!
//! The progression policy folds over history oldest-first; feeding it a
//! descending list silently computes placements from the wrong end of the
//! timeline, so the ascending sort here is load-bearing. Sessions whose
//! case id no longer resolves in the knowledge base are skipped with a
//! warning rather than failing the whole read.

use std::collections::HashSet;

use crate::store::SessionStore;
use crate::types::{KnowledgeBase, SessionStatus, SimulationSession};
use crate::Result;

/// Completed sessions for one learner in one category, oldest first
pub fn session_history(
    store: &impl SessionStore,
    kb: &KnowledgeBase,
    learner_id: &str,
    category: &str,
) -> Result<Vec<SimulationSession>> {
    let sessions =
        filtered_sessions(store, kb, learner_id, category, Some(SessionStatus::Completed))?;
    tracing::debug!(
        "Loaded {} completed sessions for learner {} in {}",
        sessions.len(),
        learner_id,
        category
    );
    Ok(sessions)
}

/// In-progress sessions for one learner in one category, oldest first
pub fn open_sessions(
    store: &impl SessionStore,
    kb: &KnowledgeBase,
    learner_id: &str,
    category: &str,
) -> Result<Vec<SimulationSession>> {
    filtered_sessions(store, kb, learner_id, category, Some(SessionStatus::InProgress))
}

/// Case ids of every session the learner has in one category, any status
///
/// Abandoned and in-progress attempts count as seen for case selection,
/// not only completed ones.
pub fn seen_case_ids(
    store: &impl SessionStore,
    kb: &KnowledgeBase,
    learner_id: &str,
    category: &str,
) -> Result<HashSet<String>> {
    let sessions = filtered_sessions(store, kb, learner_id, category, None)?;
    Ok(sessions.into_iter().map(|s| s.case_id).collect())
}

fn filtered_sessions(
    store: &impl SessionStore,
    kb: &KnowledgeBase,
    learner_id: &str,
    category: &str,
    status: Option<SessionStatus>,
) -> Result<Vec<SimulationSession>> {
    let mut sessions: Vec<SimulationSession> = store
        .all()?
        .into_iter()
        .filter(|s| s.learner_id == learner_id)
        .filter(|s| match &status {
            Some(expected) => s.status == *expected,
            None => true,
        })
        .filter(|s| match kb.case(&s.case_id) {
            Some(case) => kb.case_category(case) == Some(category),
            None => {
                tracing::warn!(
                    "Session {} references unknown case '{}', skipping",
                    s.id,
                    s.case_id
                );
                false
            }
        })
        .collect();

    // Oldest first; id as tie-break keeps equal timestamps deterministic.
    sessions.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(sessions)
}
