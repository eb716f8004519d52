//! Session orchestration: the read-decide-write cycle.
//!
//! This module implements the progression loop:
//! - Force-complete stale in-progress sessions, then re-read history
//! - Fold completed history into a placement (level, next type, pool)
//! - Select a case for the placement and persist the new session
//! - Grade final submissions through the scoring oracle
//!
//! Randomness and the clock are injected so every decision is a
//! deterministic function of history, knowledge base and seed.

use crate::history;
use crate::policy;
use crate::scoring::ScoringOracle;
use crate::store::SessionStore;
use crate::types::{
    ClinicalCase, Disease, Evaluation, FinalSubmission, KnowledgeBase, Placement, SessionContext,
    SessionStatus, SessionType, SimulationSession,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

/// Score stamped on a stale in-progress session when it is force-completed.
///
/// A passing-but-not-stellar grade: the learner engaged with the case but
/// never submitted. Overwrites nothing that was actually graded.
pub const STALE_SESSION_PASS_SCORE: f64 = 15.0;

/// Upper bound on any recorded session score
pub const SCORE_CEILING: f64 = 20.0;

/// A freshly started session with its resolved references
#[derive(Clone, Debug)]
pub struct StartedSession {
    pub session: SimulationSession,
    pub case: ClinicalCase,
    pub disease: Disease,
}

impl StartedSession {
    pub fn session_type(&self) -> &SessionType {
        &self.session.context.session_type
    }
}

/// Start the next session for a learner in a category
///
/// ## Orchestration steps
///
/// 1. **Stale cleanup**: any in-progress session of this learner in this
///    category is force-completed at 15.0 so it feeds the fold
/// 2. **History read**: completed sessions, oldest first
/// 3. **Placement**: the progression fold (cold start on empty history)
/// 4. **Case selection**: pooled case for a sommative, otherwise an
///    unattempted case near the level; seen covers every recorded attempt
///    whatever its status, and an exhausted category recycles at random
/// 5. **Persistence**: the new session is journaled as in-progress with a
///    context snapshot of the decision
///
/// Two concurrent starts for the same learner can read the same history
/// and both persist a session; the journal stays line-consistent but the
/// later placement is then computed from a stale read.
pub fn start_session(
    kb: &KnowledgeBase,
    store: &impl SessionStore,
    rng: &mut impl Rng,
    learner_id: &str,
    category: &str,
    now: DateTime<Utc>,
) -> Result<StartedSession> {
    let stale = history::open_sessions(store, kb, learner_id, category)?;
    for mut session in stale {
        tracing::warn!(
            "Force-completing stale session {} on case {} at {:.1}",
            session.id,
            session.case_id,
            STALE_SESSION_PASS_SCORE
        );
        session.status = SessionStatus::Completed;
        session.score = Some(STALE_SESSION_PASS_SCORE);
        session.ended_at = Some(now);
        store.update(&session)?;
    }

    // Re-read after cleanup so forced completions count toward placement.
    let past = history::session_history(store, kb, learner_id, category)?;
    let placement = policy::next_placement(&past);

    let seen = history::seen_case_ids(store, kb, learner_id, category)?;
    let (case, session_type) = select_case(kb, rng, category, &placement, &seen)?;

    let disease = kb
        .disease(&case.disease_id)
        .ok_or_else(|| Error::NotFound(format!("Disease '{}' not found", case.disease_id)))?;

    let session = SimulationSession {
        id: Uuid::new_v4(),
        learner_id: learner_id.to_string(),
        case_id: case.id.clone(),
        status: SessionStatus::InProgress,
        score: None,
        context: SessionContext {
            session_type: session_type.clone(),
            formative_count_since_eval: placement.formative_pool.len() as u32,
            dialogue: Vec::new(),
            formative_pool: placement.formative_pool.clone(),
        },
        started_at: now,
        ended_at: None,
    };
    store.create(&session)?;

    tracing::info!(
        "Started {} session {} for {} on case {} (level {})",
        session_type,
        session.id,
        learner_id,
        case.id,
        placement.level
    );

    Ok(StartedSession {
        session,
        case: case.clone(),
        disease: disease.clone(),
    })
}

/// Pick the case for a placement
///
/// A sommative revisits one pooled formative case, chosen uniformly at
/// random. If the pool is unusable (empty, or the picked id no longer
/// resolves) the session downgrades to a formative. Formative and test
/// sessions take an unseen case near the level; when every case in the
/// category has been seen, one is recycled uniformly at random.
fn select_case<'a>(
    kb: &'a KnowledgeBase,
    rng: &mut impl Rng,
    category: &str,
    placement: &Placement,
    seen: &HashSet<String>,
) -> Result<(&'a ClinicalCase, SessionType)> {
    if placement.next_session_type == SessionType::Sommative {
        match placement.formative_pool.choose(rng) {
            Some(case_id) => {
                if let Some(case) = kb.case(case_id) {
                    tracing::info!("Sommative revisits pooled case {}", case.id);
                    return Ok((case, SessionType::Sommative));
                }
                tracing::warn!(
                    "Pooled case '{}' no longer in knowledge base, downgrading to formative",
                    case_id
                );
            }
            None => {
                tracing::warn!("Sommative called for with an empty pool, downgrading to formative");
            }
        }
    }

    let session_type = if placement.next_session_type == SessionType::Test {
        SessionType::Test
    } else {
        SessionType::Formative
    };

    if let Some(case) = kb.find_candidate(category, placement.level, seen, rng) {
        return Ok((case, session_type));
    }

    // Every case in the category has been attempted; repetition beats
    // refusing to serve anything.
    let all_cases = kb.cases_in_category(category);
    match all_cases.choose(rng).copied() {
        Some(case) => {
            tracing::info!(
                "All cases in {} already seen by this learner, recycling {}",
                category,
                case.id
            );
            Ok((case, session_type))
        }
        None => Err(Error::NotFound(format!(
            "No cases available in category '{}'",
            category
        ))),
    }
}

/// Grade a final submission and complete its session
///
/// The oracle's verdict is recorded as-is apart from an upper clamp;
/// custom oracles may grade past the 20-point scale. The submitted
/// justification turns are appended to the session dialogue before the
/// completed record is journaled. Oracle failure aborts the operation and
/// leaves the session in progress.
pub fn submit_final_answer(
    kb: &KnowledgeBase,
    store: &impl SessionStore,
    oracle: &impl ScoringOracle,
    session_id: Uuid,
    submission: &FinalSubmission,
    now: DateTime<Utc>,
) -> Result<Evaluation> {
    let mut session = store
        .get(session_id)?
        .ok_or_else(|| Error::NotFound(format!("Session '{}' not found", session_id)))?;

    let case = kb
        .case(&session.case_id)
        .ok_or_else(|| Error::NotFound(format!("Case '{}' not found", session.case_id)))?;
    let disease = kb
        .disease(&case.disease_id)
        .ok_or_else(|| Error::NotFound(format!("Disease '{}' not found", case.disease_id)))?;

    let mut evaluation = oracle.evaluate(case, disease, submission)?;
    evaluation.score_total = evaluation.score_total.min(SCORE_CEILING);

    session
        .context
        .dialogue
        .extend(submission.justification.iter().cloned());
    session.status = SessionStatus::Completed;
    session.score = Some(evaluation.score_total);
    session.ended_at = Some(now);
    store.update(&session)?;

    tracing::info!(
        "Session {} completed with score {:.1}/20",
        session_id,
        evaluation.score_total
    );

    Ok(evaluation)
}
