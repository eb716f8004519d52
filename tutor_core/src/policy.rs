//! Progression policy for adaptive session placement.
//!
//! This module implements the placement rules as a pure fold over a
//! learner's completed sessions in one category, oldest first:
//! - Test: recalibrates the level from the score, clears the pool
//! - Sommative: promotes on a pass, demotes one level on a fail, clears
//!   the pool
//! - Formative: feeds the pool of attempts awaiting the next sommative
//!
//! Nothing here touches storage or randomness; callers load history and
//! hand it in.

use crate::types::{Placement, SessionType, SimulationSession, DIFFICULTY_MAX, DIFFICULTY_MIN};

/// Level assumed for a learner with no history in the category
pub const COLD_START_LEVEL: i32 = 10;

/// Formative attempts retained for (and required to trigger) a sommative
pub const FORMATIVE_POOL_CAP: usize = 3;

/// Sommative score at or above which the learner is promoted
pub const SOMMATIVE_PASS_SCORE: f64 = 12.0;

/// Levels gained on a passed sommative
pub const SOMMATIVE_PROMOTION: i32 = 3;

/// Placement for a learner who has never worked in the category
pub fn cold_start_placement() -> Placement {
    Placement {
        level: COLD_START_LEVEL,
        next_session_type: SessionType::Test,
        formative_pool: Vec::new(),
    }
}

/// Compute the next placement from completed history, oldest first
///
/// Placement rules:
/// 1. Empty history is a cold start: level 10, a test session, empty pool.
///    The cold start is an override; the fold itself starts at level 1
/// 2. A test sets the level to floor(score), at least 1, and clears the pool
/// 3. A sommative at or above 12 adds 3 levels; below 12 it subtracts one
///    (never below 1); either way the pool is cleared
/// 4. A formative pushes its case id into the pool; only the last 3 are kept
/// 5. The final level is clamped to [1, 30]
/// 6. A full pool calls for a sommative next; otherwise a formative
///
/// A completed session with no recorded score counts as 0.
pub fn next_placement(history: &[SimulationSession]) -> Placement {
    if history.is_empty() {
        tracing::debug!("Empty history, cold-start placement");
        return cold_start_placement();
    }

    let mut level = DIFFICULTY_MIN;
    let mut pool: Vec<String> = Vec::new();

    for session in history {
        match session.context.session_type {
            SessionType::Test => {
                let score = session.score.unwrap_or(0.0);
                level = (score.floor() as i32).max(DIFFICULTY_MIN);
                pool.clear();
                tracing::debug!("Test scored {:.1}: level recalibrated to {}", score, level);
            }
            SessionType::Sommative => {
                let score = session.score.unwrap_or(0.0);
                if score >= SOMMATIVE_PASS_SCORE {
                    level += SOMMATIVE_PROMOTION;
                    tracing::debug!("Sommative passed at {:.1}: level up to {}", score, level);
                } else {
                    level = (level - 1).max(DIFFICULTY_MIN);
                    tracing::debug!("Sommative failed at {:.1}: level down to {}", score, level);
                }
                pool.clear();
            }
            SessionType::Formative => {
                pool.push(session.case_id.clone());
                if pool.len() > FORMATIVE_POOL_CAP {
                    pool.remove(0);
                }
            }
        }
    }

    level = level.clamp(DIFFICULTY_MIN, DIFFICULTY_MAX);

    let next_session_type = if pool.len() >= FORMATIVE_POOL_CAP {
        SessionType::Sommative
    } else {
        SessionType::Formative
    };

    tracing::info!(
        "Placement after {} sessions: level {}, next {} ({} pooled)",
        history.len(),
        level,
        next_session_type,
        pool.len()
    );

    Placement {
        level,
        next_session_type,
        formative_pool: pool,
    }
}
