//! Core domain types for the Externat tutoring system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Knowledge-base entities (diseases, medications, clinical cases)
//! - Simulation sessions and their typed context
//! - Policy decisions and final-answer evaluation
//! - The knowledge base container

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lowest declared case difficulty; also the value a null difficulty
/// counts as in distance comparisons.
pub const DIFFICULTY_MIN: i32 = 1;

/// Highest declared case difficulty and mastery-level cap.
pub const DIFFICULTY_MAX: i32 = 30;

// ============================================================================
// Knowledge-base Entities
// ============================================================================

/// A disease; the unit that carries category membership.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Disease {
    pub id: String,
    pub name: String,
    /// Grouping label (e.g. "Infectiologie") inherited by every clinical
    /// case whose primary disease this is.
    pub category: String,
}

/// A medication, referenced by final submissions and case rubrics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub name: String,
}

/// A clinical scenario built around one primary disease.
///
/// The case has no category of its own; it belongs to whatever category its
/// primary disease belongs to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClinicalCase {
    pub id: String,
    pub title: String,
    pub disease_id: String,
    /// Declared difficulty on the 1..=30 scale; may be absent.
    pub difficulty: Option<i32>,
    /// Vignette shown to the learner at session start.
    pub presentation: String,
    /// Medication ids the reference treatment expects.
    #[serde(default)]
    pub recommended_medications: Vec<String>,
}

impl ClinicalCase {
    /// Difficulty used for distance comparisons; a null difficulty counts
    /// as [`DIFFICULTY_MIN`]. The stored value is left untouched.
    pub fn effective_difficulty(&self) -> i32 {
        self.difficulty.unwrap_or(DIFFICULTY_MIN)
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Kind of simulation session the policy can decide.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Placement session; its score is read directly as the mastery level.
    Test,
    /// Low-stakes practice attempt.
    Formative,
    /// Graded checkpoint after three formative attempts. "summative" is an
    /// accepted synonym on the wire.
    #[serde(alias = "summative")]
    Sommative,
}

impl SessionType {
    /// Parse from a user-facing string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "test" => Some(SessionType::Test),
            "formative" => Some(SessionType::Formative),
            "sommative" | "summative" => Some(SessionType::Sommative),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionType::Test => write!(f, "test"),
            SessionType::Formative => write!(f, "formative"),
            SessionType::Sommative => write!(f, "sommative"),
        }
    }
}

/// Lifecycle status of a simulation session.
///
/// `Abandoned` is kept for forward compatibility; no code path produces it
/// today.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    /// Parse from a user-facing string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Who spoke a dialogue turn.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Learner,
    Tutor,
}

/// One exchange in a session's dialogue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: TurnRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Working memory of a session, written once at creation.
///
/// Persisted as JSON only at the storage boundary; in memory it stays
/// strongly typed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_type: SessionType,
    /// Formative sessions completed since the last test or sommative.
    #[serde(default)]
    pub formative_count_since_eval: u32,
    /// Append-only transcript.
    #[serde(default)]
    pub dialogue: Vec<DialogueTurn>,
    /// Case ids of the formative attempts feeding the next sommative.
    #[serde(default)]
    pub formative_pool: Vec<String>,
}

/// A recorded simulation session (one learner attempt at one case).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationSession {
    pub id: Uuid,
    pub learner_id: String,
    pub case_id: String,
    pub status: SessionStatus,
    /// Set only when the status transitions to `Completed`.
    pub score: Option<f64>,
    pub context: SessionContext,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SimulationSession {
    pub fn session_type(&self) -> &SessionType {
        &self.context.session_type
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

// ============================================================================
// Policy Output
// ============================================================================

/// What the progression policy decided for the next session.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// Mastery level in [1, 30]; the difficulty target for case selection.
    pub level: i32,
    pub next_session_type: SessionType,
    /// Case ids of the formative attempts since the last evaluation,
    /// newest last, at most three.
    pub formative_pool: Vec<String>,
}

// ============================================================================
// Final Submission and Evaluation
// ============================================================================

/// The learner's final answer for a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalSubmission {
    pub diagnosis_id: String,
    #[serde(default)]
    pub medication_ids: Vec<String>,
    /// Justification turns accumulated while the learner worked the case.
    #[serde(default)]
    pub justification: Vec<DialogueTurn>,
}

/// Graded outcome of a final submission, on the 0..=20 scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evaluation {
    pub score_diagnostic: f64,
    pub score_therapeutic: f64,
    pub score_process: f64,
    pub score_total: f64,
    pub feedback: String,
    pub recommendation: String,
}

// ============================================================================
// Knowledge Base Container
// ============================================================================

/// The complete reference knowledge: diseases, medications and cases.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub diseases: HashMap<String, Disease>,
    pub medications: HashMap<String, Medication>,
    pub cases: HashMap<String, ClinicalCase>,
}
