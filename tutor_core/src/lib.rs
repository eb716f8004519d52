#![forbid(unsafe_code)]

//! Core domain model and business logic for the Externat tutoring system.
//!
//! This crate provides:
//! - Domain types (diseases, cases, sessions, evaluations)
//! - Knowledge base management
//! - Adaptive session orchestration and progression policy
//! - Persistence (JSONL journal, CSV archive)
//! - Scoring seam with a bundled rubric grader

pub mod types;
pub mod error;
pub mod knowledge;
pub mod config;
pub mod logging;
pub mod store;
pub mod archive;
pub mod history;
pub mod policy;
pub mod scoring;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use knowledge::{build_builtin_knowledge_base, builtin_knowledge_base};
pub use config::Config;
pub use store::{JsonlSessionStore, SessionStore};
pub use history::session_history;
pub use policy::next_placement;
pub use scoring::{RubricOracle, ScoringOracle};
pub use engine::{start_session, submit_final_answer, StartedSession};
