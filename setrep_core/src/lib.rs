#![forbid(unsafe_code)]

//! Core domain model and business logic for the Setrep workout tracker.
//!
//! This crate provides:
//! - Domain types (exercises, groups, completed series, plateaus)
//! - Exercise grouping and working-value preload
//! - Plateau detection and progression suggestions
//! - Recovery timer and audio cues
//! - The active workout session state machine
//! - Session repositories (in-memory and file-backed)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod grouping;
pub mod history;
pub mod preload;
pub mod plateau;
pub mod cues;
pub mod timer;
pub mod repository;
pub mod store;
pub mod plans;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, PlateauPolicy};
pub use grouping::group_exercises;
pub use plateau::detect_plateaus;
pub use cues::{CueKind, CuePlayer, SharedCuePlayer, TracingCuePlayer};
pub use timer::{RecoveryTimer, TimerState};
pub use repository::{MemoryRepository, RepositoryError, SessionRepository};
pub use store::FileRepository;
pub use plans::{demo_plan, validate_plan, DEMO_PLAN_ID};
pub use session::{SessionSnapshot, SeriesOutcome, WorkoutSession, WorkoutSummary};
