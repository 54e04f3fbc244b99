//! Core domain types for the active workout session engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercises and the groups they form (single, superset, circuit)
//! - Completed series and historic series
//! - Working values for the next set
//! - Plateau findings and progression suggestions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of an exercise within a plan
pub type ExerciseId = String;

// ============================================================================
// Exercise Types
// ============================================================================

/// How an exercise is performed relative to its neighbours
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    #[default]
    Normal,
    Superset,
    Circuit,
}

impl SetType {
    /// Superset and circuit exercises can share a group
    pub fn is_linkable(self) -> bool {
        matches!(self, SetType::Superset | SetType::Circuit)
    }
}

/// An exercise of a workout plan, immutable for the lifetime of a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
    pub target_sets: u32,
    pub target_reps: u32,
    pub target_weight: f64,
    #[serde(default)]
    pub isometric: bool,
    pub recovery_seconds: u32,
    #[serde(default)]
    pub set_type: SetType,
    #[serde(default)]
    pub linked_to_previous: bool,
    pub order_index: u32,
}

/// A contiguous run of exercises sharing one effective set type
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseGroup {
    pub set_type: SetType,
    pub exercises: Vec<Exercise>,
}

impl ExerciseGroup {
    /// A group of exactly one exercise
    pub fn single(exercise: Exercise) -> Self {
        Self {
            set_type: SetType::Normal,
            exercises: vec![exercise],
        }
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn is_multi(&self) -> bool {
        self.exercises.len() > 1
    }

    pub fn contains(&self, exercise_id: &str) -> bool {
        self.exercises.iter().any(|e| e.id == exercise_id)
    }

    pub fn position(&self, exercise_id: &str) -> Option<usize> {
        self.exercises.iter().position(|e| e.id == exercise_id)
    }
}

// ============================================================================
// Series Types
// ============================================================================

/// One confirmed set of an exercise within the current session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletedSeries {
    pub id: Uuid,
    /// 1-based, unique per exercise
    pub series_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub recovery_seconds: u32,
    pub completed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A completed series tagged with the exercise it belongs to, as exchanged
/// with the session repository
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeriesRecord {
    pub exercise_id: ExerciseId,
    pub series: CompletedSeries,
}

/// A series performed in an earlier session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoricEntry {
    /// Workout instance the series belongs to, when known
    pub session_id: Option<String>,
    pub series_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub performed_at: DateTime<Utc>,
}

/// Historic series per exercise
pub type HistoricSeries = BTreeMap<ExerciseId, Vec<HistoricEntry>>;

/// Series recorded in the current session, per exercise
pub type CompletedSeriesMap = BTreeMap<ExerciseId, Vec<CompletedSeries>>;

/// Proposed weight/reps for the next set of an exercise
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkingValues {
    pub weight: f64,
    pub reps: u32,
}

impl WorkingValues {
    pub fn new(weight: f64, reps: u32) -> Self {
        Self { weight, reps }
    }

    /// Plan defaults of an exercise
    pub fn from_plan(exercise: &Exercise) -> Self {
        Self::new(exercise.target_weight, exercise.target_reps)
    }
}

impl fmt::Display for WorkingValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kg x {}", self.weight, self.reps)
    }
}

// ============================================================================
// Plateau Types
// ============================================================================

/// How long an exercise has been stuck
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PlateauSeverity {
    Mild,
    Moderate,
    Severe,
}

impl fmt::Display for PlateauSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlateauSeverity::Mild => "mild",
            PlateauSeverity::Moderate => "moderate",
            PlateauSeverity::Severe => "severe",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    IncreaseWeight,
    IncreaseReps,
}

/// A proposed way out of a plateau
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionSuggestion {
    pub kind: SuggestionKind,
    pub description: String,
    pub weight: f64,
    pub reps: u32,
    /// Display ordering only
    pub confidence: f64,
}

impl ProgressionSuggestion {
    pub fn working_values(&self) -> WorkingValues {
        WorkingValues::new(self.weight, self.reps)
    }
}

/// A detected plateau for one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlateauInfo {
    pub exercise_id: ExerciseId,
    pub exercise_name: String,
    pub severity: PlateauSeverity,
    pub stagnant_sessions: usize,
    pub current: WorkingValues,
    /// Ranked, highest confidence first
    pub suggestions: Vec<ProgressionSuggestion>,
}
