//! Exercise grouping and superset/circuit navigation.
//!
//! This is the one place group boundaries are computed. Every presentation
//! layer asks this module which exercises form a group, which member comes
//! next, and how far the workout has progressed.

use crate::{CompletedSeriesMap, Exercise, ExerciseGroup, SetType};

/// Partition an ordered exercise list into contiguous groups
///
/// An exercise joins the previous exercise's group only when it is linked to
/// it, has the same set type, and that type is superset or circuit. Every
/// other exercise opens a new group; groups of one are always normal.
pub fn group_exercises(exercises: &[Exercise]) -> Vec<ExerciseGroup> {
    let mut groups: Vec<ExerciseGroup> = Vec::new();
    let mut previous: Option<&Exercise> = None;

    for exercise in exercises {
        let joins_previous = previous.is_some_and(|prev| {
            exercise.linked_to_previous
                && exercise.set_type == prev.set_type
                && exercise.set_type.is_linkable()
        });

        match groups.last_mut() {
            Some(group) if joins_previous => {
                group.set_type = exercise.set_type;
                group.exercises.push(exercise.clone());
            }
            _ => groups.push(ExerciseGroup::single(exercise.clone())),
        }

        previous = Some(exercise);
    }

    tracing::debug!(
        "Grouped {} exercises into {} groups",
        exercises.len(),
        groups.len()
    );
    groups
}

/// Flatten groups back into the ordered exercise list
pub fn flatten(groups: &[ExerciseGroup]) -> Vec<Exercise> {
    groups
        .iter()
        .flat_map(|g| g.exercises.iter().cloned())
        .collect()
}

/// Index of the group containing an exercise
pub fn group_index_of(groups: &[ExerciseGroup], exercise_id: &str) -> Option<usize> {
    groups.iter().position(|g| g.contains(exercise_id))
}

/// Number of series recorded for an exercise
pub fn completed_count(completed: &CompletedSeriesMap, exercise_id: &str) -> u32 {
    completed
        .get(exercise_id)
        .map_or(0, |series| series.len() as u32)
}

/// Whether an exercise has reached its target set count
pub fn is_exercise_complete(exercise: &Exercise, completed: &CompletedSeriesMap) -> bool {
    completed_count(completed, &exercise.id) >= exercise.target_sets
}

/// Whether every member of a group has reached its target set count
pub fn is_group_complete(group: &ExerciseGroup, completed: &CompletedSeriesMap) -> bool {
    group
        .exercises
        .iter()
        .all(|e| is_exercise_complete(e, completed))
}

/// Whether every group is complete
pub fn is_workout_complete(groups: &[ExerciseGroup], completed: &CompletedSeriesMap) -> bool {
    groups.iter().all(|g| is_group_complete(g, completed))
}

/// The member to show after a set of `current` was confirmed
///
/// Walks the group cyclically starting after `current` and returns the first
/// member that still has series left. Returns `None` when `current` was the
/// last incomplete member, meaning the round of the group is over.
pub fn next_incomplete_member<'a>(
    group: &'a ExerciseGroup,
    current: &str,
    completed: &CompletedSeriesMap,
) -> Option<&'a Exercise> {
    let start = group.position(current)?;
    let len = group.len();

    (1..len)
        .map(|offset| &group.exercises[(start + offset) % len])
        .find(|e| !is_exercise_complete(e, completed))
}

/// First member of a group that still has series left
pub fn first_incomplete_member<'a>(
    group: &'a ExerciseGroup,
    completed: &CompletedSeriesMap,
) -> Option<&'a Exercise> {
    group
        .exercises
        .iter()
        .find(|e| !is_exercise_complete(e, completed))
}

/// Index of the first incomplete group after `from`
pub fn next_incomplete_group(
    groups: &[ExerciseGroup],
    from: usize,
    completed: &CompletedSeriesMap,
) -> Option<usize> {
    groups
        .iter()
        .enumerate()
        .skip(from + 1)
        .find(|(_, g)| !is_group_complete(g, completed))
        .map(|(idx, _)| idx)
}

/// Fraction of target series completed across the whole workout, in [0, 1]
///
/// Series beyond an exercise's target never count, so the value reaches 1
/// exactly when every member of every group is complete.
pub fn workout_progress(groups: &[ExerciseGroup], completed: &CompletedSeriesMap) -> f64 {
    let (done, target) = groups
        .iter()
        .flat_map(|g| g.exercises.iter())
        .fold((0u64, 0u64), |(done, target), e| {
            let count = completed_count(completed, &e.id).min(e.target_sets);
            (done + u64::from(count), target + u64::from(e.target_sets))
        });

    if target == 0 {
        return if groups.is_empty() { 0.0 } else { 1.0 };
    }
    done as f64 / target as f64
}

/// Effective set type label for display
pub fn group_label(group: &ExerciseGroup) -> &'static str {
    match group.set_type {
        SetType::Normal => "single",
        SetType::Superset => "superset",
        SetType::Circuit => "circuit",
    }
}
