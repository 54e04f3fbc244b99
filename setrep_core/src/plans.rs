//! Built-in demo plan and plan validation.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Id under which the built-in plan is available
pub const DEMO_PLAN_ID: &str = "demo";

/// Cached demo plan - built once and reused across all operations
static DEMO_PLAN: Lazy<Vec<Exercise>> = Lazy::new(build_demo_plan);

/// Get a reference to the cached demo plan
pub fn demo_plan() -> &'static [Exercise] {
    &DEMO_PLAN
}

fn plan_exercise(
    order_index: u32,
    id: &str,
    name: &str,
    (target_sets, target_reps, target_weight): (u32, u32, f64),
    recovery_seconds: u32,
    set_type: SetType,
    linked_to_previous: bool,
) -> Exercise {
    Exercise {
        id: id.into(),
        name: name.into(),
        target_sets,
        target_reps,
        target_weight,
        isometric: false,
        recovery_seconds,
        set_type,
        linked_to_previous,
        order_index,
    }
}

/// Full-body plan: a straight-set squat, a push/pull superset and a
/// three-station finisher circuit
pub fn build_demo_plan() -> Vec<Exercise> {
    let mut plank = plan_exercise(
        6,
        "plank",
        "Plank (seconds)",
        (2, 30, 0.0),
        45,
        SetType::Circuit,
        true,
    );
    plank.isometric = true;

    vec![
        plan_exercise(1, "back_squat", "Back Squat", (3, 5, 80.0), 150, SetType::Normal, false),
        plan_exercise(2, "bench_press", "Bench Press", (3, 8, 60.0), 90, SetType::Superset, false),
        plan_exercise(3, "barbell_row", "Barbell Row", (3, 8, 50.0), 90, SetType::Superset, true),
        plan_exercise(4, "kb_swing", "Kettlebell Swing", (2, 15, 16.0), 45, SetType::Circuit, false),
        plan_exercise(5, "push_up", "Push-up", (2, 12, 0.0), 45, SetType::Circuit, true),
        plank,
    ]
}

/// Validate a plan, returning every problem found
pub fn validate_plan(exercises: &[Exercise]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    if exercises.is_empty() {
        errors.push("Plan has no exercises".to_string());
    }

    for (idx, exercise) in exercises.iter().enumerate() {
        if !seen.insert(exercise.id.as_str()) {
            errors.push(format!("Duplicate exercise id {}", exercise.id));
        }
        if exercise.target_sets == 0 {
            errors.push(format!("Exercise {} has no target sets", exercise.id));
        }
        if exercise.target_weight < 0.0 {
            errors.push(format!("Exercise {} has a negative target weight", exercise.id));
        }
        if !exercise.linked_to_previous {
            continue;
        }
        if !exercise.set_type.is_linkable() {
            errors.push(format!(
                "Exercise {} is linked but is a normal exercise",
                exercise.id
            ));
        }
        match idx.checked_sub(1).map(|prev| &exercises[prev]) {
            None => errors.push(format!(
                "Exercise {} is linked but has no previous exercise",
                exercise.id
            )),
            Some(prev) if prev.set_type != exercise.set_type => errors.push(format!(
                "Exercise {} is linked to {} of a different set type",
                exercise.id, prev.id
            )),
            Some(_) => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group_exercises;

    #[test]
    fn test_demo_plan_validates() {
        let errors = validate_plan(demo_plan());
        assert!(
            errors.is_empty(),
            "Demo plan has validation errors: {:?}",
            errors
        );
    }

    #[test]
    fn test_demo_plan_groups() {
        let groups = group_exercises(demo_plan());
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        assert_eq!(groups[1].set_type, SetType::Superset);
        assert_eq!(groups[2].set_type, SetType::Circuit);
    }

    #[test]
    fn test_validation_reports_linking_problems() {
        let mut plan = build_demo_plan();
        plan[0].linked_to_previous = true;
        plan[2].set_type = SetType::Circuit;
        plan[3].id = "back_squat".into();

        let errors = validate_plan(&plan);
        assert!(errors.iter().any(|e| e.contains("no previous exercise")));
        assert!(errors.iter().any(|e| e.contains("different set type")));
        assert!(errors.iter().any(|e| e.contains("Duplicate exercise id")));
    }

    #[test]
    fn test_empty_plan_invalid() {
        assert_eq!(validate_plan(&[]), vec!["Plan has no exercises".to_string()]);
    }
}
