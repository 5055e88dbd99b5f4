//! Structural validation of workflow definitions
//!
//! Collects every problem instead of stopping at the first one, so an
//! editor can show them all at once. Only the cycle scan short-circuits.

use crate::config::WorkflowDefinition;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Outcome of validating a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub const CIRCULAR_REFERENCE: &str = "Workflow contains circular references";

/// Validate a workflow definition
pub fn validate(workflow: &WorkflowDefinition) -> ValidationReport {
    let mut errors = Vec::new();

    if workflow.name.trim().is_empty() {
        errors.push("Workflow name is required".to_string());
    }
    if workflow.trigger.trim().is_empty() {
        errors.push("Workflow trigger is required".to_string());
    }
    if workflow.steps.is_empty() {
        errors.push("Workflow must have at least one step".to_string());
    }

    // Reported per occurrence; the first sighting is never an error
    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("Duplicate step ID: {}", step.id));
        }
    }

    for step in &workflow.steps {
        if step.name.trim().is_empty() {
            errors.push(format!("Step {} must have a name", step.id));
        }
    }

    for step in &workflow.steps {
        for next in &step.next_steps {
            if !seen.contains(next.as_str()) {
                errors.push(format!(
                    "Step {} references non-existent step: {}",
                    step.id, next
                ));
            }
        }
    }

    if let Some(ref entry) = workflow.entry_step {
        if !seen.contains(entry.as_str()) {
            errors.push(format!("Entry step {} does not exist", entry));
        }
    }

    if has_cycle(workflow) {
        errors.push(CIRCULAR_REFERENCE.to_string());
    }

    ValidationReport::from_errors(errors)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InPath,
    Done,
}

/// Whether any step can reach itself through `next_steps`
///
/// Iterative three-colour DFS started from every step in declaration order.
/// `Done` nodes are shared across starts and never re-walked. Edges to
/// unknown ids are ignored here; they are reported separately.
fn has_cycle(workflow: &WorkflowDefinition) -> bool {
    // Duplicate ids merge their edges; that is what a walk by id would see
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &workflow.steps {
        edges
            .entry(step.id.as_str())
            .or_default()
            .extend(step.next_steps.iter().map(String::as_str));
    }

    let mut marks: HashMap<&str, Mark> = edges.keys().map(|id| (*id, Mark::Unvisited)).collect();

    for step in &workflow.steps {
        let start = step.id.as_str();
        if marks.get(start) != Some(&Mark::Unvisited) {
            continue;
        }

        // (node, index of the next edge to follow)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::InPath);

        while let Some(top) = stack.last_mut() {
            let (node, idx) = *top;
            let next = edges.get(node).and_then(|targets| targets.get(idx)).copied();

            match next {
                Some(target) => {
                    top.1 += 1;
                    match marks.get(target).copied() {
                        Some(Mark::InPath) => return true,
                        Some(Mark::Unvisited) => {
                            marks.insert(target, Mark::InPath);
                            stack.push((target, 0));
                        }
                        Some(Mark::Done) | None => {}
                    }
                }
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    false
}
