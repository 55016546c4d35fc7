//! Flattens a ride's `FlowNode` tree into an ordered set of effective
//! segments, deriving structural dependencies from the flow shape (spec
//! §4.1).

use std::collections::{HashMap, HashSet};

use kite_model::{apply_overrides, FlowNode, Ride, Segment, SegmentOverrides, ValidationError};

use crate::warning::Warning;

/// One occurrence of a `Ref` encountered during the depth-first walk, in
/// left-to-right order.
struct RefOccurrence {
    segment_name: String,
    overrides: SegmentOverrides,
}

/// Entry/exit leaf sets for a flow subtree, used to derive sequential
/// ordering edges between sibling subtrees.
#[derive(Default, Clone)]
struct Frontier {
    entry: HashSet<String>,
    exit: HashSet<String>,
}

pub struct MaterializeResult {
    /// Effective segments in first-occurrence DFS order.
    pub effective: Vec<Segment>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<ValidationError>,
}

pub fn materialize(
    available: &HashMap<String, Segment>,
    ride: &Ride,
) -> MaterializeResult {
    let mut occurrences: Vec<RefOccurrence> = Vec::new();
    let mut structural_deps: HashMap<String, HashSet<String>> = HashMap::new();
    let mut errors: Vec<ValidationError> = Vec::new();

    walk(
        &ride.flow,
        available,
        &mut occurrences,
        &mut structural_deps,
        &mut errors,
        &mut Vec::new(),
    );

    // First-wins selection.
    let mut seen: HashSet<String> = HashSet::new();
    let mut warnings = Vec::new();
    let mut effective = Vec::new();

    for occ in &occurrences {
        if !seen.insert(occ.segment_name.clone()) {
            warnings.push(Warning::DuplicateRef {
                name: occ.segment_name.clone(),
            });
            continue;
        }

        let Some(source) = available.get(&occ.segment_name) else {
            // Already reported as UnknownSegment in `walk`.
            continue;
        };

        let mut eff = apply_overrides(source, &occ.overrides);

        // Union in structural dependencies derived from flow shape,
        // preserving first-occurrence order (declared+override deps first).
        if let Some(structural) = structural_deps.get(&occ.segment_name) {
            let mut combined = eff.depends_on.clone();
            for dep in structural {
                if !combined.contains(dep) {
                    combined.push(dep.clone());
                }
            }
            eff.depends_on = combined;
        }

        if eff.depends_on.contains(&eff.name) {
            errors.push(ValidationError::SelfDependency(eff.name.clone()));
        }

        effective.push(eff);
    }

    MaterializeResult {
        effective,
        warnings,
        errors,
    }
}

/// Recursively walk a flow subtree, returning its entry/exit leaf-name sets.
fn walk(
    node: &FlowNode,
    available: &HashMap<String, Segment>,
    occurrences: &mut Vec<RefOccurrence>,
    structural_deps: &mut HashMap<String, HashSet<String>>,
    errors: &mut Vec<ValidationError>,
    path: &mut Vec<usize>,
) -> Frontier {
    match node {
        FlowNode::Ref {
            segment_name,
            overrides,
        } => {
            if !available.contains_key(segment_name) {
                errors.push(ValidationError::UnknownSegment(segment_name.clone()));
                return Frontier::default();
            }
            occurrences.push(RefOccurrence {
                segment_name: segment_name.clone(),
                overrides: overrides.clone(),
            });
            let mut singleton = HashSet::new();
            singleton.insert(segment_name.clone());
            Frontier {
                entry: singleton.clone(),
                exit: singleton,
            }
        }
        FlowNode::Sequential { children } => {
            let mut entry = HashSet::new();
            let mut exit = HashSet::new();
            let mut prev_exit: Option<HashSet<String>> = None;

            for (i, child) in children.iter().enumerate() {
                path.push(i);
                let frontier = walk(child, available, occurrences, structural_deps, errors, path);
                path.pop();

                if i == 0 {
                    entry = frontier.entry.clone();
                }
                if let Some(prev) = &prev_exit {
                    for successor in &frontier.entry {
                        structural_deps
                            .entry(successor.clone())
                            .or_default()
                            .extend(prev.iter().cloned());
                    }
                }
                exit = frontier.exit.clone();
                prev_exit = Some(frontier.exit);
            }

            Frontier { entry, exit }
        }
        FlowNode::Parallel { children } => {
            if children.is_empty() {
                errors.push(ValidationError::EmptyParallel {
                    path: path_label(path),
                });
                return Frontier::default();
            }

            let mut entry = HashSet::new();
            let mut exit = HashSet::new();
            for (i, child) in children.iter().enumerate() {
                path.push(i);
                let frontier = walk(child, available, occurrences, structural_deps, errors, path);
                path.pop();
                entry.extend(frontier.entry);
                exit.extend(frontier.exit);
            }
            Frontier { entry, exit }
        }
    }
}

fn path_label(path: &[usize]) -> String {
    if path.is_empty() {
        "root".to_string()
    } else {
        path.iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}
