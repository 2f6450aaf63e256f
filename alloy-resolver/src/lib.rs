//! Dependency resolution and load ordering (component C3).

use std::collections::{BTreeMap, BTreeSet};

use alloy_metadata::ModCandidate;
use alloy_version::SemanticVersion;
use custom_error::custom_error;
use tracing::info;

/// The manifest dependency key that expresses compatibility with the host
/// application. Hardcoded per spec's open question on reserved-id
/// configurability — see this workspace's DESIGN.md.
pub const HOST_ID: &str = "minecraft";

/// The manifest dependency key that expresses compatibility with the loader
/// itself.
pub const LOADER_ID: &str = "alloy";

custom_error! {
    pub ResolutionError
    DuplicateId { ids: String } = "duplicate mod id(s) found in more than one candidate: {ids}",
    HostIncompatible { reserved_id: String, mod_id: String, constraint: String, actual: String } =
        "mod '{mod_id}' requires {reserved_id} {constraint} but found {actual}",
    MissingDependency { requested_by: String, missing_id: String, constraint: String } =
        "mod '{requested_by}' depends on '{missing_id}' {constraint} which is not present",
    VersionMismatch { requested_by: String, dependency_id: String, constraint: String, actual: String } =
        "mod '{requested_by}' requires '{dependency_id}' {constraint} but found {actual}",
    CircularDependency { cycle: String } = "circular dependency detected: {cycle}",
}

/// Resolve a candidate set into a topologically ordered load list.
/// Deterministic: permuting the input order never changes the output,
/// because every step that matters to output order sorts its inputs
/// explicitly rather than relying on map iteration order.
pub fn resolve(
    candidates: Vec<ModCandidate>,
    host_version: SemanticVersion,
    loader_version: SemanticVersion,
) -> Result<Vec<ModCandidate>, ResolutionError> {
    let mods = check_duplicates(candidates)?;
    check_host_and_loader_compatibility(&mods, host_version, loader_version)?;
    check_dependencies_present_and_satisfied(&mods)?;
    let order = topological_sort(&mods)?;

    info!("resolved load order: [{}]", order.join(", "));

    Ok(order
        .into_iter()
        .map(|id| mods[&id].clone())
        .collect())
}

fn check_duplicates(
    candidates: Vec<ModCandidate>,
) -> Result<BTreeMap<String, ModCandidate>, ResolutionError> {
    let mut grouped: BTreeMap<String, Vec<ModCandidate>> = BTreeMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.metadata.id.clone())
            .or_default()
            .push(candidate);
    }

    let duplicates: Vec<&String> = grouped
        .iter()
        .filter(|(_, group)| group.len() >= 2)
        .map(|(id, _)| id)
        .collect();
    if !duplicates.is_empty() {
        let ids = duplicates
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ResolutionError::DuplicateId { ids });
    }

    Ok(grouped
        .into_iter()
        .map(|(id, mut group)| (id, group.remove(0)))
        .collect())
}

fn check_host_and_loader_compatibility(
    mods: &BTreeMap<String, ModCandidate>,
    host_version: SemanticVersion,
    loader_version: SemanticVersion,
) -> Result<(), ResolutionError> {
    for (id, candidate) in mods {
        if let Some(constraint) = candidate.metadata.dependency_constraint(HOST_ID) {
            if !constraint.satisfies(&host_version) {
                return Err(ResolutionError::HostIncompatible {
                    reserved_id: HOST_ID.to_string(),
                    mod_id: id.clone(),
                    constraint: constraint.to_string(),
                    actual: host_version.to_string(),
                });
            }
        }
        if let Some(constraint) = candidate.metadata.dependency_constraint(LOADER_ID) {
            if !constraint.satisfies(&loader_version) {
                return Err(ResolutionError::HostIncompatible {
                    reserved_id: LOADER_ID.to_string(),
                    mod_id: id.clone(),
                    constraint: constraint.to_string(),
                    actual: loader_version.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_dependencies_present_and_satisfied(
    mods: &BTreeMap<String, ModCandidate>,
) -> Result<(), ResolutionError> {
    for (id, candidate) in mods {
        for (dep_id, constraint) in &candidate.metadata.dependencies {
            if dep_id == HOST_ID || dep_id == LOADER_ID {
                continue;
            }
            match mods.get(dep_id) {
                None => {
                    return Err(ResolutionError::MissingDependency {
                        requested_by: id.clone(),
                        missing_id: dep_id.clone(),
                        constraint: constraint.to_string(),
                    })
                }
                Some(dependency) => {
                    if !constraint.satisfies(&dependency.metadata.version) {
                        return Err(ResolutionError::VersionMismatch {
                            requested_by: id.clone(),
                            dependency_id: dep_id.clone(),
                            constraint: constraint.to_string(),
                            actual: dependency.metadata.version.to_string(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over the edge relation `dependency -> dependent`,
/// breaking in-degree-zero ties by lexicographic id order for determinism.
fn topological_sort(mods: &BTreeMap<String, ModCandidate>) -> Result<Vec<String>, ResolutionError> {
    let mut indegree: BTreeMap<String, usize> = mods.keys().map(|id| (id.clone(), 0)).collect();
    let mut dependents: BTreeMap<String, BTreeSet<String>> =
        mods.keys().map(|id| (id.clone(), BTreeSet::new())).collect();
    let mut deps_of: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (id, candidate) in mods {
        let mut own_deps = Vec::new();
        for dep_id in candidate.metadata.dependencies.keys() {
            if dep_id == HOST_ID || dep_id == LOADER_ID {
                continue;
            }
            own_deps.push(dep_id.clone());
            dependents.get_mut(dep_id).expect("dependency is a candidate").insert(id.clone());
            *indegree.get_mut(id).expect("mod is a candidate") += 1;
        }
        deps_of.insert(id.clone(), own_deps);
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut ordered = Vec::with_capacity(mods.len());
    while let Some(next) = ready.iter().next().cloned() {
        ready.remove(&next);
        ordered.push(next.clone());

        for dependent in &dependents[&next] {
            let degree = indegree.get_mut(dependent).expect("dependent is a candidate");
            *degree -= 1;
            if *degree == 0 {
                ready.insert(dependent.clone());
            }
        }
    }

    if ordered.len() != mods.len() {
        let remaining: BTreeSet<String> = indegree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| id.clone())
            .collect();
        let cycle = extract_cycle(&remaining, &deps_of);
        return Err(ResolutionError::CircularDependency {
            cycle: cycle.join(" -> "),
        });
    }

    Ok(ordered)
}

/// Walk outgoing dependency edges within `remaining` from its
/// lexicographically smallest member until a node repeats, then return the
/// repeated segment. `remaining` is guaranteed non-empty and every node in
/// it has at least one outgoing edge staying inside `remaining`, since it is
/// exactly the set of nodes Kahn's algorithm could not retire.
fn extract_cycle(remaining: &BTreeSet<String>, deps_of: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let start = remaining.iter().next().expect("cycle is non-empty").clone();
    let mut visited = Vec::new();
    let mut current = start;

    loop {
        if let Some(position) = visited.iter().position(|id| id == &current) {
            return visited[position..].to_vec();
        }
        visited.push(current.clone());

        current = deps_of
            .get(&current)
            .into_iter()
            .flatten()
            .filter(|dep| remaining.contains(*dep))
            .min()
            .expect("a node retained by Kahn's algorithm has an outgoing edge within `remaining`")
            .clone();
    }
}
