//! RB-030: Normalization. Canonical ordering, validation, freeze.
//!
//! `normalize` turns a Draft recipe into a canonical, validated, Frozen
//! recipe. Validation findings make normalization fail without touching the
//! recipe. Anything that merely keeps the recipe from being resolved
//! (missing specs on verb placeholders, dangling connections, unsatisfiable
//! fates) is recorded on the frozen recipe instead.

use super::context::{SpecLookup, StoreLookup};
use super::error::Result;
use super::recipe::{Connection, Handle, Particle, Recipe, Unresolved};
use super::types::{
    Direction, Fate, HandleId, ParticleId, ParticleSpec, TypeDescriptor, ValidationError,
};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Outcome of one normalization attempt.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    /// Structural failures; non-empty means the recipe was not frozen.
    pub errors: Vec<ValidationError>,
    /// Elements recorded as unresolved on the frozen recipe.
    pub unresolved: Vec<Unresolved>,
}

impl NormalizeReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.errors.is_empty() && self.unresolved.is_empty()
    }
}

/// Normalize `recipe` in place. Returns whether it was frozen.
pub fn normalize(
    recipe: &mut Recipe,
    specs: &dyn SpecLookup,
    stores: Option<&dyn StoreLookup>,
) -> bool {
    normalize_with_report(recipe, specs, stores).is_ok()
}

/// Normalize `recipe` in place and report every finding.
pub fn normalize_with_report(
    recipe: &mut Recipe,
    specs: &dyn SpecLookup,
    stores: Option<&dyn StoreLookup>,
) -> NormalizeReport {
    let mut report = NormalizeReport::default();

    if recipe.is_frozen() {
        report
            .errors
            .push(ValidationError::new("recipe is already frozen"));
        return report;
    }

    let found = resolve_specs(recipe, specs, &mut report);
    let agreed_types = validate_handles(recipe, &found, &mut report);
    validate_stores(recipe, &mut report);

    if !report.errors.is_empty() {
        tracing::debug!(
            "normalization failed with {} error(s)",
            report.errors.len()
        );
        for e in &report.errors {
            tracing::trace!("validation: {e}");
        }
        return report;
    }

    record_dangling(recipe, &found, &mut report);
    record_fates(recipe, &agreed_types, stores, &mut report);

    if let Err(e) = canonicalize(recipe, &found, &agreed_types) {
        report.errors.push(ValidationError::new(e.to_string()));
        return report;
    }

    let resolved = report.unresolved.is_empty();
    recipe.freeze(resolved, report.unresolved.clone());
    tracing::debug!(
        "recipe normalized: {} particle(s), {} handle(s), resolved={}, unresolved={}",
        recipe.particle_count(),
        recipe.handle_count(),
        resolved,
        report.unresolved.len()
    );
    report
}

fn handle_label(handle: &Handle) -> String {
    match handle.local_name() {
        Some(name) => format!("'{}'", name),
        None => handle.id().to_string(),
    }
}

// ============================================================================
// Specs
// ============================================================================

/// Look up a spec for every particle and check its connections against it.
/// Returns the spec of every particle that has one.
fn resolve_specs(
    recipe: &Recipe,
    specs: &dyn SpecLookup,
    report: &mut NormalizeReport,
) -> IndexMap<ParticleId, Arc<ParticleSpec>> {
    let mut found = IndexMap::new();

    for particle in recipe.particles() {
        match particle
            .shared_spec()
            .or_else(|| specs.lookup(particle.name()))
        {
            Some(spec) => {
                check_against_spec(particle, &spec, report);
                found.insert(particle.id(), spec);
            }
            None if particle.verbs().is_empty() => {
                report.errors.push(ValidationError::new(format!(
                    "particle '{}': no spec found and no verbs to resolve it by",
                    particle.name()
                )));
            }
            None => report.unresolved.push(Unresolved::MissingSpec {
                particle: particle.id(),
                name: particle.name().to_string(),
            }),
        }
    }
    found
}

fn check_against_spec(particle: &Particle, spec: &ParticleSpec, report: &mut NormalizeReport) {
    for conn in particle.connections() {
        match spec.connections.get(conn.name()) {
            None => report.errors.push(ValidationError::new(format!(
                "particle '{}': connection '{}' is not declared by its spec",
                particle.name(),
                conn.name()
            ))),
            Some(declared) if !conn.direction().satisfies(declared.direction) => {
                report.errors.push(ValidationError::new(format!(
                    "particle '{}': connection '{}' {} but spec declares {}",
                    particle.name(),
                    conn.name(),
                    conn.direction(),
                    declared.direction
                )))
            }
            Some(_) => {}
        }
    }

    for (name, declared) in &spec.connections {
        if !declared.optional && particle.connection(name).is_none() {
            report.unresolved.push(Unresolved::MissingConnection {
                particle: particle.id(),
                particle_name: particle.name().to_string(),
                connection: name.clone(),
            });
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Check every handle's aggregated access pattern. Returns the agreed type
/// of each handle that has at least one typed usage.
fn validate_handles(
    recipe: &Recipe,
    found: &IndexMap<ParticleId, Arc<ParticleSpec>>,
    report: &mut NormalizeReport,
) -> IndexMap<HandleId, TypeDescriptor> {
    let mut agreed = IndexMap::new();

    for handle in recipe.handles() {
        let usages: Vec<(&Particle, &Connection)> = recipe
            .connections_of(handle.id())
            .iter()
            .filter_map(|cref| {
                let particle = recipe.particle(cref.particle)?;
                Some((particle, particle.connection(&cref.name)?))
            })
            .collect();

        if handle.fate().read_only() {
            for (particle, conn) in usages.iter().filter(|(_, c)| c.direction().writes()) {
                report.errors.push(ValidationError::new(format!(
                    "handle {}: {} handle cannot be written by {}::{}",
                    handle_label(handle),
                    handle.fate(),
                    particle.name(),
                    conn.name()
                )));
            }
        }

        let hosted = usages
            .iter()
            .any(|(_, c)| c.direction() == Direction::Hosts);
        let data = usages
            .iter()
            .any(|(_, c)| c.direction() != Direction::Hosts);
        if hosted && data {
            report.errors.push(ValidationError::new(format!(
                "handle {}: used for both hosting and data",
                handle_label(handle)
            )));
        }

        let mut types: Vec<TypeDescriptor> = handle.type_desc().cloned().into_iter().collect();
        for (particle, conn) in &usages {
            types.extend(conn.type_desc().cloned());
            let declared = found
                .get(&particle.id())
                .and_then(|spec| spec.connections.get(conn.name()))
                .and_then(|cs| cs.type_desc.clone());
            types.extend(declared);
        }
        if let Some(first) = types.first() {
            match types.iter().find(|t| !t.is_compatible(first)) {
                Some(other) => report.errors.push(ValidationError::new(format!(
                    "handle {}: conflicting types '{}' and '{}'",
                    handle_label(handle),
                    first,
                    other
                ))),
                None => {
                    agreed.insert(handle.id(), first.clone());
                }
            }
        }
    }
    agreed
}

fn validate_stores(recipe: &Recipe, report: &mut NormalizeReport) {
    let mut seen = IndexSet::new();
    for handle in recipe.handles() {
        if let Some(store) = handle.store() {
            if !seen.insert(store) {
                report.errors.push(ValidationError::new(format!(
                    "store '{}' is bound by more than one handle",
                    store
                )));
            }
        }
    }
}

// ============================================================================
// Unresolved elements
// ============================================================================

fn record_dangling(
    recipe: &Recipe,
    found: &IndexMap<ParticleId, Arc<ParticleSpec>>,
    report: &mut NormalizeReport,
) {
    for particle in recipe.particles() {
        for conn in particle.connections().filter(|c| c.is_dangling()) {
            let optional = found
                .get(&particle.id())
                .and_then(|spec| spec.connections.get(conn.name()))
                .is_some_and(|cs| cs.optional);
            if !optional {
                report.unresolved.push(Unresolved::DanglingConnection {
                    particle: particle.id(),
                    particle_name: particle.name().to_string(),
                    connection: conn.name().to_string(),
                });
            }
        }
    }
}

fn record_fates(
    recipe: &Recipe,
    agreed: &IndexMap<HandleId, TypeDescriptor>,
    stores: Option<&dyn StoreLookup>,
    report: &mut NormalizeReport,
) {
    for handle in recipe.handles() {
        let expected = agreed.get(&handle.id()).or(handle.type_desc());
        if let Some(reason) = unsatisfied_fate(handle, expected, stores) {
            report.unresolved.push(Unresolved::UnsatisfiedFate {
                handle: handle.id(),
                fate: handle.fate(),
                reason,
            });
        }
    }
}

/// Why `handle`'s fate cannot be satisfied, if it cannot.
fn unsatisfied_fate(
    handle: &Handle,
    expected: Option<&TypeDescriptor>,
    stores: Option<&dyn StoreLookup>,
) -> Option<String> {
    match handle.fate() {
        Fate::Create => handle
            .store()
            .map(|s| format!("create handle already bound to store '{}'", s)),
        Fate::Use | Fate::Map | Fate::Copy => {
            let Some(id) = handle.store() else {
                return Some("no store bound".to_string());
            };
            let registry = stores?;
            let Some(store) = registry.store(id) else {
                return Some(format!("store '{}' not found", id));
            };
            match (store.type_desc.as_ref(), expected) {
                (Some(have), Some(want)) if !have.is_compatible(want) => Some(format!(
                    "store '{}' holds {} but handle expects {}",
                    id, have, want
                )),
                _ => None,
            }
        }
        Fate::Join if handle.joined().is_empty() => Some("join handle joins nothing".to_string()),
        Fate::Join => None,
    }
}

// ============================================================================
// Canonical form
// ============================================================================

type ParticleKey = (String, Vec<String>, Vec<String>);
type HandleKey = (Option<String>, Vec<String>, Fate, Option<TypeDescriptor>);

fn sorted(items: &[String]) -> Vec<String> {
    let mut v = items.to_vec();
    v.sort();
    v.dedup();
    v
}

fn particle_key(p: &Particle) -> ParticleKey {
    (p.name().to_string(), p.verbs().to_vec(), sorted(p.tags()))
}

fn handle_key(h: &Handle, agreed: &IndexMap<HandleId, TypeDescriptor>) -> HandleKey {
    (
        h.store().map(str::to_string),
        sorted(h.tags()),
        h.fate(),
        agreed.get(&h.id()).or(h.type_desc()).cloned(),
    )
}

type ConnectionKey = (String, Direction, Vec<String>, Option<TypeDescriptor>);

/// Particle/handle incidence by position in arrival order.
struct Incidence {
    /// Per particle: each connection and the position of its handle.
    ports: Vec<Vec<(ConnectionKey, Option<usize>)>>,
    /// Per handle: each (particle position, connection) bound to it.
    uses: Vec<Vec<(usize, ConnectionKey)>>,
    /// Per handle: positions of the handles it joins.
    joins: Vec<Vec<usize>>,
}

impl Incidence {
    fn new(recipe: &Recipe) -> Self {
        let position: IndexMap<HandleId, usize> = recipe
            .handles()
            .enumerate()
            .map(|(i, h)| (h.id(), i))
            .collect();
        let mut uses = vec![Vec::new(); position.len()];
        let mut ports = Vec::new();
        for (i, p) in recipe.particles().enumerate() {
            let mut own = Vec::new();
            for c in p.connections() {
                let key = (
                    c.name().to_string(),
                    c.direction(),
                    c.tags().to_vec(),
                    c.type_desc().cloned(),
                );
                let at = c.handle().and_then(|h| position.get(&h).copied());
                if let Some(j) = at {
                    uses[j].push((i, key.clone()));
                }
                own.push((key, at));
            }
            ports.push(own);
        }
        let joins = recipe
            .handles()
            .map(|h| {
                h.joined()
                    .iter()
                    .filter_map(|j| position.get(j).copied())
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { ports, uses, joins }
    }
}

/// Dense ranks of `keys`: equal keys share a rank, ranks follow key order.
fn rank<K: Ord>(keys: &[K]) -> Vec<usize> {
    let mut distinct: Vec<&K> = keys.iter().collect();
    distinct.sort();
    distinct.dedup();
    keys.iter()
        .map(|k| distinct.binary_search(&k).unwrap_or(0))
        .collect()
}

fn classes(ranks: &[usize]) -> usize {
    ranks.iter().max().map_or(0, |m| m + 1)
}

/// Refine ranks with the ranks of each component's neighbours until the
/// partition stops splitting. A refined rank never reorders two components
/// that already differed.
fn refine(
    inc: &Incidence,
    mut prank: Vec<usize>,
    mut hrank: Vec<usize>,
) -> (Vec<usize>, Vec<usize>) {
    loop {
        let psig: Vec<_> = inc
            .ports
            .iter()
            .enumerate()
            .map(|(i, ports)| {
                let mut near: Vec<_> = ports
                    .iter()
                    .map(|(key, at)| (key, at.map(|j| hrank[j])))
                    .collect();
                near.sort();
                (prank[i], near)
            })
            .collect();
        let hsig: Vec<_> = inc
            .uses
            .iter()
            .zip(&inc.joins)
            .enumerate()
            .map(|(j, (uses, joins))| {
                let mut near: Vec<_> = uses.iter().map(|(i, key)| (prank[*i], key)).collect();
                near.sort();
                let mut joined: Vec<usize> = joins.iter().map(|k| hrank[*k]).collect();
                joined.sort();
                (hrank[j], near, joined)
            })
            .collect();

        let (next_p, next_h) = (rank(&psig), rank(&hsig));
        let stable = classes(&next_p) == classes(&prank) && classes(&next_h) == classes(&hrank);
        prank = next_p;
        hrank = next_h;
        if stable {
            return (prank, hrank);
        }
    }
}

/// Give the first member of the lowest tied class a rank of its own.
fn split_first_tie(ranks: &[usize]) -> Option<Vec<usize>> {
    let class = (0..classes(ranks)).find(|c| ranks.iter().filter(|r| **r == *c).count() > 1)?;
    let chosen = ranks.iter().position(|r| *r == class)?;
    let keys: Vec<(usize, bool)> = ranks
        .iter()
        .enumerate()
        .map(|(i, r)| (*r, i != chosen))
        .collect();
    Some(rank(&keys))
}

/// Structural ranks of particles and handles, all distinct. Starts from the
/// component keys and refines; a tie refinement cannot split is broken on
/// its first member and refined again.
fn structural_ranks(
    recipe: &Recipe,
    agreed: &IndexMap<HandleId, TypeDescriptor>,
) -> (Incidence, Vec<usize>, Vec<usize>) {
    let inc = Incidence::new(recipe);
    let pkeys: Vec<ParticleKey> = recipe.particles().map(particle_key).collect();
    let hkeys: Vec<HandleKey> = recipe.handles().map(|h| handle_key(h, agreed)).collect();
    let (mut prank, mut hrank) = refine(&inc, rank(&pkeys), rank(&hkeys));
    loop {
        if let Some(split) = split_first_tie(&prank) {
            prank = split;
        } else if let Some(split) = split_first_tie(&hrank) {
            hrank = split;
        } else {
            return (inc, prank, hrank);
        }
        (prank, hrank) = refine(&inc, prank, hrank);
    }
}

/// Particle and handle order derived from structure alone: connections are
/// sorted by (particle, name, direction, handle) rank, components are taken
/// in order of first appearance, and unconnected components follow sorted
/// by rank.
fn canonical_order(
    recipe: &Recipe,
    agreed: &IndexMap<HandleId, TypeDescriptor>,
) -> (Vec<ParticleId>, Vec<HandleId>) {
    let particle_ids = recipe.particle_ids();
    let handle_ids = recipe.handle_ids();
    let (inc, prank, hrank) = structural_ranks(recipe, agreed);

    let mut edges: Vec<(usize, &str, Direction, Option<usize>, usize, Option<usize>)> = Vec::new();
    for (i, ports) in inc.ports.iter().enumerate() {
        for (key, at) in ports {
            edges.push((prank[i], key.0.as_str(), key.1, at.map(|j| hrank[j]), i, *at));
        }
    }
    edges.sort();

    let mut particles: IndexSet<usize> = IndexSet::new();
    let mut handles: IndexSet<usize> = IndexSet::new();
    for (_, _, _, _, i, at) in &edges {
        particles.insert(*i);
        if let Some(j) = at {
            handles.insert(*j);
        }
    }

    let mut orphan_particles: Vec<usize> = (0..prank.len())
        .filter(|i| !particles.contains(i))
        .collect();
    orphan_particles.sort_by_key(|i| prank[*i]);
    particles.extend(orphan_particles);

    let mut orphan_handles: Vec<usize> = (0..hrank.len())
        .filter(|j| !handles.contains(j))
        .collect();
    orphan_handles.sort_by_key(|j| hrank[*j]);
    handles.extend(orphan_handles);

    (
        particles.into_iter().map(|i| particle_ids[i]).collect(),
        handles.into_iter().map(|j| handle_ids[j]).collect(),
    )
}

/// Attach specs, record agreed types, sort tags, and apply the canonical
/// order. Runs only once validation has passed.
fn canonicalize(
    recipe: &mut Recipe,
    found: &IndexMap<ParticleId, Arc<ParticleSpec>>,
    agreed: &IndexMap<HandleId, TypeDescriptor>,
) -> Result<()> {
    for (pid, spec) in found {
        let attached = recipe.particle(*pid).is_some_and(|p| p.spec().is_some());
        if !attached {
            recipe.attach_spec(*pid, Arc::clone(spec))?;
        }
    }
    for (hid, t) in agreed {
        recipe.set_handle_type(*hid, Some(t.clone()))?;
    }

    let particle_tags: Vec<(ParticleId, Vec<String>)> = recipe
        .particles()
        .map(|p| (p.id(), sorted(p.tags())))
        .collect();
    for (pid, tags) in particle_tags {
        recipe.set_particle_tags(pid, tags)?;
    }
    let connection_tags: Vec<(ParticleId, String, Vec<String>)> = recipe
        .particles()
        .flat_map(|p| {
            p.connections()
                .map(move |c| (p.id(), c.name().to_string(), sorted(c.tags())))
        })
        .collect();
    for (pid, name, tags) in connection_tags {
        recipe.set_connection_tags(pid, &name, tags)?;
    }
    let handle_tags: Vec<(HandleId, Vec<String>)> =
        recipe.handles().map(|h| (h.id(), sorted(h.tags()))).collect();
    for (hid, tags) in handle_tags {
        recipe.set_tags(hid, tags)?;
    }

    let (particles, handles) = canonical_order(recipe, agreed);
    recipe.apply_order(&particles, &handles)
}
