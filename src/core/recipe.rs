//! RB-010: Recipe graph model of particles, handles, and connections.
//!
//! A recipe owns its particles and handles. Particles own their connections;
//! handles own nothing. Connection → handle back-references live in a
//! recipe-level index (`HandleId → [ConnectionRef]`), so the graph never
//! forms ownership cycles.
//!
//! Every structural mutation is gated on `RecipeState::Draft`. The one-way
//! Draft → Frozen transition is crate-private and performed only by the
//! normalizer.

use super::error::{RecipeError, Result};
use super::types::{
    ConnectionRef, Direction, Fate, HandleId, ParticleId, ParticleSpec, TypeDescriptor,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Mutability state of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeState {
    Draft,
    Frozen,
}

impl fmt::Display for RecipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Frozen => write!(f, "frozen"),
        }
    }
}

// ============================================================================
// Components
// ============================================================================

/// A named, directioned binding from a particle to (at most) one handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    name: String,
    direction: Direction,
    handle: Option<HandleId>,
    type_desc: Option<TypeDescriptor>,
    tags: Vec<String>,
}

impl Connection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    pub fn type_desc(&self) -> Option<&TypeDescriptor> {
        self.type_desc.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_dangling(&self) -> bool {
        self.handle.is_none()
    }
}

/// A computational role, looked up by name against a spec registry.
#[derive(Debug, Clone)]
pub struct Particle {
    id: ParticleId,
    name: String,
    verbs: Vec<String>,
    tags: Vec<String>,
    connections: IndexMap<String, Connection>,
    spec: Option<Arc<ParticleSpec>>,
}

impl Particle {
    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The resolved spec, once one has been attached.
    pub fn spec(&self) -> Option<&ParticleSpec> {
        self.spec.as_deref()
    }

    pub(crate) fn shared_spec(&self) -> Option<Arc<ParticleSpec>> {
        self.spec.clone()
    }

    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// A shareable data endpoint.
#[derive(Debug, Clone)]
pub struct Handle {
    id: HandleId,
    fate: Fate,
    local_name: Option<String>,
    store: Option<String>,
    tags: Vec<String>,
    type_desc: Option<TypeDescriptor>,
    joined: Vec<HandleId>,
}

impl Handle {
    fn new(id: HandleId, fate: Fate) -> Self {
        Self {
            id,
            fate,
            local_name: None,
            store: None,
            tags: Vec::new(),
            type_desc: None,
            joined: Vec::new(),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn fate(&self) -> Fate {
        self.fate
    }

    /// Author-facing name; never part of structural identity.
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Concrete store id this handle is bound to (use/map/copy).
    pub fn store(&self) -> Option<&str> {
        self.store.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn type_desc(&self) -> Option<&TypeDescriptor> {
        self.type_desc.as_ref()
    }

    /// Handles joined by this one (join fate).
    pub fn joined(&self) -> &[HandleId] {
        &self.joined
    }
}

/// An element that keeps a frozen recipe from being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unresolved {
    MissingSpec {
        particle: ParticleId,
        name: String,
    },
    DanglingConnection {
        particle: ParticleId,
        particle_name: String,
        connection: String,
    },
    MissingConnection {
        particle: ParticleId,
        particle_name: String,
        connection: String,
    },
    UnsatisfiedFate {
        handle: HandleId,
        fate: Fate,
        reason: String,
    },
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSpec { particle, name } => {
                write!(f, "particle '{}' ({}): missing spec", name, particle)
            }
            Self::DanglingConnection {
                particle_name,
                connection,
                ..
            } => write!(f, "connection {}::{}: missing handle", particle_name, connection),
            Self::MissingConnection {
                particle_name,
                connection,
                ..
            } => write!(
                f,
                "particle '{}': required connection '{}' not present",
                particle_name, connection
            ),
            Self::UnsatisfiedFate {
                handle,
                fate,
                reason,
            } => write!(f, "handle {} ({}): {}", handle, fate, reason),
        }
    }
}

// ============================================================================
// Recipe
// ============================================================================

/// Declarative graph of particles and handles.
#[derive(Debug, Clone)]
pub struct Recipe {
    name: Option<String>,
    state: RecipeState,
    resolved: bool,
    particles: IndexMap<ParticleId, Particle>,
    handles: IndexMap<HandleId, Handle>,
    bindings: IndexMap<HandleId, Vec<ConnectionRef>>,
    unresolved: Vec<Unresolved>,
    next_particle: u32,
    next_handle: u32,
}

impl Default for Recipe {
    fn default() -> Self {
        Self::new()
    }
}

fn to_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Recipe {
    /// Create an empty draft recipe.
    pub fn new() -> Self {
        Self {
            name: None,
            state: RecipeState::Draft,
            resolved: false,
            particles: IndexMap::new(),
            handles: IndexMap::new(),
            bindings: IndexMap::new(),
            unresolved: Vec::new(),
            next_particle: 0,
            next_handle: 0,
        }
    }

    /// Create an empty, named draft recipe.
    pub fn named(name: &str) -> Self {
        let mut recipe = Self::new();
        recipe.name = Some(name.to_string());
        recipe
    }

    fn ensure_draft(&self) -> Result<()> {
        if self.state == RecipeState::Frozen {
            return Err(RecipeError::MutationAfterFreeze);
        }
        Ok(())
    }

    fn particle_mut(&mut self, id: ParticleId) -> Result<&mut Particle> {
        self.particles
            .get_mut(&id)
            .ok_or(RecipeError::UnknownParticle(id))
    }

    fn handle_mut(&mut self, id: HandleId) -> Result<&mut Handle> {
        self.handles
            .get_mut(&id)
            .ok_or(RecipeError::UnknownHandle(id))
    }

    fn connection_mut(&mut self, particle: ParticleId, name: &str) -> Result<&mut Connection> {
        self.particle_mut(particle)?
            .connections
            .get_mut(name)
            .ok_or_else(|| RecipeError::UnknownConnection {
                particle,
                name: name.to_string(),
            })
    }

    fn detach(&mut self, handle: HandleId, connection: &ConnectionRef) {
        if let Some(refs) = self.bindings.get_mut(&handle) {
            refs.retain(|r| r != connection);
        }
    }

    // -- Structural mutation -------------------------------------------------

    pub fn set_name(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_draft()?;
        self.name = name.map(str::to_string);
        Ok(())
    }

    pub fn add_particle(&mut self, name: &str) -> Result<ParticleId> {
        self.ensure_draft()?;
        if name.trim().is_empty() {
            return Err(RecipeError::EmptyName);
        }
        let id = ParticleId(self.next_particle);
        self.next_particle += 1;
        self.particles.insert(
            id,
            Particle {
                id,
                name: name.to_string(),
                verbs: Vec::new(),
                tags: Vec::new(),
                connections: IndexMap::new(),
                spec: None,
            },
        );
        Ok(id)
    }

    /// Remove a particle together with its connections.
    pub fn remove_particle(&mut self, id: ParticleId) -> Result<()> {
        self.ensure_draft()?;
        let particle = self
            .particles
            .shift_remove(&id)
            .ok_or(RecipeError::UnknownParticle(id))?;
        for conn in particle.connections.values() {
            if let Some(handle) = conn.handle {
                self.detach(handle, &ConnectionRef::new(id, &conn.name));
            }
        }
        Ok(())
    }

    pub fn add_handle(&mut self, fate: Fate) -> Result<HandleId> {
        self.ensure_draft()?;
        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(id, Handle::new(id, fate));
        self.bindings.insert(id, Vec::new());
        Ok(id)
    }

    /// Remove a handle. Fails while any connection is still bound to it.
    pub fn remove_handle(&mut self, id: HandleId) -> Result<()> {
        self.ensure_draft()?;
        if !self.handles.contains_key(&id) {
            return Err(RecipeError::UnknownHandle(id));
        }
        if !self.connections_of(id).is_empty() {
            return Err(RecipeError::HandleInUse(id));
        }
        self.handles.shift_remove(&id);
        self.bindings.shift_remove(&id);
        for handle in self.handles.values_mut() {
            handle.joined.retain(|j| *j != id);
        }
        Ok(())
    }

    pub fn add_connection(
        &mut self,
        particle: ParticleId,
        name: &str,
        direction: Direction,
    ) -> Result<()> {
        self.ensure_draft()?;
        if name.trim().is_empty() {
            return Err(RecipeError::EmptyName);
        }
        let p = self.particle_mut(particle)?;
        if p.connections.contains_key(name) {
            return Err(RecipeError::DuplicateConnection {
                particle,
                name: name.to_string(),
            });
        }
        p.connections.insert(
            name.to_string(),
            Connection {
                name: name.to_string(),
                direction,
                handle: None,
                type_desc: None,
                tags: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn remove_connection(&mut self, particle: ParticleId, name: &str) -> Result<()> {
        self.ensure_draft()?;
        let conn = self
            .particle_mut(particle)?
            .connections
            .shift_remove(name)
            .ok_or_else(|| RecipeError::UnknownConnection {
                particle,
                name: name.to_string(),
            })?;
        if let Some(handle) = conn.handle {
            self.detach(handle, &ConnectionRef::new(particle, name));
        }
        Ok(())
    }

    /// Bind a connection to a handle. Rebinding moves the back-reference.
    pub fn bind(&mut self, particle: ParticleId, name: &str, handle: HandleId) -> Result<()> {
        self.ensure_draft()?;
        if !self.handles.contains_key(&handle) {
            return Err(RecipeError::UnknownHandle(handle));
        }
        let previous = self.connection_mut(particle, name)?.handle.replace(handle);
        let cref = ConnectionRef::new(particle, name);
        if let Some(prev) = previous {
            self.detach(prev, &cref);
        }
        self.bindings.entry(handle).or_default().push(cref);
        Ok(())
    }

    /// Leave a connection dangling.
    pub fn unbind(&mut self, particle: ParticleId, name: &str) -> Result<()> {
        self.ensure_draft()?;
        if let Some(prev) = self.connection_mut(particle, name)?.handle.take() {
            self.detach(prev, &ConnectionRef::new(particle, name));
        }
        Ok(())
    }

    pub fn set_connection_type(
        &mut self,
        particle: ParticleId,
        name: &str,
        type_desc: Option<TypeDescriptor>,
    ) -> Result<()> {
        self.ensure_draft()?;
        self.connection_mut(particle, name)?.type_desc = type_desc;
        Ok(())
    }

    pub fn set_connection_tags<I, S>(&mut self, particle: ParticleId, name: &str, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_draft()?;
        self.connection_mut(particle, name)?.tags = to_strings(tags);
        Ok(())
    }

    pub fn set_verbs<I, S>(&mut self, particle: ParticleId, verbs: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_draft()?;
        self.particle_mut(particle)?.verbs = to_strings(verbs);
        Ok(())
    }

    pub fn set_particle_tags<I, S>(&mut self, particle: ParticleId, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_draft()?;
        self.particle_mut(particle)?.tags = to_strings(tags);
        Ok(())
    }

    pub fn attach_spec(&mut self, particle: ParticleId, spec: Arc<ParticleSpec>) -> Result<()> {
        self.ensure_draft()?;
        self.particle_mut(particle)?.spec = Some(spec);
        Ok(())
    }

    pub fn set_fate(&mut self, handle: HandleId, fate: Fate) -> Result<()> {
        self.ensure_draft()?;
        self.handle_mut(handle)?.fate = fate;
        Ok(())
    }

    pub fn set_store(&mut self, handle: HandleId, store: Option<&str>) -> Result<()> {
        self.ensure_draft()?;
        self.handle_mut(handle)?.store = store.map(str::to_string);
        Ok(())
    }

    pub fn set_tags<I, S>(&mut self, handle: HandleId, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_draft()?;
        self.handle_mut(handle)?.tags = to_strings(tags);
        Ok(())
    }

    pub fn set_handle_type(&mut self, handle: HandleId, type_desc: Option<TypeDescriptor>) -> Result<()> {
        self.ensure_draft()?;
        self.handle_mut(handle)?.type_desc = type_desc;
        Ok(())
    }

    pub fn set_local_name(&mut self, handle: HandleId, name: Option<&str>) -> Result<()> {
        self.ensure_draft()?;
        self.handle_mut(handle)?.local_name = name.map(str::to_string);
        Ok(())
    }

    /// Make `handle` a join over `joined`; sets its fate to `Join`.
    pub fn join(&mut self, handle: HandleId, joined: &[HandleId]) -> Result<()> {
        self.ensure_draft()?;
        for j in joined {
            if *j == handle {
                return Err(RecipeError::InvalidJoin(handle));
            }
            if !self.handles.contains_key(j) {
                return Err(RecipeError::UnknownHandle(*j));
            }
        }
        let h = self.handle_mut(handle)?;
        h.joined = joined.to_vec();
        h.fate = Fate::Join;
        Ok(())
    }

    // -- Queries -------------------------------------------------------------

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> RecipeState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == RecipeState::Frozen
    }

    /// Whether the recipe is frozen and fully resolved. Always false for
    /// drafts.
    pub fn is_resolved(&self) -> bool {
        self.is_frozen() && self.resolved
    }

    /// Elements recorded as unresolved by the last normalization.
    pub fn unresolved(&self) -> &[Unresolved] {
        &self.unresolved
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty() && self.handles.is_empty()
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.particles.values()
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(&id)
    }

    pub fn particle_ids(&self) -> Vec<ParticleId> {
        self.particles.keys().copied().collect()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = &Handle> + '_ {
        self.handles.values()
    }

    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.get(&id)
    }

    pub fn handle_ids(&self) -> Vec<HandleId> {
        self.handles.keys().copied().collect()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn connection_count(&self) -> usize {
        self.particles.values().map(|p| p.connections.len()).sum()
    }

    pub fn connection(&self, cref: &ConnectionRef) -> Option<&Connection> {
        self.particles.get(&cref.particle)?.connections.get(&cref.name)
    }

    /// Connections currently bound to `handle`.
    pub fn connections_of(&self, handle: HandleId) -> &[ConnectionRef] {
        self.bindings
            .get(&handle)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handles with no connections, in recipe order.
    pub fn free_handles(&self) -> Vec<HandleId> {
        self.handles
            .keys()
            .filter(|id| self.connections_of(**id).is_empty())
            .copied()
            .collect()
    }

    /// Connections with no handle, in recipe order.
    pub fn dangling_connections(&self) -> Vec<ConnectionRef> {
        self.particles
            .values()
            .flat_map(|p| {
                p.connections
                    .values()
                    .filter(|c| c.is_dangling())
                    .map(move |c| ConnectionRef::new(p.id, &c.name))
            })
            .collect()
    }

    pub fn handle_by_local_name(&self, name: &str) -> Option<HandleId> {
        self.handles
            .values()
            .find(|h| h.local_name.as_deref() == Some(name))
            .map(|h| h.id)
    }

    /// A fresh draft copy. Component ids are preserved so results can be
    /// related back to this recipe.
    pub fn to_draft(&self) -> Recipe {
        let mut draft = self.clone();
        draft.state = RecipeState::Draft;
        draft.resolved = false;
        draft.unresolved.clear();
        draft
    }

    // -- Normalizer-only -----------------------------------------------------

    /// Put particles and handles into the given order and sort every
    /// particle's connections by name. Ids not listed keep their relative
    /// order at the end.
    pub(crate) fn apply_order(&mut self, particles: &[ParticleId], handles: &[HandleId]) -> Result<()> {
        self.ensure_draft()?;

        let mut ordered_particles = IndexMap::with_capacity(self.particles.len());
        for id in particles {
            if let Some(p) = self.particles.shift_remove(id) {
                ordered_particles.insert(*id, p);
            }
        }
        ordered_particles.extend(self.particles.drain(..));
        for p in ordered_particles.values_mut() {
            p.connections.sort_keys();
        }
        self.particles = ordered_particles;

        let mut ordered_handles = IndexMap::with_capacity(self.handles.len());
        for id in handles {
            if let Some(h) = self.handles.shift_remove(id) {
                ordered_handles.insert(*id, h);
            }
        }
        ordered_handles.extend(self.handles.drain(..));
        self.handles = ordered_handles;

        let mut bindings = IndexMap::with_capacity(self.handles.len());
        for id in self.handles.keys() {
            let mut refs = self.bindings.shift_remove(id).unwrap_or_default();
            refs.sort();
            bindings.insert(*id, refs);
        }
        self.bindings = bindings;
        Ok(())
    }

    /// The one-way Draft → Frozen transition.
    pub(crate) fn freeze(&mut self, resolved: bool, unresolved: Vec<Unresolved>) {
        self.state = RecipeState::Frozen;
        self.resolved = resolved;
        self.unresolved = unresolved;
    }
}

impl fmt::Display for Recipe {
    /// Manifest-like rendering with positional handle names. Local names and
    /// component ids are left out, so structurally identical normalized
    /// recipes render identically.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: IndexMap<HandleId, String> = self
            .handles
            .keys()
            .enumerate()
            .map(|(i, id)| (*id, format!("handle{}", i)))
            .collect();
        let name_of = |id: &HandleId| names.get(id).map(String::as_str).unwrap_or("?");

        match &self.name {
            Some(name) => writeln!(f, "recipe {}", name)?,
            None => writeln!(f, "recipe")?,
        }
        for handle in self.handles.values() {
            write!(f, "  {}: {}", name_of(&handle.id), handle.fate)?;
            if !handle.joined.is_empty() {
                let joined: Vec<&str> = handle.joined.iter().map(name_of).collect();
                write!(f, " ({})", joined.join(", "))?;
            }
            if let Some(ref store) = handle.store {
                write!(f, " '{}'", store)?;
            }
            for tag in &handle.tags {
                write!(f, " #{}", tag)?;
            }
            if let Some(ref t) = handle.type_desc {
                write!(f, " : {}", t)?;
            }
            writeln!(f)?;
        }
        for particle in self.particles.values() {
            write!(f, "  {}", particle.name)?;
            for verb in &particle.verbs {
                write!(f, " &{}", verb)?;
            }
            for tag in &particle.tags {
                write!(f, " #{}", tag)?;
            }
            writeln!(f)?;
            for conn in particle.connections.values() {
                write!(f, "    {}: {}", conn.name, conn.direction)?;
                if let Some(ref h) = conn.handle {
                    write!(f, " {}", name_of(h))?;
                }
                for tag in &conn.tags {
                    write!(f, " #{}", tag)?;
                }
                if let Some(ref t) = conn.type_desc {
                    write!(f, " : {}", t)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer_pair() -> (Recipe, ParticleId, ParticleId, HandleId) {
        let mut r = Recipe::named("pair");
        let h = r.add_handle(Fate::Create).unwrap();
        let a = r.add_particle("A").unwrap();
        let b = r.add_particle("B").unwrap();
        r.add_connection(a, "a", Direction::Writes).unwrap();
        r.add_connection(b, "b", Direction::Reads).unwrap();
        r.bind(a, "a", h).unwrap();
        r.bind(b, "b", h).unwrap();
        (r, a, b, h)
    }

    #[test]
    fn test_rb010_new_recipe_is_draft() {
        let r = Recipe::new();
        assert_eq!(r.state(), RecipeState::Draft);
        assert!(!r.is_frozen());
        assert!(!r.is_resolved());
        assert!(r.is_empty());
    }

    #[test]
    fn test_rb010_bind_records_back_references() {
        let (r, a, b, h) = writer_pair();
        let refs = r.connections_of(h);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&ConnectionRef::new(a, "a")));
        assert!(refs.contains(&ConnectionRef::new(b, "b")));
        assert_eq!(r.particle(a).unwrap().connection("a").unwrap().handle(), Some(h));
    }

    #[test]
    fn test_rb010_rebind_moves_back_reference() {
        let (mut r, a, _, h) = writer_pair();
        let h2 = r.add_handle(Fate::Create).unwrap();
        r.bind(a, "a", h2).unwrap();
        assert_eq!(r.connections_of(h).len(), 1);
        assert_eq!(r.connections_of(h2), &[ConnectionRef::new(a, "a")]);
    }

    #[test]
    fn test_rb010_rebind_same_handle_is_single_entry() {
        let (mut r, a, _, h) = writer_pair();
        r.bind(a, "a", h).unwrap();
        assert_eq!(r.connections_of(h).len(), 2);
    }

    #[test]
    fn test_rb010_unbind_leaves_dangling() {
        let (mut r, a, _, h) = writer_pair();
        r.unbind(a, "a").unwrap();
        assert_eq!(r.connections_of(h).len(), 1);
        assert_eq!(r.dangling_connections(), vec![ConnectionRef::new(a, "a")]);
    }

    #[test]
    fn test_rb010_remove_particle_drops_back_references() {
        let (mut r, a, _, h) = writer_pair();
        r.remove_particle(a).unwrap();
        assert_eq!(r.particle_count(), 1);
        assert_eq!(r.connections_of(h).len(), 1);
        assert!(r.particle(a).is_none());
    }

    #[test]
    fn test_rb010_remove_connection() {
        let (mut r, _, b, h) = writer_pair();
        r.remove_connection(b, "b").unwrap();
        assert_eq!(r.connections_of(h).len(), 1);
        assert!(matches!(
            r.remove_connection(b, "b"),
            Err(RecipeError::UnknownConnection { .. })
        ));
    }

    #[test]
    fn test_rb010_remove_handle_in_use() {
        let (mut r, a, b, h) = writer_pair();
        assert_eq!(r.remove_handle(h), Err(RecipeError::HandleInUse(h)));
        r.unbind(a, "a").unwrap();
        r.unbind(b, "b").unwrap();
        r.remove_handle(h).unwrap();
        assert_eq!(r.handle_count(), 0);
    }

    #[test]
    fn test_rb010_remove_handle_clears_join_reference() {
        let mut r = Recipe::new();
        let x = r.add_handle(Fate::Use).unwrap();
        let y = r.add_handle(Fate::Use).unwrap();
        let j = r.add_handle(Fate::Create).unwrap();
        r.join(j, &[x, y]).unwrap();
        assert_eq!(r.handle(j).unwrap().fate(), Fate::Join);
        r.remove_handle(x).unwrap();
        assert_eq!(r.handle(j).unwrap().joined(), &[y]);
    }

    #[test]
    fn test_rb010_join_rejects_self_and_unknown() {
        let mut r = Recipe::new();
        let j = r.add_handle(Fate::Join).unwrap();
        assert_eq!(r.join(j, &[j]), Err(RecipeError::InvalidJoin(j)));
        assert_eq!(
            r.join(j, &[HandleId(99)]),
            Err(RecipeError::UnknownHandle(HandleId(99)))
        );
    }

    #[test]
    fn test_rb010_duplicate_connection() {
        let mut r = Recipe::new();
        let p = r.add_particle("P").unwrap();
        r.add_connection(p, "x", Direction::Reads).unwrap();
        assert!(matches!(
            r.add_connection(p, "x", Direction::Writes),
            Err(RecipeError::DuplicateConnection { .. })
        ));
    }

    #[test]
    fn test_rb010_empty_names_rejected() {
        let mut r = Recipe::new();
        assert_eq!(r.add_particle("  "), Err(RecipeError::EmptyName));
        let p = r.add_particle("P").unwrap();
        assert_eq!(r.add_connection(p, "", Direction::Reads), Err(RecipeError::EmptyName));
    }

    #[test]
    fn test_rb010_bind_unknown_components() {
        let mut r = Recipe::new();
        let p = r.add_particle("P").unwrap();
        r.add_connection(p, "x", Direction::Reads).unwrap();
        assert_eq!(
            r.bind(p, "x", HandleId(7)),
            Err(RecipeError::UnknownHandle(HandleId(7)))
        );
        let h = r.add_handle(Fate::Create).unwrap();
        assert_eq!(
            r.bind(ParticleId(42), "x", h),
            Err(RecipeError::UnknownParticle(ParticleId(42)))
        );
    }

    #[test]
    fn test_rb010_frozen_rejects_every_mutation() {
        let (mut r, a, _, h) = writer_pair();
        r.freeze(false, Vec::new());
        assert!(r.is_frozen());

        let frozen = Err(RecipeError::MutationAfterFreeze);
        assert_eq!(r.add_particle("C").map(|_| ()), frozen);
        assert_eq!(r.add_handle(Fate::Create).map(|_| ()), frozen);
        assert_eq!(r.remove_particle(a), frozen);
        assert_eq!(r.remove_handle(h), frozen);
        assert_eq!(r.add_connection(a, "z", Direction::Reads), frozen);
        assert_eq!(r.remove_connection(a, "a"), frozen);
        assert_eq!(r.bind(a, "a", h), frozen);
        assert_eq!(r.unbind(a, "a"), frozen);
        assert_eq!(r.set_fate(h, Fate::Use), frozen);
        assert_eq!(r.set_store(h, Some("s")), frozen);
        assert_eq!(r.set_tags(h, ["t"]), frozen);
        assert_eq!(r.set_handle_type(h, None), frozen);
        assert_eq!(r.set_local_name(h, Some("n")), frozen);
        assert_eq!(r.join(h, &[]), frozen);
        assert_eq!(r.set_verbs(a, ["v"]), frozen);
        assert_eq!(r.set_particle_tags(a, ["t"]), frozen);
        assert_eq!(r.attach_spec(a, Arc::new(ParticleSpec::new("A"))), frozen);
        assert_eq!(r.set_connection_type(a, "a", None), frozen);
        assert_eq!(r.set_connection_tags(a, "a", ["t"]), frozen);
        assert_eq!(r.set_name(None), frozen);
        assert_eq!(r.apply_order(&[], &[]), frozen);

        // Nothing changed.
        assert_eq!(r.particle_count(), 2);
        assert_eq!(r.handle_count(), 1);
        assert_eq!(r.connections_of(h).len(), 2);
    }

    #[test]
    fn test_rb010_to_draft_unfreezes_copy_only() {
        let (mut r, _, _, _) = writer_pair();
        r.freeze(true, Vec::new());
        let draft = r.to_draft();
        assert!(r.is_frozen());
        assert!(r.is_resolved());
        assert!(!draft.is_frozen());
        assert!(!draft.is_resolved());
        assert_eq!(draft.particle_ids(), r.particle_ids());
        assert_eq!(draft.to_string(), r.to_string());
    }

    #[test]
    fn test_rb010_free_handles() {
        let (mut r, _, _, _) = writer_pair();
        let free = r.add_handle(Fate::Create).unwrap();
        assert_eq!(r.free_handles(), vec![free]);
    }

    #[test]
    fn test_rb010_apply_order() {
        let mut r = Recipe::new();
        let p0 = r.add_particle("Z").unwrap();
        let p1 = r.add_particle("A").unwrap();
        r.add_connection(p1, "zeta", Direction::Reads).unwrap();
        r.add_connection(p1, "alpha", Direction::Reads).unwrap();
        let h0 = r.add_handle(Fate::Create).unwrap();
        let h1 = r.add_handle(Fate::Create).unwrap();
        r.apply_order(&[p1, p0], &[h1, h0]).unwrap();
        assert_eq!(r.particle_ids(), vec![p1, p0]);
        assert_eq!(r.handle_ids(), vec![h1, h0]);
        let names: Vec<&str> = r.particle(p1).unwrap().connections().map(|c| c.name()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_rb010_display() {
        let (mut r, a, _, h) = writer_pair();
        r.set_store(h, Some("store-1")).unwrap();
        r.set_tags(h, ["shared"]).unwrap();
        r.set_verbs(a, ["make"]).unwrap();
        let text = r.to_string();
        assert!(text.starts_with("recipe pair\n"));
        assert!(text.contains("  handle0: create 'store-1' #shared\n"));
        assert!(text.contains("  A &make\n    a: writes handle0\n"));
        assert!(text.contains("    b: reads handle0\n"));
    }

    #[test]
    fn test_rb010_display_ignores_local_names() {
        let (mut r1, _, _, h) = writer_pair();
        let (r2, _, _, _) = writer_pair();
        r1.set_local_name(h, Some("products")).unwrap();
        assert_eq!(r1.to_string(), r2.to_string());
        assert_eq!(r1.handle_by_local_name("products"), Some(h));
    }

    #[test]
    fn test_rb010_unresolved_display() {
        let u = Unresolved::DanglingConnection {
            particle: ParticleId(0),
            particle_name: "A".to_string(),
            connection: "out".to_string(),
        };
        assert_eq!(u.to_string(), "connection A::out: missing handle");
        let u = Unresolved::UnsatisfiedFate {
            handle: HandleId(2),
            fate: Fate::Use,
            reason: "no store".to_string(),
        };
        assert_eq!(u.to_string(), "handle h2 (use): no store");
    }
}
