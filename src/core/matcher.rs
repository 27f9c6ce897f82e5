//! RB-050: Backtracking search for structural correspondences between a
//! recipe and a shape.
//!
//! The search walks an explicit frontier of partial assignments. Roles are
//! assigned first, in shape order, then every variable no role has bound is
//! offered the recipe's free handles. Inconsistent branches are dropped as
//! soon as they are generated, so the frontier only ever holds consistent
//! partial matches.
//!
//! Penalties (only their ordering matters):
//!
//! | Outcome | Penalty |
//! |---------|---------|
//! | role unmatched | −2 |
//! | variable unmatched | −2 |
//! | constrained connection dangling | −1 (each) |
//! | variable bound to a free handle | −1 |

use super::recipe::{Particle, Recipe};
use super::shape::{recipe_to_shape, Shape, ShapeRole};
use super::types::{HandleId, ParticleId};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

const UNMATCHED_ROLE: i32 = -2;
const UNMATCHED_VARIABLE: i32 = -2;
const DANGLING_CONNECTION: i32 = -1;
const FREE_HANDLE_FALLBACK: i32 = -1;

/// Decides whether a particle can play a role.
pub trait RolePredicate {
    fn accepts(&self, role: &ShapeRole, particle: &Particle) -> bool;
}

/// Role matches particles with exactly the role's particle name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactName;

impl RolePredicate for ExactName {
    fn accepts(&self, role: &ShapeRole, particle: &Particle) -> bool {
        particle.name() == role.particle()
    }
}

/// What a role or variable is bound to in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    Particle { id: ParticleId },
    Handle { id: HandleId },
    /// A role's constrained connection exists but is unbound.
    Dangling { role: String, connection: String },
    Unmatched,
}

impl Binding {
    /// The `"<role>:<connection>"` marker of a dangling binding.
    pub fn marker(&self) -> Option<String> {
        match self {
            Self::Dangling { role, connection } => Some(format!("{}:{}", role, connection)),
            _ => None,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Particle { id } => write!(f, "{}", id),
            Self::Handle { id } => write!(f, "{}", id),
            Self::Dangling { role, connection } => write!(f, "{}:{}", role, connection),
            Self::Unmatched => write!(f, "-"),
        }
    }
}

/// One correspondence: every role and variable name mapped to a binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub bindings: IndexMap<String, Binding>,
    pub score: i32,
}

impl Match {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Particle bound to `role`, if any.
    pub fn particle(&self, role: &str) -> Option<ParticleId> {
        match self.bindings.get(role) {
            Some(Binding::Particle { id }) => Some(*id),
            _ => None,
        }
    }

    /// Concrete handle bound to `variable`, if any.
    pub fn handle(&self, variable: &str) -> Option<HandleId> {
        match self.bindings.get(variable) {
            Some(Binding::Handle { id }) => Some(*id),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.score == 0
    }
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum VarState {
    Unset,
    Direct(HandleId),
    Free(HandleId),
    Dangling { role: String, connection: String },
}

impl VarState {
    fn handle(&self) -> Option<HandleId> {
        match self {
            Self::Direct(h) | Self::Free(h) => Some(*h),
            _ => None,
        }
    }
}

/// A consistent partial assignment.
#[derive(Debug, Clone)]
struct Partial {
    step: usize,
    roles: Vec<Option<ParticleId>>,
    vars: Vec<VarState>,
    /// Constrained role connections found dangling.
    dangling: usize,
}

/// Steppable search state. `step` expands one frontier entry; `run` drives
/// the search to completion.
pub struct ShapeSearch<'a> {
    recipe: &'a Recipe,
    roles: Vec<&'a ShapeRole>,
    variables: Vec<&'a str>,
    predicate: &'a dyn RolePredicate,
    free_handles: Vec<HandleId>,
    frontier: Vec<Partial>,
    results: Vec<Match>,
    expanded: usize,
}

impl<'a> ShapeSearch<'a> {
    pub fn new(recipe: &'a Recipe, shape: &'a Shape, predicate: &'a dyn RolePredicate) -> Self {
        let roles: Vec<&ShapeRole> = shape.roles().collect();
        let variables: Vec<&str> = shape.variables().collect();
        let initial = Partial {
            step: 0,
            roles: vec![None; roles.len()],
            vars: vec![VarState::Unset; variables.len()],
            dangling: 0,
        };
        Self {
            recipe,
            roles,
            variables,
            predicate,
            free_handles: recipe.free_handles(),
            frontier: vec![initial],
            results: Vec::new(),
            expanded: 0,
        }
    }

    /// Number of partial assignments waiting to be expanded.
    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_done(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Matches completed so far, in discovery order.
    pub fn matches(&self) -> &[Match] {
        &self.results
    }

    /// Expand one partial assignment. Returns false once the frontier is
    /// exhausted.
    pub fn step(&mut self) -> bool {
        let Some(partial) = self.frontier.pop() else {
            return false;
        };
        self.expanded += 1;

        let role_steps = self.roles.len();
        let total = role_steps + self.variables.len();

        if partial.step >= total {
            let found = self.complete(&partial);
            if !self.results.contains(&found) {
                self.results.push(found);
            }
        } else if partial.step < role_steps {
            let children = self.expand_role(&partial);
            // Reverse so candidates pop in recipe order.
            self.frontier.extend(children.into_iter().rev());
        } else {
            let children = self.expand_variable(&partial);
            self.frontier.extend(children.into_iter().rev());
        }
        true
    }

    /// Run to completion; matches ordered by descending score, ties in
    /// discovery order.
    pub fn run(mut self) -> Vec<Match> {
        while self.step() {}
        self.results.sort_by(|a, b| b.score.cmp(&a.score));
        tracing::debug!(
            "shape search finished: {} match(es) after {} expansion(s)",
            self.results.len(),
            self.expanded
        );
        self.results
    }

    fn expand_role(&self, partial: &Partial) -> Vec<Partial> {
        let index = partial.step;
        let role = self.roles[index];

        let mut children: Vec<Partial> = self
            .recipe
            .particles()
            .filter(|p| !partial.roles.contains(&Some(p.id())))
            .filter(|p| self.predicate.accepts(role, p))
            .filter_map(|p| self.assign(partial, index, role, p))
            .collect();

        if children.is_empty() {
            let mut unmatched = partial.clone();
            unmatched.step += 1;
            children.push(unmatched);
        }
        children
    }

    /// Try `particle` for `role`; `None` when the binding is inconsistent.
    fn assign(
        &self,
        partial: &Partial,
        index: usize,
        role: &ShapeRole,
        particle: &Particle,
    ) -> Option<Partial> {
        let mut next = partial.clone();
        next.roles[index] = Some(particle.id());
        next.step += 1;

        for (conn_name, var) in role.constraints() {
            let conn = particle.connection(conn_name)?;
            let Some(var) = var else {
                // Connection must stay dangling.
                if !conn.is_dangling() {
                    return None;
                }
                continue;
            };
            let slot = self.variables.iter().position(|v| *v == var)?;

            match conn.handle() {
                Some(handle) => {
                    match &next.vars[slot] {
                        VarState::Direct(bound) if *bound != handle => return None,
                        VarState::Direct(_) => {}
                        _ => {
                            let taken = next
                                .vars
                                .iter()
                                .enumerate()
                                .any(|(i, s)| i != slot && s.handle() == Some(handle));
                            if taken {
                                return None;
                            }
                            next.vars[slot] = VarState::Direct(handle);
                        }
                    }
                }
                None => {
                    next.dangling += 1;
                    if next.vars[slot] == VarState::Unset {
                        next.vars[slot] = VarState::Dangling {
                            role: role.label().to_string(),
                            connection: conn_name.to_string(),
                        };
                    }
                }
            }
        }
        Some(next)
    }

    fn expand_variable(&self, partial: &Partial) -> Vec<Partial> {
        let slot = partial.step - self.roles.len();
        let mut advance = partial.clone();
        advance.step += 1;

        if partial.vars[slot] != VarState::Unset {
            return vec![advance];
        }

        let children: Vec<Partial> = self
            .free_handles
            .iter()
            .filter(|h| !partial.vars.iter().any(|s| s.handle() == Some(**h)))
            .map(|h| {
                let mut next = advance.clone();
                next.vars[slot] = VarState::Free(*h);
                next
            })
            .collect();

        if children.is_empty() {
            vec![advance]
        } else {
            children
        }
    }

    fn complete(&self, partial: &Partial) -> Match {
        let mut bindings = IndexMap::new();
        let mut score = DANGLING_CONNECTION * partial.dangling as i32;

        for (role, assigned) in self.roles.iter().zip(&partial.roles) {
            let binding = match assigned {
                Some(id) => Binding::Particle { id: *id },
                None => {
                    score += UNMATCHED_ROLE;
                    Binding::Unmatched
                }
            };
            bindings.insert(role.label().to_string(), binding);
        }

        for (name, state) in self.variables.iter().zip(&partial.vars) {
            let binding = match state {
                VarState::Direct(h) => Binding::Handle { id: *h },
                VarState::Free(h) => {
                    score += FREE_HANDLE_FALLBACK;
                    Binding::Handle { id: *h }
                }
                VarState::Dangling { role, connection } => Binding::Dangling {
                    role: role.clone(),
                    connection: connection.clone(),
                },
                VarState::Unset => {
                    score += UNMATCHED_VARIABLE;
                    Binding::Unmatched
                }
            };
            bindings.insert(name.to_string(), binding);
        }

        Match { bindings, score }
    }
}

/// All distinct matches of `shape` in `recipe`, best first. Never empty.
pub fn find(recipe: &Recipe, shape: &Shape) -> Vec<Match> {
    find_with(recipe, shape, &ExactName)
}

/// `find` with a custom role predicate.
pub fn find_with(recipe: &Recipe, shape: &Shape, predicate: &dyn RolePredicate) -> Vec<Match> {
    ShapeSearch::new(recipe, shape, predicate).run()
}

/// Whether `a` and `b` are structurally equal: a bijection between their
/// particles and handles preserves every connection binding and direction.
pub fn matches_recipe(a: &Recipe, b: &Recipe) -> bool {
    if a.particle_count() != b.particle_count()
        || a.handle_count() != b.handle_count()
        || a.connection_count() != b.connection_count()
        || a.free_handles().len() != b.free_handles().len()
    {
        return false;
    }

    let shape = recipe_to_shape(b);
    find(a, &shape)
        .iter()
        .filter(|m| m.is_complete())
        .any(|m| directions_agree(a, b, &shape, m))
}

fn directions_agree(a: &Recipe, b: &Recipe, shape: &Shape, m: &Match) -> bool {
    shape.roles().zip(b.particles()).all(|(role, theirs)| {
        let Some(ours) = m.particle(role.label()).and_then(|id| a.particle(id)) else {
            return false;
        };
        theirs.connections().all(|c| {
            ours.connection(c.name())
                .is_some_and(|mine| mine.direction() == c.direction())
        })
    })
}
