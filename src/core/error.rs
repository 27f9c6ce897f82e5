//! RB-002: Errors for illegal API usage.
//!
//! Ordinary outcomes (a recipe that does not normalize, an unresolved
//! recipe, a shape with no counterpart) are data, not errors. Only misuse of
//! the graph and shape APIs produces a `RecipeError`.

use super::types::{HandleId, ParticleId};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    /// Structural change attempted on a frozen recipe.
    MutationAfterFreeze,
    EmptyName,
    UnknownParticle(ParticleId),
    UnknownHandle(HandleId),
    UnknownConnection { particle: ParticleId, name: String },
    DuplicateConnection { particle: ParticleId, name: String },
    /// Handle removal while connections still point at it.
    HandleInUse(HandleId),
    /// A join handle listing itself.
    InvalidJoin(HandleId),
    /// Shape referencing undeclared roles/variables, or declaring duplicates.
    MalformedShape(String),
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MutationAfterFreeze => write!(f, "recipe is frozen; structural mutation rejected"),
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::UnknownParticle(id) => write!(f, "unknown particle {}", id),
            Self::UnknownHandle(id) => write!(f, "unknown handle {}", id),
            Self::UnknownConnection { particle, name } => {
                write!(f, "particle {} has no connection '{}'", particle, name)
            }
            Self::DuplicateConnection { particle, name } => {
                write!(f, "particle {} already has a connection '{}'", particle, name)
            }
            Self::HandleInUse(id) => write!(f, "handle {} still has connections", id),
            Self::InvalidJoin(id) => write!(f, "handle {} cannot join itself", id),
            Self::MalformedShape(msg) => write!(f, "malformed shape: {}", msg),
        }
    }
}

impl std::error::Error for RecipeError {}

pub type Result<T> = std::result::Result<T, RecipeError>;
