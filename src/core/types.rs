//! RB-001: Shared types. Component ids, directions, fates, particle specs,
//! store descriptors, and the YAML document schema.
//!
//! The document types (`RecipeDoc`, `ShapeDoc`, `ContextDoc`) derive
//! Serialize/Deserialize for YAML roundtripping. The core graph never sees
//! them directly; `parser` converts documents into graph values.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Component identities
// ============================================================================

/// Stable identity of a particle within one recipe (and its clones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticleId(pub u32);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Stable identity of a handle within one recipe (and its clones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Identity of a connection: owning particle plus connection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionRef {
    pub particle: ParticleId,
    pub name: String,
}

impl ConnectionRef {
    pub fn new(particle: ParticleId, name: &str) -> Self {
        Self {
            particle,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.particle, self.name)
    }
}

// ============================================================================
// Direction / Fate
// ============================================================================

/// Direction of a connection relative to its particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Reads,
    Writes,
    ReadsWrites,
    Hosts,
    Provides,
}

impl Direction {
    /// Whether data flows from the handle into the particle.
    pub fn reads(self) -> bool {
        matches!(self, Self::Reads | Self::ReadsWrites)
    }

    /// Whether data flows from the particle into the handle.
    pub fn writes(self) -> bool {
        matches!(self, Self::Writes | Self::ReadsWrites)
    }

    /// Whether a connection declared with `self` satisfies a spec that
    /// declares `spec`. A read-write spec may be narrowed to either half.
    pub fn satisfies(self, spec: Direction) -> bool {
        self == spec || (spec == Self::ReadsWrites && matches!(self, Self::Reads | Self::Writes))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reads => write!(f, "reads"),
            Self::Writes => write!(f, "writes"),
            Self::ReadsWrites => write!(f, "reads writes"),
            Self::Hosts => write!(f, "hosts"),
            Self::Provides => write!(f, "provides"),
        }
    }
}

/// How a handle's backing store is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fate {
    Create,
    Use,
    Map,
    Copy,
    Join,
}

impl Fate {
    /// Fates that bind to an existing, externally provided store.
    pub fn needs_store(self) -> bool {
        matches!(self, Self::Use | Self::Map | Self::Copy)
    }

    /// Fates whose handles may never be written through.
    pub fn read_only(self) -> bool {
        matches!(self, Self::Map | Self::Join)
    }
}

impl fmt::Display for Fate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Use => write!(f, "use"),
            Self::Map => write!(f, "map"),
            Self::Copy => write!(f, "copy"),
            Self::Join => write!(f, "join"),
        }
    }
}

// ============================================================================
// Types, specs, stores
// ============================================================================

/// Opaque type descriptor (e.g. `Product`, `[Product]`). Two descriptors are
/// compatible iff they are textually equal after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDescriptor(pub String);

impl TypeDescriptor {
    pub fn new(s: &str) -> Self {
        Self(s.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_compatible(&self, other: &TypeDescriptor) -> bool {
        self.0.trim() == other.0.trim()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection declared by a particle spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub direction: Direction,

    /// Declared type, if any
    #[serde(rename = "type", default)]
    pub type_desc: Option<TypeDescriptor>,

    /// Optional connections may stay dangling in a resolved recipe
    #[serde(default)]
    pub optional: bool,
}

/// Externally resolvable particle implementation description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpec {
    pub name: String,

    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub connections: IndexMap<String, ConnectionSpec>,
}

impl ParticleSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verbs: Vec::new(),
            connections: IndexMap::new(),
        }
    }

    /// Builder-style helper for declaring a connection.
    pub fn with_connection(
        mut self,
        name: &str,
        direction: Direction,
        type_desc: Option<&str>,
        optional: bool,
    ) -> Self {
        self.connections.insert(
            name.to_string(),
            ConnectionSpec {
                direction,
                type_desc: type_desc.map(TypeDescriptor::new),
                optional,
            },
        );
        self
    }
}

/// A concrete store available for Use/Map/Copy resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub id: String,

    #[serde(rename = "type", default)]
    pub type_desc: Option<TypeDescriptor>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// A validation finding. Validation collects these instead of stopping at
/// the first problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// YAML documents
// ============================================================================

/// recipe.yaml: a draft recipe as written by hand or emitted by a parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDoc {
    /// Optional recipe name
    #[serde(default)]
    pub name: Option<String>,

    /// Handles keyed by local name (order-preserving)
    #[serde(default)]
    pub handles: IndexMap<String, HandleDoc>,

    /// Particles in declaration order
    #[serde(default)]
    pub particles: Vec<ParticleDoc>,
}

/// A handle declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleDoc {
    pub fate: Fate,

    /// Concrete store id (use/map/copy)
    #[serde(default)]
    pub store: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(rename = "type", default)]
    pub type_desc: Option<String>,

    /// Local names of joined handles (join fate only)
    #[serde(default)]
    pub join: Vec<String>,
}

/// A particle declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleDoc {
    pub name: String,

    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub connections: IndexMap<String, ConnectionDoc>,
}

/// A connection declaration. A missing `handle` leaves it dangling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDoc {
    pub direction: Direction,

    #[serde(default)]
    pub handle: Option<String>,

    #[serde(rename = "type", default)]
    pub type_desc: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// shape.yaml: roles, variables, and per-role connection constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeDoc {
    pub roles: Vec<String>,

    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default)]
    pub constraints: IndexMap<String, IndexMap<String, String>>,
}

/// context.yaml: the read-only snapshot a recipe is resolved against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDoc {
    /// Particle specs keyed by particle name
    #[serde(default)]
    pub particles: IndexMap<String, SpecDoc>,

    /// Stores keyed by store id
    #[serde(default)]
    pub stores: IndexMap<String, StoreDoc>,
}

/// A particle spec entry of the context file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecDoc {
    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub connections: IndexMap<String, ConnectionSpec>,
}

/// A store entry of the context file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDoc {
    #[serde(rename = "type", default)]
    pub type_desc: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rb001_recipe_doc_parse() {
        let yaml = r#"
name: products
handles:
  list:
    fate: use
    store: products-store
    tags: [shortlist]
    type: "[Product]"
  shown:
    fate: create
particles:
  - name: ShowProducts
    verbs: [show]
    connections:
      list:
        direction: reads
        handle: list
      out:
        direction: writes
        handle: shown
  - name: Logger
    connections:
      sink:
        direction: reads_writes
"#;
        let doc: RecipeDoc = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(doc.name.as_deref(), Some("products"));
        assert_eq!(doc.handles.len(), 2);
        assert_eq!(doc.handles["list"].fate, Fate::Use);
        assert_eq!(doc.handles["list"].type_desc.as_deref(), Some("[Product]"));
        assert_eq!(doc.particles.len(), 2);
        assert_eq!(doc.particles[0].connections["list"].direction, Direction::Reads);
        assert!(doc.particles[1].connections["sink"].handle.is_none());
        assert_eq!(
            doc.particles[1].connections["sink"].direction,
            Direction::ReadsWrites
        );
    }

    #[test]
    fn test_rb001_context_doc_parse() {
        let yaml = r#"
particles:
  ShowProducts:
    verbs: [show]
    connections:
      list:
        direction: reads
        type: "[Product]"
      extra:
        direction: writes
        optional: true
stores:
  products-store:
    type: "[Product]"
    tags: [shortlist]
"#;
        let doc: ContextDoc = serde_yaml_ng::from_str(yaml).unwrap();
        let spec = &doc.particles["ShowProducts"];
        assert_eq!(spec.connections.len(), 2);
        assert!(spec.connections["extra"].optional);
        assert!(!spec.connections["list"].optional);
        assert_eq!(doc.stores["products-store"].tags, vec!["shortlist"]);
    }

    #[test]
    fn test_rb001_shape_doc_parse() {
        let yaml = r#"
roles: [A, B]
variables: [v]
constraints:
  A: { a: v }
  B: { b: v }
"#;
        let doc: ShapeDoc = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(doc.roles, vec!["A", "B"]);
        assert_eq!(doc.constraints["B"]["b"], "v");
    }

    #[test]
    fn test_rb001_direction_display() {
        assert_eq!(Direction::Reads.to_string(), "reads");
        assert_eq!(Direction::ReadsWrites.to_string(), "reads writes");
        assert_eq!(Direction::Provides.to_string(), "provides");
    }

    #[test]
    fn test_rb001_direction_satisfies() {
        assert!(Direction::Reads.satisfies(Direction::Reads));
        assert!(Direction::Reads.satisfies(Direction::ReadsWrites));
        assert!(Direction::Writes.satisfies(Direction::ReadsWrites));
        assert!(!Direction::ReadsWrites.satisfies(Direction::Reads));
        assert!(!Direction::Hosts.satisfies(Direction::ReadsWrites));
    }

    #[test]
    fn test_rb001_fate_properties() {
        assert!(Fate::Use.needs_store());
        assert!(Fate::Copy.needs_store());
        assert!(!Fate::Create.needs_store());
        assert!(Fate::Map.read_only());
        assert!(Fate::Join.read_only());
        assert!(!Fate::Use.read_only());
        assert_eq!(Fate::Join.to_string(), "join");
    }

    #[test]
    fn test_rb001_type_descriptor_compat() {
        let a = TypeDescriptor::new(" [Product] ");
        let b = TypeDescriptor::new("[Product]");
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&TypeDescriptor::new("Product")));
    }

    #[test]
    fn test_rb001_ids_display() {
        assert_eq!(ParticleId(3).to_string(), "p3");
        assert_eq!(HandleId(0).to_string(), "h0");
        assert_eq!(ConnectionRef::new(ParticleId(1), "out").to_string(), "p1:out");
    }

    #[test]
    fn test_rb001_spec_builder() {
        let spec = ParticleSpec::new("A")
            .with_connection("a", Direction::Writes, Some("Thing"), false)
            .with_connection("b", Direction::Reads, None, true);
        assert_eq!(spec.connections.len(), 2);
        assert!(spec.connections["b"].optional);
        assert_eq!(
            spec.connections["a"].type_desc,
            Some(TypeDescriptor::new("Thing"))
        );
    }
}
