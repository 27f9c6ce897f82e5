//! RB-040: Shapes, the abstract role/variable patterns matched against recipes.

use super::error::{RecipeError, Result};
use super::recipe::Recipe;
use indexmap::{IndexMap, IndexSet};

/// One role of a shape: the particle it requires and the connections that
/// particle must expose.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRole {
    label: String,
    particle: String,
    /// Connection name → variable. `None` requires the connection to be
    /// dangling.
    connections: IndexMap<String, Option<String>>,
}

impl ShapeRole {
    /// Unique label of the role within its shape.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Particle name the role asks for.
    pub fn particle(&self) -> &str {
        &self.particle
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.connections
            .iter()
            .map(|(conn, var)| (conn.as_str(), var.as_deref()))
    }

    pub fn constraint_count(&self) -> usize {
        self.connections.len()
    }
}

/// Ordered roles, ordered variables, per-role connection constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    roles: IndexMap<String, ShapeRole>,
    variables: IndexSet<String>,
}

impl Shape {
    pub fn roles(&self) -> impl Iterator<Item = &ShapeRole> + '_ {
        self.roles.values()
    }

    pub fn role(&self, label: &str) -> Option<&ShapeRole> {
        self.roles.get(label)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.variables.iter().map(String::as_str)
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}

/// Build a shape. Each role names a particle by exact name; `constraints`
/// maps role → connection name → variable.
///
/// Referencing an undeclared role or variable, declaring a name twice, or
/// using one name for both a role and a variable is `MalformedShape`.
pub fn make_shape<S: AsRef<str>>(
    roles: &[S],
    variables: &[S],
    constraints: &IndexMap<String, IndexMap<String, String>>,
) -> Result<Shape> {
    let mut shape = Shape {
        roles: IndexMap::new(),
        variables: IndexSet::new(),
    };

    for role in roles.iter().map(|r| r.as_ref()) {
        if role.trim().is_empty() {
            return Err(RecipeError::MalformedShape("empty role name".to_string()));
        }
        let entry = ShapeRole {
            label: role.to_string(),
            particle: role.to_string(),
            connections: IndexMap::new(),
        };
        if shape.roles.insert(role.to_string(), entry).is_some() {
            return Err(RecipeError::MalformedShape(format!(
                "role '{}' declared twice",
                role
            )));
        }
    }

    for var in variables.iter().map(|v| v.as_ref()) {
        if var.trim().is_empty() {
            return Err(RecipeError::MalformedShape("empty variable name".to_string()));
        }
        if shape.roles.contains_key(var) {
            return Err(RecipeError::MalformedShape(format!(
                "'{}' is declared as both a role and a variable",
                var
            )));
        }
        if !shape.variables.insert(var.to_string()) {
            return Err(RecipeError::MalformedShape(format!(
                "variable '{}' declared twice",
                var
            )));
        }
    }

    for (role, conns) in constraints {
        let Some(entry) = shape.roles.get_mut(role) else {
            return Err(RecipeError::MalformedShape(format!(
                "constraint for undeclared role '{}'",
                role
            )));
        };
        for (conn, var) in conns {
            if !shape.variables.contains(var) {
                return Err(RecipeError::MalformedShape(format!(
                    "role '{}' connection '{}' references undeclared variable '{}'",
                    role, conn, var
                )));
            }
            entry.connections.insert(conn.clone(), Some(var.clone()));
        }
    }

    Ok(shape)
}

/// The shape of a concrete recipe: one role per particle, one variable per
/// connected handle, dangling connections required to stay dangling.
///
/// Roles of particles sharing a name are labelled `Name`, `Name#1`, ...
pub fn recipe_to_shape(recipe: &Recipe) -> Shape {
    let mut roles: IndexMap<String, ShapeRole> = IndexMap::new();
    let mut seen: IndexMap<&str, usize> = IndexMap::new();
    for particle in recipe.particles() {
        let count = seen.entry(particle.name()).or_insert(0);
        let mut label = match *count {
            0 => particle.name().to_string(),
            n => format!("{}#{}", particle.name(), n),
        };
        *count += 1;
        while roles.contains_key(&label) {
            label.push('\'');
        }
        roles.insert(
            label.clone(),
            ShapeRole {
                label,
                particle: particle.name().to_string(),
                connections: IndexMap::new(),
            },
        );
    }

    let mut variables: IndexMap<_, String> = IndexMap::new();
    for (i, handle) in recipe
        .handles()
        .filter(|h| !recipe.connections_of(h.id()).is_empty())
        .enumerate()
    {
        let mut name = format!("handle{}", i);
        while roles.contains_key(&name) {
            name.insert(0, '_');
        }
        variables.insert(handle.id(), name);
    }

    for (role, particle) in roles.values_mut().zip(recipe.particles()) {
        for conn in particle.connections() {
            let var = conn.handle().and_then(|h| variables.get(&h)).cloned();
            role.connections.insert(conn.name().to_string(), var);
        }
    }

    Shape {
        roles,
        variables: variables.into_values().collect(),
    }
}

#[cfg(test)]
pub(crate) fn constraints(list: &[(&str, &str, &str)]) -> IndexMap<String, IndexMap<String, String>> {
    let mut map: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    for (role, conn, var) in list {
        map.entry(role.to_string())
            .or_default()
            .insert(conn.to_string(), var.to_string());
    }
    map
}
