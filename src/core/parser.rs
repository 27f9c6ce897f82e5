//! RB-080: YAML front-end. Parse, validate, and build recipes, shapes, and
//! contexts from documents.

use super::context::Context;
use super::recipe::Recipe;
use super::shape::{make_shape, Shape};
use super::types::*;
use std::path::Path;

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))
}

fn joined(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Recipes
// ============================================================================

/// Parse a recipe.yaml file from disk.
pub fn parse_recipe_file(path: &Path) -> Result<RecipeDoc, String> {
    parse_recipe(&read(path)?)
}

/// Parse a recipe.yaml from a string.
pub fn parse_recipe(yaml: &str) -> Result<RecipeDoc, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed recipe document. Returns a list of errors (empty = valid).
pub fn validate_recipe_doc(doc: &RecipeDoc) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (name, handle) in &doc.handles {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("handle name must not be empty"));
        }
        if handle.type_desc.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push(ValidationError::new(format!(
                "handle '{}' has an empty type",
                name
            )));
        }
        if !handle.join.is_empty() && handle.fate != Fate::Join {
            errors.push(ValidationError::new(format!(
                "handle '{}' joins handles but its fate is {}",
                name, handle.fate
            )));
        }
        for j in &handle.join {
            if j == name {
                errors.push(ValidationError::new(format!("handle '{}' joins itself", name)));
            } else if !doc.handles.contains_key(j) {
                errors.push(ValidationError::new(format!(
                    "handle '{}' joins unknown handle '{}'",
                    name, j
                )));
            }
        }
    }

    for (i, particle) in doc.particles.iter().enumerate() {
        if particle.name.trim().is_empty() {
            errors.push(ValidationError::new(format!(
                "particle #{} has an empty name",
                i
            )));
        }
        for (conn_name, conn) in &particle.connections {
            if conn_name.trim().is_empty() {
                errors.push(ValidationError::new(format!(
                    "particle '{}' has a connection with an empty name",
                    particle.name
                )));
            }
            if let Some(ref h) = conn.handle {
                if !doc.handles.contains_key(h) {
                    errors.push(ValidationError::new(format!(
                        "connection {}::{} references unknown handle '{}'",
                        particle.name, conn_name, h
                    )));
                }
            }
        }
    }

    errors
}

/// Build a draft recipe from a validated document.
pub fn build_recipe(doc: &RecipeDoc) -> Result<Recipe, String> {
    let errors = validate_recipe_doc(doc);
    if !errors.is_empty() {
        return Err(format!("invalid recipe: {}", joined(&errors)));
    }

    let mut recipe = Recipe::new();
    let err = |e: super::error::RecipeError| e.to_string();
    recipe.set_name(doc.name.as_deref()).map_err(err)?;

    for (name, h) in &doc.handles {
        let id = recipe.add_handle(h.fate).map_err(err)?;
        recipe.set_local_name(id, Some(name)).map_err(err)?;
        recipe.set_store(id, h.store.as_deref()).map_err(err)?;
        recipe.set_tags(id, h.tags.iter().cloned()).map_err(err)?;
        recipe
            .set_handle_type(id, h.type_desc.as_deref().map(TypeDescriptor::new))
            .map_err(err)?;
    }
    for (name, h) in doc.handles.iter().filter(|(_, h)| !h.join.is_empty()) {
        let lookup = |n: &str| {
            recipe
                .handle_by_local_name(n)
                .ok_or_else(|| format!("unknown handle '{}'", n))
        };
        let id = lookup(name.as_str())?;
        let members = h
            .join
            .iter()
            .map(|n| lookup(n.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        recipe.join(id, &members).map_err(err)?;
    }

    for p in &doc.particles {
        let pid = recipe.add_particle(&p.name).map_err(err)?;
        recipe.set_verbs(pid, p.verbs.iter().cloned()).map_err(err)?;
        recipe.set_particle_tags(pid, p.tags.iter().cloned()).map_err(err)?;
        for (conn_name, c) in &p.connections {
            recipe.add_connection(pid, conn_name, c.direction).map_err(err)?;
            recipe
                .set_connection_type(pid, conn_name, c.type_desc.as_deref().map(TypeDescriptor::new))
                .map_err(err)?;
            recipe
                .set_connection_tags(pid, conn_name, c.tags.iter().cloned())
                .map_err(err)?;
            if let Some(ref h) = c.handle {
                let hid = recipe
                    .handle_by_local_name(h)
                    .ok_or_else(|| format!("unknown handle '{}'", h))?;
                recipe.bind(pid, conn_name, hid).map_err(err)?;
            }
        }
    }

    Ok(recipe)
}

/// Parse, validate, and build a recipe file in one step.
pub fn load_recipe(path: &Path) -> Result<Recipe, String> {
    build_recipe(&parse_recipe_file(path)?)
}

// ============================================================================
// Shapes
// ============================================================================

pub fn parse_shape_file(path: &Path) -> Result<ShapeDoc, String> {
    parse_shape(&read(path)?)
}

pub fn parse_shape(yaml: &str) -> Result<ShapeDoc, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

pub fn build_shape(doc: &ShapeDoc) -> Result<Shape, String> {
    make_shape(&doc.roles, &doc.variables, &doc.constraints).map_err(|e| e.to_string())
}

pub fn load_shape(path: &Path) -> Result<Shape, String> {
    build_shape(&parse_shape_file(path)?)
}

// ============================================================================
// Contexts
// ============================================================================

pub fn parse_context_file(path: &Path) -> Result<ContextDoc, String> {
    parse_context(&read(path)?)
}

pub fn parse_context(yaml: &str) -> Result<ContextDoc, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a context document. Returns a list of errors (empty = valid).
pub fn validate_context_doc(doc: &ContextDoc) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (name, spec) in &doc.particles {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("particle spec name must not be empty"));
        }
        for conn in spec.connections.keys() {
            if conn.trim().is_empty() {
                errors.push(ValidationError::new(format!(
                    "spec '{}' declares a connection with an empty name",
                    name
                )));
            }
        }
    }
    for (id, store) in &doc.stores {
        if id.trim().is_empty() {
            errors.push(ValidationError::new("store id must not be empty"));
        }
        if store.type_desc.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push(ValidationError::new(format!(
                "store '{}' has an empty type",
                id
            )));
        }
    }
    errors
}

pub fn build_context(doc: &ContextDoc) -> Result<Context, String> {
    let errors = validate_context_doc(doc);
    if !errors.is_empty() {
        return Err(format!("invalid context: {}", joined(&errors)));
    }
    Ok(Context::from_doc(doc))
}

pub fn load_context(path: &Path) -> Result<Context, String> {
    build_context(&parse_context_file(path)?)
}
