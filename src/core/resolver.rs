//! RB-060: Recipe resolution against a read-only context snapshot.
//!
//! `resolve` never touches its input. It works on a draft copy: store-less
//! Use/Map/Copy handles are mapped to the one store that fits them, then the
//! copy is normalized exactly once against the context's registries.

use super::context::{Context, SpecLookup, StoreLookup};
use super::error::Result;
use super::normalizer::{normalize_with_report, NormalizeReport};
use super::recipe::{Handle, Recipe};
use super::types::{HandleId, StoreDescriptor, TypeDescriptor, ValidationError};

/// Resolves recipes against one context snapshot. Distinct recipes may be
/// resolved concurrently against the same context.
#[derive(Debug, Clone, Copy)]
pub struct RecipeResolver<'a> {
    context: &'a Context,
}

impl<'a> RecipeResolver<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self { context }
    }

    /// `None` if the recipe cannot be normalized at all; otherwise the
    /// frozen copy, whose `is_resolved()` tells full from partial
    /// resolution.
    pub fn resolve(&self, recipe: &Recipe) -> Option<Recipe> {
        self.resolve_with_report(recipe).0
    }

    /// `resolve` plus the normalizer's findings.
    pub fn resolve_with_report(&self, recipe: &Recipe) -> (Option<Recipe>, NormalizeReport) {
        let mut draft = recipe.to_draft();

        match map_stores(&mut draft, self.context) {
            Ok(mapped) if mapped > 0 => tracing::debug!("mapped {mapped} handle(s) to stores"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("store mapping failed: {e}");
                let report = NormalizeReport {
                    errors: vec![ValidationError::new(e.to_string())],
                    unresolved: Vec::new(),
                };
                return (None, report);
            }
        }

        let report = normalize_with_report(&mut draft, self.context, Some(self.context));
        if !report.is_ok() {
            tracing::debug!(
                "recipe {} is structurally invalid",
                recipe.name().unwrap_or("<unnamed>")
            );
            return (None, report);
        }
        tracing::debug!(
            "recipe {} normalized, resolved={}",
            recipe.name().unwrap_or("<unnamed>"),
            draft.is_resolved()
        );
        (Some(draft), report)
    }
}

/// Bind every store-less Use/Map/Copy handle to the single store that
/// matches its type and carries all its tags. Returns how many were bound.
fn map_stores(recipe: &mut Recipe, context: &Context) -> Result<usize> {
    let mut taken: Vec<String> = recipe
        .handles()
        .filter_map(|h| h.store().map(str::to_string))
        .collect();

    let mut assignments: Vec<(HandleId, String)> = Vec::new();
    for handle in recipe.handles() {
        if !handle.fate().needs_store() || handle.store().is_some() {
            continue;
        }
        let expected = expected_type(recipe, handle, context);
        let candidates: Vec<&StoreDescriptor> = context
            .stores()
            .into_iter()
            .filter(|s| !taken.contains(&s.id))
            .filter(|s| store_fits(s, handle, expected.as_ref()))
            .collect();

        match candidates.as_slice() {
            [only] => {
                tracing::trace!("handle {} -> store '{}'", handle.id(), only.id);
                taken.push(only.id.clone());
                assignments.push((handle.id(), only.id.clone()));
            }
            [] => tracing::trace!("handle {}: no fitting store", handle.id()),
            many => tracing::trace!("handle {}: {} fitting stores, left alone", handle.id(), many.len()),
        }
    }

    for (id, store) in &assignments {
        recipe.set_store(*id, Some(store))?;
    }
    Ok(assignments.len())
}

/// The handle's own type, else the first type declared by a connection to
/// it or by that connection's spec.
fn expected_type(recipe: &Recipe, handle: &Handle, context: &Context) -> Option<TypeDescriptor> {
    if let Some(t) = handle.type_desc() {
        return Some(t.clone());
    }
    recipe.connections_of(handle.id()).iter().find_map(|cref| {
        let particle = recipe.particle(cref.particle)?;
        let conn = particle.connection(&cref.name)?;
        conn.type_desc().cloned().or_else(|| {
            context
                .lookup(particle.name())?
                .connections
                .get(&cref.name)?
                .type_desc
                .clone()
        })
    })
}

fn store_fits(store: &StoreDescriptor, handle: &Handle, expected: Option<&TypeDescriptor>) -> bool {
    let type_ok = match (store.type_desc.as_ref(), expected) {
        (Some(have), Some(want)) => have.is_compatible(want),
        _ => true,
    };
    type_ok && handle.tags().iter().all(|t| store.tags.contains(t))
}
