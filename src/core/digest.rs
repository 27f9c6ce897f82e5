//! RB-070: BLAKE3 digests of canonical recipe renderings.
//!
//! Two normalized recipes with the same structure render identically, so
//! their digests agree. Digests of drafts depend on arrival order.

use super::matcher::matches_recipe;
use super::recipe::Recipe;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Digest of a recipe's canonical rendering.
pub fn recipe_digest(recipe: &Recipe) -> String {
    hash_string(&recipe.to_string())
}

/// Order-independent digest of a set of recipes.
pub fn composite_digest(recipes: &[&Recipe]) -> String {
    let mut digests: Vec<String> = recipes.iter().map(|r| recipe_digest(r)).collect();
    digests.sort();
    let mut hasher = blake3::Hasher::new();
    for d in &digests {
        hasher.update(d.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Drop recipes structurally equal to an earlier one. Equal digests are
/// taken as equal; otherwise `matches_recipe` decides.
pub fn dedup_recipes(recipes: Vec<Recipe>) -> Vec<Recipe> {
    let mut kept: Vec<(String, Recipe)> = Vec::new();
    for recipe in recipes {
        let digest = recipe_digest(&recipe);
        let duplicate = kept
            .iter()
            .any(|(d, k)| *d == digest || matches_recipe(k, &recipe));
        if duplicate {
            tracing::trace!("dropping duplicate recipe {}", digest);
        } else {
            kept.push((digest, recipe));
        }
    }
    kept.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, Fate};

    fn chain(names: [&str; 2]) -> Recipe {
        let mut r = Recipe::new();
        let h = r.add_handle(Fate::Create).unwrap();
        for (i, name) in names.iter().enumerate() {
            let p = r.add_particle(name).unwrap();
            let dir = if i == 0 { Direction::Writes } else { Direction::Reads };
            r.add_connection(p, "x", dir).unwrap();
            r.bind(p, "x", h).unwrap();
        }
        r
    }

    #[test]
    fn test_rb070_hash_string() {
        let h1 = hash_string("hello");
        assert_eq!(h1, hash_string("hello"));
        assert_ne!(h1, hash_string("world"));
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_rb070_recipe_digest_ignores_local_names() {
        let a = chain(["A", "B"]);
        let mut b = chain(["A", "B"]);
        let h = b.handle_ids()[0];
        b.set_local_name(h, Some("renamed")).unwrap();
        assert_eq!(recipe_digest(&a), recipe_digest(&b));
        assert_ne!(recipe_digest(&a), recipe_digest(&chain(["A", "C"])));
    }

    #[test]
    fn test_rb070_composite_order_independent() {
        let a = chain(["A", "B"]);
        let b = chain(["B", "A"]);
        assert_eq!(composite_digest(&[&a, &b]), composite_digest(&[&b, &a]));
        assert_ne!(composite_digest(&[&a]), composite_digest(&[&a, &b]));
    }

    #[test]
    fn test_rb070_dedup_recipes() {
        let mut reordered = Recipe::new();
        let pb = reordered.add_particle("B").unwrap();
        let pa = reordered.add_particle("A").unwrap();
        let h = reordered.add_handle(Fate::Create).unwrap();
        reordered.add_connection(pb, "x", Direction::Reads).unwrap();
        reordered.add_connection(pa, "x", Direction::Writes).unwrap();
        reordered.bind(pa, "x", h).unwrap();
        reordered.bind(pb, "x", h).unwrap();

        let kept = dedup_recipes(vec![chain(["A", "B"]), reordered, chain(["A", "C"])]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].particles().nth(1).unwrap().name(), "C");
    }
}
