//! RB-090: CLI subcommands (init, validate, normalize, resolve, match, compare).

use crate::core::context::{Context, StoreLookup};
use crate::core::recipe::{Recipe, Unresolved};
use crate::core::{digest, matcher, normalizer, parser, resolver};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write starter recipe, shape, and context files
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a recipe file without normalizing it
    Validate {
        /// Path to recipe.yaml
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,
    },

    /// Normalize a recipe and print its canonical form
    Normalize {
        /// Path to recipe.yaml
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,

        /// Context file with particle specs and stores
        #[arg(short, long)]
        context: Option<PathBuf>,
    },

    /// Resolve a recipe against a context
    Resolve {
        /// Path to recipe.yaml
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,

        /// Context file with particle specs and stores
        #[arg(short, long, default_value = "context.yaml")]
        context: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find structural matches of a shape in a recipe
    Match {
        /// Path to recipe.yaml
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,

        /// Path to shape.yaml
        #[arg(short, long, default_value = "shape.yaml")]
        shape: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check two recipes for structural equality
    Compare {
        left: PathBuf,
        right: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Normalize { file, context } => cmd_normalize(&file, context.as_deref()),
        Commands::Resolve {
            file,
            context,
            json,
        } => cmd_resolve(&file, &context, json),
        Commands::Match { file, shape, json } => cmd_match(&file, &shape, json),
        Commands::Compare { left, right } => cmd_compare(&left, &right),
    }
}

const RECIPE_TEMPLATE: &str = r#"name: my-recipe

handles:
  items:
    fate: create
    type: "[Item]"

particles:
  - name: MakeItems
    connections:
      out:
        direction: writes
        handle: items
  - name: ShowItems
    verbs: [show]
    connections:
      list:
        direction: reads
        handle: items
"#;

const SHAPE_TEMPLATE: &str = r#"roles: [MakeItems, ShowItems]
variables: [items]
constraints:
  MakeItems: { out: items }
  ShowItems: { list: items }
"#;

const CONTEXT_TEMPLATE: &str = r#"particles:
  MakeItems:
    connections:
      out: { direction: writes, type: "[Item]" }
  ShowItems:
    verbs: [show]
    connections:
      list: { direction: reads, type: "[Item]" }

stores: {}
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let files = [
        ("recipe.yaml", RECIPE_TEMPLATE),
        ("shape.yaml", SHAPE_TEMPLATE),
        ("context.yaml", CONTEXT_TEMPLATE),
    ];
    for (name, _) in &files {
        let target = path.join(name);
        if target.exists() {
            return Err(format!("{} already exists", target.display()));
        }
    }

    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    println!("Initialized recipe project at {}", path.display());
    for (name, content) in &files {
        let target = path.join(name);
        std::fs::write(&target, content)
            .map_err(|e| format!("cannot write {}: {}", target.display(), e))?;
        println!("  Created: {}", target.display());
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let doc = parser::parse_recipe_file(file)?;
    let errors = parser::validate_recipe_doc(&doc);

    if errors.is_empty() {
        println!(
            "OK: {} ({} particles, {} handles)",
            doc.name.as_deref().unwrap_or("<unnamed>"),
            doc.particles.len(),
            doc.handles.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn print_unresolved(unresolved: &[Unresolved], recipe: &Recipe, context: &Context) {
    for u in unresolved {
        println!("  ? {}", u);
        if let Unresolved::MissingSpec { particle, .. } = u {
            let verbs = recipe.particle(*particle).map(|p| p.verbs()).unwrap_or(&[]);
            for verb in verbs {
                let names: Vec<String> = context
                    .specs_with_verb(verb)
                    .iter()
                    .map(|s| s.name.clone())
                    .collect();
                if !names.is_empty() {
                    println!("      &{} could be: {}", verb, names.join(", "));
                }
            }
        }
    }
}

fn cmd_normalize(file: &Path, context: Option<&Path>) -> Result<(), String> {
    let mut recipe = parser::load_recipe(file)?;
    let ctx = match context {
        Some(path) => parser::load_context(path)?,
        None => Context::new(),
    };
    let stores = context.map(|_| &ctx as &dyn StoreLookup);

    let report = normalizer::normalize_with_report(&mut recipe, &ctx, stores);
    if !report.is_ok() {
        for e in &report.errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} normalization error(s)", report.errors.len()));
    }

    print!("{}", recipe);
    println!();
    println!("digest: {}", digest::recipe_digest(&recipe));
    if recipe.is_resolved() {
        println!("status: resolved");
    } else {
        println!("status: unresolved ({})", recipe.unresolved().len());
        print_unresolved(recipe.unresolved(), &recipe, &ctx);
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    name: Option<&'a str>,
    resolved: bool,
    digest: String,
    unresolved: &'a [Unresolved],
}

fn cmd_resolve(file: &Path, context: &Path, json: bool) -> Result<(), String> {
    let recipe = parser::load_recipe(file)?;
    let ctx = parser::load_context(context)?;

    let (resolved, report) = resolver::RecipeResolver::new(&ctx).resolve_with_report(&recipe);
    let Some(resolved) = resolved else {
        for e in &report.errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err("recipe is structurally invalid".to_string());
    };

    if json {
        let out = ResolveOutput {
            name: resolved.name(),
            resolved: resolved.is_resolved(),
            digest: digest::recipe_digest(&resolved),
            unresolved: resolved.unresolved(),
        };
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| format!("JSON serialization error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    print!("{}", resolved);
    println!();
    if resolved.is_resolved() {
        println!("Resolved: {}", resolved.name().unwrap_or("<unnamed>"));
    } else {
        println!(
            "Unresolved: {} ({} item(s))",
            resolved.name().unwrap_or("<unnamed>"),
            resolved.unresolved().len()
        );
        print_unresolved(resolved.unresolved(), &resolved, &ctx);
    }
    Ok(())
}

fn cmd_match(file: &Path, shape: &Path, json: bool) -> Result<(), String> {
    let recipe = parser::load_recipe(file)?;
    let shape = parser::load_shape(shape)?;
    let matches = matcher::find(&recipe, &shape);

    if json {
        let text = serde_json::to_string_pretty(&matches)
            .map_err(|e| format!("JSON serialization error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{} match(es)", matches.len());
    for (i, m) in matches.iter().enumerate() {
        println!();
        println!("match {} (score {})", i, m.score);
        for (name, binding) in &m.bindings {
            let detail = match binding {
                matcher::Binding::Particle { id } => recipe
                    .particle(*id)
                    .map(|p| format!("{} ({})", id, p.name()))
                    .unwrap_or_else(|| id.to_string()),
                matcher::Binding::Handle { id } => {
                    match recipe.handle(*id).and_then(|h| h.local_name()) {
                        Some(local) => format!("{} ({})", id, local),
                        None => id.to_string(),
                    }
                }
                other => other.to_string(),
            };
            println!("  {} -> {}", name, detail);
        }
    }
    Ok(())
}

fn cmd_compare(left: &Path, right: &Path) -> Result<(), String> {
    let a = parser::load_recipe(left)?;
    let b = parser::load_recipe(right)?;

    let equal = matcher::matches_recipe(&a, &b);
    println!("{}: {}", left.display(), digest::recipe_digest(&a));
    println!("{}: {}", right.display(), digest::recipe_digest(&b));
    if equal {
        println!("Structurally equal.");
    } else {
        println!("Structurally different.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        dir
    }

    #[test]
    fn test_rb090_init() {
        let dir = project();
        assert!(dir.path().join("recipe.yaml").exists());
        assert!(dir.path().join("shape.yaml").exists());
        assert!(dir.path().join("context.yaml").exists());
    }

    #[test]
    fn test_rb090_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shape.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
        assert!(!dir.path().join("recipe.yaml").exists());
    }

    #[test]
    fn test_rb090_templates_are_consistent() {
        let dir = project();
        let recipe = parser::load_recipe(&dir.path().join("recipe.yaml")).unwrap();
        let ctx = parser::load_context(&dir.path().join("context.yaml")).unwrap();
        let shape = parser::load_shape(&dir.path().join("shape.yaml")).unwrap();
        let resolved = resolver::RecipeResolver::new(&ctx).resolve(&recipe).unwrap();
        assert!(resolved.is_resolved());
        assert_eq!(matcher::find(&recipe, &shape)[0].score, 0);
    }

    #[test]
    fn test_rb090_validate() {
        let dir = project();
        cmd_validate(&dir.path().join("recipe.yaml")).unwrap();

        let bad = dir.path().join("bad.yaml");
        std::fs::write(
            &bad,
            "particles:\n  - name: A\n    connections:\n      a: { direction: reads, handle: ghost }\n",
        )
        .unwrap();
        assert!(cmd_validate(&bad).is_err());
    }

    #[test]
    fn test_rb090_normalize() {
        let dir = project();
        let file = dir.path().join("recipe.yaml");
        cmd_normalize(&file, Some(&dir.path().join("context.yaml"))).unwrap();
        // Without a context MakeItems has neither spec nor verbs.
        assert!(cmd_normalize(&file, None).is_err());
    }

    #[test]
    fn test_rb090_resolve() {
        let dir = project();
        let file = dir.path().join("recipe.yaml");
        let ctx = dir.path().join("context.yaml");
        cmd_resolve(&file, &ctx, false).unwrap();
        cmd_resolve(&file, &ctx, true).unwrap();

        std::fs::write(&ctx, "particles: {}\n").unwrap();
        assert!(cmd_resolve(&file, &ctx, false).is_err());
    }

    #[test]
    fn test_rb090_match() {
        let dir = project();
        let file = dir.path().join("recipe.yaml");
        let shape = dir.path().join("shape.yaml");
        cmd_match(&file, &shape, false).unwrap();
        cmd_match(&file, &shape, true).unwrap();
    }

    #[test]
    fn test_rb090_compare() {
        let dir = project();
        let file = dir.path().join("recipe.yaml");
        cmd_compare(&file, &file).unwrap();
        assert!(cmd_compare(&file, &dir.path().join("missing.yaml")).is_err());
    }
}
