//! Benchmarks for recipe-binder core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recipe_binder::core::context::Context;
use recipe_binder::core::digest::recipe_digest;
use recipe_binder::core::matcher::{find, matches_recipe};
use recipe_binder::core::normalizer::normalize;
use recipe_binder::core::parser::{build_recipe, parse_recipe};
use recipe_binder::core::recipe::Recipe;
use recipe_binder::core::resolver::RecipeResolver;
use recipe_binder::core::shape::recipe_to_shape;
use recipe_binder::core::types::{Direction, Fate, ParticleSpec};

/// A pipeline of `n` stages: stage i reads handle i and writes handle i+1.
fn pipeline(n: usize) -> (Recipe, Context) {
    let mut recipe = Recipe::named("pipeline");
    let mut ctx = Context::new();
    let handles: Vec<_> = (0..=n)
        .map(|_| recipe.add_handle(Fate::Create).unwrap())
        .collect();
    for i in 0..n {
        let name = format!("Stage{i:03}");
        ctx.add_spec(
            ParticleSpec::new(&name)
                .with_connection("in", Direction::Reads, Some("Item"), false)
                .with_connection("out", Direction::Writes, Some("Item"), false),
        );
        let p = recipe.add_particle(&name).unwrap();
        recipe.add_connection(p, "in", Direction::Reads).unwrap();
        recipe.add_connection(p, "out", Direction::Writes).unwrap();
        recipe.bind(p, "in", handles[i]).unwrap();
        recipe.bind(p, "out", handles[i + 1]).unwrap();
    }
    (recipe, ctx)
}

fn bench_blake3_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_string");
    for size in [64, 256, 1024, 4096] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let hash = blake3::hash(black_box(input.as_bytes()));
                black_box(hash);
            });
        });
    }
    group.finish();
}

fn bench_yaml_build(c: &mut Criterion) {
    let yaml = r#"
name: bench-recipe
handles:
  products: { fate: use, store: products, tags: [shortlist], type: "[Product]" }
  shown: { fate: create }
  picked: { fate: create, type: Product }
particles:
  - name: ShowProducts
    verbs: [show]
    connections:
      list: { direction: reads, handle: products }
      out: { direction: writes, handle: shown }
  - name: Chooser
    connections:
      choices: { direction: reads, handle: products }
      choice: { direction: writes, handle: picked }
  - name: Logger
    connections:
      sink: { direction: reads }
"#;

    c.bench_function("yaml_build_recipe", |b| {
        b.iter(|| {
            let doc = parse_recipe(black_box(yaml)).unwrap();
            black_box(build_recipe(&doc).unwrap());
        });
    });
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for n in [10, 50, 100] {
        let (recipe, ctx) = pipeline(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &recipe, |b, recipe| {
            b.iter(|| {
                let mut draft = recipe.clone();
                black_box(normalize(&mut draft, &ctx, Some(&ctx)));
            });
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for n in [10, 50] {
        let (recipe, ctx) = pipeline(n);
        let resolver = RecipeResolver::new(&ctx);
        group.bench_with_input(BenchmarkId::from_parameter(n), &recipe, |b, recipe| {
            b.iter(|| black_box(resolver.resolve(black_box(recipe))));
        });
    }
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_self_shape");
    for n in [4, 8, 16] {
        let (recipe, _) = pipeline(n);
        let shape = recipe_to_shape(&recipe);
        group.bench_with_input(BenchmarkId::from_parameter(n), &recipe, |b, recipe| {
            b.iter(|| black_box(find(recipe, &shape)));
        });
    }
    group.finish();
}

fn bench_matches_recipe(c: &mut Criterion) {
    let (recipe, _) = pipeline(16);
    c.bench_function("matches_recipe_16", |b| {
        b.iter(|| black_box(matches_recipe(black_box(&recipe), &recipe)));
    });
}

fn bench_digest(c: &mut Criterion) {
    let (mut recipe, ctx) = pipeline(50);
    normalize(&mut recipe, &ctx, None);
    c.bench_function("recipe_digest_50", |b| {
        b.iter(|| black_box(recipe_digest(black_box(&recipe))));
    });
}

criterion_group!(
    benches,
    bench_blake3_string,
    bench_yaml_build,
    bench_normalize,
    bench_resolve,
    bench_find,
    bench_matches_recipe,
    bench_digest
);
criterion_main!(benches);
