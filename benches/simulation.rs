//! Performance benchmarks for DINONEAT

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dinoneat::agent::{Agent, ControllerFactory};
use dinoneat::checkpoint::Checkpoint;
use dinoneat::evolution::{EvolutionEngine, Population};
use dinoneat::generation::GenerationRunner;
use dinoneat::neural::{FeedForwardNetwork, Genome};
use dinoneat::species::SpeciesSet;
use dinoneat::{Config, World};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

fn genomes(config: &Config, count: usize) -> Vec<Genome> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    (1..=count as u64)
        .map(|k| Genome::new_initial(k, &config.neat, &mut rng))
        .collect()
}

fn benchmark_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");

    for population in [50, 200, 1000].iter() {
        let config = Config::default();
        let pool = genomes(&config, *population);

        group.bench_with_input(BenchmarkId::new("population", population), population, |b, _| {
            b.iter_batched_ref(
                || pool.clone(),
                |batch| {
                    let agents: Vec<Agent<'_>> = batch
                        .iter_mut()
                        .map(|g| {
                            let controller = config.neat.build(g);
                            Agent::new(g, controller, &config.agent, &config.world)
                        })
                        .collect();
                    let mut world = World::new_with_seed(&config, agents, 42);
                    for _ in 0..50 {
                        world.step();
                    }
                    world.population()
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_network_activate(c: &mut Criterion) {
    let config = Config::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let inputs = [120.0, 300.0, 50.0, 30.0, 20.0, 270.0];

    let minimal = Genome::new_initial(1, &config.neat, &mut rng);
    let mut net = FeedForwardNetwork::create(&minimal, &config.neat);
    c.bench_function("network_activate_minimal", |b| {
        b.iter(|| net.activate(black_box(&inputs)));
    });

    let mut complex = minimal.clone();
    for _ in 0..10 {
        complex.mutate_add_node(&config.neat, &mut rng);
    }
    let mut complex_net = FeedForwardNetwork::create(&complex, &config.neat);
    c.bench_function("network_activate_complex", |b| {
        b.iter(|| complex_net.activate(black_box(&inputs)));
    });
}

fn benchmark_generation(c: &mut Criterion) {
    let mut config = Config::default();
    config.world.max_ticks = Some(2000);
    let pool = genomes(&config, config.neat.population_size);

    c.bench_function("run_generation", |b| {
        b.iter(|| {
            let mut batch = pool.clone();
            GenerationRunner::new(&config, &config.neat)
                .run_generation(1, &mut batch, 42)
                .map(|o| o.ticks)
        });
    });
}

fn benchmark_reproduce(c: &mut Criterion) {
    let config = Config::default();
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut population = Population::new(&config.neat, &mut rng);
    for (i, genome) in population.genomes.iter_mut().enumerate() {
        genome.fitness = Some(i as f64);
    }
    let engine = EvolutionEngine::from_config(&config.neat);

    c.bench_function("reproduce", |b| {
        b.iter(|| {
            let mut species = SpeciesSet::new();
            let mut next_id = population.next_genome_id;
            engine.reproduce(&mut species, black_box(&population.genomes), 1, &mut next_id, &mut rng)
        });
    });
}

fn benchmark_checkpoint(c: &mut Criterion) {
    let config = Config::default();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let population = Population::new(&config.neat, &mut rng);
    let checkpoint = Checkpoint::new(config, population, BTreeMap::new(), 42);

    c.bench_function("checkpoint_serialize", |b| {
        b.iter(|| bincode::serialize(black_box(&checkpoint)).unwrap());
    });

    let serialized = bincode::serialize(&checkpoint).unwrap();

    c.bench_function("checkpoint_deserialize", |b| {
        b.iter(|| {
            let _: Checkpoint = bincode::deserialize(black_box(&serialized)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    benchmark_world_step,
    benchmark_network_activate,
    benchmark_generation,
    benchmark_reproduce,
    benchmark_checkpoint,
);

criterion_main!(benches);
