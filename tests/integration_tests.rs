//! Integration tests for cgp-search.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use cgp_search::topology::has_cycle;
use cgp_search::{
    checkpoint, dominates, fast_non_dominated_sort, is_legal, mark_active, ActiveKind,
    ActiveNetwork, ArtifactStore, Cgp, CgpConfig, Evaluation, EvaluationError, Fitness,
    FitnessEvaluator, Individual, Primitive, RunOptions,
};

/// Rewards networks that mix different cells, penalizes size.
struct CellMix {
    networks: ArtifactStore<ActiveNetwork>,
    exported: Mutex<Vec<(usize, ActiveNetwork)>>,
}

impl CellMix {
    fn new() -> Self {
        Self {
            networks: ArtifactStore::new(),
            exported: Mutex::new(Vec::new()),
        }
    }
}

impl FitnessEvaluator for CellMix {
    fn evaluate(
        &self,
        individual: &Individual,
        child_index: usize,
        _generation: usize,
    ) -> Result<Evaluation, EvaluationError> {
        let network = individual.active_network();
        let kinds: HashSet<&str> = network
            .nodes
            .iter()
            .filter_map(|node| match &node.kind {
                ActiveKind::Function { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        let cells = network.num_functions() as f64;
        let score = (kinds.len() as f64 + 1.0) / (cells + 2.0);

        self.networks.insert(child_index, network.clone());
        Ok(Evaluation::new(score, cells, score).with_artifact(network))
    }

    fn is_better(&self, incumbent: f64, candidate: f64) -> bool {
        candidate > incumbent
    }

    fn improved(&self, child_index: usize, _score: f64) {
        if let Some(network) = self.networks.take(child_index) {
            self.exported.lock().unwrap().push((child_index, network));
        }
    }
}

#[test]
fn test_full_search_cycle() {
    let options = RunOptions {
        children: 4,
        generations: 15,
        seed: Some(42),
        parallel_evaluation: true,
        ..Default::default()
    };
    let evaluator = CellMix::new();
    let mut cgp = Cgp::new(CgpConfig::default(), options).unwrap();
    let summary = cgp.run(&evaluator);

    assert_eq!(summary.generations, 15);
    assert_eq!(cgp.generation(), 15);

    let parent = cgp.parent().unwrap();
    parent.validate().unwrap();
    assert!(!has_cycle(&parent.genes, parent.config.num_inputs));
    assert_eq!(parent.fitness, summary.best);

    // Scores only ever go up.
    for pair in summary.improvements.windows(2) {
        assert!(pair[1].score > pair[0].score);
    }

    let exported = evaluator.exported.lock().unwrap();
    assert_eq!(exported.len(), summary.improvements.len());
    if let Some((child_index, network)) = exported.last() {
        assert_eq!(*child_index, summary.improvements.last().unwrap().child_index);
        assert_eq!(*network, parent.active_network());
        assert_eq!(parent.artifact::<ActiveNetwork>(), Some(network));
    }
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("search").join("best.json");
    let options = RunOptions {
        children: 3,
        generations: 10,
        seed: Some(3),
        save_best: Some(path.clone()),
        ..Default::default()
    };

    let mut first = Cgp::new(CgpConfig::default(), options.clone()).unwrap();
    let summary = first.run(&CellMix::new());
    let best = first.into_parent().unwrap();

    if summary.improvements.is_empty() {
        assert!(!path.exists());
        return;
    }

    let evaluator = CellMix::new();
    let mut second = Cgp::new(CgpConfig::default(), options)
        .unwrap()
        .with_checkpoint(&path);
    assert_eq!(second.parent().unwrap().genes, best.genes);
    assert_eq!(second.parent().unwrap().fitness, best.fitness);

    second.run(&evaluator);
    let resumed_score = second.parent().unwrap().score().unwrap();
    assert!(resumed_score >= best.score().unwrap());

    let on_disk = checkpoint::load(&path, second.config()).unwrap().unwrap();
    assert_eq!(on_disk.score(), Some(resumed_score));
}

#[test]
fn test_children_do_not_alias_parent() {
    let config = Arc::new(CgpConfig::small(4, 6));
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let parent = Individual::spawn(Arc::clone(&config), &mut rng);
    let snapshot = (parent.genes.clone(), parent.active.clone());

    let children: Vec<Individual> = (0..8)
        .map(|_| {
            let mut child = parent.clone();
            child.mutate(&mut rng, true);
            child
        })
        .collect();

    assert_eq!((parent.genes.clone(), parent.active.clone()), snapshot);
    for child in &children {
        assert_ne!(child.active, parent.active);
        assert!(Arc::ptr_eq(&child.config, &parent.config));
    }
}

#[test]
fn test_decoded_network_is_feed_forward() {
    let config = Arc::new(CgpConfig {
        num_inputs: 2,
        num_outputs: 2,
        functions: Primitive::mobile_cells(),
        ..CgpConfig::small(3, 8)
    });
    let mut rng = ChaCha8Rng::seed_from_u64(9);

    for _ in 0..20 {
        let individual = Individual::spawn(Arc::clone(&config), &mut rng);
        let network = individual.active_network();

        for (id, node) in network.nodes.iter().enumerate() {
            assert!(node.inputs.iter().all(|&input| input < id));
        }
        assert_eq!(network.output_ids().len(), 2);
        assert_eq!(
            network.nodes.len(),
            config.num_inputs + individual.num_active_nodes()
        );
    }
}

fn grid_config() -> impl Strategy<Value = CgpConfig> {
    (1usize..4, 1usize..7, 1usize..7, 1usize..3, 0.05f32..1.0).prop_map(
        |(rows, cols, level_back, num_inputs, mutation_rate)| CgpConfig {
            rows,
            cols,
            level_back,
            num_inputs,
            mutation_rate,
            ..Default::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_mutation_preserves_topology(
        config in grid_config(),
        seed in any::<u64>(),
        steps in 1usize..20,
    ) {
        let config = Arc::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut individual = Individual::spawn(Arc::clone(&config), &mut rng);

        for _ in 0..steps {
            individual.mutate(&mut rng, false);

            prop_assert!(individual.validate().is_ok());
            prop_assert!(!has_cycle(&individual.genes, config.num_inputs));
            for (position, gene) in individual.genes.iter().enumerate() {
                for &id in gene.slots() {
                    prop_assert!(is_legal(&config, position, id));
                }
            }
            prop_assert_eq!(&individual.active, &mark_active(&config, &individual.genes));
        }
    }

    #[test]
    fn prop_forced_mutation_changes_phenotype(
        config in grid_config()
            .prop_filter("mask must be able to change", |c| c.rows > 1 || c.level_back > 1),
        seed in any::<u64>(),
    ) {
        let config = Arc::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut individual = Individual::spawn(config, &mut rng);
        let before = individual.active.clone();

        let report = individual.mutate(&mut rng, true);
        prop_assert!(report.phenotype_changed);
        prop_assert_ne!(&individual.active, &before);
    }

    #[test]
    fn prop_mark_active_is_idempotent(config in grid_config(), seed in any::<u64>()) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let individual = Individual::spawn(Arc::new(config.clone()), &mut rng);

        let once = mark_active(&config, &individual.genes);
        let twice = mark_active(&config, &individual.genes);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once[config.num_nodes()..].iter().all(|&a| a));

        // An active gene is read by another active gene, and only active
        // genes read active genes.
        for position in 0..config.num_nodes() {
            let id = position + config.num_inputs;
            let readers: Vec<usize> = individual
                .genes
                .iter()
                .enumerate()
                .filter(|(_, gene)| gene.inputs().contains(&id))
                .map(|(reader, _)| reader)
                .collect();
            if once[position] {
                prop_assert!(readers.iter().any(|&reader| once[reader]));
            } else {
                prop_assert!(readers.iter().all(|&reader| !once[reader]));
            }
        }
    }

    #[test]
    fn prop_fronts_partition_population(
        points in prop::collection::vec((0.0f64..1.0, 0.0f64..100.0), 0..30),
    ) {
        let population: Vec<Fitness> = points
            .iter()
            .map(|&(score, cost)| Fitness::new(score, cost, score))
            .collect();
        let fronts = fast_non_dominated_sort(&population);

        let mut seen: Vec<usize> = fronts.iter().flatten().copied().collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..population.len()).collect::<Vec<_>>());

        // Nothing in a front dominates anything in the same front.
        for front in &fronts {
            for &p in front {
                for &q in front {
                    prop_assert!(!dominates(&population[p], &population[q]));
                }
            }
        }
    }
}
