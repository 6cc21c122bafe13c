//! Point mutation for CGP individuals.
//!
//! A mutation call keeps picking random genes until a budget of
//! `round(mutation_rate * num_genes)` successful changes is spent. Function
//! genes may switch primitive; any gene may rewire one connection slot. All
//! rewiring draws from [`legal_range`], so the genotype stays acyclic.

use rand::Rng;

use crate::gene::Gene;
use crate::genome::Individual;
use crate::topology::legal_range;

/// Upper bound on rounds of a forced mutation.
///
/// A round whose changes only touch inactive genes is followed by another
/// round on top of it. Configurations that can mutate at all reach a
/// phenotypic change long before this bound; hitting it is reported through
/// [`MutationReport::phenotype_changed`] instead of looping forever.
pub const MAX_FORCED_ROUNDS: usize = 1_000;

/// Attempts per budgeted event and gene before a round gives up.
const ATTEMPTS_PER_EVENT_PER_GENE: usize = 64;

/// What a call to [`Individual::mutate`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// The individual had no genes and was randomly initialized first.
    pub initialized: bool,
    /// Successful gene changes across all rounds.
    pub events: usize,
    /// Mutation rounds performed (more than one only when forced).
    pub rounds: usize,
    /// The active mask differs from the one before the call.
    pub phenotype_changed: bool,
}

impl Individual {
    /// Number of successful events one mutation round applies.
    #[must_use]
    pub fn mutation_budget(&self) -> usize {
        let budget = (f64::from(self.config.mutation_rate) * self.genes.len() as f64).round();
        (budget as usize).max(1)
    }

    /// Whether any gene can change at all under this configuration.
    ///
    /// False only for degenerate setups: a single primitive and no gene with
    /// more than one legal connection value.
    #[must_use]
    pub fn can_mutate(&self) -> bool {
        if !self.is_spawned() {
            return true;
        }
        self.config.num_functions() > 1
            || (0..self.genes.len()).any(|position| legal_range(&self.config, position).len() > 1)
    }

    /// Whether any mutation can alter the active mask.
    ///
    /// False for single-row grids with `level_back == 1`: every node reads
    /// its only predecessor and the output reads the last node, so the whole
    /// grid is always active.
    #[must_use]
    pub fn can_change_phenotype(&self) -> bool {
        self.config.rows > 1 || self.config.level_back > 1
    }

    /// Mutate in place and recompute the active mask.
    ///
    /// With `force`, rounds are repeated on top of each other until the
    /// active mask differs from the one before the call, at most
    /// [`MAX_FORCED_ROUNDS`] times. Grids whose mask can never change
    /// (see [`can_change_phenotype`](Self::can_change_phenotype)) get a
    /// single round. An unspawned individual is initialized before
    /// mutating. Fitness is cleared whenever a gene changed.
    pub fn mutate<R: Rng>(&mut self, rng: &mut R, force: bool) -> MutationReport {
        let mut report = MutationReport::default();
        if !self.is_spawned() {
            self.init_genes(rng);
            report.initialized = true;
        }

        let before = self.active.clone();
        if !self.can_mutate() {
            return report;
        }
        let force = force && self.can_change_phenotype();

        loop {
            report.rounds += 1;
            report.events += self.mutation_round(rng);
            self.mark_active();

            if !force || self.active != before || report.rounds >= MAX_FORCED_ROUNDS {
                break;
            }
        }

        report.phenotype_changed = self.active != before;
        if report.events > 0 {
            self.clear_fitness();
        }
        report
    }

    /// One budgeted pass over randomly chosen genes. Returns applied events.
    fn mutation_round<R: Rng>(&mut self, rng: &mut R) -> usize {
        let num_genes = self.genes.len();
        let num_nodes = self.config.num_nodes();
        let budget = self.mutation_budget();
        let max_attempts = budget
            .saturating_mul(num_genes)
            .saturating_mul(ATTEMPTS_PER_EVENT_PER_GENE);

        let mut events = 0;
        let mut attempts = 0;
        while events < budget && attempts < max_attempts {
            attempts += 1;
            let position = rng.random_range(0..num_genes);

            if position < num_nodes && self.mutate_function(position, rng) {
                events += 1;
            }
            if self.mutate_connection(position, rng) {
                events += 1;
            }
        }

        events
    }

    /// Switch a function gene to a different primitive.
    fn mutate_function<R: Rng>(&mut self, position: usize, rng: &mut R) -> bool {
        let num_functions = self.config.num_functions();
        if num_functions < 2 {
            return false;
        }

        let Gene::Function {
            function, arity, ..
        } = &mut self.genes[position]
        else {
            return false;
        };

        // Uniform over the other primitives.
        let mut next = rng.random_range(0..num_functions - 1);
        if next >= *function {
            next += 1;
        }
        *function = next;
        *arity = self.config.functions[next].arity;
        true
    }

    /// Rewire the first used slot a coin flip selects, if it has alternatives.
    fn mutate_connection<R: Rng>(&mut self, position: usize, rng: &mut R) -> bool {
        let range = legal_range(&self.config, position);
        let span = range.len();
        let arity = self.genes[position].arity();

        for slot in &mut self.genes[position].slots_mut()[..arity] {
            if rng.random_bool(0.5) && span > 1 {
                *slot = if range.contains(&*slot) {
                    let mut next = range.start + rng.random_range(0..span - 1);
                    if next >= *slot {
                        next += 1;
                    }
                    next
                } else {
                    rng.random_range(range.clone())
                };
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CgpConfig;
    use crate::function::Primitive;
    use crate::genome::Fitness;
    use crate::topology::{has_cycle, is_legal};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_budget_rounds_and_is_at_least_one() {
        let config = Arc::new(CgpConfig {
            mutation_rate: 0.1,
            ..Default::default()
        });
        let individual = Individual::spawn(Arc::clone(&config), &mut test_rng());
        // 51 genes * 0.1 = 5.1
        assert_eq!(individual.mutation_budget(), 5);

        let tiny = Arc::new(CgpConfig {
            rows: 1,
            cols: 2,
            mutation_rate: 0.01,
            ..Default::default()
        });
        let individual = Individual::spawn(tiny, &mut test_rng());
        assert_eq!(individual.mutation_budget(), 1);
    }

    #[test]
    fn test_mutation_keeps_connections_legal() {
        let config = Arc::new(CgpConfig {
            rows: 3,
            cols: 8,
            level_back: 3,
            mutation_rate: 0.3,
            ..Default::default()
        });
        let mut rng = test_rng();
        let mut individual = Individual::spawn(Arc::clone(&config), &mut rng);

        for _ in 0..200 {
            individual.mutate(&mut rng, false);
            individual.validate().unwrap();
            for (position, gene) in individual.genes.iter().enumerate() {
                assert!(gene.slots().iter().all(|&id| is_legal(&config, position, id)));
            }
            assert!(!has_cycle(&individual.genes, config.num_inputs));
        }
    }

    #[test]
    fn test_forced_mutation_changes_phenotype() {
        let config = Arc::new(CgpConfig::default());
        for seed in 0..100 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut individual = Individual::spawn(Arc::clone(&config), &mut rng);
            let before = individual.active.clone();

            let report = individual.mutate(&mut rng, true);
            assert!(report.phenotype_changed, "seed {seed} left phenotype unchanged");
            assert_ne!(individual.active, before);
        }
    }

    #[test]
    fn test_mutation_recomputes_active_mask() {
        let config = Arc::new(CgpConfig::small(3, 5));
        let mut rng = test_rng();
        let mut individual = Individual::spawn(config, &mut rng);
        for _ in 0..20 {
            individual.mutate(&mut rng, false);
            let stale = individual.active.clone();
            individual.mark_active();
            assert_eq!(individual.active, stale);
        }
    }

    #[test]
    fn test_mutating_clone_leaves_source_untouched() {
        let config = Arc::new(CgpConfig::default());
        let mut rng = test_rng();
        let parent = Individual::spawn(config, &mut rng);
        let genes = parent.genes.clone();
        let active = parent.active.clone();

        let mut child = parent.clone();
        for _ in 0..10 {
            child.mutate(&mut rng, true);
        }

        assert_ne!(child.genes, genes);
        assert_eq!(parent.genes, genes);
        assert_eq!(parent.active, active);
    }

    #[test]
    fn test_unspawned_individual_is_initialized() {
        let config = Arc::new(CgpConfig::default());
        let mut individual = Individual::new(Arc::clone(&config));

        let report = individual.mutate(&mut test_rng(), true);
        assert!(report.initialized);
        assert_eq!(individual.genes.len(), config.num_genes());
        individual.validate().unwrap();
    }

    #[test]
    fn test_mutation_clears_fitness() {
        let config = Arc::new(CgpConfig::default());
        let mut rng = test_rng();
        let mut individual = Individual::spawn(config, &mut rng);
        individual.set_fitness(Fitness::new(0.7, 10.0, 0.7), None);

        individual.mutate(&mut rng, true);
        assert!(individual.fitness.is_none());
    }

    #[test]
    fn test_single_function_changes_only_connections() {
        let config = Arc::new(CgpConfig {
            functions: vec![Primitive::unary("conv")],
            ..CgpConfig::small(2, 4)
        });
        let mut rng = test_rng();
        let mut individual = Individual::spawn(config, &mut rng);

        for _ in 0..50 {
            let report = individual.mutate(&mut rng, false);
            assert!(report.events > 0);
            assert!(individual
                .genes
                .iter()
                .all(|g| g.function_index().unwrap_or(0) == 0));
        }
    }

    #[test]
    fn test_frozen_phenotype_gets_one_forced_round() {
        let config = Arc::new(CgpConfig {
            rows: 1,
            cols: 4,
            level_back: 1,
            ..Default::default()
        });
        let mut rng = test_rng();
        let mut individual = Individual::spawn(config, &mut rng);
        assert!(individual.can_mutate());
        assert!(!individual.can_change_phenotype());
        assert!(individual.active.iter().all(|&a| a));

        let report = individual.mutate(&mut rng, true);
        assert_eq!(report.rounds, 1);
        assert!(report.events > 0);
        assert!(!report.phenotype_changed);
    }

    #[test]
    fn test_single_row_with_reach_can_change_phenotype() {
        let config = Arc::new(CgpConfig {
            rows: 1,
            cols: 4,
            level_back: 2,
            ..Default::default()
        });
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut individual = Individual::spawn(Arc::clone(&config), &mut rng);
            assert!(individual.can_change_phenotype());
            assert!(individual.mutate(&mut rng, true).phenotype_changed);
        }
    }

    #[test]
    fn test_degenerate_configuration_is_a_noop() {
        // One primitive, one node reading the single input, one output that
        // can only read that node: nothing can ever change.
        let config = Arc::new(CgpConfig {
            rows: 1,
            cols: 1,
            level_back: 1,
            functions: vec![Primitive::unary("conv")],
            ..Default::default()
        });
        let mut rng = test_rng();
        let mut individual = Individual::spawn(config, &mut rng);
        let genes = individual.genes.clone();

        assert!(!individual.can_mutate());
        let report = individual.mutate(&mut rng, true);
        assert_eq!(report.rounds, 0);
        assert_eq!(report.events, 0);
        assert!(!report.phenotype_changed);
        assert_eq!(individual.genes, genes);
    }
}
