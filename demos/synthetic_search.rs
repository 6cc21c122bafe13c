//! Architecture search against a synthetic training surrogate.
//!
//! Instead of training models, the evaluator infers the tensor shapes of the
//! decoded network for a 32x32 RGB input, counts parameters, and derives an
//! accuracy estimate from model capacity and final resolution. Networks that
//! pool below a 1x1 feature map cannot be built and are reported as
//! undecodable, so the loop remutates them.
//!
//! Run with: `cargo run --example synthetic_search`

use cgp_search::{
    ActiveKind, ActiveNetwork, ArtifactStore, Cgp, CgpConfig, Evaluation, EvaluationError,
    FitnessEvaluator, Individual, RunOptions,
};

const INPUT_SIZE: u32 = 32;
const INPUT_CHANNELS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct Shape {
    size: u32,
    channels: u32,
}

/// What "training" produced for one candidate.
#[derive(Debug, Clone)]
struct ModelSummary {
    parameters: u64,
    output: Shape,
    cells: usize,
}

/// Parse `conv_<filters>_<k>x<k>`.
fn conv_spec(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("conv_")?;
    let (filters, kernel) = rest.split_once('_')?;
    let (k, _) = kernel.split_once('x')?;
    Some((filters.parse().ok()?, k.parse().ok()?))
}

fn build(network: &ActiveNetwork) -> Result<ModelSummary, String> {
    let mut shapes: Vec<Shape> = Vec::with_capacity(network.nodes.len());
    let mut parameters = 0u64;

    for node in &network.nodes {
        let inputs: Vec<Shape> = node.inputs.iter().map(|&id| shapes[id]).collect();
        let shape = match &node.kind {
            ActiveKind::Input(_) => Shape {
                size: INPUT_SIZE,
                channels: INPUT_CHANNELS,
            },
            ActiveKind::Output(_) => inputs[0],
            ActiveKind::Function { name, .. } => match name.as_str() {
                "sum" => Shape {
                    size: inputs[0].size.min(inputs[1].size),
                    channels: inputs[0].channels.max(inputs[1].channels),
                },
                "concat" => Shape {
                    size: inputs[0].size.min(inputs[1].size),
                    channels: inputs[0].channels + inputs[1].channels,
                },
                "max_pool_2x2" | "avg_pool_2x2" => {
                    if inputs[0].size < 2 {
                        return Err(format!("{name} on a {0}x{0} feature map", inputs[0].size));
                    }
                    Shape {
                        size: inputs[0].size / 2,
                        channels: inputs[0].channels,
                    }
                }
                other => {
                    let (filters, kernel) =
                        conv_spec(other).ok_or_else(|| format!("unknown cell {other}"))?;
                    if inputs[0].size < kernel {
                        return Err(format!(
                            "{other} on a {0}x{0} feature map",
                            inputs[0].size
                        ));
                    }
                    parameters += u64::from(kernel * kernel * inputs[0].channels * filters)
                        + u64::from(filters);
                    Shape {
                        size: inputs[0].size,
                        channels: filters,
                    }
                }
            },
        };
        shapes.push(shape);
    }

    let output = network
        .output_ids()
        .first()
        .map(|&id| shapes[id])
        .ok_or_else(|| "network has no output".to_string())?;

    Ok(ModelSummary {
        parameters,
        output,
        cells: network.num_functions(),
    })
}

/// Surrogate accuracy in (0, 0.95).
fn estimate_accuracy(model: &ModelSummary) -> f64 {
    let capacity = (1.0 + model.parameters as f64).ln();
    let resolution = if (2..=8).contains(&model.output.size) {
        1.0
    } else {
        0.85
    };
    0.05 + 0.9 * (1.0 - (-capacity / 12.0).exp()) * resolution
}

struct SurrogateTrainer {
    models: ArtifactStore<ModelSummary>,
}

impl FitnessEvaluator for SurrogateTrainer {
    fn evaluate(
        &self,
        individual: &Individual,
        child_index: usize,
        _generation: usize,
    ) -> Result<Evaluation, EvaluationError> {
        let model = build(&individual.active_network()).map_err(EvaluationError::Undecodable)?;
        let accuracy = estimate_accuracy(&model);
        let parameters = model.parameters as f64;

        self.models.insert(child_index, model.clone());
        Ok(Evaluation::new(accuracy, parameters, accuracy).with_artifact(model))
    }

    fn is_better(&self, incumbent: f64, candidate: f64) -> bool {
        candidate > incumbent
    }

    fn improved(&self, child_index: usize, score: f64) {
        if let Some(model) = self.models.take(child_index) {
            println!(
                "  child {child_index}: accuracy {score:.4}, {} cells, {} parameters, output {}x{}x{}",
                model.cells,
                model.parameters,
                model.output.size,
                model.output.size,
                model.output.channels
            );
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("CGP Synthetic Architecture Search");
    println!("=================================\n");

    let config = CgpConfig::default();
    let options = RunOptions {
        children: 4,
        generations: 50,
        seed: Some(42),
        parallel_evaluation: true,
        ..Default::default()
    };

    println!("Grid: {}x{} (level-back {})", config.rows, config.cols, config.level_back);
    println!("Cells: {}", config.functions.len());
    println!("Children per generation: {}", options.children);
    println!("Generations: {}\n", options.generations);

    let trainer = SurrogateTrainer {
        models: ArtifactStore::new(),
    };

    let mut cgp = match Cgp::new(config, options) {
        Ok(cgp) => cgp,
        Err(err) => {
            eprintln!("invalid setup: {err}");
            return;
        }
    };
    let summary = cgp.run(&trainer);

    println!("\nImprovements: {}", summary.improvements.len());
    if let Some(best) = cgp.parent() {
        println!("Best score: {:?}", best.score());
        println!("Active genes: {}", best.num_active_nodes());
        if let Some(model) = best.artifact::<ModelSummary>() {
            println!("Parameters: {}", model.parameters);
        }
        println!("\nActive network:");
        for (id, node) in best.active_network().nodes.iter().enumerate() {
            println!("  {id:>3}: {:?} <- {:?}", node.kind, node.inputs);
        }
    }
}
