//! Fit a Line with a Single Fully Connected Layer
//!
//! Generates `y = 2x + 1` plus a little Gaussian noise, trains a 1 → 1
//! fully connected layer with MSE and Adam, and prints the learned weight
//! and bias.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example train_regression
//!
//! # Deeper network, more epochs, per-batch tracing
//! RUST_LOG=chainrule=debug cargo run --release --example train_regression -- \
//!     --hidden 8 --epochs 200
//!
//! # Hyperparameters from a JSON file, parameters saved afterwards
//! cargo run --release --example train_regression -- \
//!     --config config.json --save params.json
//! ```
//!
//! ## Output
//!
//! - `training_log.csv` - One row per epoch (see `TrainingLogger`)
//! - Optional JSON parameter snapshot (`--save`)

use clap::Parser;
use chainrule::{
    layers, loss, optimizer, random, Dataset, Model, Tensor, TrainingConfig, TrainingLogger,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "train_regression",
    about = "Fit y = 2x + 1 with a small feed-forward network"
)]
struct Args {
    /// Number of training examples
    #[arg(long, default_value = "100")]
    examples: usize,

    /// Width of an optional ReLU hidden layer (0 for a single linear layer)
    #[arg(long, default_value = "0")]
    hidden: usize,

    /// Passes over the training set
    #[arg(long, default_value = "50")]
    epochs: usize,

    /// Examples per mini-batch
    #[arg(long, default_value = "10")]
    batch_size: usize,

    /// Learning rate
    #[arg(long, default_value = "0.01")]
    lr: f32,

    /// Standard deviation of the target noise
    #[arg(long, default_value = "0.01")]
    noise: f32,

    /// Seed for data generation and weight initialization
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Load hyperparameters from a JSON file (overrides the flags above)
    #[arg(long)]
    config: Option<String>,

    /// Write the trained parameters to this JSON file
    #[arg(long)]
    save: Option<String>,

    /// CSV log path
    #[arg(long, default_value = "training_log.csv")]
    log: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainrule=info")),
        )
        .init();

    let args = Args::parse();

    println!("\n{}", "=".repeat(70));
    println!("  Fitting y = 2x + 1");
    println!("{}", "=".repeat(70));
    println!();

    // ========================================================================
    // 1. Generate Data
    // ========================================================================
    let n = args.examples.max(1);
    let mut noise = Tensor::new(2 * n)?;
    random::randn(&mut noise, args.seed);

    let xs: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
    let ys: Vec<f32> = xs
        .iter()
        .zip(noise.as_slice())
        .map(|(x, e)| 2.0 * x + 1.0 + args.noise * e)
        .collect();

    // held-out points between the training inputs
    let test_xs: Vec<f32> = (0..n).map(|i| (i as f32 + 0.5) / n as f32).collect();
    let test_ys: Vec<f32> = test_xs
        .iter()
        .zip(&noise.as_slice()[n..])
        .map(|(x, e)| 2.0 * x + 1.0 + args.noise * e)
        .collect();

    let train = Dataset::new(&xs, &ys, 1, 1)?;
    let test = Dataset::new(&test_xs, &test_ys, 1, 1)?;
    println!("Training examples: {}", train.len());
    println!("Test examples:     {}", test.len());

    // ========================================================================
    // 2. Build Model
    // ========================================================================
    let mut model = Model::init(1)?;
    if args.hidden > 0 {
        model.add_layer(args.hidden, layers::fully_connected(args.seed + 1))?;
        model.add_layer(args.hidden, layers::relu())?;
    }
    model.add_layer(1, layers::fully_connected(args.seed + 2))?;
    model.set_loss(loss::mse())?;
    model.set_optimizer(optimizer::adam())?;

    let config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig {
            epochs: args.epochs,
            batch_size: args.batch_size,
            batches: n.div_ceil(args.batch_size.max(1)),
            learning_rate: args.lr,
            max_grad_norm: None,
        },
    };
    model.configure(&config)?;

    println!("\nLayers:     {}", model.len());
    println!("Parameters: {}", model.parameter_count());
    println!(
        "Config:     {} epochs × {} batches × {} examples, lr {}",
        config.epochs, config.batches, config.batch_size, config.learning_rate
    );
    println!();

    // ========================================================================
    // 3. Train
    // ========================================================================
    let mut logger = TrainingLogger::new(&args.log)?;
    let report = model.train_with_logger(&train, &test, &mut logger)?;

    println!("\n{}", "=".repeat(70));
    if let (Some(first), Some(last)) = (report.epochs.first(), report.epochs.last()) {
        println!(
            "Loss: {:.6} → {:.6} ({:.2}% of initial)",
            first.train_loss,
            last.train_loss,
            100.0 * last.train_loss / first.train_loss
        );
    }

    if args.hidden == 0 {
        if let Some(layer) = model.layer(0) {
            let params = layer.parameters();
            println!(
                "Learned: y = {:.4}x + {:.4}",
                params[0].as_slice()[0],
                params[1].as_slice()[0]
            );
        }
    }

    for x in [0.0f32, 0.5, 1.0] {
        let y = model.predict(&[x])?[0];
        println!("  f({x:.1}) = {y:.4}  (target {:.4})", 2.0 * x + 1.0);
    }

    if let Some(path) = &args.save {
        model.save_parameters(path)?;
        println!("\n✓ Parameters saved to: {path}");
    }
    println!("✓ Log written to: {}", args.log);

    Ok(())
}
