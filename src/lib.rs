//! Chainrule: A Small Feed-Forward Training Engine
//!
//! A chain of layers trained by reverse-mode backpropagation and mini-batch
//! gradient descent, implemented from scratch in Rust with `f32` buffers
//! and no external math library.
//!
//! # Modules
//!
//! - [`tensor`] - Flat `f32` buffers with fallible allocation
//! - [`linalg`] - Matrix-vector product and element-wise kernels
//! - [`random`] - Seeded PRNG, uniform/normal fills and He initialization
//! - [`layers`] - The [`Layer`] trait plus ReLU, identity and fully connected
//! - [`loss`] - Mean squared error and softmax cross-entropy
//! - [`optimizer`] - Adam
//! - [`gradients`] - Accumulator layout and gradient clipping
//! - [`model`] - Graph construction, prediction and training
//! - [`train`] - Dataset view, hyperparameters and training reports
//! - [`training_logger`] - Per-epoch CSV/console log
//!
//! # Example
//!
//! ```rust
//! use chainrule::{layers, loss, optimizer, Dataset, Model};
//!
//! // y = 2x + 1
//! let xs: Vec<f32> = (0..20).map(|i| i as f32 / 20.0).collect();
//! let ys: Vec<f32> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
//! let data = Dataset::new(&xs, &ys, 1, 1)?;
//!
//! let mut model = Model::init(1)?;
//! model.add_layer(1, layers::fully_connected(42))?;
//! model.set_loss(loss::mse())?;
//! model.set_optimizer(optimizer::adam())?;
//!
//! model.epochs = 5;
//! model.batch_size = 5;
//! model.batches = 4;
//! model.learning_rate = 1e-2;
//!
//! let report = model.train(&data, &data)?;
//! assert_eq!(report.epochs.len(), 5);
//!
//! let y = model.predict(&[0.5])?;
//! assert_eq!(y.len(), 1);
//! # Ok::<(), chainrule::NnError>(())
//! ```
//!
//! Enable the `simd` feature to route the linear-algebra kernels through
//! their 8-lane blocked variants.

pub mod error;
pub mod gradients;
pub mod layers;
pub mod linalg;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod random;
pub mod tensor;
pub mod train;
pub mod training_logger;

// Re-export main types for convenience
pub use error::{NnError, Result};
pub use gradients::GradientLayout;
pub use layers::{FullyConnected, Identity, Layer, LayerInit, LayerShape, Relu};
pub use loss::{CrossEntropy, Loss, MeanSquaredError};
pub use model::{LayerSnapshot, Model, ModelSnapshot};
pub use optimizer::{Adam, Optimizer};
pub use tensor::Tensor;
pub use train::{Dataset, EpochStats, TrainingConfig, TrainingReport};
pub use training_logger::TrainingLogger;
