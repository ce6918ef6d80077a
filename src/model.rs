//! Model Orchestrator
//!
//! The [`Model`] owns the layer chain, the loss node and the optimizer, and
//! drives prediction, evaluation and mini-batch training.
//!
//! ## Building
//!
//! ```rust
//! use chainrule::{layers, loss, optimizer, Model};
//!
//! let mut model = Model::init(4)?;
//! model.add_layer(8, layers::fully_connected(1))?;
//! model.add_layer(8, layers::relu())?;
//! model.add_layer(3, layers::fully_connected(2))?;
//! model.set_loss(loss::cross_entropy())?;
//! model.set_optimizer(optimizer::adam())?;
//!
//! model.epochs = 10;
//! model.batch_size = 4;
//! model.learning_rate = 1e-2;
//! # Ok::<(), chainrule::NnError>(())
//! ```
//!
//! Once the loss or the optimizer is set the graph is frozen: further
//! `add_layer` calls fail with [`NnError::InvalidConfiguration`].
//!
//! ## Buffer Ownership
//!
//! For each layer the model owns an `out` buffer (its forward result) and an
//! `in_grad` buffer (the gradient w.r.t. its input). Hooks receive borrowed
//! neighbors:
//!
//! ```text
//! caller input ─> L0.out ─> L1.out ─> ... ─> Ln.out ─> loss
//!       L0.in_grad <─ L1.in_grad <─ ... <─ Ln.in_grad <─ loss.in_grad
//! ```
//!
//! The caller's input is never copied into the graph; it is passed straight
//! to the first layer's forward hook.
//!
//! ## Training Step
//!
//! For each of `batch_size` examples:
//! 1. evaluate the test-set loss (diagnostic)
//! 2. evaluate the training loss
//! 3. loss backward, then walk the layers tail → head, adding each
//!    layer's `internal_grad` into its slice of the shared accumulator
//!
//! Then average the loss and the accumulator by `1/batch_size`, optionally
//! clip, run the optimizer over the accumulator, and walk the layers again
//! copying each slice back into `internal_grad` before calling `update`.
//!
//! Slices come from the [`GradientLayout`] computed when the loss is set.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{NnError, Result};
use crate::gradients::{clip_gradients, compute_grad_norm, GradientLayout};
use crate::layers::{Layer, LayerInit, LayerShape};
use crate::linalg;
use crate::loss::Loss;
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;
use crate::train::{Dataset, EpochStats, TrainingConfig, TrainingReport};
use crate::training_logger::TrainingLogger;

struct Node {
    layer: Box<dyn Layer>,
    out: Tensor,
    in_grad: Tensor,
}

struct LossNode {
    loss: Box<dyn Loss>,
    in_grad: Tensor,
}

/// A chain of layers with a loss and an optimizer.
pub struct Model {
    input_size: usize,
    nodes: Vec<Node>,
    loss: Option<LossNode>,
    optimizer: Option<Box<dyn Optimizer>>,
    layout: GradientLayout,

    pub epochs: usize,
    pub batch_size: usize,
    pub batches: usize,
    pub learning_rate: f32,
    pub max_grad_norm: Option<f32>,
}

impl Model {
    /// Start a model whose input examples are `input_size` wide.
    ///
    /// Hyperparameters start at [`TrainingConfig::default`].
    pub fn init(input_size: usize) -> Result<Self> {
        if input_size == 0 {
            return Err(NnError::config("input_size must be at least 1"));
        }

        let defaults = TrainingConfig::default();
        Ok(Self {
            input_size,
            nodes: Vec::new(),
            loss: None,
            optimizer: None,
            layout: GradientLayout::default(),
            epochs: defaults.epochs,
            batch_size: defaults.batch_size,
            batches: defaults.batches,
            learning_rate: defaults.learning_rate,
            max_grad_norm: defaults.max_grad_norm,
        })
    }

    /// Append a layer producing `output_size` values.
    ///
    /// `init` receives the layer's input and output widths and builds the
    /// layer; see [`crate::layers`] for the provided kinds. Returns the new
    /// layer for any kind-specific configuration.
    ///
    /// # Errors
    ///
    /// - [`NnError::InvalidConfiguration`] if the loss or optimizer is
    ///   already set, or `output_size` is zero.
    /// - Whatever `init` returns, e.g. [`NnError::ShapeMismatch`].
    /// - [`NnError::OutOfMemory`] for the layer's buffers.
    ///
    /// On error the model is unchanged.
    pub fn add_layer<F: LayerInit>(
        &mut self,
        output_size: usize,
        init: F,
    ) -> Result<&mut dyn Layer> {
        if self.loss.is_some() || self.optimizer.is_some() {
            return Err(NnError::config(
                "cannot add a layer after the loss or optimizer is set",
            ));
        }
        if output_size == 0 {
            return Err(NnError::config("layer output_size must be at least 1"));
        }

        let shape = LayerShape {
            in_size: self.output_size(),
            out_size: output_size,
        };
        let layer = init(shape)?;
        let out = Tensor::new(shape.out_size)?;
        let in_grad = Tensor::new(shape.in_size)?;

        debug!(
            index = self.nodes.len(),
            kind = layer.kind(),
            in_size = shape.in_size,
            out_size = shape.out_size,
            parameters = layer.internal_grad().map_or(0, Tensor::len),
            "added layer"
        );

        self.nodes.push(Node {
            layer,
            out,
            in_grad,
        });
        let index = self.nodes.len() - 1;
        let layer: &mut dyn Layer = self.nodes[index].layer.as_mut();
        Ok(layer)
    }

    /// Attach the loss node after the last layer and freeze the graph.
    ///
    /// `init` receives the network's output width.
    pub fn set_loss<F>(&mut self, init: F) -> Result<()>
    where
        F: FnOnce(usize) -> Result<Box<dyn Loss>>,
    {
        if self.loss.is_some() {
            return Err(NnError::config("loss is already set"));
        }
        if self.nodes.is_empty() {
            return Err(NnError::config("add at least one layer before the loss"));
        }

        let width = self.output_size();
        let loss = init(width)?;
        let in_grad = Tensor::new(width)?;

        let lengths: Vec<Option<usize>> = self
            .nodes
            .iter()
            .map(|node| node.layer.internal_grad().map(Tensor::len))
            .collect();
        self.layout = GradientLayout::new(&lengths);

        debug!(
            kind = loss.kind(),
            width,
            gradient_len = self.layout.total_len(),
            "set loss"
        );

        self.loss = Some(LossNode { loss, in_grad });
        Ok(())
    }

    /// Attach the optimizer applied to every averaged mini-batch gradient.
    pub fn set_optimizer<F>(&mut self, init: F) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn Optimizer>>,
    {
        if self.optimizer.is_some() {
            return Err(NnError::config("optimizer is already set"));
        }
        let optimizer = init()?;
        debug!(kind = optimizer.kind(), "set optimizer");
        self.optimizer = Some(optimizer);
        Ok(())
    }

    /// Validate and apply a set of hyperparameters.
    pub fn configure(&mut self, config: &TrainingConfig) -> Result<()> {
        config.validate()?;
        self.epochs = config.epochs;
        self.batch_size = config.batch_size;
        self.batches = config.batches;
        self.learning_rate = config.learning_rate;
        self.max_grad_norm = config.max_grad_norm;
        Ok(())
    }

    /// Current hyperparameters.
    pub fn config(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            batches: self.batches,
            learning_rate: self.learning_rate,
            max_grad_norm: self.max_grad_norm,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Width of the last layer's output (the input width for an empty model).
    pub fn output_size(&self) -> usize {
        self.nodes
            .last()
            .map_or(self.input_size, |node| node.out.len())
    }

    /// Number of layers, not counting the implicit input.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.nodes.get(index).map(|node| node.layer.as_ref())
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut dyn Layer> {
        let node = self.nodes.get_mut(index)?;
        let layer: &mut dyn Layer = node.layer.as_mut();
        Some(layer)
    }

    /// Total number of trainable parameters.
    pub fn parameter_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| node.layer.internal_grad())
            .map(Tensor::len)
            .sum()
    }

    pub fn gradient_layout(&self) -> &GradientLayout {
        &self.layout
    }

    /// Gradient of the loss w.r.t. the network input, from the most recent
    /// backward walk.
    pub fn input_gradient(&self) -> Option<&[f32]> {
        self.nodes.first().map(|node| node.in_grad.as_slice())
    }

    /// Run the forward pass and return the last layer's output.
    ///
    /// # Errors
    ///
    /// [`NnError::ShapeMismatch`] if `input` is not `input_size` long,
    /// [`NnError::InvalidConfiguration`] if the model has no layers.
    pub fn predict(&mut self, input: &[f32]) -> Result<&[f32]> {
        self.check_input(input)?;
        self.forward(input);
        self.nodes
            .last()
            .map(|node| node.out.as_slice())
            .ok_or_else(|| NnError::config("model has no layers"))
    }

    /// Run the forward pass and return the loss against `expected`,
    /// without touching any gradient.
    pub fn test(&mut self, input: &[f32], expected: &[f32]) -> Result<f32> {
        self.check_input(input)?;
        if expected.len() != self.output_size() {
            return Err(NnError::shape(
                "expected output",
                self.output_size(),
                expected.len(),
            ));
        }
        if self.loss.is_none() {
            return Err(NnError::config("loss is not set"));
        }
        Ok(self.evaluate(input, expected))
    }

    /// Train on `train` for `epochs × batches` mini-batches, evaluating
    /// `test` alongside every training example.
    pub fn train(&mut self, train: &Dataset<'_>, test: &Dataset<'_>) -> Result<TrainingReport> {
        self.run_training(train, test, None)
    }

    /// [`Model::train`], additionally writing every epoch to `logger`.
    pub fn train_with_logger(
        &mut self,
        train: &Dataset<'_>,
        test: &Dataset<'_>,
        logger: &mut TrainingLogger,
    ) -> Result<TrainingReport> {
        self.run_training(train, test, Some(logger))
    }

    /// Tear the model down, tail to head.
    pub fn destroy(self) {}

    fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.input_size {
            return Err(NnError::shape("model input", self.input_size, input.len()));
        }
        Ok(())
    }

    fn check_dataset(&self, name: &'static str, data: &Dataset<'_>) -> Result<()> {
        if data.input_size() != self.input_size {
            return Err(NnError::shape(name, self.input_size, data.input_size()));
        }
        if data.output_size() != self.output_size() {
            return Err(NnError::shape(name, self.output_size(), data.output_size()));
        }
        if data.is_empty() {
            return Err(NnError::config(format!("{name} has no examples")));
        }
        Ok(())
    }

    fn forward(&mut self, input: &[f32]) {
        for i in 0..self.nodes.len() {
            let (before, rest) = self.nodes.split_at_mut(i);
            if let Some(node) = rest.first_mut() {
                let layer_input = before.last().map_or(input, |prev| prev.out.as_slice());
                node.layer.forward(layer_input, node.out.as_mut_slice());
            }
        }
    }

    /// Forward pass plus loss. The loss node must be set.
    fn evaluate(&mut self, input: &[f32], expected: &[f32]) -> f32 {
        self.forward(input);
        match (self.loss.as_ref(), self.nodes.last()) {
            (Some(node), Some(tail)) => node.loss.forward(tail.out.as_slice(), expected),
            _ => f32::NAN,
        }
    }

    /// Backpropagate the most recent forward pass of `input` and add every
    /// layer's parameter gradient into its slice of `accumulator`.
    fn backward(&mut self, input: &[f32], expected: &[f32], accumulator: &mut [f32]) {
        let Model {
            nodes,
            loss,
            layout,
            ..
        } = self;
        let Some(loss_node) = loss.as_mut() else {
            return;
        };
        let Some(tail) = nodes.last() else {
            return;
        };

        loss_node.loss.backward(
            tail.out.as_slice(),
            expected,
            loss_node.in_grad.as_mut_slice(),
        );

        for i in (0..nodes.len()).rev() {
            let (before, rest) = nodes.split_at_mut(i);
            let Some((node, after)) = rest.split_first_mut() else {
                continue;
            };

            let layer_input = before.last().map_or(input, |prev| prev.out.as_slice());
            let loss_grad = after
                .first()
                .map_or(loss_node.in_grad.as_slice(), |next| next.in_grad.as_slice());

            node.layer
                .backward(layer_input, loss_grad, node.in_grad.as_mut_slice());

            if let (Some(range), Some(grad)) = (layout.slot(i), node.layer.internal_grad()) {
                linalg::add_assign(&mut accumulator[range], grad.as_slice());
            }
        }
    }

    /// Hand each trainable layer its slice of the optimizer output and let
    /// it update its parameters.
    fn apply_update(&mut self, steps: &[f32]) -> Result<()> {
        for (i, node) in self.nodes.iter_mut().enumerate().rev() {
            let Some(range) = self.layout.slot(i) else {
                continue;
            };
            if let Some(grad) = node.layer.internal_grad_mut() {
                grad.copy_from(&steps[range])?;
            }
            node.layer.update();
        }
        Ok(())
    }

    /// One mini-batch. Returns the mean (train, validation) loss.
    fn train_batch(
        &mut self,
        batch: usize,
        train: &Dataset<'_>,
        test: &Dataset<'_>,
        accumulator: &mut Tensor,
    ) -> Result<(f32, f32)> {
        accumulator.zero();

        let mut batch_loss = 0.0;
        let mut batch_val_loss = 0.0;

        for i in 0..self.batch_size {
            let index = batch * self.batch_size + i;

            let (x_test, y_test) = test.example(index);
            batch_val_loss += self.evaluate(x_test, y_test);

            let (x_train, y_train) = train.example(index);
            batch_loss += self.evaluate(x_train, y_train);

            self.backward(x_train, y_train, accumulator.as_mut_slice());
        }

        let avg = 1.0 / self.batch_size as f32;
        batch_loss *= avg;
        batch_val_loss *= avg;
        linalg::scale(accumulator.as_mut_slice(), avg);

        let grad_norm = match self.max_grad_norm {
            Some(max_norm) => {
                let norm = clip_gradients(accumulator.as_mut_slice(), max_norm);
                if norm > max_norm {
                    warn!(batch, norm, max_norm, "clipped gradient");
                }
                norm
            }
            None => compute_grad_norm(accumulator.as_slice()),
        };

        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| NnError::config("optimizer is not set"))?;
        optimizer.apply(accumulator.as_mut_slice(), self.learning_rate)?;

        self.apply_update(accumulator.as_slice())?;

        debug!(batch, loss = batch_loss, val_loss = batch_val_loss, grad_norm, "trained batch");
        Ok((batch_loss, batch_val_loss))
    }

    fn run_training(
        &mut self,
        train: &Dataset<'_>,
        test: &Dataset<'_>,
        mut logger: Option<&mut TrainingLogger>,
    ) -> Result<TrainingReport> {
        self.config().validate()?;
        if self.loss.is_none() {
            return Err(NnError::config("loss is not set"));
        }
        if self.optimizer.is_none() {
            return Err(NnError::config("optimizer is not set"));
        }
        self.check_dataset("training set", train)?;
        self.check_dataset("test set", test)?;

        let mut accumulator = Tensor::new(self.layout.total_len())?;
        let mut report = TrainingReport::default();

        info!(
            epochs = self.epochs,
            batches = self.batches,
            batch_size = self.batch_size,
            learning_rate = self.learning_rate,
            parameters = self.layout.total_len(),
            "starting training"
        );

        for epoch in 0..self.epochs {
            let mut epoch_loss = 0.0;
            let mut epoch_val_loss = 0.0;

            for batch in 0..self.batches {
                let (loss, val_loss) = self.train_batch(batch, train, test, &mut accumulator)?;
                epoch_loss += loss;
                epoch_val_loss += val_loss;
            }

            let stats = EpochStats {
                epoch,
                train_loss: epoch_loss / self.batches as f32,
                val_loss: epoch_val_loss / self.batches as f32,
            };

            if !stats.train_loss.is_finite() {
                warn!(epoch, loss = stats.train_loss, "training loss is not finite");
            }
            info!(
                epoch,
                train_loss = stats.train_loss,
                val_loss = stats.val_loss,
                "finished epoch"
            );

            if let Some(logger) = logger.as_deref_mut() {
                logger.log(&stats, self.learning_rate)?;
            }
            report.epochs.push(stats);
        }

        Ok(report)
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // tail first, then the loss node and the optimizer state
        while let Some(node) = self.nodes.pop() {
            drop(node);
        }
        self.loss = None;
        self.optimizer = None;
    }
}

/// Parameters of one layer, in `internal_grad` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub kind: String,
    pub output_size: usize,
    pub parameters: Vec<Tensor>,
}

/// Architecture outline and trained parameters of a [`Model`].
///
/// Optimizer moments are not included; restoring a snapshot and training
/// further starts a fresh optimizer history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub input_size: usize,
    pub layers: Vec<LayerSnapshot>,
}

impl Model {
    /// Copy out every layer's kind, width and parameters.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            input_size: self.input_size,
            layers: self
                .nodes
                .iter()
                .map(|node| LayerSnapshot {
                    kind: node.layer.kind().to_string(),
                    output_size: node.out.len(),
                    parameters: node.layer.parameters().into_iter().cloned().collect(),
                })
                .collect(),
        }
    }

    /// Load parameters from a snapshot of a model with the same layers.
    ///
    /// Every size is checked before anything is written, so a failed
    /// restore leaves the model unchanged.
    pub fn restore(&mut self, snapshot: &ModelSnapshot) -> Result<()> {
        if snapshot.input_size != self.input_size {
            return Err(NnError::shape(
                "snapshot input size",
                self.input_size,
                snapshot.input_size,
            ));
        }
        if snapshot.layers.len() != self.nodes.len() {
            return Err(NnError::shape(
                "snapshot layer count",
                self.nodes.len(),
                snapshot.layers.len(),
            ));
        }

        for (node, saved) in self.nodes.iter().zip(&snapshot.layers) {
            if saved.kind != node.layer.kind() {
                return Err(NnError::config(format!(
                    "snapshot layer kind {} does not match {}",
                    saved.kind,
                    node.layer.kind()
                )));
            }
            if saved.output_size != node.out.len() {
                return Err(NnError::shape(
                    "snapshot layer width",
                    node.out.len(),
                    saved.output_size,
                ));
            }
            let params = node.layer.parameters();
            if params.len() != saved.parameters.len() {
                return Err(NnError::shape(
                    "snapshot parameter count",
                    params.len(),
                    saved.parameters.len(),
                ));
            }
            for (param, saved) in params.iter().zip(&saved.parameters) {
                if param.len() != saved.len() {
                    return Err(NnError::shape(
                        "snapshot parameter length",
                        param.len(),
                        saved.len(),
                    ));
                }
            }
        }

        for (node, saved) in self.nodes.iter_mut().zip(&snapshot.layers) {
            for (param, saved) in node.layer.parameters_mut().into_iter().zip(&saved.parameters) {
                param.copy_from(saved.as_slice())?;
            }
        }
        Ok(())
    }

    /// Write [`Model::snapshot`] to `path` as JSON.
    pub fn save_parameters(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(&self.snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a JSON snapshot from `path` and [`Model::restore`] it.
    pub fn load_parameters(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let json = fs::read_to_string(path)?;
        let snapshot: ModelSnapshot = serde_json::from_str(&json)?;
        self.restore(&snapshot)
    }
}
