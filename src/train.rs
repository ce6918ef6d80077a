//! Training Data and Configuration
//!
//! This module provides the borrowed view the model trains on, the
//! hyperparameter set, and the per-epoch report `train` returns.
//!
//! ## How Examples Are Laid Out
//!
//! Inputs and targets are flat buffers, one example after another, with a
//! stride equal to the per-example width:
//!
//! ```text
//! input_size = 2, output_size = 1, 3 examples
//!
//! inputs:  [x00, x01, x10, x11, x20, x21]
//! targets: [y0,  y1,  y2]
//! ```
//!
//! ## How Batches Are Drawn
//!
//! Mini-batch `b` uses examples `b·batch_size + i` for `i < batch_size`,
//! wrapping around the end of the dataset. With 100 examples, a batch size
//! of 10 and 10 batches, every epoch visits each example exactly once. The
//! buffers are never mutated or re-pointed; each example slice is derived
//! from its index.
//!
//! ## Example
//!
//! ```rust
//! use chainrule::Dataset;
//!
//! let inputs = [0.0, 1.0, 2.0];
//! let targets = [1.0, 3.0, 5.0];
//! let data = Dataset::new(&inputs, &targets, 1, 1)?;
//!
//! assert_eq!(data.len(), 3);
//! assert_eq!(data.example(4), (&[1.0][..], &[3.0][..])); // wraps
//! # Ok::<(), chainrule::NnError>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// A borrowed set of `(input, target)` examples stored contiguously.
#[derive(Clone, Copy, Debug)]
pub struct Dataset<'a> {
    inputs: &'a [f32],
    targets: &'a [f32],
    input_size: usize,
    output_size: usize,
    len: usize,
}

impl<'a> Dataset<'a> {
    /// Bind input and target buffers with their per-example widths.
    ///
    /// # Errors
    ///
    /// - [`NnError::InvalidConfiguration`] for a zero width.
    /// - [`NnError::ShapeMismatch`] if a buffer is not a whole number of
    ///   examples, or the two buffers hold different example counts.
    pub fn new(
        inputs: &'a [f32],
        targets: &'a [f32],
        input_size: usize,
        output_size: usize,
    ) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(NnError::config("dataset widths must be non-zero"));
        }
        if inputs.len() % input_size != 0 {
            return Err(NnError::shape(
                "dataset inputs (whole examples)",
                inputs.len() - inputs.len() % input_size,
                inputs.len(),
            ));
        }
        if targets.len() % output_size != 0 {
            return Err(NnError::shape(
                "dataset targets (whole examples)",
                targets.len() - targets.len() % output_size,
                targets.len(),
            ));
        }

        let len = inputs.len() / input_size;
        if targets.len() / output_size != len {
            return Err(NnError::shape(
                "dataset example count",
                len,
                targets.len() / output_size,
            ));
        }

        Ok(Self {
            inputs,
            targets,
            input_size,
            output_size,
            len,
        })
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Input and target of example `index`, wrapping past the end.
    ///
    /// # Panics
    ///
    /// Panics if the dataset is empty.
    pub fn example(&self, index: usize) -> (&'a [f32], &'a [f32]) {
        let i = index % self.len;
        (
            &self.inputs[i * self.input_size..(i + 1) * self.input_size],
            &self.targets[i * self.output_size..(i + 1) * self.output_size],
        )
    }
}

/// Training configuration
///
/// Hyperparameters for [`crate::Model::train`]. Serializable so a run can
/// be reproduced from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over `batches` mini-batches
    pub epochs: usize,
    /// Examples per mini-batch
    pub batch_size: usize,
    /// Mini-batches per epoch
    pub batches: usize,
    /// Learning rate handed to the optimizer
    pub learning_rate: f32,
    /// Clip the averaged gradient to this L2 norm before the optimizer
    pub max_grad_norm: Option<f32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            batches: 1,
            learning_rate: 1e-3,
            max_grad_norm: None,
        }
    }
}

impl TrainingConfig {
    /// Create a tiny configuration for quick experiments
    pub fn tiny() -> Self {
        Self {
            epochs: 5,
            batch_size: 4,
            batches: 4,
            learning_rate: 1e-2,
            max_grad_norm: None,
        }
    }

    /// Check every field for a usable value.
    ///
    /// # Errors
    ///
    /// [`NnError::InvalidConfiguration`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(NnError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(NnError::config("batch_size must be at least 1"));
        }
        if self.batches == 0 {
            return Err(NnError::config("batches must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NnError::config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if let Some(norm) = self.max_grad_norm {
            if !(norm.is_finite() && norm > 0.0) {
                return Err(NnError::config(format!(
                    "max_grad_norm must be positive and finite, got {norm}"
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: TrainingConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Mean losses of one epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean training loss over every example of every batch
    pub train_loss: f32,
    /// Mean loss on the test set, evaluated alongside each training example
    pub val_loss: f32,
}

/// Everything a training run measured.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochStats>,
}

impl TrainingReport {
    /// Mean training loss of the last epoch.
    pub fn final_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.train_loss)
    }

    pub fn train_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.train_loss).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_examples() {
        let inputs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let targets = [10.0, 20.0, 30.0];
        let data = Dataset::new(&inputs, &targets, 2, 1).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.example(1), (&[3.0, 4.0][..], &[20.0][..]));
        assert_eq!(data.example(5), (&[5.0, 6.0][..], &[30.0][..]));
    }

    #[test]
    fn test_dataset_rejects_partial_example() {
        let err = Dataset::new(&[1.0, 2.0, 3.0], &[1.0], 2, 1).unwrap_err();
        assert!(matches!(err, NnError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_dataset_rejects_count_mismatch() {
        let err = Dataset::new(&[1.0, 2.0], &[1.0], 1, 1).unwrap_err();
        assert!(matches!(err, NnError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainingConfig::default().validate().is_ok());
        assert!(TrainingConfig::tiny().validate().is_ok());

        let zero_batch = TrainingConfig {
            batch_size: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            zero_batch.validate(),
            Err(NnError::InvalidConfiguration(_))
        ));

        let bad_lr = TrainingConfig {
            learning_rate: f32::NAN,
            ..TrainingConfig::default()
        };
        assert!(bad_lr.validate().is_err());
    }

    #[test]
    fn test_config_json_defaults_missing_fields() {
        let config: TrainingConfig = serde_json::from_str(r#"{"epochs": 7}"#).unwrap();
        assert_eq!(config.epochs, 7);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_grad_norm, None);
    }

    #[test]
    fn test_config_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "chainrule_config_{}.json",
            std::process::id()
        ));
        let config = TrainingConfig {
            max_grad_norm: Some(1.0),
            ..TrainingConfig::tiny()
        };
        config.to_json_file(&path).unwrap();
        let loaded = TrainingConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_report_final_loss() {
        let mut report = TrainingReport::default();
        assert_eq!(report.final_loss(), None);
        report.epochs.push(EpochStats {
            epoch: 0,
            train_loss: 2.0,
            val_loss: 2.5,
        });
        report.epochs.push(EpochStats {
            epoch: 1,
            train_loss: 1.0,
            val_loss: 1.5,
        });
        assert_eq!(report.final_loss(), Some(1.0));
        assert_eq!(report.train_losses(), vec![2.0, 1.0]);
    }
}
