//! Training Logger
//!
//! Writes one CSV row per epoch and mirrors it to the console, so a run can
//! be followed live and analyzed afterwards.
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number, starting at 0
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for the epoch
//! - `train_loss`: Mean training loss
//! - `val_loss`: Mean loss on the test set
//!
//! ## Example
//!
//! ```rust,no_run
//! use chainrule::{EpochStats, TrainingLogger};
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(&EpochStats { epoch: 0, train_loss: 0.8, val_loss: 0.9 }, 1e-2)?;
//! # Ok::<(), chainrule::NnError>(())
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::error::Result;
use crate::train::EpochStats;

/// Per-epoch CSV and console logger
pub struct TrainingLogger {
    log_file: BufWriter<File>,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file at `log_path` and write its header.
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let mut log_file = BufWriter::new(File::create(log_path)?);

        writeln!(
            log_file,
            "epoch,elapsed_seconds,learning_rate,train_loss,val_loss"
        )?;
        log_file.flush()?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one epoch row and print it.
    pub fn log(&mut self, stats: &EpochStats, learning_rate: f32) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.6},{:.6}",
            stats.epoch, elapsed, learning_rate, stats.train_loss, stats.val_loss
        )?;

        // flushed per row so a crashed run keeps its history
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f32();
        println!(
            "Epoch {:4} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Train: {:.6} | Val: {:.6}",
            stats.epoch, elapsed, epoch_time, learning_rate, stats.train_loss, stats.val_loss
        );

        self.last_log_time = Instant::now();
        Ok(())
    }
}
