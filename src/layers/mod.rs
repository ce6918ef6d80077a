//! Neural Network Layers
//!
//! A model is an ordered chain of layers. Each layer is a trait object that
//! implements the four lifecycle hooks of the [`Layer`] trait: forward,
//! backward, parameter update and teardown (`Drop`).
//!
//! ## Layers
//!
//! - **activation**: Identity pass-through and ReLU (no trainable parameters)
//! - **linear**: Fully connected layer (weights and bias)
//!
//! ## Buffers
//!
//! The model owns every layer's output and input-gradient buffers and hands
//! them to the hooks as slices. A layer never owns or frees what it reads:
//!
//! ```text
//!          input ──> [ layer k ] ──> out          (input = out of layer k-1,
//!                                                   or the caller's slice for k = 0)
//!       in_grad <── [ layer k ] <── loss_grad     (loss_grad = in_grad of layer k+1,
//!                                                   or of the loss node for the tail)
//! ```
//!
//! A layer owns only its kind-specific state: its parameters and, if it has
//! any, one contiguous `internal_grad` tensor holding the gradient of every
//! parameter in a fixed order. `internal_grad()` returning `None` is how the
//! model knows a layer has nothing to train.
//!
//! ## Plug-in Pattern
//!
//! A layer kind is selected by passing an init function to
//! [`crate::Model::add_layer`]. The model calls it with the layer's input and
//! output sizes; the function validates them and allocates the layer:
//!
//! ```rust,ignore
//! pub fn my_layer() -> impl FnOnce(LayerShape) -> Result<Box<dyn Layer>> {
//!     move |shape| Ok(Box::new(MyLayer::new(shape.in_size, shape.out_size)?))
//! }
//! ```

pub mod activation;
pub mod linear;

use crate::error::Result;
use crate::tensor::Tensor;

// Re-export main types for convenience
pub use activation::{identity, relu, Identity, Relu};
pub use linear::{fully_connected, FullyConnected};

/// Input and output width of a layer being constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerShape {
    pub in_size: usize,
    pub out_size: usize,
}

/// Plug-in signature of a layer kind.
///
/// Implemented for every closure that builds a layer from its
/// [`LayerShape`], so the init functions in this module can be passed to
/// [`crate::Model::add_layer`] directly.
pub trait LayerInit: FnOnce(LayerShape) -> Result<Box<dyn Layer>> {}

impl<F> LayerInit for F where F: FnOnce(LayerShape) -> Result<Box<dyn Layer>> {}

/// One node of the computation graph.
pub trait Layer {
    /// Short stable name of the layer kind, used in logs and snapshots.
    fn kind(&self) -> &'static str;

    /// Compute `out` from `input`.
    fn forward(&mut self, input: &[f32], out: &mut [f32]);

    /// Given the gradient of the loss w.r.t. this layer's output
    /// (`loss_grad`), write the gradient w.r.t. its input into `in_grad`
    /// and refresh `internal_grad` if the layer has parameters.
    ///
    /// `input` is the same slice the preceding `forward` call received.
    fn backward(&mut self, input: &[f32], loss_grad: &[f32], in_grad: &mut [f32]);

    /// Apply the optimizer-transformed `internal_grad` to the parameters.
    fn update(&mut self) {}

    fn internal_grad(&self) -> Option<&Tensor> {
        None
    }

    fn internal_grad_mut(&mut self) -> Option<&mut Tensor> {
        None
    }

    /// Trainable parameter tensors, in `internal_grad` order.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable access to the parameter tensors for in-place edits.
    ///
    /// Callers may change values but never lengths: the forward and backward
    /// hooks assume the shapes fixed at construction.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }
}
