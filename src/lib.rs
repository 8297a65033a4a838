//! On-device image classification core.
//!
//! Orchestrates classification against a pluggable inference backend: the
//! [`controller::ClassificationController`] drives asynchronous model and
//! sample-image loading, converts bitmaps into the tensor layout the model
//! expects ([`codec`]), runs inference through the [`engine`] boundary and
//! reduces the probability output to a ranked top-K result ([`topk`]).
//!
//! Everything UI-shaped lives behind the [`controller::Surface`] trait; this
//! crate only hands it plain data and never renders anything itself.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bitmap;
pub mod codec;
pub mod controller;
pub mod engine;
pub mod mean;
pub mod model;
pub mod tensor;
pub mod topk;

#[cfg(feature = "ml")]
pub mod ort_engine;

pub use bitmap::{BitmapCache, BitmapError};
pub use codec::CodecError;
pub use controller::{ClassificationController, ControllerEvent, Surface};
pub use engine::{EngineError, EngineOptions, InferenceEngine, InferenceSession, RuntimePreference};
pub use model::{ModelBundle, ModelError};
pub use tensor::{LabelScore, NamedOutputSet, Tensor, TensorError};
pub use topk::SelectionError;

#[cfg(feature = "ml")]
pub use ort_engine::OrtEngine;

/// Name of the model output layer carrying class probabilities.
pub const PROB_OUTPUT_LAYER: &str = "prob";

/// How many ranked labels a classification produces.
pub const CLASSIFICATION_TOP_K: usize = 1;

/// Runtime targets the engine tries in order when loading a model.
pub const DEFAULT_RUNTIME_ORDER: &[RuntimePreference] =
    &[RuntimePreference::Gpu, RuntimePreference::Cpu];

/// Entry cap for the sample bitmap cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 4096;
pub const MAX_IMAGE_ALLOC: u64 = 100 * 1024 * 1024;
