//! Inference engine boundary.
//!
//! The tensor math and model execution live in an external engine; this crate
//! only prepares inputs, owns the session lifecycle and interprets outputs.
//! Exactly one concrete backend ships in-repo ([`crate::ort_engine`], behind
//! the `ml` feature), but the controller is written against these traits so
//! alternate backends slot in without touching it.

use std::path::PathBuf;
use std::sync::Arc;

use crate::tensor::{NamedOutputSet, Tensor};

/// An execution target the engine may try when loading a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePreference {
    Gpu,
    Cpu,
}

/// Options for building a session: runtime targets in preference order, the
/// model artifact, and a debug toggle.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub runtime_order: Vec<RuntimePreference>,
    pub model_path: PathBuf,
    pub debug: bool,
}

impl EngineOptions {
    /// Accelerator-first defaults with debugging off.
    #[must_use]
    pub fn for_model(model_path: PathBuf) -> Self {
        Self {
            runtime_order: crate::DEFAULT_RUNTIME_ORDER.to_vec(),
            model_path,
            debug: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to read model file")]
    Io(#[from] std::io::Error),

    #[error("engine failed to build session: {0}")]
    Build(String),

    #[error("inference failed: {0}")]
    Execute(String),

    #[error("session already released")]
    Released,

    #[error("model output shape invalid: {0}")]
    InvalidOutputShape(String),
}

/// Builds inference sessions from model files.
#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Loads the model and returns a ready session, or an error when the
    /// artifact is unreadable or rejected by the backend. Never retries.
    async fn build(&self, options: EngineOptions) -> Result<Arc<dyn InferenceSession>, EngineError>;
}

/// A loaded model. Owned exclusively by the controller between load-complete
/// and release; only one `execute` runs at a time by construction (the
/// controller serializes classification requests).
pub trait InferenceSession: Send + Sync {
    /// Ordered input dimension vector, e.g. height x width x channels.
    fn input_dimensions(&self) -> Vec<usize>;

    /// Names of the model's output layers.
    fn output_layer_names(&self) -> Vec<String>;

    /// Version string reported by the loaded model.
    fn model_version(&self) -> String;

    /// Runs the model on one input tensor.
    fn execute(&self, input: &Tensor) -> Result<NamedOutputSet, EngineError>;

    /// Frees backend resources. Idempotent; `execute` after release fails
    /// with [`EngineError::Released`].
    fn release(&self);
}
