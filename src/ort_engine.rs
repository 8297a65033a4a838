//! ONNX Runtime backed inference engine (feature `ml`).

use std::sync::{Arc, Mutex};

use ort::execution_providers::CPUExecutionProvider;
use ort::session::Session;
use tracing::{debug, warn};

use crate::engine::{
    EngineError, EngineOptions, InferenceEngine, InferenceSession, RuntimePreference,
};
use crate::tensor::{NamedOutputSet, Tensor};

/// Builds [`OrtSession`]s. Stateless; the session owns all native resources.
#[derive(Debug, Default)]
pub struct OrtEngine;

#[async_trait::async_trait]
impl InferenceEngine for OrtEngine {
    async fn build(&self, options: EngineOptions) -> Result<Arc<dyn InferenceSession>, EngineError> {
        // Session construction does file IO and graph compilation; keep it off
        // the async workers.
        let session = tokio::task::spawn_blocking(move || OrtSession::open(&options))
            .await
            .map_err(|e| EngineError::Build(format!("model load task failed: {e}")))??;
        Ok(Arc::new(session))
    }
}

/// A loaded ONNX model.
///
/// The native session sits behind a mutex and is dropped on [`release`];
/// shape and name metadata is extracted at load time so the accessors stay
/// available (and lock-free) for the session's whole lifetime.
///
/// [`release`]: InferenceSession::release
pub struct OrtSession {
    session: Mutex<Option<Session>>,
    input_dims: Vec<usize>,
    output_names: Vec<String>,
    version: String,
}

impl OrtSession {
    fn open(options: &EngineOptions) -> Result<Self, EngineError> {
        let mut providers = Vec::new();
        for preference in &options.runtime_order {
            match preference {
                RuntimePreference::Gpu => {
                    // Accelerator providers are separate cargo features of the
                    // runtime; without one compiled in the order falls through
                    // to the next entry, mirroring the engine's own fallback.
                    debug!("no accelerator provider in this build, trying next runtime");
                }
                RuntimePreference::Cpu => providers.push(CPUExecutionProvider::default().build()),
            }
        }

        let session = Session::builder()
            .map_err(build_error)?
            .with_execution_providers(providers)
            .map_err(build_error)?
            .commit_from_file(&options.model_path)
            .map_err(build_error)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| EngineError::Build("model has no inputs".into()))?;
        let dims_i64 = input
            .input_type
            .tensor_dimensions()
            .cloned()
            .ok_or_else(|| EngineError::Build("model input is not a tensor".into()))?;
        // Dynamic dimensions (-1) resolve to a batch of one.
        let input_dims = dims_i64
            .iter()
            .map(|&d| if d > 0 { usize::try_from(d).unwrap_or(1) } else { 1 })
            .collect();

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let version = match session.metadata() {
            Ok(metadata) => metadata
                .version()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "unknown".into()),
            Err(_) => "unknown".into(),
        };

        debug!(
            model = %options.model_path.display(),
            debug_enabled = options.debug,
            outputs = output_names.len(),
            "model loaded"
        );

        Ok(Self {
            session: Mutex::new(Some(session)),
            input_dims,
            output_names,
            version,
        })
    }
}

impl InferenceSession for OrtSession {
    fn input_dimensions(&self) -> Vec<usize> {
        self.input_dims.clone()
    }

    fn output_layer_names(&self) -> Vec<String> {
        self.output_names.clone()
    }

    fn model_version(&self) -> String {
        self.version.clone()
    }

    fn execute(&self, input: &Tensor) -> Result<NamedOutputSet, EngineError> {
        let array =
            ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(input.dims()), input.data().to_vec())
                .map_err(|e| EngineError::Execute(e.to_string()))?;
        let value = ort::value::Value::from_array(array).map_err(execute_error)?;

        let guard = self
            .session
            .lock()
            .map_err(|_| EngineError::Execute("session lock poisoned".into()))?;
        let session = guard.as_ref().ok_or(EngineError::Released)?;

        let outputs = session.run(ort::inputs![value]).map_err(execute_error)?;

        let mut named = NamedOutputSet::new();
        for name in &self.output_names {
            let Some(output) = outputs.get(name.as_str()) else {
                continue;
            };
            // Non-float outputs (token ids and the like) are not part of the
            // classification contract; skip them.
            let Ok((shape, data)) = output.try_extract_tensor::<f32>() else {
                warn!(layer = %name, "skipping non-f32 output");
                continue;
            };
            let dims: Vec<usize> = shape
                .iter()
                .map(|&d| usize::try_from(d).unwrap_or(0))
                .collect();
            let tensor = Tensor::new(dims, data.to_vec())
                .map_err(|e| EngineError::InvalidOutputShape(e.to_string()))?;
            named.insert(name.clone(), tensor);
        }
        Ok(named)
    }

    fn release(&self) {
        if let Ok(mut guard) = self.session.lock() {
            guard.take();
        }
    }
}

// Full error goes to the log; callers get a sanitized description.
fn build_error(e: ort::Error) -> EngineError {
    tracing::error!(error = %e, "ORT session build error");
    EngineError::Build("internal engine error".into())
}

fn execute_error(e: ort::Error) -> EngineError {
    tracing::error!(error = %e, "ORT inference error");
    EngineError::Execute("internal inference error".into())
}
