use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dimensioned flat float buffer, the unit of exchange with the inference
/// engine.
///
/// The buffer length always equals the product of the dimensions; the
/// constructor rejects anything else, so the size is derived and never stored
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    dims: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("buffer length {actual} does not match dimensions {dims:?} (expected {expected})")]
    LengthMismatch {
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

impl Tensor {
    /// Builds a tensor, enforcing `data.len() == product(dims)`.
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected = element_count(&dims);
        if data.len() != expected {
            return Err(TensorError::LengthMismatch {
                dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Zero-filled tensor of the given shape.
    #[must_use]
    pub fn zeros(dims: Vec<usize>) -> Self {
        let data = vec![0.0; element_count(&dims)];
        Self { dims, data }
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Product of a dimension vector; the element count of a tensor of that shape.
#[must_use]
pub fn element_count(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Output tensors keyed by layer name. Exactly one entry (the probability
/// layer) is consumed by classification.
pub type NamedOutputSet = HashMap<String, Tensor>;

/// One ranked classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub index: usize,
    pub label: String,
    pub score: f32,
}
