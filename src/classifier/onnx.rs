use std::path::Path;

use ndarray::Array3;
use tract_onnx::prelude::*;

use super::{Classifier, ClassifierError};
use crate::models::Label;

/// Pre-trained model exported to ONNX, with a channels-last `[1, size, size, 3]` input.
pub struct OnnxClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_size: u32,
}

fn onnx_error(e: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Onnx(e.to_string())
}

impl OnnxClassifier {
    pub fn load(path: &Path, input_size: u32) -> Result<Self, ClassifierError> {
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(onnx_error)?
            .with_input_fact(0, f32::fact([1, side, side, 3]).into())
            .map_err(onnx_error)?
            .into_optimized()
            .map_err(onnx_error)?
            .into_runnable()
            .map_err(onnx_error)?;

        Ok(Self { model, input_size })
    }
}

impl Classifier for OnnxClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn probabilities(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError> {
        let (height, width, channels) = input.dim();
        let values: Vec<f32> = input.iter().copied().collect();
        let tensor = tract_ndarray::Array::from_shape_vec((1, height, width, channels), values)
            .map_err(onnx_error)?
            .into_tensor();

        let result = self
            .model
            .run(tvec!(tensor.into_tvalue()))
            .map_err(onnx_error)?;

        let output = result[0].to_array_view::<f32>().map_err(onnx_error)?;
        let scores: Vec<f32> = output.iter().copied().collect();
        if scores.len() != Label::ALL.len() {
            return Err(ClassifierError::LabelMismatch {
                expected: Label::ALL.len(),
                actual: scores.len(),
            });
        }
        to_probabilities(scores)
    }
}

/// Passes a softmax output through unchanged and applies softmax to raw logits.
fn to_probabilities(scores: Vec<f32>) -> Result<Vec<f32>, ClassifierError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ClassifierError::Onnx(format!(
            "model produced non-finite scores {scores:?}"
        )));
    }

    let sum: f32 = scores.iter().sum();
    if scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3 {
        return Ok(scores);
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    Ok(exp.into_iter().map(|e| e / total).collect())
}
