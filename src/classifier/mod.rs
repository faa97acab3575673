pub mod cnn;
pub mod onnx;
pub mod preprocess;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use ndarray::Array3;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::models::Label;

pub use cnn::CnnClassifier;
pub use onnx::OnnxClassifier;
pub use preprocess::preprocess;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Invalid image file: {0}")]
    Decode(#[from] image::ImageError),
    #[error("model has {actual} outputs but there are {expected} labels")]
    LabelMismatch { expected: usize, actual: usize },
    #[error("model weights are inconsistent: {0}")]
    Shape(String),
    #[error("no model found at {0}")]
    MissingModel(PathBuf),
    #[error("model file error: {0}")]
    Io(#[from] io::Error),
    #[error("model file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("onnx runtime error: {0}")]
    Onnx(String),
}

impl From<ndarray::ShapeError> for ClassifierError {
    fn from(err: ndarray::ShapeError) -> Self {
        ClassifierError::Shape(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub probability: f32,
}

impl Prediction {
    /// Probability as a percentage, rounded to two decimals.
    pub fn confidence(&self) -> f64 {
        (f64::from(self.probability) * 100.0 * 100.0).round() / 100.0
    }
}

pub trait Classifier: Send + Sync {
    fn input_size(&self) -> u32;

    /// One forward pass over a preprocessed `(size, size, 3)` tensor.
    fn probabilities(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError>;

    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassifierError> {
        let input = preprocess(image, self.input_size());
        let probabilities = self.probabilities(&input)?;
        top_prediction(&probabilities)
    }

    /// Decodes by content; the extension is only a fallback hint.
    fn classify_file(&self, path: &Path) -> Result<Prediction, ClassifierError> {
        let image = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?;
        self.classify(&image)
    }
}

/// Picks the highest scoring label; the first index wins ties.
pub fn top_prediction(probabilities: &[f32]) -> Result<Prediction, ClassifierError> {
    if probabilities.len() != Label::ALL.len() {
        return Err(ClassifierError::LabelMismatch {
            expected: Label::ALL.len(),
            actual: probabilities.len(),
        });
    }

    let mut best = 0;
    for (index, &p) in probabilities.iter().enumerate() {
        if p > probabilities[best] {
            best = index;
        }
    }

    Ok(Prediction {
        label: Label::ALL[best],
        probability: probabilities[best],
    })
}

/// Loads the configured model, writing an untrained placeholder when allowed.
pub fn load(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    let path = &config.path;

    if path.extension().is_some_and(|ext| ext == "onnx") {
        if !path.exists() {
            return Err(ClassifierError::MissingModel(path.clone()));
        }
        info!(path = %path.display(), "loading onnx model");
        return Ok(Arc::new(OnnxClassifier::load(path, INPUT_SIZE)?));
    }

    if path.exists() {
        info!(path = %path.display(), "loading model weights");
        return Ok(Arc::new(CnnClassifier::load(path)?));
    }

    if !config.create_if_missing {
        return Err(ClassifierError::MissingModel(path.clone()));
    }

    warn!(
        path = %path.display(),
        "no model found, saving an untrained placeholder; predictions are meaningless until it is replaced with a trained model"
    );
    let model = CnnClassifier::untrained(INPUT_SIZE, Label::ALL.len(), &mut rand::thread_rng());
    model.save(path)?;
    Ok(Arc::new(model))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Returns the same scores for every input.
    pub struct FixedClassifier {
        pub scores: Vec<f32>,
    }

    impl Classifier for FixedClassifier {
        fn input_size(&self) -> u32 {
            INPUT_SIZE
        }

        fn probabilities(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError> {
            assert_eq!(input.dim(), (64, 64, 3));
            Ok(self.scores.clone())
        }
    }
}
