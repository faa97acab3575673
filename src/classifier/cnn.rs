//! Small convolutional network evaluated with ndarray.
//!
//! Layout: conv 3x3 (32) → maxpool 2 → conv 3x3 (64) → maxpool 2 → flatten
//! → dense 128 → dense (one unit per label) with softmax. Activations are HWC.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array1, Array2, Array3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Classifier, ClassifierError};
use crate::models::Label;

const KERNEL: usize = 3;
const POOL: usize = 2;
const CONV1_FILTERS: usize = 32;
const CONV2_FILTERS: usize = 64;
const HIDDEN_UNITS: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Conv2d {
    kernel_size: usize,
    /// `(kernel_size * kernel_size * in_channels, filters)`, rows ordered (dy, dx, c).
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    /// `(inputs, units)`
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnnClassifier {
    input_size: u32,
    conv1: Conv2d,
    conv2: Conv2d,
    hidden: Dense,
    output: Dense,
}

fn glorot_uniform<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit))
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}

impl Conv2d {
    fn untrained<R: Rng>(in_channels: usize, filters: usize, rng: &mut R) -> Self {
        let receptive = KERNEL * KERNEL;
        let limit = (6.0 / ((receptive * in_channels) + (receptive * filters)) as f32).sqrt();
        Self {
            kernel_size: KERNEL,
            weights: Array2::from_shape_fn((receptive * in_channels, filters), |_| {
                rng.gen_range(-limit..limit)
            }),
            bias: Array1::zeros(filters),
        }
    }

    fn in_channels(&self) -> usize {
        self.weights.nrows() / (self.kernel_size * self.kernel_size)
    }

    fn filters(&self) -> usize {
        self.weights.ncols()
    }

    /// Valid (unpadded) convolution with stride 1 followed by ReLU.
    fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>, ClassifierError> {
        let (height, width, channels) = input.dim();
        let k = self.kernel_size;
        if channels != self.in_channels() || height < k || width < k {
            return Err(ClassifierError::Shape(format!(
                "conv{}x{} over {}x{}x{} input, expected {} channels",
                k,
                k,
                height,
                width,
                channels,
                self.in_channels()
            )));
        }

        let (out_h, out_w) = (height - k + 1, width - k + 1);
        let mut patches = Array2::<f32>::zeros((out_h * out_w, k * k * channels));
        for y in 0..out_h {
            for x in 0..out_w {
                let window = input.slice(s![y..y + k, x..x + k, ..]);
                let mut row = patches.row_mut(y * out_w + x);
                for (dst, src) in row.iter_mut().zip(window.iter()) {
                    *dst = *src;
                }
            }
        }

        let mut out = patches.dot(&self.weights);
        out += &self.bias;
        out.mapv_inplace(relu);
        Ok(out.into_shape((out_h, out_w, self.filters()))?)
    }
}

impl Dense {
    fn untrained<R: Rng>(inputs: usize, units: usize, rng: &mut R) -> Self {
        Self {
            weights: glorot_uniform(inputs, units, rng),
            bias: Array1::zeros(units),
        }
    }

    fn forward(&self, input: &Array1<f32>) -> Result<Array1<f32>, ClassifierError> {
        if input.len() != self.weights.nrows() {
            return Err(ClassifierError::Shape(format!(
                "dense layer expects {} inputs, got {}",
                self.weights.nrows(),
                input.len()
            )));
        }
        Ok(input.dot(&self.weights) + &self.bias)
    }
}

fn max_pool(input: &Array3<f32>) -> Array3<f32> {
    let (height, width, channels) = input.dim();
    Array3::from_shape_fn((height / POOL, width / POOL, channels), |(y, x, c)| {
        input
            .slice(s![y * POOL..(y + 1) * POOL, x * POOL..(x + 1) * POOL, c])
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v))
    })
}

fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Spatial side length after conv → pool → conv → pool.
fn flattened_side(input_size: usize) -> Option<usize> {
    let after_first = input_size.checked_sub(KERNEL - 1)? / POOL;
    let after_second = after_first.checked_sub(KERNEL - 1)? / POOL;
    (after_second > 0).then_some(after_second)
}

impl CnnClassifier {
    /// Fresh Glorot-initialised weights. Predictions are meaningless until trained.
    pub fn untrained<R: Rng>(input_size: u32, classes: usize, rng: &mut R) -> Self {
        let side = flattened_side(input_size as usize).unwrap_or(1);
        Self {
            input_size,
            conv1: Conv2d::untrained(3, CONV1_FILTERS, rng),
            conv2: Conv2d::untrained(CONV1_FILTERS, CONV2_FILTERS, rng),
            hidden: Dense::untrained(side * side * CONV2_FILTERS, HIDDEN_UNITS, rng),
            output: Dense::untrained(HIDDEN_UNITS, classes, rng),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.conv1.kernel_size != KERNEL || self.conv2.kernel_size != KERNEL {
            return Err(ClassifierError::Shape(format!(
                "kernel size must be {KERNEL}"
            )));
        }

        let classes = self.output.weights.ncols();
        if classes != Label::ALL.len() {
            return Err(ClassifierError::LabelMismatch {
                expected: Label::ALL.len(),
                actual: classes,
            });
        }

        let side = flattened_side(self.input_size as usize).ok_or_else(|| {
            ClassifierError::Shape(format!("input size {} is too small", self.input_size))
        })?;

        let checks = [
            ("conv1 channels", self.conv1.in_channels(), 3),
            (
                "conv1 rows",
                self.conv1.weights.nrows(),
                self.conv1.kernel_size * self.conv1.kernel_size * 3,
            ),
            ("conv1 bias", self.conv1.bias.len(), self.conv1.filters()),
            (
                "conv2 channels",
                self.conv2.in_channels(),
                self.conv1.filters(),
            ),
            (
                "conv2 rows",
                self.conv2.weights.nrows(),
                self.conv2.kernel_size * self.conv2.kernel_size * self.conv1.filters(),
            ),
            ("conv2 bias", self.conv2.bias.len(), self.conv2.filters()),
            (
                "hidden inputs",
                self.hidden.weights.nrows(),
                side * side * self.conv2.filters(),
            ),
            ("hidden bias", self.hidden.bias.len(), self.hidden.weights.ncols()),
            (
                "output inputs",
                self.output.weights.nrows(),
                self.hidden.weights.ncols(),
            ),
            ("output bias", self.output.bias.len(), classes),
        ];
        for (what, actual, expected) in checks {
            if actual != expected {
                return Err(ClassifierError::Shape(format!(
                    "{what}: expected {expected}, found {actual}"
                )));
            }
        }
        Ok(())
    }
}

impl Classifier for CnnClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn probabilities(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError> {
        let x = max_pool(&self.conv1.forward(input)?);
        let x = max_pool(&self.conv2.forward(&x)?);
        let flat = Array1::from_iter(x.iter().copied());
        let hidden = self.hidden.forward(&flat)?.mapv(relu);
        let logits = self.output.forward(&hidden)?;
        Ok(softmax(&logits).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_model(classes: usize) -> CnnClassifier {
        CnnClassifier::untrained(16, classes, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn flattened_side_matches_layer_stack() {
        // 64 → 62 → 31 → 29 → 14
        assert_eq!(flattened_side(64), Some(14));
        assert_eq!(flattened_side(16), Some(2));
        assert_eq!(flattened_side(4), None);
    }

    #[test]
    fn untrained_model_outputs_a_distribution() {
        let model = small_model(3);
        assert_eq!(model.output.bias.len(), 3);

        let input = Array3::from_shape_fn((16, 16, 3), |(y, x, c)| ((y + x + c) % 7) as f32 / 7.0);
        let probabilities = model.probabilities(&input).unwrap();

        assert_eq!(probabilities.len(), 3);
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        let total: f32 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn wrong_input_size_is_a_shape_error() {
        let model = small_model(3);
        let input = Array3::<f32>::zeros((20, 20, 3));
        assert!(matches!(
            model.probabilities(&input),
            Err(ClassifierError::Shape(_))
        ));
    }

    #[test]
    fn convolution_sums_window_and_applies_relu() {
        let conv = Conv2d {
            kernel_size: 3,
            weights: Array2::from_shape_fn((9, 2), |(_, f)| if f == 0 { 1.0 } else { -1.0 }),
            bias: array![0.5, 0.0],
        };
        let input = Array3::from_elem((4, 4, 1), 1.0);
        let out = conv.forward(&input).unwrap();

        assert_eq!(out.dim(), (2, 2, 2));
        assert_eq!(out[[0, 0, 0]], 9.5);
        assert_eq!(out[[1, 1, 1]], 0.0);
    }

    #[test]
    fn max_pool_takes_window_maximum_and_floors() {
        let input = Array3::from_shape_fn((5, 5, 1), |(y, x, _)| (y * 5 + x) as f32);
        let out = max_pool(&input);
        assert_eq!(out.dim(), (2, 2, 1));
        assert_eq!(out[[0, 0, 0]], 6.0);
        assert_eq!(out[[1, 1, 0]], 18.0);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let out = softmax(&array![1000.0, 1000.0, 0.0]);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out[2] < 1e-6);
    }

    #[test]
    fn load_rejects_wrong_label_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("four.json");
        small_model(4).save(&path).unwrap();

        assert!(matches!(
            CnnClassifier::load(&path),
            Err(ClassifierError::LabelMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn load_rejects_truncated_hidden_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        let mut model = small_model(3);
        model.hidden.weights = Array2::zeros((10, HIDDEN_UNITS));
        model.save(&path).unwrap();

        assert!(matches!(
            CnnClassifier::load(&path),
            Err(ClassifierError::Shape(_))
        ));
    }

    #[test]
    fn saved_model_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let model = small_model(3);
        model.save(&path).unwrap();

        let loaded = CnnClassifier::load(&path).unwrap();
        let input = Array3::from_elem((16, 16, 3), 0.25);
        let a = model.probabilities(&input).unwrap();
        let b = loaded.probabilities(&input).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
