use std::fmt;

use serde::{Deserialize, Serialize};

/// Output classes of the classifier, in model output order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Cat,
    Dog,
    Car,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Cat, Label::Dog, Label::Car];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Cat => "cat",
            Label::Dog => "dog",
            Label::Car => "car",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored prediction. Also the body of a successful `/predict` response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionRecord {
    pub filename: String,
    pub prediction: Label,
    /// Percentage, rounded to two decimals.
    pub confidence: f64,
    pub timestamp: String,
}

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl PredictionRecord {
    pub fn now(filename: String, prediction: Label, confidence: f64) -> Self {
        Self {
            filename,
            prediction,
            confidence,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
