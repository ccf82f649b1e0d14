//! The inference pipeline: image to tensor, tensor to score, score to
//! diagnosis. Pure functions apart from the forward pass itself, so the
//! decision math is testable without a model.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;

use crate::model::{ModelError, Predictor};

/// A preprocessed image in NHWC layout, kept as a plain buffer so it can be
/// built and inspected without the torch runtime.
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub data: Vec<f32>,
    pub shape: [i64; 4],
}

/// Resize to `size` x `size` (no aspect preservation, distortion accepted)
/// and scale 8-bit channels into [0, 1], with a leading batch dimension.
pub fn preprocess(img: &DynamicImage, size: u32) -> InputTensor {
    let resized = img.resize_exact(size, size, FilterType::Triangle);
    let rgb = resized.to_rgb8();
    let data = rgb.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    InputTensor {
        data,
        shape: [1, i64::from(size), i64::from(size), 3],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Diagnosis {
    #[serde(rename = "PNEUMONIA")]
    Pneumonia,
    #[serde(rename = "NORMAL")]
    Normal,
}

/// Strictly-greater comparison: a score exactly at the threshold is NORMAL.
pub fn decide(score: f64, threshold: f64) -> Diagnosis {
    if score > threshold {
        Diagnosis::Pneumonia
    } else {
        Diagnosis::Normal
    }
}

/// Probability mass assigned to the winning label, rounded to 4 decimals.
pub fn confidence(score: f64, diagnosis: Diagnosis) -> f64 {
    let conf = match diagnosis {
        Diagnosis::Pneumonia => score,
        Diagnosis::Normal => 1.0 - score,
    };
    round4(conf)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub diagnosis: Diagnosis,
    pub confidence: f64,
    pub raw_score: f64,
}

/// One forward pass plus the decision rule. One image per call, no batching.
pub fn classify(
    predictor: &dyn Predictor,
    input: &InputTensor,
    threshold: f64,
) -> Result<Prediction, ModelError> {
    let raw_score = f64::from(predictor.predict(input)?);
    let diagnosis = decide(raw_score, threshold);
    Ok(Prediction {
        diagnosis,
        confidence: confidence(raw_score, diagnosis),
        raw_score,
    })
}
