use serde::{Deserialize, Serialize};

/// Distance reported for pairs that cannot be compared: mismatched lengths,
/// zero-norm vectors or non-finite arithmetic. Never below any threshold.
pub const MAX_DISTANCE: f32 = f32::INFINITY;

/// Face embedding as produced by the recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn distance(&self, other: &Embedding) -> f32 {
        distance(&self.0, &other.0)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Cosine distance, `1 - cos(a, b)`, in `[0, 2]`.
///
/// Returns [`MAX_DISTANCE`] instead of failing when the vectors differ in
/// length, either has zero norm, or the arithmetic is not finite, so
/// nearest-neighbour scans never need to special-case bad rows.
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return MAX_DISTANCE;
    }

    // f64 accumulation keeps tiny or large components from under/overflowing
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }

    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 || !denom.is_finite() || !dot.is_finite() {
        return MAX_DISTANCE;
    }

    let cos = (dot / denom).clamp(-1.0, 1.0);
    (1.0 - cos) as f32
}
