use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// Side length of the square face crop fed to the embedding model.
pub const INPUT_SIZE: u32 = 112;

const NORM_MEAN: f32 = 128.0;
const NORM_STD: f32 = 128.0;

/// Memory layout of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, as exported from TFLite MobileFaceNet.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

/// Turns a cropped face into a fixed-length embedding.
///
/// Implementations own whatever model state they need, so extraction takes
/// `&mut self`. Callers treat the output as opaque apart from its length.
pub trait EmbeddingExtractor {
    fn extract(&mut self, face: &DynamicImage) -> Result<Vec<f32>>;
}

/// ONNX Runtime backed extractor.
pub struct OnnxEncoder {
    session: Session,
    layout: TensorLayout,
}

impl OnnxEncoder {
    pub fn open(model_path: &Path, layout: TensorLayout) -> Result<Self> {
        let session = crate::model::encoder_session(model_path)?;
        log::debug!(
            "loaded embedding model {} ({:?} input)",
            model_path.display(),
            layout
        );
        Ok(Self { session, layout })
    }
}

impl EmbeddingExtractor for OnnxEncoder {
    fn extract(&mut self, face: &DynamicImage) -> Result<Vec<f32>> {
        let input = preprocess(face, self.layout);
        let input_tensor = Value::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("running embedding model")?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        // Expecting [1, D]
        let embedding_size = if shape.len() == 2 {
            shape[1] as usize
        } else {
            data.len()
        };
        if embedding_size == 0 || embedding_size > data.len() {
            anyhow::bail!("embedding model returned an empty output");
        }

        let mut embedding = data[..embedding_size].to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize to `INPUT_SIZE` square and scale each channel to roughly `[-1, 1]`.
pub fn preprocess(face: &DynamicImage, layout: TensorLayout) -> Array4<f32> {
    let resized = face
        .resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let size = INPUT_SIZE as usize;
    let pixels = resized.as_raw();

    let shape = match layout {
        TensorLayout::Nhwc => (1, size, size, 3),
        TensorLayout::Nchw => (1, 3, size, size),
    };
    let mut tensor = Array4::<f32>::zeros(shape);

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 3;
            for c in 0..3 {
                let value = (pixels[idx + c] as f32 - NORM_MEAN) / NORM_STD;
                match layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
