pub mod encoder;
pub mod model;

// Re-export commonly used types
pub use encoder::{EmbeddingExtractor, OnnxEncoder, TensorLayout};
