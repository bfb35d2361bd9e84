pub mod config;
pub mod controller;
pub mod embedding;
pub mod matcher;
pub mod quality;
pub mod session;
pub mod store;

pub use controller::{Controller, Event, FinalizeError, Mode};
pub use embedding::{distance, Embedding, MAX_DISTANCE};
pub use matcher::{Identity, IdentityScore, MatchResult, Matcher};
pub use session::{Capture, EnrollmentSession};
pub use store::{EnrollmentRecord, FileStore, IdentityStore, MemoryStore};

// Re-export vision types for convenience
pub use facematch_vision::{EmbeddingExtractor, OnnxEncoder, TensorLayout};
