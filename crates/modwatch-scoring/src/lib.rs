//! Clients for the external classifiers: the Perspective toxicity scorer and
//! the Gemini generative model.

pub mod error;
pub mod gemini;
pub mod perspective;

pub use error::ScoringError;
pub use gemini::{GeminiClient, GeminiResponse, GenerationSettings};
pub use perspective::PerspectiveClient;
