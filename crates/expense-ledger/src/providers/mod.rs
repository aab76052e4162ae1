//! Provider abstractions for generative models
//!
//! The extraction and advice layers talk to a [`GenerativeModel`] trait
//! object so tests can script responses without a network.

pub mod gemini;
pub mod model;

pub use gemini::GeminiClient;
pub use model::{GenerativeModel, MediaPart, TextStream};
