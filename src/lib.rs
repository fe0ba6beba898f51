//! Framewise - Deterministic Windowed Number-Set Inference
//!
//! Turns token sequences into per-position predictions: local windows are
//! hashed into feature ids per configured number set, the ids are looked up in
//! precomputed probability tables, and the candidates are merged into one
//! ranked prediction with explicit fallback and tie-break rules.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod framer;
pub mod hasher;
pub mod model;

// Re-export main types for convenience
pub use aggregator::{predict_batch, ResultAggregator, ResultSet, TypeTally};
pub use config::{Amplify, AmplifyMode, EngineConfig};
pub use context::Context;
pub use engine::{Candidate, Prediction, PredictionEngine, PredictionType};
pub use error::{ModelError, PredictError};
pub use framer::{CharEdge, Frame, Framer};
pub use hasher::{hash_short_string, hash_values, Token};
pub use model::{DataplaneKey, Model, ModelArtifact, ProbMethod, Value};
