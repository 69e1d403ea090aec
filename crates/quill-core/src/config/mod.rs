//! Configuration for the Quill engine.

pub mod engine;
pub mod traits;

pub use engine::EngineConfig;
pub use traits::{ConfigDefaults, ConfigValidation};
