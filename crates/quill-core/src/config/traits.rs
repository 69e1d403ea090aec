//! Core configuration traits

use crate::QuillResult;

/// Trait for configuration defaults
pub trait ConfigDefaults {
    /// Get default values for this configuration
    fn defaults() -> Self;
}

/// Trait for configuration validation
pub trait ConfigValidation {
    /// Validate this configuration
    fn validate(&self) -> QuillResult<()>;
}
