use std::env;
use thiserror::Error;

/// Environment variable overriding [`SheetConfig::max_eval_depth`]
pub const MAX_EVAL_DEPTH_VAR: &str = "CELLGRAPH_MAX_EVAL_DEPTH";

/// Default bound on nested formula resolution
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Sheet configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    /// How many formula cells may be resolving at once before evaluation
    /// gives up with `#ERROR!`
    pub max_eval_depth: usize,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }
}

impl SheetConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_eval_depth = match lookup(MAX_EVAL_DEPTH_VAR) {
            None => DEFAULT_MAX_EVAL_DEPTH,
            Some(value) => match value.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => depth,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: MAX_EVAL_DEPTH_VAR,
                        value,
                    })
                }
            },
        };

        Ok(Self { max_eval_depth })
    }
}
