use serde::Deserialize;

use crate::grammar::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_ERRORS};

pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Syntax errors recorded per parse before the reporter stops collecting.
    pub max_errors: usize,
    /// Loop iterations a single compiled function may run.
    pub max_iterations: usize,
    /// Nesting levels of expressions, blocks and elements a template or rule may use.
    pub max_depth: usize,
    /// Render fragment compile errors as `<!--[ddv] ... -->` comments instead of dropping them.
    pub error_markers: bool,
    /// Keep compiled artifacts between calls.
    pub cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_depth: DEFAULT_MAX_DEPTH,
            error_markers: true,
            cache: true,
        }
    }
}
