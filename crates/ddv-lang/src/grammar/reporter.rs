use std::collections::BTreeSet;
use std::fmt::{self, Display};

use itertools::Itertools;

use crate::error::syntax::SyntaxError;

pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Error listener shared by every parser: records syntax errors instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReporter {
    errors: BTreeSet<SyntaxError>,
    max_errors: usize,
}

impl Display for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.errors.iter().join(", "))
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

impl ErrorReporter {
    pub fn new(max_errors: usize) -> Self {
        Self {
            errors: BTreeSet::new(),
            max_errors,
        }
    }

    pub fn report(&mut self, error: SyntaxError) {
        if self.errors.len() < self.max_errors {
            self.errors.insert(error);
        }
    }

    /// Errors ordered by source position.
    pub fn to_vec(&self) -> Vec<SyntaxError> {
        self.errors.iter().cloned().collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
