//! Shared front-end contract for the query, rule, script, expression and markup grammars.
//!
//! Every parser recovers from syntax errors: it reports them to an [`ErrorReporter`]
//! and leaves an error node in the tree at the place where it recovered. Validation
//! is a depth-first walk over the produced tree that collects those error nodes.

mod reporter;

pub use reporter::{DEFAULT_MAX_ERRORS, ErrorReporter};

use crate::error::syntax::SyntaxError;
use crate::options::Options;

/// Nesting levels a parser descends into before it reports `NestingTooDeep`.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Bounds a single parse runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_errors: usize,
    /// Levels of nested expressions, blocks or elements. Input past this depth
    /// is skipped and replaced by a single error node.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&Options> for Limits {
    fn from(options: &Options) -> Self {
        Self {
            max_errors: options.max_errors,
            max_depth: options.max_depth,
        }
    }
}

/// Trees that may contain error nodes at any depth.
pub trait CollectErrors {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>);

    fn errors(&self) -> Vec<SyntaxError> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        errors
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

impl<T: CollectErrors> CollectErrors for [T] {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.iter().for_each(|node| node.collect_errors(errors));
    }
}

impl<T: CollectErrors> CollectErrors for Vec<T> {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.as_slice().collect_errors(errors);
    }
}

impl<T: CollectErrors> CollectErrors for Box<T> {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        (**self).collect_errors(errors);
    }
}

impl<T: CollectErrors> CollectErrors for Option<T> {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        if let Some(node) = self {
            node.collect_errors(errors);
        }
    }
}

/// A parse tree together with everything the error listener recorded while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub tree: T,
    pub reporter: ErrorReporter,
}

impl<T: CollectErrors> Parsed<T> {
    /// Returns the tree when it is free of error nodes, otherwise every collected error.
    pub fn into_result(self) -> Result<T, Vec<SyntaxError>> {
        let errors = self.tree.errors();
        if errors.is_empty() { Ok(self.tree) } else { Err(errors) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub ok: bool,
    pub errors: Vec<SyntaxError>,
}

pub trait Grammar {
    type Tree: CollectErrors;

    /// Parses `text` under `limits`: at most `max_errors` syntax errors reach the
    /// reporter and nothing nests deeper than `max_depth` in the tree.
    fn parse_with(text: &str, limits: Limits) -> Parsed<Self::Tree>;

    fn parse(text: &str) -> Parsed<Self::Tree> {
        Self::parse_with(text, Limits::default())
    }

    fn validate(text: &str) -> Validation {
        let errors = Self::parse(text).tree.errors();
        Validation {
            ok: errors.is_empty(),
            errors,
        }
    }
}
