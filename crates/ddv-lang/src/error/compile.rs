use itertools::Itertools;
use smol_str::SmolStr;
use thiserror::Error;

use super::syntax::SyntaxError;
use crate::range::Range;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("{}", .0.iter().join(", "))]
    Syntax(Vec<SyntaxError>),
    #[error("Undefined variable \"{1}\"")]
    UndefinedVariable(Range, SmolStr),
    #[error("\"@{1}\" is not a member of the runtime contract")]
    UnknownRuntimeMember(Range, SmolStr),
    #[error("\"{1}\" is not defined")]
    NotDefined(Range, SmolStr),
    #[error("Invalid number of arguments in \"{1}\", expected {2}, got {3}")]
    InvalidNumberOfArguments(Range, SmolStr, u8, u8),
    #[error("Unknown model type \"{0}\"")]
    UnknownModelType(SmolStr),
    #[error("Template \"{template}\" does not support model type \"{model_type}\"")]
    UnsupportedModelType { template: SmolStr, model_type: SmolStr },
    #[error("\"<{1}>\" is nested deeper than {2} levels")]
    NestingTooDeep(Range, SmolStr, usize),
}

impl CompileError {
    #[cold]
    pub fn range(&self) -> Option<Range> {
        match self {
            CompileError::Syntax(errors) => errors.first().map(|error| error.range),
            CompileError::UndefinedVariable(range, _) => Some(*range),
            CompileError::UnknownRuntimeMember(range, _) => Some(*range),
            CompileError::NotDefined(range, _) => Some(*range),
            CompileError::InvalidNumberOfArguments(range, _, _, _) => Some(*range),
            CompileError::UnknownModelType(_) => None,
            CompileError::UnsupportedModelType { .. } => None,
            CompileError::NestingTooDeep(range, _, _) => Some(*range),
        }
    }
}
