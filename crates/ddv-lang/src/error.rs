pub mod compile;
pub mod runtime;
pub mod syntax;

use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{model::RegistryError, query::exec::ExecError, range::Range};
use compile::CompileError;
use syntax::{SyntaxError, SyntaxErrorKind};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl From<Vec<SyntaxError>> for InnerError {
    fn from(errors: Vec<SyntaxError>) -> Self {
        InnerError::Compile(CompileError::Syntax(errors))
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: impl Into<InnerError>) -> Self {
        let source_code = source_code.into();
        let cause = cause.into();

        let range = match &cause {
            InnerError::Compile(err) => err.range(),
            InnerError::Registry(_) | InnerError::Exec(_) => None,
        };

        let location = match range {
            Some(range) => span_of(&source_code, &range),
            None => SourceSpan::new(SourceOffset::from(0), 0),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }

    /// Syntax errors carried by this error, if it was caused by invalid source text.
    pub fn syntax_errors(&self) -> &[SyntaxError] {
        match &self.cause {
            InnerError::Compile(CompileError::Syntax(errors)) => errors,
            _ => &[],
        }
    }
}

fn span_of(source_code: &str, range: &Range) -> SourceSpan {
    let start = offset_of(source_code, range.start.line, range.start.column);
    let end = offset_of(source_code, range.end.line, range.end.column);

    SourceSpan::new(
        SourceOffset::from(start),
        std::cmp::max(end.saturating_sub(start), 1).min(source_code.len().saturating_sub(start)),
    )
}

fn offset_of(source_code: &str, line: u32, column: usize) -> usize {
    if source_code.is_empty() {
        return 0;
    }

    SourceOffset::from_location(source_code, line as usize, column)
        .offset()
        .min(source_code.len())
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Compile(CompileError::Syntax(errors)) => match errors.first().map(|e| &e.kind) {
                Some(SyntaxErrorKind::UnexpectedEof) => "SyntaxError::UnexpectedEOFDetected",
                Some(SyntaxErrorKind::NestingTooDeep) => "SyntaxError::NestingTooDeep",
                Some(SyntaxErrorKind::UnclosedElement) | Some(SyntaxErrorKind::MismatchedClosingTag) => {
                    "SyntaxError::Markup"
                }
                _ => "SyntaxError::UnexpectedToken",
            },
            InnerError::Compile(CompileError::UndefinedVariable(_, _)) => "CompileError::UndefinedVariable",
            InnerError::Compile(CompileError::UnknownRuntimeMember(_, _)) => "CompileError::UnknownRuntimeMember",
            InnerError::Compile(CompileError::NotDefined(_, _)) => "CompileError::NotDefined",
            InnerError::Compile(CompileError::InvalidNumberOfArguments(_, _, _, _)) => {
                "CompileError::InvalidNumberOfArguments"
            }
            InnerError::Compile(CompileError::UnknownModelType(_)) => "CompileError::UnknownModelType",
            InnerError::Compile(CompileError::UnsupportedModelType { .. }) => "CompileError::UnsupportedModelType",
            InnerError::Compile(CompileError::NestingTooDeep(_, _, _)) => "CompileError::NestingTooDeep",
            InnerError::Registry(RegistryError::UnknownModelType(_)) => "RegistryError::UnknownModelType",
            InnerError::Registry(RegistryError::MissingField { .. }) => "RegistryError::MissingField",
            InnerError::Registry(RegistryError::InvalidFieldType { .. }) => "RegistryError::InvalidFieldType",
            InnerError::Registry(RegistryError::DuplicateModelType(_)) => "RegistryError::DuplicateModelType",
            InnerError::Exec(ExecError::NotMaterialized(_)) => "ExecError::NotMaterialized",
            InnerError::Exec(ExecError::UnknownVertex(_)) => "ExecError::UnknownVertex",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Compile(CompileError::Syntax(errors)) if errors.len() > 1 => {
                format!("{} syntax errors were found, the first one is highlighted", errors.len())
            }
            InnerError::Compile(CompileError::UnknownModelType(_)) | InnerError::Registry(_) => {
                "Register the model type with `ModelRegistry::register` before compiling".to_string()
            }
            InnerError::Compile(CompileError::UnsupportedModelType { .. }) => {
                "Add the model type to the template's supported model types".to_string()
            }
            InnerError::Exec(ExecError::NotMaterialized(_)) => {
                "Sort and limit steps must follow a ReturnFor step".to_string()
            }
            InnerError::Compile(CompileError::NestingTooDeep(_, _, _)) => {
                "Flatten the markup or raise `max_depth` in the engine options".to_string()
            }
            _ => return None,
        };

        Some(Box::new(msg))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        if self.source_code.is_empty() {
            return None;
        }

        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(self.cause.to_string()),
            self.location,
        ))))
    }
}
