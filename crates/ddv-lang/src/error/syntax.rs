use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::range::Range;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyntaxErrorKind {
    UnexpectedToken,
    UnexpectedEof,
    ExpectedClosingParen,
    ExpectedClosingBrace,
    ExpectedClosingBracket,
    Expected(SmolStr),
    InvalidNumber,
    UnterminatedString,
    UnknownCharacter,
    UnclosedElement,
    MismatchedClosingTag,
    MissingValue,
    NestingTooDeep,
}

/// A syntax error record: where it happened, what went wrong and the offending text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyntaxError {
    pub range: Range,
    pub kind: SyntaxErrorKind,
    pub text: SmolStr,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, range: Range, text: impl Into<SmolStr>) -> Self {
        Self {
            range,
            kind,
            text: text.into(),
        }
    }

    pub fn line(&self) -> u32 {
        self.range.start.line
    }

    pub fn column(&self) -> usize {
        self.range.start.column
    }

    pub fn message(&self) -> String {
        let text = if self.text.is_empty() { "EOF" } else { self.text.as_str() };

        match &self.kind {
            SyntaxErrorKind::UnexpectedToken => format!("Unexpected token `{}`", text),
            SyntaxErrorKind::UnexpectedEof => "Unexpected EOF detected".to_string(),
            SyntaxErrorKind::ExpectedClosingParen => {
                format!("Expected a closing parenthesis `)` but got `{}`", text)
            }
            SyntaxErrorKind::ExpectedClosingBrace => format!("Expected a closing brace `}}` but got `{}`", text),
            SyntaxErrorKind::ExpectedClosingBracket => {
                format!("Expected a closing bracket `]` but got `{}`", text)
            }
            SyntaxErrorKind::Expected(expected) => format!("Expected {} but got `{}`", expected, text),
            SyntaxErrorKind::InvalidNumber => format!("Invalid number `{}`", text),
            SyntaxErrorKind::UnterminatedString => format!("Unterminated string `{}`", text),
            SyntaxErrorKind::UnknownCharacter => format!("Unknown character `{}`", text),
            SyntaxErrorKind::UnclosedElement => format!("Element `<{}>` is never closed", text),
            SyntaxErrorKind::MismatchedClosingTag => format!("Closing tag `</{}>` does not match any open element", text),
            SyntaxErrorKind::MissingValue => "Expected the rule to end with a value expression".to_string(),
            SyntaxErrorKind::NestingTooDeep => format!("Nesting is too deep at `{}`", text),
        }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line(), self.column(), self.message())
    }
}

impl std::error::Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Position;
    use rstest::rstest;

    #[rstest]
    #[case(SyntaxErrorKind::UnexpectedToken, ")", "line 1, column 3: Unexpected token `)`")]
    #[case(SyntaxErrorKind::UnexpectedToken, "", "line 1, column 3: Unexpected token `EOF`")]
    #[case(SyntaxErrorKind::UnclosedElement, "div", "line 1, column 3: Element `<div>` is never closed")]
    fn test_display(#[case] kind: SyntaxErrorKind, #[case] text: &str, #[case] expected: &str) {
        let error = SyntaxError::new(kind, Range::new(Position::new(1, 3), Position::new(1, 4)), text);
        assert_eq!(error.to_string(), expected);
    }
}
