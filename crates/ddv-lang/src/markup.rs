//! The HTML-like markup templates are written in.

pub mod lexer;
pub mod node;
pub mod parser;

pub use node::{Attribute, Document, Element, Node, Quote, VOID_ELEMENTS, is_void};
pub use parser::Parser;

use crate::grammar::{Grammar, Limits, Parsed};

pub struct MarkupGrammar;

impl Grammar for MarkupGrammar {
    type Tree = Document;

    fn parse_with(text: &str, limits: Limits) -> Parsed<Document> {
        let (tree, reporter) = Parser::with_limits(text, limits).parse();
        Parsed { tree, reporter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("<p>Hello [[@model.Name]]!</p>", true)]
    #[case("<ul><li ddv-repeat=\"@model.Tags\">[[item]]</li></ul>", true)]
    #[case("<p>open", false)]
    #[case("</p>", false)]
    fn test_validate(#[case] text: &str, #[case] ok: bool) {
        let validation = MarkupGrammar::validate(text);
        assert_eq!(validation.ok, ok);
        assert_eq!(validation.errors.is_empty(), ok);
    }
}
