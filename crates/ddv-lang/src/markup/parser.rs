use smol_str::SmolStr;

use super::lexer::{self, MarkupToken, SCRIPTLET_TAG};
use super::node::{Document, Element, Node, is_void};
use crate::error::syntax::{SyntaxError, SyntaxErrorKind};
use crate::grammar::{ErrorReporter, Limits};
use crate::lexer::Token;
use crate::range::Range;

/// Builds a [`Document`] from markup tokens.
///
/// Elements left open when their parent closes, or at the end of input, are
/// kept with the children collected so far and followed by an `UnclosedElement`
/// error node; end tags matching no open element become `MismatchedClosingTag`
/// error nodes. An element that would sit deeper than `max_depth` becomes a
/// `NestingTooDeep` error node and its content is dropped.
pub struct Parser {
    tokens: Vec<Token<MarkupToken>>,
    open: Vec<Element>,
    skipped: Vec<SmolStr>,
    root: Vec<Node>,
    max_depth: usize,
    errors: ErrorReporter,
}

impl Parser {
    pub fn new(text: &str) -> Self {
        Self::with_limits(text, Limits::default())
    }

    pub fn with_limits(text: &str, limits: Limits) -> Self {
        Self {
            tokens: lexer::tokenize(text),
            open: Vec::new(),
            skipped: Vec::new(),
            root: Vec::new(),
            max_depth: limits.max_depth,
            errors: ErrorReporter::new(limits.max_errors),
        }
    }

    pub fn parse(mut self) -> (Document, ErrorReporter) {
        for token in std::mem::take(&mut self.tokens) {
            self.token(token);
        }

        while let Some(element) = self.open.pop() {
            self.close_unclosed(element);
        }

        (Document { children: self.root }, self.errors)
    }

    fn token(&mut self, token: Token<MarkupToken>) {
        let range = token.range;

        if !self.skipped.is_empty() {
            return self.skip(token.kind, range);
        }

        match token.kind {
            MarkupToken::Text(text) => self.text(text),
            MarkupToken::Comment(comment) => self.push(Node::Comment(comment)),
            MarkupToken::Raw(raw) => self.push(Node::Raw(raw)),
            MarkupToken::Scriptlet { source, closed } => {
                self.push(Node::Scriptlet(source));
                if !closed {
                    self.error(SyntaxErrorKind::UnclosedElement, range, SCRIPTLET_TAG);
                }
            }
            MarkupToken::Unterminated { text, expected } => {
                self.error(SyntaxErrorKind::Expected(SmolStr::new(expected)), range, text);
            }
            MarkupToken::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                let element = Element {
                    self_closing,
                    closed: false,
                    attributes,
                    children: Vec::new(),
                    range,
                    name,
                };
                let leaf = self_closing || element.is_void();

                if self.open.len() >= self.max_depth {
                    self.error(SyntaxErrorKind::NestingTooDeep, range, element.name.clone());
                    if !leaf {
                        self.skipped.push(element.name);
                    }
                } else if leaf {
                    self.push(Node::Element(element));
                } else {
                    self.open.push(element);
                }
            }
            MarkupToken::EndTag(name) => self.end_tag(name, range),
        }
    }

    /// Drops content below an element opened past `max_depth`, tracking the start
    /// tags inside it so the matching end tag resumes normal parsing.
    fn skip(&mut self, token: MarkupToken, range: Range) {
        match token {
            MarkupToken::StartTag { name, self_closing, .. } if !self_closing && !is_void(&name) => {
                self.skipped.push(name);
            }
            MarkupToken::EndTag(name) => {
                match self
                    .skipped
                    .iter()
                    .rposition(|skipped| skipped.eq_ignore_ascii_case(&name))
                {
                    Some(index) => self.skipped.truncate(index),
                    None => {
                        self.skipped.clear();
                        self.end_tag(name, range);
                    }
                }
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, name: SmolStr, range: Range) {
        let Some(index) = self
            .open
            .iter()
            .rposition(|element| element.name.eq_ignore_ascii_case(&name))
        else {
            if !is_void(&name) {
                self.error(SyntaxErrorKind::MismatchedClosingTag, range, name);
            }
            return;
        };

        while self.open.len() > index + 1 {
            if let Some(element) = self.open.pop() {
                self.close_unclosed(element);
            }
        }

        if let Some(mut element) = self.open.pop() {
            element.closed = true;
            element.range = element.range.merge(&range);
            self.push(Node::Element(element));
        }
    }

    fn close_unclosed(&mut self, element: Element) {
        let range = element.range;
        let name = element.name.clone();
        self.push(Node::Element(element));
        self.error(SyntaxErrorKind::UnclosedElement, range, name);
    }

    fn text(&mut self, text: String) {
        let children = self.children();
        if let Some(Node::Text(previous)) = children.last_mut() {
            previous.push_str(&text);
        } else {
            children.push(Node::Text(text));
        }
    }

    fn push(&mut self, node: Node) {
        self.children().push(node);
    }

    fn error(&mut self, kind: SyntaxErrorKind, range: Range, text: impl Into<SmolStr>) {
        let error = SyntaxError::new(kind, range, text);
        self.errors.report(error.clone());
        self.push(Node::Error(error));
    }

    fn children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(element) => &mut element.children,
            None => &mut self.root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{CollectErrors, DEFAULT_MAX_DEPTH};
    use rstest::rstest;

    fn parse(text: &str) -> Document {
        Parser::new(text).parse().0
    }

    #[rstest]
    #[case("<ul><li>a</li><li>b</li></ul>")]
    #[case("<!DOCTYPE html><html><body><p class=\"x\">Hi<br>there</p></body></html>")]
    #[case("<img src='a.png' /><!-- c -->")]
    #[case("<p>[[ @model.Name ]]</p><ddv>write(\"<b>\");</ddv>")]
    fn test_round_trip(#[case] text: &str) {
        let document = parse(text);
        assert!(!document.has_errors());
        assert_eq!(document.to_string(), text);
    }

    #[test]
    fn test_case_insensitive_end_tag() {
        let document = parse("<DIV>x</div>");
        assert!(!document.has_errors());
        let Node::Element(element) = &document.children[0] else {
            panic!("expected element");
        };
        assert!(element.closed);
        assert_eq!(element.children, vec![Node::Text("x".into())]);
    }

    #[rstest]
    #[case("<div><p>a</div>", vec![(SyntaxErrorKind::UnclosedElement, "p")])]
    #[case("<div>a", vec![(SyntaxErrorKind::UnclosedElement, "div")])]
    #[case("a</span>", vec![(SyntaxErrorKind::MismatchedClosingTag, "span")])]
    #[case("<ddv>let x = 1;", vec![(SyntaxErrorKind::UnclosedElement, "ddv")])]
    #[case("<!-- never", vec![(SyntaxErrorKind::Expected("-->".into()), "<!-- never")])]
    fn test_errors(#[case] text: &str, #[case] expected: Vec<(SyntaxErrorKind, &str)>) {
        let (document, reporter) = Parser::new(text).parse();
        let errors: Vec<(SyntaxErrorKind, String)> = document
            .errors()
            .into_iter()
            .map(|error| (error.kind, error.text.to_string()))
            .collect();
        let expected: Vec<(SyntaxErrorKind, String)> = expected
            .into_iter()
            .map(|(kind, text)| (kind, text.to_string()))
            .collect();

        assert_eq!(errors, expected);
        assert_eq!(reporter.len(), errors.len());
    }

    #[test]
    fn test_unclosed_child_keeps_content() {
        let document = parse("<div><p>a</div>");
        let Node::Element(div) = &document.children[0] else {
            panic!("expected element");
        };
        assert!(div.closed);
        let Node::Element(p) = &div.children[0] else {
            panic!("expected element");
        };
        assert!(!p.closed);
        assert_eq!(p.children, vec![Node::Text("a".into())]);
        assert!(matches!(div.children[1], Node::Error(_)));
    }

    #[rstest]
    #[case::closed(format!("{}x{}", "<b>".repeat(3000), "</b>".repeat(3000)), 1)]
    #[case::unclosed("<b>".repeat(3000), 1 + DEFAULT_MAX_DEPTH)]
    fn test_deep_nesting_is_cut_off(#[case] text: String, #[case] error_count: usize) {
        let document = parse(&text);
        let errors = document.errors();

        assert_eq!(errors.len(), error_count);
        assert_eq!(
            errors
                .iter()
                .filter(|error| error.kind == SyntaxErrorKind::NestingTooDeep)
                .count(),
            1
        );
        assert_eq!(depth(&document.children), DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_content_after_deep_element_is_kept() {
        let limits = Limits {
            max_depth: 2,
            ..Limits::default()
        };
        let (document, _) = Parser::with_limits("<div><p><b><i>gone</i></b>kept<br></p></div>", limits).parse();

        assert_eq!(document.errors().len(), 2);
        assert_eq!(depth(&document.children), 2);
        let Node::Element(div) = &document.children[0] else {
            panic!("expected element");
        };
        let Node::Element(p) = &div.children[0] else {
            panic!("expected element");
        };
        assert!(p.closed);
        assert!(matches!(p.children[0], Node::Error(_)));
        assert_eq!(p.children[1], Node::Text("kept".into()));
        assert!(matches!(p.children[2], Node::Error(_)));
    }

    fn depth(nodes: &[Node]) -> usize {
        nodes
            .iter()
            .map(|node| match node {
                Node::Element(element) => 1 + depth(&element.children),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_stray_void_end_tag_is_ignored() {
        assert!(!parse("<br></br>").has_errors());
    }
}
