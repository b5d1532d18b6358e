use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::error::syntax::SyntaxError;
use crate::grammar::CollectErrors;
use crate::range::Range;

pub const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    Bare,
}

impl Quote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quote::Double => "\"",
            Quote::Single => "'",
            Quote::Bare => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: SmolStr,
    /// `None` for a valueless attribute such as `disabled`.
    pub value: Option<String>,
    pub quote: Quote,
    pub range: Range,
}

impl Attribute {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}{}{}", self.name, self.quote.as_str(), value, self.quote.as_str()),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: SmolStr,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    /// Whether an end tag was found in the source.
    pub closed: bool,
    pub range: Range,
}

impl Element {
    pub fn is_void(&self) -> bool {
        is_void(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.is(name))
    }

    /// A copy of this element without the attribute at `index`.
    pub fn without_attribute(&self, index: usize) -> Element {
        let mut element = self.clone();
        if index < element.attributes.len() {
            element.attributes.remove(index);
        }
        element
    }

    pub fn end_tag(&self) -> Option<String> {
        self.closed.then(|| format!("</{}>", self.name))
    }

    pub fn start_tag_suffix(&self) -> &'static str {
        if self.self_closing { " />" } else { ">" }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for attribute in &self.attributes {
            write!(f, " {}", attribute)?;
        }
        write!(f, "{}", self.start_tag_suffix())?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        if let Some(end_tag) = self.end_tag() {
            write!(f, "{}", end_tag)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// The content between `<!--` and `-->`.
    Comment(String),
    /// Doctype and processing declarations, verbatim.
    Raw(String),
    /// The source of a `<ddv>` block.
    Scriptlet(String),
    Error(SyntaxError),
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(element) => write!(f, "{}", element),
            Node::Text(text) | Node::Raw(text) => write!(f, "{}", text),
            Node::Comment(comment) => write!(f, "<!--{}-->", comment),
            Node::Scriptlet(source) => write!(f, "<ddv>{}</ddv>", source),
            Node::Error(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.children.iter().try_for_each(|child| write!(f, "{}", child))
    }
}

impl CollectErrors for Node {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        match self {
            Node::Element(element) => element.children.collect_errors(errors),
            Node::Error(error) => errors.push(error.clone()),
            Node::Text(_) | Node::Comment(_) | Node::Raw(_) | Node::Scriptlet(_) => {}
        }
    }
}

impl CollectErrors for Document {
    fn collect_errors(&self, errors: &mut Vec<SyntaxError>) {
        self.children.collect_errors(errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn attribute(name: &str, value: Option<&str>, quote: Quote) -> Attribute {
        Attribute {
            name: name.into(),
            value: value.map(str::to_string),
            quote,
            range: Range::default(),
        }
    }

    #[rstest]
    #[case("br", true)]
    #[case("IMG", true)]
    #[case("div", false)]
    fn test_is_void(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_void(name), expected);
    }

    #[rstest]
    #[case(attribute("class", Some("a"), Quote::Double), "class=\"a\"")]
    #[case(attribute("class", Some("a"), Quote::Single), "class='a'")]
    #[case(attribute("width", Some("10"), Quote::Bare), "width=10")]
    #[case(attribute("disabled", None, Quote::Bare), "disabled")]
    fn test_attribute_display(#[case] attribute: Attribute, #[case] expected: &str) {
        assert_eq!(attribute.to_string(), expected);
    }

    #[test]
    fn test_without_attribute() {
        let element = Element {
            name: "li".into(),
            attributes: vec![
                attribute("class", Some("x"), Quote::Double),
                attribute("DDV-REPEAT", Some("@model.Tags"), Quote::Double),
            ],
            children: vec![Node::Text("t".into())],
            self_closing: false,
            closed: true,
            range: Range::default(),
        };

        assert!(element.attribute("ddv-repeat").is_some());
        assert_eq!(element.without_attribute(1).to_string(), "<li class=\"x\">t</li>");
    }
}
