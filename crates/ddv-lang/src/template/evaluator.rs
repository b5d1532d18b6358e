use crate::code::CodeContext;
use crate::error::compile::CompileError;
use crate::markup::{Document, Element, Node};

pub const REPEAT_ATTRIBUTE: &str = "ddv-repeat";
pub const IF_ATTRIBUTE: &str = "ddv-if";

const OPEN_MARKER: &str = "[[";
const CLOSE_MARKER: &str = "]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Inline(&'a str),
}

/// Splits `text` on `[[ ]]` markers. An unterminated `[[` stays literal text.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN_MARKER) {
        let inner = &rest[start + OPEN_MARKER.len()..];
        let Some(end) = inner.find(CLOSE_MARKER) else {
            break;
        };

        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        segments.push(Segment::Inline(&inner[..end]));
        rest = &inner[end + CLOSE_MARKER.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Compiles a markup document into `context`. Elements nested deeper than
/// `max_depth` compile to an error marker instead of their content.
pub fn evaluate(context: &mut CodeContext<'_>, document: &Document) -> Result<(), CompileError> {
    compile_nodes(context, &document.children, 0)
}

fn compile_nodes(context: &mut CodeContext<'_>, nodes: &[Node], depth: usize) -> Result<(), CompileError> {
    nodes.iter().try_for_each(|node| compile_node(context, node, depth))
}

fn compile_node(context: &mut CodeContext<'_>, node: &Node, depth: usize) -> Result<(), CompileError> {
    match node {
        Node::Element(element) => compile_element(context, element, depth)?,
        Node::Text(text) => interpolate(context, text),
        Node::Scriptlet(source) => context.append_code(source),
        Node::Error(error) => context.append_error(&error.text, CompileError::Syntax(vec![error.clone()])),
        Node::Comment(_) | Node::Raw(_) => context.append_text(&node.to_string()),
    }
    Ok(())
}

fn compile_element(context: &mut CodeContext<'_>, element: &Element, depth: usize) -> Result<(), CompileError> {
    let max_depth = context.options().max_depth;
    if depth >= max_depth {
        let error = CompileError::NestingTooDeep(element.range, element.name.clone(), max_depth);
        context.append_error(&element.name, error);
        return Ok(());
    }

    for (index, attribute) in element.attributes.iter().enumerate() {
        let repeat = attribute.is(REPEAT_ATTRIBUTE);
        if !repeat && !attribute.is(IF_ATTRIBUTE) {
            continue;
        }

        let control = attribute.value.clone().unwrap_or_default();
        let body = element.without_attribute(index);
        let body_source = body.to_string();

        return if repeat {
            context.append_for(&control, &body_source, move |nested| compile_element(nested, &body, depth))
        } else {
            context.append_if(&control, &body_source, move |nested| compile_element(nested, &body, depth))
        };
    }

    context.append_text("<");
    context.append_text(&element.name);
    for attribute in &element.attributes {
        context.append_text(" ");
        context.append_text(&attribute.name);
        if let Some(value) = &attribute.value {
            context.append_text("=");
            context.append_text(attribute.quote.as_str());
            interpolate(context, value);
            context.append_text(attribute.quote.as_str());
        }
    }
    context.append_text(element.start_tag_suffix());

    compile_nodes(context, &element.children, depth + 1)?;

    if let Some(end_tag) = element.end_tag() {
        context.append_text(&end_tag);
    }
    Ok(())
}

fn interpolate(context: &mut CodeContext<'_>, text: &str) {
    for segment in segments(text) {
        match segment {
            Segment::Text(text) => context.append_text(text),
            Segment::Inline(source) => context.append_inline(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArtifactCache, Checksum};
    use crate::code::{CompileEnv, ContextKind, Outcome};
    use crate::grammar::Grammar;
    use crate::markup::MarkupGrammar;
    use crate::options::Options;
    use crate::runtime::{Runtime, RuntimeContract};
    use rstest::rstest;

    #[rstest]
    #[case("plain", vec![Segment::Text("plain")])]
    #[case("Hello [[@model.Name]]!", vec![
        Segment::Text("Hello "),
        Segment::Inline("@model.Name"),
        Segment::Text("!"),
    ])]
    #[case("[[a]][[b]]", vec![Segment::Inline("a"), Segment::Inline("b")])]
    #[case("a [[b", vec![Segment::Text("a [[b")])]
    #[case("[[a]] [[b", vec![Segment::Inline("a"), Segment::Text(" [[b")])]
    #[case("", vec![])]
    fn test_segments(#[case] text: &str, #[case] expected: Vec<Segment<'_>>) {
        assert_eq!(segments(text), expected);
    }

    #[rstest]
    #[case::plain("<div><p><b>x</b></p></div>", "<div><p><!--[ddv] \"<b>\" is nested deeper than 2 levels --></p></div>")]
    #[case::control(
        "<div><p><b ddv-if=\"true\">x</b>y</p></div>",
        "<div><p><!--[ddv] \"<b>\" is nested deeper than 2 levels -->y</p></div>"
    )]
    #[case::within("<div><p>x</p></div>", "<div><p>x</p></div>")]
    fn test_max_depth(#[case] source: &str, #[case] expected: &str) {
        let contract = RuntimeContract::new("test", ["model"]);
        let blocks = ArtifactCache::new();
        let options = Options {
            max_depth: 2,
            ..Options::default()
        };
        let env = CompileEnv {
            contract: &contract,
            blocks: &blocks,
            options: &options,
        };

        let document = MarkupGrammar::parse(source).tree;
        let mut context = CodeContext::new(env, ContextKind::Template, None, "Person", Checksum::of(source));
        evaluate(&mut context, &document).unwrap();
        let function = context.complete();

        assert_eq!(function.invoke(&Runtime::new()), Outcome::Value(expected.into()));
        assert_eq!(function.diagnostics.len(), usize::from(source != expected));
    }
}
