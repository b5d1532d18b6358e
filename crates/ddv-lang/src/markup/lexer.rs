use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take, take_until},
    character::complete::{alpha1, alphanumeric1, char, multispace0, multispace1},
    combinator::{consumed, map, opt, recognize, rest, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use smol_str::SmolStr;

use super::node::{Attribute, Quote};
use crate::lexer::Token;
use crate::range::{Range, Span};

pub const SCRIPTLET_TAG: &str = "ddv";

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupToken {
    StartTag {
        name: SmolStr,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag(SmolStr),
    Text(String),
    Comment(String),
    Raw(String),
    Scriptlet {
        source: String,
        closed: bool,
    },
    /// A comment or tag that runs to the end of input, with what would have closed it.
    Unterminated {
        text: String,
        expected: &'static str,
    },
}

/// Splits markup into tags, text, comments, declarations and raw scriptlet blocks.
/// Like the other lexers it never fails.
pub fn tokenize(input: &str) -> Vec<Token<MarkupToken>> {
    let mut span = Span::new(input);
    let mut tokens = Vec::new();

    while !span.fragment().is_empty() {
        let (next, kind) = markup_token(span);
        let (next, kind) = match kind {
            MarkupToken::StartTag {
                name,
                self_closing: false,
                ..
            } if name.eq_ignore_ascii_case(SCRIPTLET_TAG) => scriptlet(next),
            MarkupToken::StartTag { name, .. } if name.eq_ignore_ascii_case(SCRIPTLET_TAG) => (
                next,
                MarkupToken::Scriptlet {
                    source: String::new(),
                    closed: true,
                },
            ),
            kind => (next, kind),
        };

        tokens.push(Token {
            range: Range::new(span.into(), next.into()),
            kind,
        });
        span = next;
    }

    tokens
}

fn markup_token(input: Span) -> (Span, MarkupToken) {
    if let Ok(token) = alt((comment, declaration, end_tag, start_tag)).parse(input) {
        return token;
    }

    let fragment = *input.fragment();
    if fragment.starts_with("<!--") {
        return unterminated(input, "-->");
    }
    if starts_tag(fragment) {
        return malformed_tag(input);
    }

    let text: IResult<Span, Span> = alt((is_not("<"), take(1usize))).parse(input);
    match text {
        Ok((next, text)) => (next, MarkupToken::Text(text.fragment().to_string())),
        Err(_) => unterminated(input, ">"),
    }
}

fn starts_tag(fragment: &str) -> bool {
    let mut chars = fragment.chars();
    if chars.next() != Some('<') {
        return false;
    }

    match chars.next() {
        Some('/') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        Some(c) => c.is_ascii_alphabetic(),
        None => false,
    }
}

fn tag_name(input: Span) -> IResult<Span, Span> {
    recognize(pair(
        alpha1,
        many0(alt((alphanumeric1, tag("-"), tag("_"), tag(":"), tag(".")))),
    ))
    .parse(input)
}

fn comment(input: Span) -> IResult<Span, MarkupToken> {
    map(delimited(tag("<!--"), take_until("-->"), tag("-->")), |span: Span| {
        MarkupToken::Comment(span.fragment().to_string())
    })
    .parse(input)
}

fn declaration(input: Span) -> IResult<Span, MarkupToken> {
    map(
        recognize(pair(alt((tag("<!"), tag("<?"))), pair(opt(is_not(">")), char('>')))),
        |span: Span| MarkupToken::Raw(span.fragment().to_string()),
    )
    .parse(input)
}

fn end_tag(input: Span) -> IResult<Span, MarkupToken> {
    map(
        delimited(tag("</"), tag_name, preceded(multispace0, char('>'))),
        |name: Span| MarkupToken::EndTag(SmolStr::new(name.fragment())),
    )
    .parse(input)
}

fn start_tag(input: Span) -> IResult<Span, MarkupToken> {
    let (input, name) = preceded(char('<'), tag_name).parse(input)?;
    let (input, attributes) = many0(attribute).parse(input)?;
    let (input, self_closing) = preceded(
        multispace0,
        alt((value(true, tag("/>")), value(false, tag(">")))),
    )
    .parse(input)?;

    Ok((
        input,
        MarkupToken::StartTag {
            name: SmolStr::new(name.fragment()),
            attributes,
            self_closing,
        },
    ))
}

fn attribute(input: Span) -> IResult<Span, Attribute> {
    let (input, _) = multispace1.parse(input)?;
    let (input, (matched, (name, value))) = consumed(pair(
        is_not(" \t\r\n/>=\"'<"),
        opt(preceded(delimited(multispace0, char('='), multispace0), attribute_value)),
    ))
    .parse(input)?;

    let (quote, value) = match value {
        Some((quote, value)) => (quote, Some(value)),
        None => (Quote::Bare, None),
    };

    Ok((
        input,
        Attribute {
            name: SmolStr::new(name.fragment()),
            value,
            quote,
            range: Range::new(matched.into(), input.into()),
        },
    ))
}

fn attribute_value(input: Span) -> IResult<Span, (Quote, String)> {
    let quoted = |quote: char, stop: &'static str, kind: Quote| {
        map(delimited(char(quote), opt(is_not(stop)), char(quote)), move |value: Option<Span>| {
            (kind, value.map(|value| value.fragment().to_string()).unwrap_or_default())
        })
    };

    alt((
        quoted('"', "\"", Quote::Double),
        quoted('\'', "'", Quote::Single),
        map(is_not(" \t\r\n>\"'=<`"), |value: Span| {
            (Quote::Bare, value.fragment().to_string())
        }),
    ))
    .parse(input)
}

/// Everything up to the matching `</ddv>`; the content is never parsed as markup.
fn scriptlet(input: Span) -> (Span, MarkupToken) {
    let lowered = input.fragment().to_ascii_lowercase();
    let closing = format!("</{}", SCRIPTLET_TAG);
    let mut from = 0;

    while let Some(offset) = lowered[from..].find(&closing).map(|offset| offset + from) {
        let chars = lowered[..offset].chars().count();
        let split: IResult<Span, Span> = take(chars).parse(input);
        if let Ok((at, source)) = split
            && let Ok((next, _)) = end_tag(at)
        {
            return (
                next,
                MarkupToken::Scriptlet {
                    source: source.fragment().to_string(),
                    closed: true,
                },
            );
        }
        from = offset + closing.len();
    }

    let (next, source) = take_rest(input);
    (
        next,
        MarkupToken::Scriptlet {
            source: source.fragment().to_string(),
            closed: false,
        },
    )
}

fn malformed_tag(input: Span) -> (Span, MarkupToken) {
    let through_close: IResult<Span, Span> = recognize(pair(is_not(">"), char('>'))).parse(input);
    match through_close {
        Ok((next, text)) => (next, MarkupToken::Text(text.fragment().to_string())),
        Err(_) => unterminated(input, ">"),
    }
}

fn unterminated<'a>(input: Span<'a>, expected: &'static str) -> (Span<'a>, MarkupToken) {
    let (next, text) = take_rest(input);
    (
        next,
        MarkupToken::Unterminated {
            text: text.fragment().to_string(),
            expected,
        },
    )
}

fn take_rest(input: Span) -> (Span, Span) {
    let all: IResult<Span, Span> = rest.parse(input);
    all.unwrap_or((input, input))
}
