//! nom building blocks shared by the script and query lexers.
//!
//! Lexing never fails: characters no token matches become `unknown` tokens and an
//! unclosed quote becomes an `unterminated` token, so the parsers can turn them into
//! error nodes and keep going.

use std::fmt::Display;

use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, none_of},
    combinator::{consumed, map, map_opt, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

use crate::number::Number;
use crate::range::{Range, Span};

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct Token<K> {
    pub range: Range,
    pub kind: K,
}

impl<K: Display> Display for Token<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Token kinds produced by [`tokenize`].
pub trait Lexeme: Clone + Display {
    fn eof() -> Self;
    fn unknown(text: &str) -> Self;
    fn unterminated(text: &str) -> Self;
    fn is_eof(&self) -> bool;
}

impl<K: Lexeme> Token<K> {
    pub fn is_eof(&self) -> bool {
        self.kind.is_eof()
    }

    /// Offending text used in diagnostics; empty at end of input.
    pub fn text(&self) -> String {
        if self.is_eof() { String::new() } else { self.kind.to_string() }
    }
}

pub type TokenParser<K> = fn(Span) -> IResult<Span, K>;

pub fn tokenize<K: Lexeme>(input: &str, token: TokenParser<K>) -> Vec<Token<K>> {
    let mut span = Span::new(input);
    let mut tokens = Vec::new();

    loop {
        span = skip_trivia(span);

        if span.fragment().is_empty() {
            tokens.push(Token {
                range: Range::new(span.into(), span.into()),
                kind: K::eof(),
            });
            break;
        }

        match consumed(token).parse(span) {
            Ok((rest, (matched, kind))) => {
                tokens.push(Token {
                    range: matched.into(),
                    kind,
                });
                span = rest;
            }
            Err(_) if span.fragment().starts_with(['"', '\'']) => {
                let (rest, matched) = unterminated(span);
                tokens.push(Token {
                    range: matched.into(),
                    kind: K::unterminated(matched.fragment()),
                });
                span = rest;
            }
            Err(_) => {
                let next: IResult<Span, Span> = take(1usize).parse(span);
                let (rest, matched) = match next {
                    Ok(result) => result,
                    Err(_) => break,
                };
                tokens.push(Token {
                    range: matched.into(),
                    kind: K::unknown(matched.fragment()),
                });
                span = rest;
            }
        }
    }

    tokens
}

fn unterminated(input: Span) -> (Span, Span) {
    let line: IResult<Span, Span> = recognize(pair(take(1usize), opt(is_not("\r\n")))).parse(input);
    line.unwrap_or((input, input))
}

fn line_comment(input: Span) -> IResult<Span, Span> {
    recognize(pair(tag("//"), opt(is_not("\r\n")))).parse(input)
}

fn skip_trivia(input: Span) -> Span {
    match many0(alt((multispace1, line_comment))).parse(input) {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(char('{'), take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()), char('}')),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn quoted<'a>(quote: char, input: Span<'a>) -> IResult<Span<'a>, String> {
    let stop = if quote == '"' { "\"\\" } else { "'\\" };

    map(
        delimited(
            char(quote),
            opt(escaped_transform(
                none_of(stop),
                '\\',
                alt((
                    value('\\', char('\\')),
                    value('"', char('"')),
                    value('\'', char('\'')),
                    value('\r', char('r')),
                    value('\n', char('n')),
                    value('\t', char('t')),
                    unicode,
                )),
            )),
            char(quote),
        ),
        |s: Option<String>| s.unwrap_or_default(),
    )
    .parse(input)
}

fn double_quoted(input: Span) -> IResult<Span, String> {
    quoted('"', input)
}

fn single_quoted(input: Span) -> IResult<Span, String> {
    quoted('\'', input)
}

/// `"..."` or `'...'` with `\\ \" \' \r \n \t \u{..}` escapes.
pub fn string_literal(input: Span) -> IResult<Span, String> {
    alt((double_quoted, single_quoted)).parse(input)
}

/// Unsigned decimal literal; signs are handled by the grammars.
pub fn number_literal(input: Span) -> IResult<Span, Number> {
    map_res(recognize(pair(digit1, opt(pair(char('.'), digit1)))), |span: Span| {
        span.fragment().parse::<f64>().map(Number::new)
    })
    .parse(input)
}

pub fn identifier(input: Span) -> IResult<Span, Span> {
    recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_")))))).parse(input)
}
