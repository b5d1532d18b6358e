use nom::Parser;
use nom::{IResult, branch::alt, bytes::complete::tag, combinator::{map, value}};
use smol_str::SmolStr;

use super::token::{Token, TokenKind};
use crate::lexer::{identifier, number_literal, string_literal, tokenize as tokenize_with};
use crate::range::Span;

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, TokenKind> {
            value($kind, tag($tag)).parse(input)
        }
    };
}

define_token_parser!(arrow, "->", TokenKind::Arrow);
define_token_parser!(left_arrow, "<-", TokenKind::LeftArrow);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(star, "*", TokenKind::Star);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(dot, ".", TokenKind::Dot);

fn operators(input: Span) -> IResult<Span, TokenKind> {
    alt((arrow, left_arrow, ne_eq, lte, gte, equal, lt, gt, minus, star)).parse(input)
}

fn punctuations(input: Span) -> IResult<Span, TokenKind> {
    alt((l_paren, r_paren, l_bracket, r_bracket, comma, dot)).parse(input)
}

fn literals(input: Span) -> IResult<Span, TokenKind> {
    alt((
        map(number_literal, TokenKind::NumberLiteral),
        map(string_literal, TokenKind::StringLiteral),
    ))
    .parse(input)
}

fn ident(input: Span) -> IResult<Span, TokenKind> {
    map(identifier, |span: Span| {
        TokenKind::keyword(span.fragment()).unwrap_or_else(|| TokenKind::Ident(SmolStr::new(span.fragment())))
    })
    .parse(input)
}

fn token(input: Span) -> IResult<Span, TokenKind> {
    alt((literals, ident, operators, punctuations)).parse(input)
}

pub fn tokenize(input: &str) -> Vec<Token> {
    tokenize_with(input, token)
}
