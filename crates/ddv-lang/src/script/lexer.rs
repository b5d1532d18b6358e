use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, value},
    sequence::preceded,
};
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

define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(and_and, "&&", TokenKind::AndAnd);
define_token_parser!(or_or, "||", TokenKind::OrOr);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(bang, "!", TokenKind::Bang);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(star, "*", TokenKind::Star);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(question, "?", TokenKind::Question);

fn operators(input: Span) -> IResult<Span, TokenKind> {
    alt((
        eq_eq, ne_eq, lte, gte, and_and, or_or, equal, bang, lt, gt, plus, minus, star, slash, percent,
    ))
    .parse(input)
}

fn punctuations(input: Span) -> IResult<Span, TokenKind> {
    alt((
        l_paren, r_paren, l_bracket, r_bracket, l_brace, r_brace, comma, dot, semi_colon, colon, question,
    ))
    .parse(input)
}

fn literals(input: Span) -> IResult<Span, TokenKind> {
    alt((
        map(number_literal, TokenKind::NumberLiteral),
        map(string_literal, TokenKind::StringLiteral),
    ))
    .parse(input)
}

fn runtime_member(input: Span) -> IResult<Span, TokenKind> {
    map(preceded(char('@'), identifier), |span: Span| {
        TokenKind::RuntimeMember(SmolStr::new(span.fragment()))
    })
    .parse(input)
}

fn ident(input: Span) -> IResult<Span, TokenKind> {
    map(identifier, |span: Span| {
        TokenKind::keyword(span.fragment()).unwrap_or_else(|| TokenKind::Ident(SmolStr::new(span.fragment())))
    })
    .parse(input)
}

fn token(input: Span) -> IResult<Span, TokenKind> {
    alt((literals, runtime_member, ident, operators, punctuations)).parse(input)
}

pub fn tokenize(input: &str) -> Vec<Token> {
    tokenize_with(input, token)
}
