use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::lexer::{self, Lexeme};
use crate::number::Number;

pub type Token = lexer::Token<TokenKind>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub enum TokenKind {
    Arrow,
    Asc,
    By,
    Comma,
    Desc,
    Dot,
    Eof,
    Equal,
    Exclude,
    False,
    Gt,
    Gte,
    Ident(SmolStr),
    Intersect,
    LBracket,
    LParen,
    LeftArrow,
    Limit,
    Lt,
    Lte,
    Minus,
    NeEq,
    Nodes,
    Null,
    NumberLiteral(Number),
    Order,
    Paths,
    RBracket,
    RParen,
    Returns,
    Star,
    StringLiteral(String),
    True,
    Union,
    Unknown(SmolStr),
    UnterminatedString(SmolStr),
}

impl Lexeme for TokenKind {
    fn eof() -> Self {
        TokenKind::Eof
    }

    fn unknown(text: &str) -> Self {
        TokenKind::Unknown(text.into())
    }

    fn unterminated(text: &str) -> Self {
        TokenKind::UnterminatedString(text.into())
    }

    fn is_eof(&self) -> bool {
        matches!(self, TokenKind::Eof)
    }
}

impl TokenKind {
    /// Query keywords are upper case; the literal keywords are lower case.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "ASC" => Some(TokenKind::Asc),
            "BY" => Some(TokenKind::By),
            "DESC" => Some(TokenKind::Desc),
            "EXCLUDE" => Some(TokenKind::Exclude),
            "INTERSECT" => Some(TokenKind::Intersect),
            "LIMIT" => Some(TokenKind::Limit),
            "NODES" => Some(TokenKind::Nodes),
            "ORDER" => Some(TokenKind::Order),
            "PATHS" => Some(TokenKind::Paths),
            "RETURNS" => Some(TokenKind::Returns),
            "UNION" => Some(TokenKind::Union),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "true" => Some(TokenKind::True),
            _ => None,
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Asc => write!(f, "ASC"),
            TokenKind::By => write!(f, "BY"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Desc => write!(f, "DESC"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Eof => write!(f, ""),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Exclude => write!(f, "EXCLUDE"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::Intersect => write!(f, "INTERSECT"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::LeftArrow => write!(f, "<-"),
            TokenKind::Limit => write!(f, "LIMIT"),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Nodes => write!(f, "NODES"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Order => write!(f, "ORDER"),
            TokenKind::Paths => write!(f, "PATHS"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Returns => write!(f, "RETURNS"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::True => write!(f, "true"),
            TokenKind::Union => write!(f, "UNION"),
            TokenKind::Unknown(text) => write!(f, "{}", text),
            TokenKind::UnterminatedString(text) => write!(f, "{}", text),
        }
    }
}
