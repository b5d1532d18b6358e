use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::lexer::{self, Lexeme};
use crate::number::Number;

pub type Token = lexer::Token<TokenKind>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub enum TokenKind {
    And,
    AndAnd,
    Bang,
    Colon,
    Comma,
    Dot,
    Else,
    Eof,
    EqEq,
    Equal,
    False,
    For,
    Gt,
    Gte,
    Ident(SmolStr),
    If,
    In,
    LBrace,
    LBracket,
    LParen,
    Let,
    Lt,
    Lte,
    Minus,
    NeEq,
    Not,
    Null,
    NumberLiteral(Number),
    Or,
    OrOr,
    Percent,
    Plus,
    Question,
    RBrace,
    RBracket,
    RParen,
    Return,
    RuntimeMember(SmolStr),
    SemiColon,
    Slash,
    Star,
    StringLiteral(String),
    True,
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
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "and" => Some(TokenKind::And),
            "else" => Some(TokenKind::Else),
            "false" => Some(TokenKind::False),
            "for" => Some(TokenKind::For),
            "if" => Some(TokenKind::If),
            "in" => Some(TokenKind::In),
            "let" => Some(TokenKind::Let),
            "not" => Some(TokenKind::Not),
            "null" => Some(TokenKind::Null),
            "or" => Some(TokenKind::Or),
            "return" => Some(TokenKind::Return),
            "true" => Some(TokenKind::True),
            _ => None,
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TokenKind::And => write!(f, "and"),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Eof => write!(f, ""),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Equal => write!(f, "="),
            TokenKind::False => write!(f, "false"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::If => write!(f, "if"),
            TokenKind::In => write!(f, "in"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Let => write!(f, "let"),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Or => write!(f, "or"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::RuntimeMember(name) => write!(f, "@{}", name),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
            TokenKind::True => write!(f, "true"),
            TokenKind::Unknown(text) => write!(f, "{}", text),
            TokenKind::UnterminatedString(text) => write!(f, "{}", text),
        }
    }
}
