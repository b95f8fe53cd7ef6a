//! Tokens of the textual expression form.
use std::{fmt, ops::Range};

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("**")]
    Power,

    #[token("<")]
    Lt,

    #[token("<=")]
    LtEq,

    #[token(">")]
    Gt,

    #[token(">=")]
    GtEq,

    #[token("&&")]
    And,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Identifier(s) => write!(f, "{s}"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Power => write!(f, "**"),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Comma => write!(f, ","),
        }
    }
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
}

/// Splits `source` into tokens, stopping at the first unrecognized character.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, usize> {
    Token::lexer(source)
        .spanned()
        .map(|(token, span)| match token {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(span.start),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokens("a ** 2 <= b && c"),
            vec![
                Token::Identifier("a".into()),
                Token::Power,
                Token::Number(2.0),
                Token::LtEq,
                Token::Identifier("b".into()),
                Token::And,
                Token::Identifier("c".into()),
            ]
        );
    }

    #[test_case("1", 1.0; "integer")]
    #[test_case("2.5", 2.5; "decimal")]
    #[test_case(".5", 0.5; "leading dot")]
    #[test_case("1e-3", 1e-3; "exponent")]
    #[test_case("0.00000000000000000001", 1e-20; "long decimal")]
    fn numbers(source: &str, value: f64) {
        assert_eq!(tokens(source), vec![Token::Number(value)]);
    }

    #[test]
    fn unknown_character() {
        assert_eq!(tokenize("a $ b"), Err(2));
    }
}
