//! Token definitions for the pseudocode lexer

use crate::common::Span;
use logos::Logos;
use serde::{Deserialize, Serialize};

/// A token with its kind, span, and text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Token kinds recognized by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Serialize, Deserialize)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // Types
    #[token("entero")]
    Entero,
    #[token("real")]
    Real,
    #[token("caracter")]
    Caracter,
    #[token("logico")]
    Logico,
    #[token("ref")]
    Ref,

    // Control flow
    #[token("si")]
    Si,
    #[token("entonces")]
    Entonces,
    #[token("sino")]
    Sino,
    #[token("finsi")]
    FinSi,
    #[token("mientras")]
    Mientras,
    #[token("finmientras")]
    FinMientras,
    #[token("repetir")]
    Repetir,
    #[token("hasta")]
    Hasta,
    #[token("que")]
    Que,
    #[token("para")]
    Para,
    #[token("finpara")]
    FinPara,

    // Modules
    #[token("funcion")]
    Funcion,
    #[token("finfuncion")]
    FinFuncion,
    #[token("procedimiento")]
    Procedimiento,
    #[token("finprocedimiento")]
    FinProcedimiento,
    #[token("retornar")]
    Retornar,

    // Word operators and constants
    #[token("y", priority = 3)]
    Y,
    #[token("o", priority = 3)]
    O,
    #[token("no")]
    No,
    #[token("div")]
    Div,
    #[token("mod")]
    Mod,
    #[token("verdadero")]
    Verdadero,
    #[token("falso")]
    Falso,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+")]
    RealLit,
    #[regex(r"[0-9]+")]
    IntLit,
    #[regex(r#""[^"\n]*""#)]
    #[regex(r"'[^'\n]*'")]
    StrLit,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // Punctuation
    #[token("<-")]
    Arrow,
    #[token("<=")]
    LessEq,
    #[token("<>")]
    NotEq,
    #[token("<")]
    Less,
    #[token(">=")]
    GreaterEq,
    #[token(">")]
    Greater,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,

    /// End of input, appended by [`super::lex`]
    Eof,
}

impl TokenKind {
    /// Human-readable description used in parse errors
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Entero => "`entero`",
            TokenKind::Real => "`real`",
            TokenKind::Caracter => "`caracter`",
            TokenKind::Logico => "`logico`",
            TokenKind::Ref => "`ref`",
            TokenKind::Si => "`si`",
            TokenKind::Entonces => "`entonces`",
            TokenKind::Sino => "`sino`",
            TokenKind::FinSi => "`finsi`",
            TokenKind::Mientras => "`mientras`",
            TokenKind::FinMientras => "`finmientras`",
            TokenKind::Repetir => "`repetir`",
            TokenKind::Hasta => "`hasta`",
            TokenKind::Que => "`que`",
            TokenKind::Para => "`para`",
            TokenKind::FinPara => "`finpara`",
            TokenKind::Funcion => "`funcion`",
            TokenKind::FinFuncion => "`finfuncion`",
            TokenKind::Procedimiento => "`procedimiento`",
            TokenKind::FinProcedimiento => "`finprocedimiento`",
            TokenKind::Retornar => "`retornar`",
            TokenKind::Y => "`y`",
            TokenKind::O => "`o`",
            TokenKind::No => "`no`",
            TokenKind::Div => "`div`",
            TokenKind::Mod => "`mod`",
            TokenKind::Verdadero => "`verdadero`",
            TokenKind::Falso => "`falso`",
            TokenKind::RealLit => "real literal",
            TokenKind::IntLit => "integer literal",
            TokenKind::StrLit => "string literal",
            TokenKind::Ident => "identifier",
            TokenKind::Arrow => "`<-`",
            TokenKind::LessEq => "`<=`",
            TokenKind::NotEq => "`<>`",
            TokenKind::Less => "`<`",
            TokenKind::GreaterEq => "`>=`",
            TokenKind::Greater => "`>`",
            TokenKind::Eq => "`=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Caret => "`^`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Eof => "end of file",
        }
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::Entero | TokenKind::Real | TokenKind::Caracter | TokenKind::Logico
        )
    }
}
