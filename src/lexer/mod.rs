//! Lexer for the pseudocode language

mod tokens;

pub use tokens::{Token, TokenKind};

use crate::common::LineIndex;
use crate::diagnostics::CompileError;
use logos::Logos;

/// Tokenize `source`; the result always ends with an `Eof` token
pub fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let index = LineIndex::new(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(kind) = lexer.next() {
        let range = lexer.span();
        let span = index.span(range.start, range.end);
        let text = lexer.slice().to_string();
        match kind {
            Ok(kind) => tokens.push(Token { kind, span, text }),
            Err(()) => {
                return Err(CompileError::InvalidToken {
                    text,
                    span: span.into(),
                    line: span.line,
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: index.span(source.len(), source.len()),
        text: String::new(),
    });
    tracing::trace!("lexed {} tokens", tokens.len());
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(
            kinds("si sino siempre finsi"),
            vec![
                TokenKind::Si,
                TokenKind::Sino,
                TokenKind::Ident,
                TokenKind::FinSi,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a <- b <= c <> d < e"),
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::LessEq,
                TokenKind::Ident,
                TokenKind::NotEq,
                TokenKind::Ident,
                TokenKind::Less,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_literals_and_comments() {
        let tokens = lex("x <- 2.5 // comentario\ny <- \"hola\"").expect("lexing failed");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::RealLit,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::StrLit,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[3].span.line, 2);
        assert_eq!(tokens[5].text, "\"hola\"");
    }

    #[test]
    fn test_invalid_character() {
        let err = lex("a <- 1 # 2").unwrap_err();
        assert!(matches!(err, CompileError::InvalidToken { ref text, .. } if text == "#"));
    }
}
