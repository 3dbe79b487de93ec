//! Unified compiler error type
//!
//! Each pipeline stage raises its own error kind; the driver normalizes
//! them into a single [`CompilerError`] so callers handle one type. The
//! `From` impls make `?` propagation work across stage boundaries.

use crate::irgen::IrGenError;
use crate::lexer::LexerError;
use crate::parser::ParserError;
use crate::typecheck::TypeCheckError;
use thiserror::Error;

/// Any error a compilation can produce.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Semantic analysis failed; carries every accumulated diagnostic.
    #[error("Semantic analysis failed:\n{}", .errors.join("\n"))]
    Semantic { errors: Vec<String> },

    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),

    #[error(transparent)]
    IrGen(#[from] IrGenError),
}

impl CompilerError {
    /// The diagnostics of a semantic failure, empty for other kinds.
    pub fn semantic_errors(&self) -> &[String] {
        match self {
            CompilerError::Semantic { errors } => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_error_passthrough() {
        let error: CompilerError = LexerError {
            message: "Invalid character: '@'".to_string(),
            line: 3,
            column: 7,
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Lexer error at 3:7: Invalid character: '@'"
        );
    }

    #[test]
    fn test_parser_error_passthrough() {
        let error: CompilerError = ParserError {
            message: "Expected Semicolon, got Eof".to_string(),
            line: 1,
            column: 10,
        }
        .into();
        assert!(error.to_string().starts_with("Parser error at 1:10"));
    }

    #[test]
    fn test_semantic_error_joins_diagnostics() {
        let error = CompilerError::Semantic {
            errors: vec![
                "Semantic error: Undefined identifier: 'z'".to_string(),
                "Semantic error: 'break' statement not in loop or switch".to_string(),
            ],
        };
        let text = error.to_string();
        assert!(text.starts_with("Semantic analysis failed:\n"));
        assert!(text.contains("'z'"));
        assert!(text.contains("'break'"));
        assert_eq!(error.semantic_errors().len(), 2);
    }

    #[test]
    fn test_irgen_error_passthrough() {
        let error: CompilerError = IrGenError("Unsupported unary operator: +".to_string()).into();
        assert_eq!(
            error.to_string(),
            "IR generation error: Unsupported unary operator: +"
        );
        assert!(error.semantic_errors().is_empty());
    }
}
