use reflox_core::{Error as CoreError, Token, Type};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("[line {line}] Error: {}", .source)]
    ScannerError { line: usize, source: CoreError },

    #[error("[line {line}] Error{}: {msg}", location(.token))]
    ParserError {
        token: Token,

        // line is copied from token, this is required because thiserror doesn't support field
        // access, e.g {token.line:?}, in error strings
        line: usize,
        msg: String,
    },

    #[error("[line {line}] Error{}: {msg}", location(.token))]
    ResolverError {
        token: Token,
        line: usize,
        msg: String,
    },

    #[error("{msg}\n[line {line}]")]
    RuntimeError {
        token: Token,
        line: usize,
        msg: String,
    },
}

fn location(token: &Token) -> String {
    if token.ty == Type::Eof {
        String::from(" at end")
    } else if token.is_implicit_separator() {
        String::from(" at newline")
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

impl Error {
    pub(crate) fn parser_error(token: &Token, msg: &str) -> Self {
        Error::ParserError {
            token: token.clone(),
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub(crate) fn resolver_error(token: &Token, msg: &str) -> Self {
        Error::ResolverError {
            token: token.clone(),
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub(crate) fn runtime_error(token: &Token, msg: &str) -> Self {
        Error::RuntimeError {
            token: token.clone(),
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Error::ScannerError { line, .. }
            | Error::ParserError { line, .. }
            | Error::ResolverError { line, .. }
            | Error::RuntimeError { line, .. } => *line,
        }
    }
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::ScannerError {
            line: value.line(),
            source: value,
        }
    }
}

/// Outcome of running a piece of source code that did not complete.
#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    /// Lexing, parsing or resolution reported diagnostics, nothing was executed.
    #[error("{}", join(.0))]
    Static(Vec<Error>),

    #[error("{0}")]
    Runtime(Error),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflox_core::Literal;

    fn token(ty: Type, lexeme: &str) -> Token {
        Token::new(ty, String::from(lexeme), 3, 0, 0, Literal::Nil)
    }

    #[test]
    fn test_static_diagnostic_location() {
        let err = Error::parser_error(&token(Type::Identifier, "foo"), "Expect ';' after value.");
        assert_eq!("[line 3] Error at 'foo': Expect ';' after value.", err.to_string());

        let err = Error::parser_error(&token(Type::Eof, ""), "Expect expression.");
        assert_eq!("[line 3] Error at end: Expect expression.", err.to_string());

        let err = Error::resolver_error(&token(Type::SemiColon, "\n"), "Expect expression.");
        assert_eq!("[line 3] Error at newline: Expect expression.", err.to_string());
    }

    #[test]
    fn test_runtime_and_scanner_format() {
        let err = Error::runtime_error(&token(Type::Slash, "/"), "Cannot divide by zero.");
        assert_eq!("Cannot divide by zero.\n[line 3]", err.to_string());

        let err = Error::from(CoreError::UnterminatedString { line: 7 });
        assert_eq!(7, err.line());
        assert_eq!("[line 7] Error: Unterminated string.", err.to_string());
    }

    #[test]
    fn test_static_errors_join() {
        let err = RunError::Static(vec![
            Error::parser_error(&token(Type::Identifier, "a"), "first"),
            Error::parser_error(&token(Type::Identifier, "b"), "second"),
        ]);
        assert_eq!(
            "[line 3] Error at 'a': first\n[line 3] Error at 'b': second",
            err.to_string()
        );
    }
}
