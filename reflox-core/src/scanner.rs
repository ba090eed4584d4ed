use phf::{phf_map, Map};

use crate::error::Error;
use crate::token::{Literal, Token, Type};

/// Turns source text into tokens.
///
/// The scanner keeps numbering tokens across calls to [`Scanner::scan_tokens`], so every token it
/// ever produced has a distinct [`crate::TokenIndex`].
#[derive(Debug, Default)]
pub struct Scanner {
    next_index: usize,
}

impl Scanner {
    const KEYWORDS: Map<&'static str, Type> = phf_map! {
        "and" => Type::And,
        "class" => Type::Class,
        "else" => Type::Else,
        "false" => Type::False,
        "for" => Type::For,
        "fun" => Type::Fun,
        "if" => Type::If,
        "import" => Type::Import,
        "nil" => Type::Nil,
        "or" => Type::Or,
        "return" => Type::Return,
        "super" => Type::Super,
        "this" => Type::This,
        "true" => Type::True,
        "var" => Type::Var,
        "while" => Type::While,
    };

    pub fn new() -> Self {
        Scanner { next_index: 0 }
    }

    pub fn scan_tokens<'a>(&'a mut self, src: &'a str) -> TokenStream<'a> {
        TokenStream::new(src, &mut self.next_index)
    }
}

pub struct TokenStream<'a> {
    src: &'a str,
    line: usize,

    // `start` and `current` are byte offsets to the start and end of the token being scanned
    start: usize,
    current: usize,

    // Shared with the owning scanner so numbering continues in the next stream
    index: &'a mut usize,

    // Newlines inside parentheses never terminate a statement
    paren_depth: usize,
    last: Option<Type>,

    // This flag is set to `true` if the eof is reached and the eof token has been emitted.
    // This is required because the iterator needs to distinguish between when eof is reached but
    // the token is not emitted, and eof is reached and token has been emitted.
    eof: bool,
    errors: Vec<Error>,
}

impl<'a> TokenStream<'a> {
    fn new(src: &'a str, index: &'a mut usize) -> Self {
        TokenStream {
            src,
            line: 1,
            start: 0,
            current: 0,
            index,
            paren_depth: 0,
            last: None,
            eof: false,
            errors: Vec::new(),
        }
    }

    /// Diagnostics collected so far. Scanning never stops at an error, so this is only complete
    /// once the stream has been drained.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    fn scan_token(&mut self) -> Result<Option<Token>, Error> {
        let c = self.advance();

        let token = match c {
            '(' => {
                self.paren_depth += 1;
                Some(self.make_token(Type::LeftParen))
            }
            ')' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                Some(self.make_token(Type::RightParen))
            }
            '{' => Some(self.make_token(Type::LeftBrace)),
            '}' => Some(self.make_token(Type::RightBrace)),
            '[' => Some(self.make_token(Type::LeftBracket)),
            ']' => Some(self.make_token(Type::RightBracket)),
            ',' => Some(self.make_token(Type::Comma)),
            '.' => Some(self.make_token(Type::Dot)),
            '-' => Some(self.make_token(Type::Minus)),
            '+' => Some(self.make_token(Type::Plus)),
            ';' => Some(self.make_token(Type::SemiColon)),
            '*' => Some(self.make_token(Type::Star)),
            '%' => Some(self.make_token(Type::Percent)),
            ':' => Some(self.make_token(Type::Colon)),
            '?' => Some(self.make_token(Type::Question)),
            '&' => Some(self.make_token(Type::Ampersand)),

            '!' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::BangEqual))
                } else {
                    Some(self.make_token(Type::Bang))
                }
            }

            '=' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::EqualEqual))
                } else {
                    Some(self.make_token(Type::Equal))
                }
            }

            '<' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::LessEqual))
                } else {
                    Some(self.make_token(Type::Less))
                }
            }

            '>' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::GreaterEqual))
                } else {
                    Some(self.make_token(Type::Greater))
                }
            }

            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                    None
                } else if self.match_char('*') {
                    self.block_comment()?;
                    None
                } else {
                    Some(self.make_token(Type::Slash))
                }
            }

            '"' => Some(self.string()?),

            // White spaces, do nothing
            ' ' | '\t' | '\r' => None,

            // A line break ends the statement unless the statement is clearly still open
            '\n' => {
                let separator = if self.paren_depth == 0 && self.ends_statement() {
                    Some(self.make_token(Type::SemiColon))
                } else {
                    None
                };
                self.line += 1;
                separator
            }

            _ => {
                if c.is_ascii_digit() {
                    Some(self.number())
                } else if c.is_alphabetic() || c == '_' {
                    Some(self.identifier())
                } else {
                    return Err(Error::UnexpectedCharacter {
                        ch: c,
                        line: self.line,
                    });
                }
            }
        };

        Ok(token)
    }

    fn ends_statement(&self) -> bool {
        !matches!(
            self.last,
            None | Some(Type::SemiColon) | Some(Type::LeftBrace) | Some(Type::RightBrace)
        )
    }

    // Block comments nest, so every `/*` needs its own `*/`
    fn block_comment(&mut self) -> Result<(), Error> {
        let mut depth = 1;
        while depth > 0 {
            if self.is_at_end() {
                return Err(Error::UnterminatedBlockComment { line: self.line });
            }

            match self.advance() {
                '\n' => self.line += 1,
                '/' if self.peek() == '*' => {
                    self.advance();
                    depth += 1;
                }
                '*' if self.peek() == '/' => {
                    self.advance();
                    depth -= 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn string(&mut self) -> Result<Token, Error> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }

            self.advance();
        }

        if self.is_at_end() {
            return Err(Error::UnterminatedString { line: self.line });
        }

        // consume the closing "
        self.advance();
        let value = self.unescape(self.start + 1, self.current - 1);
        Ok(self.make_token_with_val(Type::String, Literal::from(value)))
    }

    fn unescape(&mut self, from: usize, to: usize) -> String {
        let mut value = String::with_capacity(to - from);
        let mut chars = self.src[from..to].chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                value.push(c);
                continue;
            }

            match chars.next() {
                Some('n') => value.push('\n'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    self.errors.push(Error::UnrecognizedEscape {
                        ch: other,
                        line: self.line,
                    });
                    value.push(other);
                }
                None => {
                    self.errors.push(Error::UnrecognizedEscape {
                        ch: '"',
                        line: self.line,
                    });
                    value.push('\\');
                }
            }
        }

        value
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        // Only ascii digits and a single dot were consumed, which always parses
        let value = self.src[self.start..self.current]
            .parse::<f64>()
            .map(Literal::Num)
            .unwrap_or(Literal::Nil);
        self.make_token_with_val(Type::Number, value)
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = &self.src[self.start..self.current];

        match Scanner::KEYWORDS.get(text) {
            None => self.make_token(Type::Identifier),
            Some(Type::True) => self.make_token_with_val(Type::True, Literal::Bool(true)),
            Some(Type::False) => self.make_token_with_val(Type::False, Literal::Bool(false)),
            Some(keyword) => self.make_token(*keyword),
        }
    }

    fn peek(&self) -> char {
        self.src[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.src[self.current..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let res = self.peek();
        self.current += res.len_utf8();
        res
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.is_at_end() || self.peek() != c {
            false
        } else {
            self.current += c.len_utf8();
            true
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn make_token(&mut self, ty: Type) -> Token {
        self.make_token_with_val(ty, Literal::Nil)
    }

    fn make_token_with_val(&mut self, ty: Type, val: Literal) -> Token {
        let lexeme = match ty {
            Type::Eof => String::new(),
            _ => String::from(&self.src[self.start..self.current]),
        };

        let token = Token::new(ty, lexeme, self.line, self.start, *self.index, val);
        *self.index += 1;
        self.last = Some(ty);
        token
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof {
            return None;
        }

        while !self.is_at_end() {
            self.start = self.current;

            match self.scan_token() {
                Ok(None) => continue,
                Ok(Some(token)) => return Some(token),
                // Keep scanning so later problems are reported in the same pass
                Err(err) => self.errors.push(err),
            }
        }

        self.start = self.current;
        self.eof = true;
        Some(self.make_token(Type::Eof))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::scanner::Scanner;
    use crate::token::{Literal, Token, Type};

    fn types(src: &str) -> Vec<Type> {
        let mut scanner = Scanner::new();
        scanner.scan_tokens(src).map(|token| token.ty).collect()
    }

    #[test]
    fn test_basic_scanning() {
        let source = "class fun {} var foo bar 12.45 \"hello\" true false nil // this is a comment";
        let mut scanner = Scanner::new();
        let stream = scanner.scan_tokens(source);

        assert_eq!(
            stream.collect::<Vec<Token>>(),
            vec![
                Token::new(Type::Class, String::from("class"), 1, 0, 0, Literal::Nil),
                Token::new(Type::Fun, String::from("fun"), 1, 6, 1, Literal::Nil),
                Token::new(Type::LeftBrace, String::from("{"), 1, 10, 2, Literal::Nil),
                Token::new(Type::RightBrace, String::from("}"), 1, 11, 3, Literal::Nil),
                Token::new(Type::Var, String::from("var"), 1, 13, 4, Literal::Nil),
                Token::new(
                    Type::Identifier,
                    String::from("foo"),
                    1,
                    17,
                    5,
                    Literal::Nil
                ),
                Token::new(
                    Type::Identifier,
                    String::from("bar"),
                    1,
                    21,
                    6,
                    Literal::Nil
                ),
                Token::new(
                    Type::Number,
                    String::from("12.45"),
                    1,
                    25,
                    7,
                    Literal::Num(12.45)
                ),
                Token::new(
                    Type::String,
                    String::from("\"hello\""),
                    1,
                    31,
                    8,
                    Literal::from("hello")
                ),
                Token::new(
                    Type::True,
                    String::from("true"),
                    1,
                    39,
                    9,
                    Literal::Bool(true)
                ),
                Token::new(
                    Type::False,
                    String::from("false"),
                    1,
                    44,
                    10,
                    Literal::Bool(false)
                ),
                Token::new(Type::Nil, String::from("nil"), 1, 50, 11, Literal::Nil),
                Token::new(Type::Eof, String::new(), 1, 74, 12, Literal::Nil),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            types("[ ] % ? : & ! != == <= >= import"),
            vec![
                Type::LeftBracket,
                Type::RightBracket,
                Type::Percent,
                Type::Question,
                Type::Colon,
                Type::Ampersand,
                Type::Bang,
                Type::BangEqual,
                Type::EqualEqual,
                Type::LessEqual,
                Type::GreaterEqual,
                Type::Import,
                Type::Eof,
            ]
        );
    }

    #[test]
    fn test_newline_terminates_statement() {
        assert_eq!(
            types("var a = 1\nprint(a)\n"),
            vec![
                Type::Var,
                Type::Identifier,
                Type::Equal,
                Type::Number,
                Type::SemiColon,
                Type::Identifier,
                Type::LeftParen,
                Type::Identifier,
                Type::RightParen,
                Type::SemiColon,
                Type::Eof,
            ]
        );

        let mut scanner = Scanner::new();
        let separator = scanner.scan_tokens("a\n").nth(1).unwrap();
        assert!(separator.is_implicit_separator());
        assert_eq!(separator.line, 1);
    }

    #[test]
    fn test_newline_suppressed() {
        // inside parentheses
        assert_eq!(
            types("f(1,\n2)"),
            vec![
                Type::Identifier,
                Type::LeftParen,
                Type::Number,
                Type::Comma,
                Type::Number,
                Type::RightParen,
                Type::Eof,
            ]
        );
        // after separators, braces and at the very start
        assert_eq!(
            types("\n{\n}\na;\n\n"),
            vec![
                Type::LeftBrace,
                Type::RightBrace,
                Type::Identifier,
                Type::SemiColon,
                Type::Eof,
            ]
        );
    }

    #[test]
    fn test_multiline_comment() {
        let source = "/*\n\
            this is a multiline comment \n\
        */";
        let mut scanner = Scanner::new();
        let stream = scanner.scan_tokens(source);

        assert_eq!(
            stream.collect::<Vec<Token>>(),
            vec![Token::new(Type::Eof, String::new(), 3, source.len(), 0, Literal::Nil)]
        );
    }

    #[test]
    fn test_nested_comment() {
        assert_eq!(types("/* outer /* inner */ still comment */ a"), vec![Type::Identifier, Type::Eof]);
    }

    #[test]
    fn test_unterminated_multiline_comment() {
        for source in ["/*", "/* /* */", "a /* \n\n"] {
            let mut scanner = Scanner::new();
            let mut stream = scanner.scan_tokens(source);
            stream.by_ref().last();

            assert_eq!(stream.errors().len(), 1);
            assert!(matches!(
                stream.errors()[0],
                Error::UnterminatedBlockComment { .. }
            ));
        }
    }

    #[test]
    fn test_unterminated_string() {
        let source = "\"hello";
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(source);
        stream.by_ref().last();

        assert_eq!(stream.errors(), &[Error::UnterminatedString { line: 1 }]);
    }

    #[test]
    fn test_escapes() {
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(r#""a\nb\\c\q""#);
        let token = stream.next().unwrap();

        assert_eq!(token.value, Literal::from("a\nb\\cq"));
        stream.by_ref().last();
        assert_eq!(
            stream.errors(),
            &[Error::UnrecognizedEscape { ch: 'q', line: 1 }]
        );
    }

    #[test]
    fn test_continues_after_unexpected_character() {
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens("a # b $ c");
        let tokens: Vec<Type> = stream.by_ref().map(|token| token.ty).collect();

        assert_eq!(
            tokens,
            vec![
                Type::Identifier,
                Type::Identifier,
                Type::Identifier,
                Type::Eof
            ]
        );
        assert_eq!(
            stream.into_errors(),
            vec![
                Error::UnexpectedCharacter { ch: '#', line: 1 },
                Error::UnexpectedCharacter { ch: '$', line: 1 },
            ]
        );
    }

    #[test]
    fn test_index_continues_across_sources() {
        let mut scanner = Scanner::new();
        let first: Vec<Token> = scanner.scan_tokens("a b").collect();
        let second: Vec<Token> = scanner.scan_tokens("c").collect();

        assert_eq!(first.last().unwrap().idx.0, 2);
        assert_eq!(second[0].idx.0, 3);
    }
}
