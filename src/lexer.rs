//! SQL lexer for the MySQL-flavored dialect.
//!
//! Produces a flat token stream with line/column locations. Whitespace
//! and comments (`--`, `#`, `/* ... */`) are consumed and dropped here,
//! so the parser never sees them.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Result};

/// A position in the statement text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Default for Location {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted word: keyword or identifier, decided by the parser
    Word(String),
    /// Backtick-quoted identifier
    QuotedIdent(String),
    /// Numeric literal, kept as text until the parser types it
    Number(String),
    /// String literal (single or double quoted)
    String(String),
    /// `,`
    Comma,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `;`
    Semicolon,
    /// `.`
    Period,
    /// `*` (multiplication or wildcard, decided by the parser)
    Asterisk,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Eq,
    /// `<>` or `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl Token {
    /// Whether the token is the given bare keyword (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{w}"),
            Token::QuotedIdent(w) => write!(f, "`{w}`"),
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "'{s}'"),
            Token::Comma => write!(f, ","),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Period => write!(f, "."),
            Token::Asterisk => write!(f, "*"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "<>"),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
        }
    }
}

/// A token plus where it started.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    /// The token
    pub token: Token,
    /// Where it started in the input
    pub location: Location,
}

/// SQL lexer over a statement string.
pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
    location: Location,
}

/// Tokenizes a statement, dropping whitespace and comments.
pub fn tokenize(sql: &str) -> Result<Vec<LocatedToken>> {
    Lexer::new(sql).tokenize()
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for the given input string.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            iter: input.chars().peekable(),
            location: Location::default(),
        }
    }

    /// Tokenizes the whole input.
    pub fn tokenize(&mut self) -> Result<Vec<LocatedToken>> {
        let mut tokens = Vec::new();
        while let Some(located) = self.next_token()? {
            tokens.push(located);
        }
        Ok(tokens)
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.iter.next();
        match ch {
            Some('\n') => {
                self.location.line += 1;
                self.location.column = 1;
            }
            Some(_) => self.location.column += 1,
            None => {}
        }
        ch
    }

    fn next_if_is(&mut self, expected: char) -> bool {
        if self.iter.peek() == Some(&expected) {
            self.next_char();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.location.line, self.location.column)
    }

    fn next_token(&mut self) -> Result<Option<LocatedToken>> {
        loop {
            let start = self.location;
            let Some(&ch) = self.iter.peek() else {
                return Ok(None);
            };
            let token = match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.next_char();
                    continue;
                }
                '#' => {
                    self.skip_line_comment();
                    continue;
                }
                '\'' | '"' => {
                    self.next_char();
                    Token::String(self.tokenize_string_literal(ch)?)
                }
                '`' => {
                    self.next_char();
                    Token::QuotedIdent(self.tokenize_delimited_ident()?)
                }
                '0'..='9' => Token::Number(self.tokenize_number()),
                c if is_ident_start(c) => Token::Word(self.tokenize_word()),
                ',' => self.single(Token::Comma),
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                ';' => self.single(Token::Semicolon),
                '.' => {
                    // .5 is a number, everything else a period
                    self.next_char();
                    if matches!(self.iter.peek(), Some('0'..='9')) {
                        let mut num = String::from("0.");
                        num.push_str(&self.take_digits());
                        Token::Number(num)
                    } else {
                        Token::Period
                    }
                }
                '*' => self.single(Token::Asterisk),
                '+' => self.single(Token::Plus),
                '-' => {
                    self.next_char();
                    // `--` starts a comment only when followed by whitespace
                    // or end of input; `1--2` stays arithmetic
                    if self.iter.peek() == Some(&'-') {
                        let mut ahead = self.iter.clone();
                        ahead.next();
                        match ahead.peek() {
                            None | Some(' ' | '\t' | '\r' | '\n') => {
                                self.skip_line_comment();
                                continue;
                            }
                            Some(_) => Token::Minus,
                        }
                    } else {
                        Token::Minus
                    }
                }
                '/' => {
                    self.next_char();
                    if self.next_if_is('*') {
                        self.skip_block_comment()?;
                        continue;
                    }
                    Token::Slash
                }
                '%' => self.single(Token::Percent),
                '=' => self.single(Token::Eq),
                '!' => {
                    self.next_char();
                    if self.next_if_is('=') {
                        Token::NotEq
                    } else {
                        return Err(self.error("unexpected character '!'"));
                    }
                }
                '<' => {
                    self.next_char();
                    if self.next_if_is('=') {
                        Token::LtEq
                    } else if self.next_if_is('>') {
                        Token::NotEq
                    } else {
                        Token::Lt
                    }
                }
                '>' => {
                    self.next_char();
                    if self.next_if_is('=') {
                        Token::GtEq
                    } else {
                        Token::Gt
                    }
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            return Ok(Some(LocatedToken {
                token,
                location: start,
            }));
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.next_char();
        token
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.iter.peek() {
            if c == '\n' {
                break;
            }
            self.next_char();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            match self.next_char() {
                Some('*') if self.next_if_is('/') => return Ok(()),
                Some(_) => {}
                None => return Err(self.error("unterminated block comment")),
            }
        }
    }

    fn tokenize_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.iter.peek() {
            if is_ident_part(c) {
                word.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        word
    }

    fn take_digits(&mut self) -> String {
        let mut digits = String::new();
        while let Some(&c) = self.iter.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        digits
    }

    fn tokenize_number(&mut self) -> String {
        let mut num = self.take_digits();
        if self.iter.peek() == Some(&'.') {
            // lookahead so `1.id` style qualified access is not eaten
            let mut ahead = self.iter.clone();
            ahead.next();
            if matches!(ahead.peek(), Some('0'..='9')) {
                self.next_char();
                num.push('.');
                num.push_str(&self.take_digits());
            }
        }
        if matches!(self.iter.peek(), Some('e' | 'E')) {
            let mut ahead = self.iter.clone();
            ahead.next();
            let exp_digits = match ahead.peek() {
                Some('+' | '-') => {
                    ahead.next();
                    matches!(ahead.peek(), Some('0'..='9'))
                }
                Some('0'..='9') => true,
                _ => false,
            };
            if exp_digits {
                num.push('e');
                self.next_char();
                if matches!(self.iter.peek(), Some('+' | '-')) {
                    if self.iter.peek() == Some(&'-') {
                        num.push('-');
                    }
                    self.next_char();
                }
                num.push_str(&self.take_digits());
            }
        }
        num
    }

    // open quote has been consumed
    fn tokenize_string_literal(&mut self, quote: char) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.next_char() {
                Some(c) if c == quote => {
                    // doubled quote is an escaped quote
                    if self.next_if_is(quote) {
                        s.push(quote);
                    } else {
                        return Ok(s);
                    }
                }
                Some('\\') => match self.next_char() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    // backslash before % and _ stays in the string so
                    // LIKE sees the escape
                    Some(c @ ('%' | '_')) => {
                        s.push('\\');
                        s.push(c);
                    }
                    Some(c) => s.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    // open backtick has been consumed
    fn tokenize_delimited_ident(&mut self) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.next_char() {
                Some('`') => {
                    if self.next_if_is('`') {
                        s.push('`');
                    } else {
                        return Ok(s);
                    }
                }
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated quoted identifier")),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn toks(sql: &str) -> Vec<Token> {
        tokenize(sql).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn tokenizes_simple_select() {
        assert_eq!(
            toks("SELECT id FROM users;"),
            vec![
                Token::Word("SELECT".into()),
                Token::Word("id".into()),
                Token::Word("FROM".into()),
                Token::Word("users".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            toks("SELECT 1 -- trailing\n# another\n/* block\nspanning */ + 2"),
            vec![
                Token::Word("SELECT".into()),
                Token::Number("1".into()),
                Token::Plus,
                Token::Number("2".into()),
            ]
        );
    }

    #[test]
    fn double_minus_without_space_is_arithmetic() {
        assert_eq!(
            toks("1--2"),
            vec![Token::Number("1".into()), Token::Minus, Token::Minus, Token::Number("2".into())],
            "1--2 must stay arithmetic, not become a comment"
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(toks("'it''s'"), vec![Token::String("it's".into())]);
        assert_eq!(toks(r"'a\nb'"), vec![Token::String("a\nb".into())]);
        // the LIKE escapes keep their backslash
        assert_eq!(toks(r"'100\%'"), vec![Token::String(r"100\%".into())]);
        assert_eq!(toks("\"dq\""), vec![Token::String("dq".into())]);
    }

    #[test]
    fn quoted_identifiers() {
        assert_eq!(
            toks("`weird name` `tick``ed`"),
            vec![
                Token::QuotedIdent("weird name".into()),
                Token::QuotedIdent("tick`ed".into()),
            ]
        );
    }

    #[test]
    fn numbers_and_qualified_names() {
        assert_eq!(
            toks("12.5 .5 1e3 t1.id"),
            vec![
                Token::Number("12.5".into()),
                Token::Number("0.5".into()),
                Token::Number("1e3".into()),
                Token::Word("t1".into()),
                Token::Period,
                Token::Word("id".into()),
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            toks("a <> b != c <= d >= e"),
            vec![
                Token::Word("a".into()),
                Token::NotEq,
                Token::Word("b".into()),
                Token::NotEq,
                Token::Word("c".into()),
                Token::LtEq,
                Token::Word("d".into()),
                Token::GtEq,
                Token::Word("e".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("'abc").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }
}
