//! Recursive descent parser for the MySQL-flavored dialect.
//!
//! The parser is split by statement family: DDL in [`ddl`], DML in
//! [`dml`], SELECT/UNION in [`query`] and the precedence-climbing
//! expression parser in [`expr`]. This module owns the token cursor,
//! the shared helpers and the dispatch on the leading keyword.

mod ddl;
mod dml;
pub mod expr;
mod query;

use crate::ast::Statement;
use crate::error::{Error, Result};
use crate::lexer::{tokenize, LocatedToken, Location, Token};

/// Words that cannot start an implicit alias or be used as a bare
/// identifier where an alias is optional.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION",
    "ALL", "DISTINCT", "AS", "JOIN", "INNER", "LEFT", "RIGHT", "CROSS", "OUTER", "ON", "USING",
    "AND", "OR", "NOT", "NULL", "TRUE", "FALSE", "IS", "IN", "BETWEEN", "LIKE", "EXISTS",
    "CASE", "WHEN", "THEN", "ELSE", "END", "INSERT", "INTO", "VALUES", "UPDATE", "SET",
    "DELETE", "CREATE", "DROP", "TABLE", "PRIMARY", "FOREIGN", "REFERENCES", "CONSTRAINT",
    "DEFAULT", "CHECK", "ASC", "DESC", "FOR", "DUPLICATE", "KEY",
];

/// Whether `word` is reserved and therefore never an implicit alias.
#[must_use]
pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

/// Parses one statement from `sql`, requiring the whole input (up to an
/// optional trailing `;`) to be consumed.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser::new(tokens);
    let statement = parser.parse_statement()?;
    parser.consume_token(&Token::Semicolon);
    if let Some(token) = parser.peek() {
        let token = token.clone();
        return Err(parser.error(format!("unexpected trailing input near '{token}'")));
    }
    Ok(statement)
}

/// Token cursor with the shared parsing helpers.
pub struct Parser {
    tokens: Vec<LocatedToken>,
    index: usize,
}

impl Parser {
    /// Creates a parser over a token stream.
    #[must_use]
    pub fn new(tokens: Vec<LocatedToken>) -> Self {
        Self { tokens, index: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset).map(|t| &t.token)
    }

    pub(crate) fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|t| t.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.index.min(self.tokens.len().saturating_sub(1)))
            .map_or_else(Location::default, |t| t.location)
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> Error {
        let loc = self.location();
        Error::syntax(message, loc.line, loc.column)
    }

    pub(crate) fn expected(&self, what: &str) -> Error {
        match self.peek() {
            Some(token) => self.error(format!("expected {what}, found '{token}'")),
            None => self.error(format!("expected {what}, found end of statement")),
        }
    }

    /// Consumes the next token when it is the given keyword.
    pub(crate) fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(kw)) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Consumes a whole keyword sequence, or nothing.
    pub(crate) fn consume_keywords(&mut self, kws: &[&str]) -> bool {
        for (i, kw) in kws.iter().enumerate() {
            if !self.peek_at(i).is_some_and(|t| t.is_keyword(kw)) {
                return false;
            }
        }
        self.index += kws.len();
        true
    }

    pub(crate) fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.consume_keyword(kw) {
            Ok(())
        } else {
            Err(self.expected(kw))
        }
    }

    pub(crate) fn peek_keyword(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(kw))
    }

    pub(crate) fn peek_any_keyword(&self, kws: &[&str]) -> bool {
        kws.iter().any(|kw| self.peek_keyword(kw))
    }

    pub(crate) fn consume_token(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_token(&mut self, token: &Token) -> Result<()> {
        if self.consume_token(token) {
            Ok(())
        } else {
            Err(self.expected(&format!("'{token}'")))
        }
    }

    /// Parses an identifier: a bare word or a backtick-quoted name.
    pub(crate) fn parse_identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w)) => {
                let w = w.clone();
                self.index += 1;
                Ok(w)
            }
            Some(Token::QuotedIdent(w)) => {
                let w = w.clone();
                self.index += 1;
                Ok(w)
            }
            _ => Err(self.expected("an identifier")),
        }
    }

    /// Parses a table name, tolerating a `database.` qualifier by keeping
    /// only the last part.
    pub(crate) fn parse_object_name(&mut self) -> Result<String> {
        let mut name = self.parse_identifier()?;
        while self.consume_token(&Token::Period) {
            name = self.parse_identifier()?;
        }
        Ok(name)
    }

    /// Parses an optional `[AS] alias`, stopping at reserved words.
    pub(crate) fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.consume_keyword("AS") {
            return self.parse_identifier().map(Some);
        }
        match self.peek() {
            Some(Token::Word(w)) if !is_reserved(w) => {
                let w = w.clone();
                self.index += 1;
                Ok(Some(w))
            }
            Some(Token::QuotedIdent(w)) => {
                let w = w.clone();
                self.index += 1;
                Ok(Some(w))
            }
            _ => Ok(None),
        }
    }

    /// Parses `f`, then repeatedly `, f`.
    pub(crate) fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = vec![f(self)?];
        while self.consume_token(&Token::Comma) {
            items.push(f(self)?);
        }
        Ok(items)
    }

    /// Parses `( ident [, ident]* )`.
    pub(crate) fn parse_parenthesized_names(&mut self) -> Result<Vec<String>> {
        self.expect_token(&Token::LeftParen)?;
        let names = self.parse_comma_separated(Self::parse_identifier)?;
        self.expect_token(&Token::RightParen)?;
        Ok(names)
    }

    /// Parses an unsigned integer literal.
    pub(crate) fn parse_u64(&mut self) -> Result<u64> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let parsed = n
                    .parse::<u64>()
                    .map_err(|_| self.error(format!("expected an integer, found '{n}'")));
                self.index += 1;
                parsed
            }
            _ => Err(self.expected("an integer")),
        }
    }

    /// Parses one statement, dispatching on the leading keyword.
    pub fn parse_statement(&mut self) -> Result<Statement> {
        let Some(token) = self.peek() else {
            return Err(self.error("empty statement"));
        };
        let Token::Word(word) = token else {
            return Err(self.expected("a statement"));
        };
        match word.to_uppercase().as_str() {
            "CREATE" => self.parse_create(),
            "DROP" => self.parse_drop(),
            "TRUNCATE" => self.parse_truncate(),
            "INSERT" => self.parse_insert(),
            "UPDATE" => self.parse_update(),
            "DELETE" => self.parse_delete(),
            "SELECT" => Ok(Statement::Select(Box::new(self.parse_query()?))),
            "BEGIN" => {
                self.index += 1;
                // optional WORK
                self.consume_keyword("WORK");
                Ok(Statement::Begin)
            }
            "START" => {
                self.index += 1;
                self.expect_keyword("TRANSACTION")?;
                Ok(Statement::Begin)
            }
            "COMMIT" => {
                self.index += 1;
                self.consume_keyword("WORK");
                Ok(Statement::Commit)
            }
            "ROLLBACK" => {
                self.index += 1;
                if self.consume_keyword("TO") {
                    self.consume_keyword("SAVEPOINT");
                    let name = self.parse_identifier()?;
                    Ok(Statement::Rollback {
                        savepoint: Some(name),
                    })
                } else {
                    self.consume_keyword("WORK");
                    Ok(Statement::Rollback { savepoint: None })
                }
            }
            "SAVEPOINT" => {
                self.index += 1;
                let name = self.parse_identifier()?;
                Ok(Statement::Savepoint { name })
            }
            "RELEASE" => {
                self.index += 1;
                self.expect_keyword("SAVEPOINT")?;
                let name = self.parse_identifier()?;
                Ok(Statement::ReleaseSavepoint { name })
            }
            "SET" => self.parse_set(),
            "LOCK" => {
                self.index += 1;
                self.expect_keyword("TABLES")?;
                self.consume_remaining();
                Ok(Statement::LockTables)
            }
            "UNLOCK" => {
                self.index += 1;
                self.expect_keyword("TABLES")?;
                Ok(Statement::UnlockTables)
            }
            "SHOW" => self.parse_show(),
            "DESCRIBE" | "DESC" => {
                self.index += 1;
                let table = self.parse_object_name()?;
                Ok(Statement::ShowColumns { table })
            }
            other => Err(self.error(format!("unsupported statement '{other}'"))),
        }
    }

    // SET AUTOCOMMIT, SET TRANSACTION ISOLATION LEVEL, SET var = ...
    fn parse_set(&mut self) -> Result<Statement> {
        self.expect_keyword("SET")?;
        let scoped = self.consume_keyword("SESSION") || self.consume_keyword("GLOBAL");
        if self.consume_keyword("TRANSACTION") {
            self.expect_keyword("ISOLATION")?;
            self.expect_keyword("LEVEL")?;
            let mut level = Vec::new();
            while let Some(Token::Word(w)) = self.peek() {
                level.push(w.to_uppercase());
                self.index += 1;
            }
            if level.is_empty() {
                return Err(self.expected("an isolation level"));
            }
            return Ok(Statement::SetTransactionIsolation {
                level: level.join(" "),
            });
        }
        if !scoped && self.peek_keyword("AUTOCOMMIT") {
            self.index += 1;
            self.expect_token(&Token::Eq)?;
            let enabled = match self.next_token() {
                Some(Token::Number(n)) => n != "0",
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("ON") => true,
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("OFF") => false,
                _ => return Err(self.expected("0, 1, ON or OFF")),
            };
            return Ok(Statement::SetAutocommit { enabled });
        }
        // any other session/global variable: accepted without effect
        let name = self.parse_identifier()?;
        self.consume_remaining();
        Ok(Statement::SetVariable { name })
    }

    fn parse_show(&mut self) -> Result<Statement> {
        self.expect_keyword("SHOW")?;
        if self.consume_keyword("TABLES") {
            return Ok(Statement::ShowTables);
        }
        if self.consume_keyword("INDEX")
            || self.consume_keyword("INDEXES")
            || self.consume_keyword("KEYS")
        {
            self.expect_keyword("FROM")?;
            let table = self.parse_object_name()?;
            return Ok(Statement::ShowIndexes { table });
        }
        if self.consume_keyword("COLUMNS") || self.consume_keywords(&["FULL", "COLUMNS"]) {
            self.expect_keyword("FROM")?;
            let table = self.parse_object_name()?;
            return Ok(Statement::ShowColumns { table });
        }
        Err(self.expected("TABLES, INDEX FROM or COLUMNS FROM"))
    }

    // swallows the rest of the statement (parse-only forms)
    pub(crate) fn consume_remaining(&mut self) {
        while let Some(token) = self.peek() {
            if *token == Token::Semicolon {
                break;
            }
            self.index += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transaction_statements() {
        assert_eq!(parse_statement("BEGIN").unwrap(), Statement::Begin);
        assert_eq!(
            parse_statement("START TRANSACTION;").unwrap(),
            Statement::Begin
        );
        assert_eq!(parse_statement("COMMIT").unwrap(), Statement::Commit);
        assert_eq!(
            parse_statement("ROLLBACK").unwrap(),
            Statement::Rollback { savepoint: None }
        );
        assert_eq!(
            parse_statement("ROLLBACK TO SAVEPOINT sp1").unwrap(),
            Statement::Rollback {
                savepoint: Some("sp1".to_string())
            }
        );
        assert_eq!(
            parse_statement("SAVEPOINT sp1").unwrap(),
            Statement::Savepoint {
                name: "sp1".to_string()
            }
        );
        assert_eq!(
            parse_statement("RELEASE SAVEPOINT sp1").unwrap(),
            Statement::ReleaseSavepoint {
                name: "sp1".to_string()
            }
        );
    }

    #[test]
    fn set_statements() {
        assert_eq!(
            parse_statement("SET AUTOCOMMIT = 0").unwrap(),
            Statement::SetAutocommit { enabled: false }
        );
        assert_eq!(
            parse_statement("SET autocommit=1").unwrap(),
            Statement::SetAutocommit { enabled: true }
        );
        assert_eq!(
            parse_statement("SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED").unwrap(),
            Statement::SetTransactionIsolation {
                level: "READ COMMITTED".to_string()
            }
        );
        assert_eq!(
            parse_statement("SET SESSION sql_mode = 'STRICT_ALL_TABLES'").unwrap(),
            Statement::SetVariable {
                name: "sql_mode".to_string()
            }
        );
    }

    #[test]
    fn lock_statements_parse_without_effect() {
        assert_eq!(
            parse_statement("LOCK TABLES t READ, u WRITE").unwrap(),
            Statement::LockTables
        );
        assert_eq!(parse_statement("UNLOCK TABLES").unwrap(), Statement::UnlockTables);
    }

    #[test]
    fn show_statements() {
        assert_eq!(parse_statement("SHOW TABLES").unwrap(), Statement::ShowTables);
        assert_eq!(
            parse_statement("SHOW INDEX FROM t").unwrap(),
            Statement::ShowIndexes {
                table: "t".to_string()
            }
        );
        assert_eq!(
            parse_statement("DESCRIBE users").unwrap(),
            Statement::ShowColumns {
                table: "users".to_string()
            }
        );
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = parse_statement("COMMIT COMMIT").unwrap_err();
        assert!(err.to_string().contains("unexpected trailing input"));
    }
}
