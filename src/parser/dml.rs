//! DML parsing: INSERT (VALUES, SELECT, ON DUPLICATE KEY UPDATE),
//! UPDATE and DELETE.

use crate::ast::{Assignment, Delete, Insert, InsertSource, Statement, Update};
use crate::error::Result;
use crate::lexer::Token;
use crate::parser::Parser;

impl Parser {
    pub(crate) fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.parse_object_name()?;

        // a parenthesized column list is only a column list when it is
        // followed by VALUES or SELECT material, which is always the case
        // here because the sources below are the only accepted forms
        let columns = if self.peek() == Some(&Token::LeftParen) {
            self.parse_parenthesized_names()?
        } else {
            Vec::new()
        };

        let source = if self.consume_keyword("VALUES") || self.consume_keyword("VALUE") {
            let rows = self.parse_comma_separated(Self::parse_value_row)?;
            InsertSource::Values(rows)
        } else if self.peek_keyword("SELECT") {
            InsertSource::Select(Box::new(self.parse_query()?))
        } else {
            return Err(self.expected("VALUES or SELECT"));
        };

        let on_duplicate = if self.consume_keywords(&["ON", "DUPLICATE", "KEY", "UPDATE"]) {
            self.parse_comma_separated(Self::parse_assignment)?
        } else {
            Vec::new()
        };

        Ok(Statement::Insert(Insert {
            table,
            columns,
            source,
            on_duplicate,
        }))
    }

    fn parse_value_row(&mut self) -> Result<Vec<crate::ast::Expr>> {
        self.expect_token(&Token::LeftParen)?;
        let row = self.parse_comma_separated(Self::parse_expr)?;
        self.expect_token(&Token::RightParen)?;
        Ok(row)
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<Assignment> {
        let column = self.parse_identifier()?;
        self.expect_token(&Token::Eq)?;
        let value = self.parse_expr()?;
        Ok(Assignment { column, value })
    }

    pub(crate) fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword("UPDATE")?;
        let table = self.parse_object_name()?;
        self.expect_keyword("SET")?;
        let assignments = self.parse_comma_separated(Self::parse_assignment)?;
        let selection = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update(Update {
            table,
            assignments,
            selection,
        }))
    }

    pub(crate) fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.parse_object_name()?;
        let selection = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(Delete { table, selection }))
    }
}
