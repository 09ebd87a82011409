//! DDL parsing: CREATE TABLE / CREATE INDEX, DROP, TRUNCATE and the
//! data-type grammar shared with CAST.

use crate::ast::{ColumnDef, CreateIndex, CreateTable, Statement, TableConstraint};
use crate::catalog::{ColumnDefault, ReferentialAction};
use crate::error::Result;
use crate::lexer::Token;
use crate::parser::expr::number_literal;
use crate::parser::Parser;
use crate::value::{DataType, Value};

impl Parser {
    pub(crate) fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword("CREATE")?;
        if self.consume_keyword("TABLE") {
            return self.parse_create_table();
        }
        let unique = self.consume_keyword("UNIQUE");
        let fulltext = !unique && self.consume_keyword("FULLTEXT");
        if self.consume_keyword("INDEX") {
            return self.parse_create_index(unique, fulltext);
        }
        Err(self.expected("TABLE or INDEX after CREATE"))
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.consume_keywords(&["IF", "NOT", "EXISTS"]);
        let name = self.parse_object_name()?;
        self.expect_token(&Token::LeftParen)?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.peek_any_keyword(&[
                "PRIMARY", "UNIQUE", "KEY", "INDEX", "FULLTEXT", "FOREIGN", "CONSTRAINT", "CHECK",
            ]) {
                constraints.push(self.parse_table_constraint()?);
            } else {
                let (column, inline_fk) = self.parse_column_def()?;
                if let Some(fk) = inline_fk {
                    constraints.push(fk);
                }
                columns.push(column);
            }
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RightParen)?;
        self.skip_table_options();

        Ok(Statement::CreateTable(CreateTable {
            name,
            if_not_exists,
            columns,
            constraints,
        }))
    }

    // ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='...' and friends
    fn skip_table_options(&mut self) {
        self.consume_remaining();
    }

    fn parse_column_def(&mut self) -> Result<(ColumnDef, Option<TableConstraint>)> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;
        let mut column = ColumnDef {
            name,
            data_type,
            nullable: None,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            on_update_current_timestamp: false,
        };
        let mut inline_fk = None;

        // column options may come in any order
        loop {
            if self.consume_keywords(&["NOT", "NULL"]) {
                column.nullable = Some(false);
            } else if self.consume_keyword("NULL") {
                column.nullable = Some(true);
            } else if self.consume_keywords(&["PRIMARY", "KEY"]) {
                column.primary_key = true;
            } else if self.consume_keyword("UNIQUE") {
                self.consume_keyword("KEY");
                column.unique = true;
            } else if self.consume_keyword("AUTO_INCREMENT") {
                column.auto_increment = true;
            } else if self.consume_keyword("DEFAULT") {
                column.default = Some(self.parse_column_default()?);
            } else if self.consume_keywords(&["ON", "UPDATE"]) {
                self.expect_keyword("CURRENT_TIMESTAMP")?;
                if self.consume_token(&Token::LeftParen) {
                    self.expect_token(&Token::RightParen)?;
                }
                column.on_update_current_timestamp = true;
            } else if self.consume_keyword("REFERENCES") {
                let ref_table = self.parse_object_name()?;
                let ref_columns = self.parse_parenthesized_names()?;
                let (on_delete, on_update) = self.parse_referential_actions()?;
                inline_fk = Some(TableConstraint::ForeignKey {
                    name: None,
                    columns: vec![column.name.clone()],
                    ref_table,
                    ref_columns,
                    on_delete,
                    on_update,
                });
            } else if self.consume_keyword("CHECK") {
                // accepted and ignored
                self.expect_token(&Token::LeftParen)?;
                self.parse_expr()?;
                self.expect_token(&Token::RightParen)?;
            } else if self.consume_keyword("COMMENT") {
                match self.next_token() {
                    Some(Token::String(_)) => {}
                    _ => return Err(self.expected("a string after COMMENT")),
                }
            } else {
                break;
            }
        }
        Ok((column, inline_fk))
    }

    fn parse_column_default(&mut self) -> Result<ColumnDefault> {
        if self.consume_keyword("CURRENT_TIMESTAMP") {
            if self.consume_token(&Token::LeftParen) {
                self.expect_token(&Token::RightParen)?;
            }
            return Ok(ColumnDefault::CurrentTimestamp);
        }
        if self.consume_keyword("NULL") {
            return Ok(ColumnDefault::Literal(Value::Null));
        }
        if self.consume_keyword("TRUE") {
            return Ok(ColumnDefault::Literal(Value::Boolean(true)));
        }
        if self.consume_keyword("FALSE") {
            return Ok(ColumnDefault::Literal(Value::Boolean(false)));
        }
        let negative = self.consume_token(&Token::Minus);
        match self.next_token() {
            Some(Token::Number(n)) => {
                let text = if negative { format!("-{n}") } else { n };
                Ok(ColumnDefault::Literal(number_literal(&text)))
            }
            Some(Token::String(s)) if !negative => Ok(ColumnDefault::Literal(Value::Text(s))),
            _ => Err(self.expected("a literal DEFAULT value")),
        }
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        let mut constraint_name = None;
        if self.consume_keyword("CONSTRAINT") {
            // the name is optional even after CONSTRAINT
            if !self.peek_any_keyword(&["PRIMARY", "UNIQUE", "FOREIGN", "CHECK"]) {
                constraint_name = Some(self.parse_identifier()?);
            }
        }

        if self.consume_keywords(&["PRIMARY", "KEY"]) {
            let columns = self.parse_parenthesized_names()?;
            return Ok(TableConstraint::PrimaryKey { columns });
        }
        if self.consume_keyword("UNIQUE") {
            let _ = self.consume_keyword("INDEX") || self.consume_keyword("KEY");
            let name = self.parse_index_name()?.or(constraint_name);
            let columns = self.parse_parenthesized_names()?;
            return Ok(TableConstraint::Unique { name, columns });
        }
        if self.consume_keyword("FULLTEXT") {
            let _ = self.consume_keyword("INDEX") || self.consume_keyword("KEY");
            let name = self.parse_index_name()?;
            let columns = self.parse_parenthesized_names()?;
            return Ok(TableConstraint::Fulltext { name, columns });
        }
        if self.consume_keyword("INDEX") || self.consume_keyword("KEY") {
            let name = self.parse_index_name()?;
            let columns = self.parse_parenthesized_names()?;
            return Ok(TableConstraint::Index { name, columns });
        }
        if self.consume_keywords(&["FOREIGN", "KEY"]) {
            let name = self.parse_index_name()?.or(constraint_name);
            let columns = self.parse_parenthesized_names()?;
            self.expect_keyword("REFERENCES")?;
            let ref_table = self.parse_object_name()?;
            let ref_columns = self.parse_parenthesized_names()?;
            let (on_delete, on_update) = self.parse_referential_actions()?;
            return Ok(TableConstraint::ForeignKey {
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            });
        }
        if self.consume_keyword("CHECK") {
            self.expect_token(&Token::LeftParen)?;
            self.parse_expr()?;
            self.expect_token(&Token::RightParen)?;
            return Ok(TableConstraint::Check);
        }
        Err(self.expected("a table constraint"))
    }

    fn parse_index_name(&mut self) -> Result<Option<String>> {
        match self.peek() {
            Some(Token::Word(w)) if !super::is_reserved(w) => {
                let w = w.clone();
                self.next_token();
                Ok(Some(w))
            }
            Some(Token::QuotedIdent(w)) => {
                let w = w.clone();
                self.next_token();
                Ok(Some(w))
            }
            _ => Ok(None),
        }
    }

    // [ON DELETE action] [ON UPDATE action], in either order
    fn parse_referential_actions(
        &mut self,
    ) -> Result<(Option<ReferentialAction>, Option<ReferentialAction>)> {
        let mut on_delete = None;
        let mut on_update = None;
        loop {
            if self.consume_keywords(&["ON", "DELETE"]) {
                on_delete = Some(self.parse_referential_action()?);
            } else if self.consume_keywords(&["ON", "UPDATE"]) {
                on_update = Some(self.parse_referential_action()?);
            } else {
                break;
            }
        }
        Ok((on_delete, on_update))
    }

    fn parse_referential_action(&mut self) -> Result<ReferentialAction> {
        if self.consume_keyword("CASCADE") {
            Ok(ReferentialAction::Cascade)
        } else if self.consume_keyword("RESTRICT") {
            Ok(ReferentialAction::Restrict)
        } else if self.consume_keywords(&["NO", "ACTION"]) {
            Ok(ReferentialAction::Restrict)
        } else if self.consume_keywords(&["SET", "NULL"]) {
            Ok(ReferentialAction::SetNull)
        } else if self.consume_keywords(&["SET", "DEFAULT"]) {
            Ok(ReferentialAction::SetDefault)
        } else {
            Err(self.expected("CASCADE, RESTRICT, NO ACTION, SET NULL or SET DEFAULT"))
        }
    }

    fn parse_create_index(&mut self, unique: bool, fulltext: bool) -> Result<Statement> {
        let name = self.parse_identifier()?;
        self.expect_keyword("ON")?;
        let table = self.parse_object_name()?;
        let columns = self.parse_parenthesized_names()?;
        Ok(Statement::CreateIndex(CreateIndex {
            name,
            table,
            columns,
            unique,
            fulltext,
        }))
    }

    pub(crate) fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword("DROP")?;
        if self.consume_keyword("TABLE") {
            let if_exists = self.consume_keywords(&["IF", "EXISTS"]);
            let names = self.parse_comma_separated(Self::parse_object_name)?;
            return Ok(Statement::DropTable { names, if_exists });
        }
        if self.consume_keyword("INDEX") {
            let name = self.parse_identifier()?;
            self.expect_keyword("ON")?;
            let table = self.parse_object_name()?;
            return Ok(Statement::DropIndex { name, table });
        }
        Err(self.expected("TABLE or INDEX after DROP"))
    }

    pub(crate) fn parse_truncate(&mut self) -> Result<Statement> {
        self.expect_keyword("TRUNCATE")?;
        self.consume_keyword("TABLE");
        let name = self.parse_object_name()?;
        Ok(Statement::TruncateTable { name })
    }

    /// Parses a column data type.
    pub(crate) fn parse_data_type(&mut self) -> Result<DataType> {
        let name = self.parse_identifier()?.to_uppercase();
        let data_type = match name.as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" => {
                // display width like INT(11) is parsed and ignored
                if self.consume_token(&Token::LeftParen) {
                    self.parse_u64()?;
                    self.expect_token(&Token::RightParen)?;
                }
                DataType::Integer
            }
            "FLOAT" | "DOUBLE" | "REAL" => {
                if self.consume_token(&Token::LeftParen) {
                    self.parse_u64()?;
                    if self.consume_token(&Token::Comma) {
                        self.parse_u64()?;
                    }
                    self.expect_token(&Token::RightParen)?;
                }
                DataType::Float
            }
            "DECIMAL" | "NUMERIC" | "DEC" => {
                let mut precision = 10;
                let mut scale = 0;
                if self.consume_token(&Token::LeftParen) {
                    precision = u32::try_from(self.parse_u64()?)
                        .map_err(|_| self.error("decimal precision out of range"))?;
                    if self.consume_token(&Token::Comma) {
                        scale = u32::try_from(self.parse_u64()?)
                            .map_err(|_| self.error("decimal scale out of range"))?;
                    }
                    self.expect_token(&Token::RightParen)?;
                }
                DataType::Decimal { precision, scale }
            }
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "VARCHAR" | "CHAR" => {
                let mut length = 255;
                if self.consume_token(&Token::LeftParen) {
                    length = u32::try_from(self.parse_u64()?)
                        .map_err(|_| self.error("varchar length out of range"))?;
                    self.expect_token(&Token::RightParen)?;
                }
                DataType::Varchar { length }
            }
            "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => DataType::Text,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "DATETIME" => DataType::DateTime,
            "TIMESTAMP" => DataType::Timestamp,
            "YEAR" => DataType::Year,
            "ENUM" => DataType::Enum {
                members: self.parse_member_list()?,
            },
            "SET" => DataType::Set {
                members: self.parse_member_list()?,
            },
            other => return Err(self.error(format!("unsupported data type '{other}'"))),
        };
        // storage attributes are parsed and ignored
        while self.consume_keyword("UNSIGNED")
            || self.consume_keyword("SIGNED")
            || self.consume_keyword("ZEROFILL")
        {}
        Ok(data_type)
    }

    /// Parses the type argument of CAST/CONVERT, which also allows the
    /// SIGNED/UNSIGNED spellings.
    pub(crate) fn parse_cast_type(&mut self) -> Result<DataType> {
        if self.consume_keyword("SIGNED") || self.consume_keyword("UNSIGNED") {
            self.consume_keyword("INTEGER");
            return Ok(DataType::Integer);
        }
        if self.peek_keyword("CHAR") && self.peek_at(1) != Some(&Token::LeftParen) {
            self.next_token();
            return Ok(DataType::Text);
        }
        self.parse_data_type()
    }

    fn parse_member_list(&mut self) -> Result<Vec<String>> {
        self.expect_token(&Token::LeftParen)?;
        let members = self.parse_comma_separated(|p| match p.next_token() {
            Some(Token::String(s)) => Ok(s),
            _ => Err(p.expected("a quoted member")),
        })?;
        self.expect_token(&Token::RightParen)?;
        Ok(members)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    fn create_table(sql: &str) -> CreateTable {
        match parse_statement(sql).unwrap() {
            Statement::CreateTable(ct) => ct,
            other => panic!("expected CREATE TABLE, got {other:?}"),
        }
    }

    #[test]
    fn full_column_options() {
        let ct = create_table(
            "CREATE TABLE users (
                id INT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(190) UNIQUE NOT NULL,
                age INT DEFAULT 0,
                bio TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        );
        assert_eq!(ct.name, "users");
        assert_eq!(ct.columns.len(), 6);
        let id = &ct.columns[0];
        assert!(id.primary_key && id.auto_increment);
        let email = &ct.columns[1];
        assert!(email.unique);
        assert_eq!(email.nullable, Some(false));
        assert_eq!(email.data_type, DataType::Varchar { length: 190 });
        assert_eq!(
            ct.columns[2].default,
            Some(ColumnDefault::Literal(Value::Integer(0)))
        );
        assert_eq!(
            ct.columns[4].default,
            Some(ColumnDefault::CurrentTimestamp)
        );
        assert!(ct.columns[5].on_update_current_timestamp);
    }

    #[test]
    fn enum_and_set_types() {
        let ct = create_table(
            "CREATE TABLE t (status ENUM('active','inactive'), tags SET('a','b','c'))",
        );
        assert_eq!(
            ct.columns[0].data_type,
            DataType::Enum {
                members: vec!["active".to_string(), "inactive".to_string()]
            }
        );
        assert_eq!(
            ct.columns[1].data_type,
            DataType::Set {
                members: vec!["a".to_string(), "b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn foreign_key_constraint() {
        let ct = create_table(
            "CREATE TABLE prod (
                id INT PRIMARY KEY,
                cat_id INT,
                FOREIGN KEY (cat_id) REFERENCES cat(id) ON DELETE CASCADE ON UPDATE SET NULL
            )",
        );
        let fk = ct
            .constraints
            .iter()
            .find_map(|c| match c {
                TableConstraint::ForeignKey {
                    columns,
                    ref_table,
                    ref_columns,
                    on_delete,
                    on_update,
                    ..
                } => Some((columns, ref_table, ref_columns, on_delete, on_update)),
                _ => None,
            })
            .expect("foreign key constraint must be parsed");
        assert_eq!(fk.0, &vec!["cat_id".to_string()]);
        assert_eq!(fk.1, "cat");
        assert_eq!(fk.2, &vec!["id".to_string()]);
        assert_eq!(*fk.3, Some(ReferentialAction::Cascade));
        assert_eq!(*fk.4, Some(ReferentialAction::SetNull));
    }

    #[test]
    fn inline_references_becomes_constraint() {
        let ct = create_table(
            "CREATE TABLE orders (user_id INT REFERENCES users(id) ON DELETE RESTRICT)",
        );
        assert!(matches!(
            ct.constraints[0],
            TableConstraint::ForeignKey { .. }
        ));
    }

    #[test]
    fn table_level_keys() {
        let ct = create_table(
            "CREATE TABLE t (
                a INT, b INT, c TEXT,
                PRIMARY KEY (a),
                UNIQUE KEY uk_b (b),
                INDEX idx_ab (a, b),
                FULLTEXT INDEX ft_c (c),
                CHECK (a > 0)
            )",
        );
        assert_eq!(ct.constraints.len(), 5);
        assert!(matches!(ct.constraints[0], TableConstraint::PrimaryKey { .. }));
        assert!(matches!(ct.constraints[4], TableConstraint::Check));
    }

    #[test]
    fn drop_and_truncate() {
        assert_eq!(
            parse_statement("DROP TABLE IF EXISTS a, b").unwrap(),
            Statement::DropTable {
                names: vec!["a".to_string(), "b".to_string()],
                if_exists: true
            }
        );
        assert_eq!(
            parse_statement("DROP INDEX idx ON t").unwrap(),
            Statement::DropIndex {
                name: "idx".to_string(),
                table: "t".to_string()
            }
        );
        assert_eq!(
            parse_statement("TRUNCATE TABLE t").unwrap(),
            Statement::TruncateTable {
                name: "t".to_string()
            }
        );
    }

    #[test]
    fn create_index_variants() {
        assert_eq!(
            parse_statement("CREATE INDEX idx_name ON users(name)").unwrap(),
            Statement::CreateIndex(CreateIndex {
                name: "idx_name".to_string(),
                table: "users".to_string(),
                columns: vec!["name".to_string()],
                unique: false,
                fulltext: false,
            })
        );
        assert_eq!(
            parse_statement("CREATE FULLTEXT INDEX ft ON docs(body)").unwrap(),
            Statement::CreateIndex(CreateIndex {
                name: "ft".to_string(),
                table: "docs".to_string(),
                columns: vec!["body".to_string()],
                unique: false,
                fulltext: true,
            })
        );
    }
}
