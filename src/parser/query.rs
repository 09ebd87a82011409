//! SELECT parsing: projection, FROM with joins, grouping, UNION arms and
//! the trailing ORDER BY / LIMIT.

use crate::ast::{
    Join, JoinKind, Limit, OrderByExpr, Query, Select, SelectItem, TableFactor, TableRef, UnionArm,
};
use crate::error::Result;
use crate::lexer::Token;
use crate::parser::Parser;

impl Parser {
    /// Parses a query: the first SELECT, UNION arms, ORDER BY and LIMIT.
    pub(crate) fn parse_query(&mut self) -> Result<Query> {
        let body = self.parse_select_block()?;
        let mut unions = Vec::new();
        while self.consume_keyword("UNION") {
            let all = self.consume_keyword("ALL");
            if !all {
                self.consume_keyword("DISTINCT");
            }
            unions.push(UnionArm {
                all,
                select: self.parse_select_block()?,
            });
        }
        let order_by = if self.consume_keywords(&["ORDER", "BY"]) {
            self.parse_comma_separated(Self::parse_order_by_expr)?
        } else {
            Vec::new()
        };
        let limit = self.parse_limit()?;
        Ok(Query {
            body,
            unions,
            order_by,
            limit,
        })
    }

    fn parse_select_block(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;
        let distinct = self.consume_keyword("DISTINCT");
        if !distinct {
            self.consume_keyword("ALL");
        }
        let projection = self.parse_comma_separated(Self::parse_select_item)?;
        let from = if self.consume_keyword("FROM") {
            self.parse_comma_separated(Self::parse_table_ref)?
        } else {
            Vec::new()
        };
        let selection = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let group_by = if self.consume_keywords(&["GROUP", "BY"]) {
            self.parse_comma_separated(Self::parse_expr)?
        } else {
            Vec::new()
        };
        let having = if self.consume_keyword("HAVING") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            having,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.consume_token(&Token::Asterisk) {
            return Ok(SelectItem::Wildcard);
        }
        // alias.* needs two tokens of lookahead
        if let (Some(Token::Word(alias)), Some(Token::Period), Some(Token::Asterisk)) =
            (self.peek(), self.peek_at(1), self.peek_at(2))
        {
            let alias = alias.clone();
            self.next_token();
            self.next_token();
            self.next_token();
            return Ok(SelectItem::QualifiedWildcard(alias));
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let factor = self.parse_table_factor()?;
        let mut joins = Vec::new();
        loop {
            let kind = if self.consume_keywords(&["INNER", "JOIN"]) || self.consume_keyword("JOIN")
            {
                JoinKind::Inner
            } else if self.consume_keyword("LEFT") {
                self.consume_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinKind::Left
            } else if self.consume_keyword("RIGHT") {
                self.consume_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinKind::Right
            } else if self.consume_keywords(&["CROSS", "JOIN"]) {
                JoinKind::Cross
            } else {
                break;
            };
            let factor = self.parse_table_factor()?;
            let on = if self.consume_keyword("ON") {
                Some(self.parse_expr()?)
            } else if kind == JoinKind::Cross {
                None
            } else {
                return Err(self.expected("ON after JOIN"));
            };
            joins.push(Join { kind, factor, on });
        }
        Ok(TableRef { factor, joins })
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor> {
        if self.consume_token(&Token::LeftParen) {
            let query = Box::new(self.parse_query()?);
            self.expect_token(&Token::RightParen)?;
            self.consume_keyword("AS");
            let alias = self.parse_identifier().map_err(|_| {
                self.error("derived table requires an alias")
            })?;
            return Ok(TableFactor::Derived { query, alias });
        }
        let name = self.parse_object_name()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableFactor::Table { name, alias })
    }

    fn parse_order_by_expr(&mut self) -> Result<OrderByExpr> {
        let expr = self.parse_expr()?;
        let asc = if self.consume_keyword("DESC") {
            false
        } else {
            self.consume_keyword("ASC");
            true
        };
        Ok(OrderByExpr { expr, asc })
    }

    // LIMIT n | LIMIT offset, n | LIMIT n OFFSET offset
    fn parse_limit(&mut self) -> Result<Option<Limit>> {
        if !self.consume_keyword("LIMIT") {
            return Ok(None);
        }
        let first = self.parse_u64()?;
        if self.consume_token(&Token::Comma) {
            let count = self.parse_u64()?;
            return Ok(Some(Limit {
                offset: first,
                count,
            }));
        }
        if self.consume_keyword("OFFSET") {
            let offset = self.parse_u64()?;
            return Ok(Some(Limit {
                offset,
                count: first,
            }));
        }
        Ok(Some(Limit {
            offset: 0,
            count: first,
        }))
    }
}
