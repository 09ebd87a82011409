//! Expression parsing: precedence climbing over prefix and infix forms.

use rust_decimal::Decimal;

use crate::ast::{BinaryOp, Expr, FunctionArg, FunctionCall, UnaryOp};
use crate::error::Result;
use crate::lexer::Token;
use crate::parser::Parser;
use crate::value::Value;

const OR_PREC: u8 = 5;
const AND_PREC: u8 = 10;
const UNARY_NOT_PREC: u8 = 15;
const IS_PREC: u8 = 17;
const BETWEEN_PREC: u8 = 20;
const PLUS_MINUS_PREC: u8 = 30;
const MUL_DIV_PREC: u8 = 40;
const UNARY_MINUS_PREC: u8 = 50;

impl Parser {
    /// Parses a full expression.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_subexpr(0)
    }

    /// Parses until the next operator binds no tighter than `precedence`.
    pub(crate) fn parse_subexpr(&mut self, precedence: u8) -> Result<Expr> {
        let mut expr = self.parse_prefix()?;
        loop {
            let next_precedence = self.next_precedence();
            if precedence >= next_precedence {
                break;
            }
            expr = self.parse_infix(expr, next_precedence)?;
        }
        Ok(expr)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.expected("an expression"));
        };
        match token {
            Token::Number(text) => {
                self.next_token();
                Ok(Expr::Literal(number_literal(&text)))
            }
            Token::String(s) => {
                self.next_token();
                Ok(Expr::Literal(Value::Text(s)))
            }
            Token::Minus => {
                self.next_token();
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.parse_subexpr(UNARY_MINUS_PREC)?),
                })
            }
            Token::Plus => {
                self.next_token();
                self.parse_subexpr(UNARY_MINUS_PREC)
            }
            Token::LeftParen => {
                self.next_token();
                let expr = if self.peek_keyword("SELECT") {
                    Expr::Subquery(Box::new(self.parse_query()?))
                } else {
                    self.parse_expr()?
                };
                self.expect_token(&Token::RightParen)?;
                Ok(expr)
            }
            Token::Word(word) => self.parse_word_prefix(&word),
            Token::QuotedIdent(_) => self.parse_column_ref(),
            other => Err(self.error(format!("expected an expression, found '{other}'"))),
        }
    }

    fn parse_word_prefix(&mut self, word: &str) -> Result<Expr> {
        match word.to_uppercase().as_str() {
            "NULL" => {
                self.next_token();
                Ok(Expr::Literal(Value::Null))
            }
            "TRUE" => {
                self.next_token();
                Ok(Expr::Literal(Value::Boolean(true)))
            }
            "FALSE" => {
                self.next_token();
                Ok(Expr::Literal(Value::Boolean(false)))
            }
            "NOT" => {
                self.next_token();
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Not,
                    expr: Box::new(self.parse_subexpr(UNARY_NOT_PREC)?),
                })
            }
            "CASE" => self.parse_case(),
            "CAST" => self.parse_cast(),
            "CONVERT" => self.parse_convert(),
            "EXISTS" => {
                self.next_token();
                self.expect_token(&Token::LeftParen)?;
                let query = Box::new(self.parse_query()?);
                self.expect_token(&Token::RightParen)?;
                Ok(Expr::Exists {
                    query,
                    negated: false,
                })
            }
            // DATE '2024-01-01' style typed literals
            "DATE" | "TIME" | "TIMESTAMP" if matches!(self.peek_at(1), Some(Token::String(_))) => {
                self.parse_typed_literal(word)
            }
            "CURRENT_TIMESTAMP" | "CURRENT_DATE"
                if self.peek_at(1) != Some(&Token::LeftParen) =>
            {
                let name = if word.eq_ignore_ascii_case("CURRENT_DATE") {
                    "CURDATE"
                } else {
                    "NOW"
                };
                self.next_token();
                Ok(Expr::Function(FunctionCall {
                    name: name.to_string(),
                    args: Vec::new(),
                    distinct: false,
                }))
            }
            "VALUES" if self.peek_at(1) == Some(&Token::LeftParen) => {
                self.next_token();
                self.next_token();
                let column = self.parse_identifier()?;
                self.expect_token(&Token::RightParen)?;
                Ok(Expr::InsertValues { column })
            }
            _ if self.peek_at(1) == Some(&Token::LeftParen) => self.parse_function_call(),
            _ => self.parse_column_ref(),
        }
    }

    fn parse_typed_literal(&mut self, kind: &str) -> Result<Expr> {
        self.next_token();
        let Some(Token::String(text)) = self.next_token() else {
            return Err(self.expected("a string literal"));
        };
        let column = kind.to_lowercase();
        let target = match kind.to_uppercase().as_str() {
            "DATE" => crate::value::DataType::Date,
            "TIME" => crate::value::DataType::Time,
            _ => crate::value::DataType::DateTime,
        };
        let value = crate::value::coerce(&Value::Text(text), &target, &column)?;
        Ok(Expr::Literal(value))
    }

    fn parse_column_ref(&mut self) -> Result<Expr> {
        let first = self.parse_identifier()?;
        if self.consume_token(&Token::Period) {
            let name = self.parse_identifier()?;
            Ok(Expr::Column {
                table: Some(first),
                name,
            })
        } else {
            Ok(Expr::Column {
                table: None,
                name: first,
            })
        }
    }

    fn parse_function_call(&mut self) -> Result<Expr> {
        let name = self.parse_identifier()?.to_uppercase();
        self.expect_token(&Token::LeftParen)?;
        let mut distinct = false;
        let mut args = Vec::new();
        if !self.consume_token(&Token::RightParen) {
            if self.consume_keyword("DISTINCT") {
                distinct = true;
            }
            if self.consume_token(&Token::Asterisk) {
                args.push(FunctionArg::Star);
            } else {
                for arg in self.parse_comma_separated(Parser::parse_expr)? {
                    args.push(FunctionArg::Expr(arg));
                }
            }
            self.expect_token(&Token::RightParen)?;
        }
        Ok(Expr::Function(FunctionCall {
            name,
            args,
            distinct,
        }))
    }

    fn parse_case(&mut self) -> Result<Expr> {
        self.expect_keyword("CASE")?;
        let operand = if self.peek_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut branches = Vec::new();
        while self.consume_keyword("WHEN") {
            let when = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let then = self.parse_expr()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return Err(self.expected("WHEN"));
        }
        let else_result = if self.consume_keyword("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case {
            operand,
            branches,
            else_result,
        })
    }

    fn parse_cast(&mut self) -> Result<Expr> {
        self.expect_keyword("CAST")?;
        self.expect_token(&Token::LeftParen)?;
        let expr = Box::new(self.parse_expr()?);
        self.expect_keyword("AS")?;
        let data_type = self.parse_cast_type()?;
        self.expect_token(&Token::RightParen)?;
        Ok(Expr::Cast { expr, data_type })
    }

    fn parse_convert(&mut self) -> Result<Expr> {
        self.expect_keyword("CONVERT")?;
        self.expect_token(&Token::LeftParen)?;
        let expr = Box::new(self.parse_expr()?);
        self.expect_token(&Token::Comma)?;
        let data_type = self.parse_cast_type()?;
        self.expect_token(&Token::RightParen)?;
        Ok(Expr::Cast { expr, data_type })
    }

    fn next_precedence(&self) -> u8 {
        let Some(token) = self.peek() else { return 0 };
        match token {
            Token::Word(w) => match w.to_uppercase().as_str() {
                "OR" => OR_PREC,
                "AND" => AND_PREC,
                "IS" => IS_PREC,
                "IN" | "BETWEEN" | "LIKE" => BETWEEN_PREC,
                "MOD" => MUL_DIV_PREC,
                "NOT" => match self.peek_at(1) {
                    Some(t)
                        if t.is_keyword("IN") || t.is_keyword("BETWEEN") || t.is_keyword("LIKE") =>
                    {
                        BETWEEN_PREC
                    }
                    _ => 0,
                },
                _ => 0,
            },
            Token::Eq | Token::NotEq | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq => {
                BETWEEN_PREC
            }
            Token::Plus | Token::Minus => PLUS_MINUS_PREC,
            Token::Asterisk | Token::Slash | Token::Percent => MUL_DIV_PREC,
            _ => 0,
        }
    }

    fn parse_infix(&mut self, expr: Expr, precedence: u8) -> Result<Expr> {
        let Some(token) = self.next_token() else {
            return Err(self.expected("an operator"));
        };
        let simple = match &token {
            Token::Plus => Some(BinaryOp::Plus),
            Token::Minus => Some(BinaryOp::Minus),
            Token::Asterisk => Some(BinaryOp::Multiply),
            Token::Slash => Some(BinaryOp::Divide),
            Token::Percent => Some(BinaryOp::Modulo),
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            Token::Word(w) => match w.to_uppercase().as_str() {
                "AND" => Some(BinaryOp::And),
                "OR" => Some(BinaryOp::Or),
                "MOD" => Some(BinaryOp::Modulo),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = simple {
            let right = self.parse_subexpr(precedence)?;
            return Ok(Expr::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        let Token::Word(word) = &token else {
            return Err(self.error(format!("no infix parser for '{token}'")));
        };
        match word.to_uppercase().as_str() {
            "IS" => {
                let negated = self.consume_keyword("NOT");
                if self.consume_keyword("NULL") {
                    Ok(Expr::IsNull {
                        expr: Box::new(expr),
                        negated,
                    })
                } else if self.consume_keyword("TRUE") {
                    Ok(Expr::IsBool {
                        expr: Box::new(expr),
                        negated,
                        value: true,
                    })
                } else if self.consume_keyword("FALSE") {
                    Ok(Expr::IsBool {
                        expr: Box::new(expr),
                        negated,
                        value: false,
                    })
                } else {
                    Err(self.expected("NULL, TRUE or FALSE after IS"))
                }
            }
            "NOT" => {
                if self.consume_keyword("IN") {
                    self.parse_in(expr, true)
                } else if self.consume_keyword("BETWEEN") {
                    self.parse_between(expr, true)
                } else if self.consume_keyword("LIKE") {
                    self.parse_like(expr, true)
                } else {
                    Err(self.expected("IN, BETWEEN or LIKE after NOT"))
                }
            }
            "IN" => self.parse_in(expr, false),
            "BETWEEN" => self.parse_between(expr, false),
            "LIKE" => self.parse_like(expr, false),
            other => Err(self.error(format!("no infix parser for '{other}'"))),
        }
    }

    // the `[NOT] IN` keywords have been consumed
    fn parse_in(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        self.expect_token(&Token::LeftParen)?;
        let parsed = if self.peek_keyword("SELECT") {
            Expr::InSubquery {
                expr: Box::new(expr),
                query: Box::new(self.parse_query()?),
                negated,
            }
        } else {
            Expr::InList {
                expr: Box::new(expr),
                list: self.parse_comma_separated(Parser::parse_expr)?,
                negated,
            }
        };
        self.expect_token(&Token::RightParen)?;
        Ok(parsed)
    }

    // low/high stop below BETWEEN so the AND separator is not consumed
    fn parse_between(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        let low = self.parse_subexpr(BETWEEN_PREC)?;
        self.expect_keyword("AND")?;
        let high = self.parse_subexpr(BETWEEN_PREC)?;
        Ok(Expr::Between {
            expr: Box::new(expr),
            negated,
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    fn parse_like(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        let pattern = self.parse_subexpr(BETWEEN_PREC)?;
        Ok(Expr::Like {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            negated,
        })
    }
}

pub(crate) fn number_literal(text: &str) -> Value {
    if text.contains(['e', 'E']) {
        text.parse::<f64>().map_or(Value::Null, Value::Float)
    } else if text.contains('.') {
        text.parse::<Decimal>()
            .map(Value::Decimal)
            .or_else(|_| text.parse::<f64>().map(Value::Float))
            .unwrap_or(Value::Null)
    } else {
        text.parse::<i64>().map(Value::Integer).unwrap_or_else(|_| {
            text.parse::<Decimal>()
                .map(Value::Decimal)
                .or_else(|_| text.parse::<f64>().map(Value::Float))
                .unwrap_or(Value::Null)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn expr(sql: &str) -> Expr {
        let mut parser = Parser::new(tokenize(sql).unwrap());
        let parsed = parser.parse_expr().unwrap();
        assert!(parser.peek().is_none(), "expression input not fully consumed");
        parsed
    }

    #[test]
    fn precedence_or_and_comparison() {
        // a = 1 OR b = 2 AND c = 3  =>  (a = 1) OR ((b = 2) AND (c = 3))
        let parsed = expr("a = 1 OR b = 2 AND c = 3");
        let Expr::BinaryOp { op: BinaryOp::Or, right, .. } = parsed else {
            panic!("OR must be the root");
        };
        assert!(matches!(*right, Expr::BinaryOp { op: BinaryOp::And, .. }));
    }

    #[test]
    fn arithmetic_precedence() {
        // 1 + 2 * 3 => 1 + (2 * 3)
        let parsed = expr("1 + 2 * 3");
        let Expr::BinaryOp { op: BinaryOp::Plus, right, .. } = parsed else {
            panic!("+ must be the root");
        };
        assert!(matches!(
            *right,
            Expr::BinaryOp { op: BinaryOp::Multiply, .. }
        ));
    }

    #[test]
    fn number_literal_typing() {
        assert_eq!(expr("42"), Expr::Literal(Value::Integer(42)));
        assert_eq!(
            expr("10.50"),
            Expr::Literal(Value::Decimal("10.50".parse().unwrap()))
        );
        assert_eq!(expr("1e3"), Expr::Literal(Value::Float(1000.0)));
    }

    #[test]
    fn between_and_in() {
        let parsed = expr("x BETWEEN 1 AND 10 AND y IN (1, 2)");
        let Expr::BinaryOp { op: BinaryOp::And, left, right } = parsed else {
            panic!("outer AND must be the root");
        };
        assert!(matches!(*left, Expr::Between { negated: false, .. }));
        assert!(matches!(*right, Expr::InList { negated: false, .. }));
    }

    #[test]
    fn not_variants() {
        assert!(matches!(expr("x NOT IN (1)"), Expr::InList { negated: true, .. }));
        assert!(matches!(
            expr("x NOT LIKE 'a%'"),
            Expr::Like { negated: true, .. }
        ));
        assert!(matches!(
            expr("x IS NOT NULL"),
            Expr::IsNull { negated: true, .. }
        ));
        assert!(matches!(
            expr("NOT x = 1"),
            Expr::UnaryOp { op: UnaryOp::Not, .. }
        ));
    }

    #[test]
    fn function_calls() {
        let parsed = expr("COUNT(*)");
        assert_eq!(
            parsed,
            Expr::Function(FunctionCall {
                name: "COUNT".to_string(),
                args: vec![FunctionArg::Star],
                distinct: false,
            })
        );
        let parsed = expr("COUNT(DISTINCT name)");
        let Expr::Function(call) = parsed else { panic!("must parse as call") };
        assert!(call.distinct);
        // bare CURRENT_TIMESTAMP becomes NOW()
        let parsed = expr("CURRENT_TIMESTAMP");
        assert_eq!(
            parsed,
            Expr::Function(FunctionCall {
                name: "NOW".to_string(),
                args: Vec::new(),
                distinct: false,
            })
        );
    }

    #[test]
    fn case_forms() {
        let searched = expr("CASE WHEN a = 1 THEN 'x' ELSE 'y' END");
        assert!(matches!(searched, Expr::Case { operand: None, .. }));
        let simple = expr("CASE a WHEN 1 THEN 'x' END");
        assert!(matches!(simple, Expr::Case { operand: Some(_), .. }));
    }

    #[test]
    fn cast_and_convert() {
        let parsed = expr("CAST('5' AS SIGNED)");
        assert!(matches!(
            parsed,
            Expr::Cast {
                data_type: crate::value::DataType::Integer,
                ..
            }
        ));
        let parsed = expr("CONVERT(x, CHAR)");
        assert!(matches!(
            parsed,
            Expr::Cast {
                data_type: crate::value::DataType::Text,
                ..
            }
        ));
    }

    #[test]
    fn values_reference() {
        assert_eq!(
            expr("VALUES(qty)"),
            Expr::InsertValues {
                column: "qty".to_string()
            }
        );
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let parsed = expr("-2 * 3");
        assert!(matches!(
            parsed,
            Expr::BinaryOp { op: BinaryOp::Multiply, .. }
        ));
    }
}
