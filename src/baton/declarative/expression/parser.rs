// SPDX-License-Identifier: MIT

//! Recursive-descent parser.
//!
//! Precedence, lowest first:
//! `Or`/`||`, `And`/`&&`, prefix `Not`/`!`, comparisons
//! (`= <> < > <= >=`), `&`, `+ -`, `* /`, unary `-`, primary.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};
use crate::adk::error::ExpressionError;

/// Parse an expression body (without the leading `=`)
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.chars().count(),
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(ExpressionError::parse(
            extra.position,
            format!("unexpected {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    len: usize,
}

/// `And` or all-lowercase `and`
fn is_keyword(token: &Token, keyword: &str) -> bool {
    match token {
        Token::Ident(name) => {
            name == keyword
                || (name.eq_ignore_ascii_case(keyword)
                    && name.chars().all(|c| c.is_ascii_lowercase()))
        }
        _ => false,
    }
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.peek_spanned().map(|s| s.position).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            other => Err(ExpressionError::parse(
                self.position(),
                format!("expected {:?}, found {:?}", expected, other),
            )),
        }
    }

    /// A keyword operator, unless it is immediately called as a function
    fn at_keyword_operator(&self, keyword: &str) -> bool {
        self.peek().map(|t| is_keyword(t, keyword)).unwrap_or(false)
            && self.peek_at(1) != Some(&Token::LParen)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) || self.at_keyword_operator("Or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::AndAnd) || self.at_keyword_operator("And") {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Bang) || self.at_keyword_operator("Not") {
            self.pos += 1;
            let operand = self.parse_not()?;
            return Ok(Expr::unary(UnaryOp::Not, operand));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Lte) => BinaryOp::Lte,
                Some(Token::Gte) => BinaryOp::Gte,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_concat()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_concat(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        while self.peek() == Some(&Token::Amp) {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::binary(BinaryOp::Concat, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::unary(UnaryOp::Negate, operand));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::String(s)) => Ok(Expr::String(s)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    return Ok(Expr::Call { name, args });
                }
                match name.as_str() {
                    "true" | "True" => Ok(Expr::Bool(true)),
                    "false" | "False" => Ok(Expr::Bool(false)),
                    _ => Ok(Expr::Variable(name)),
                }
            }
            Some(other) => Err(ExpressionError::parse(
                position,
                format!("unexpected {:?}", other),
            )),
            None => Err(ExpressionError::parse(position, "unexpected end of input")),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one
    fn parse_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => {
                    return Err(ExpressionError::parse(
                        self.position(),
                        "expected ',' or ')' in argument list",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Variable(name.into())
    }

    #[test]
    fn test_arithmetic_binds_tighter_than_comparison() {
        let expr = parse("a + b * 2 > 10").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Gt,
                Expr::binary(
                    BinaryOp::Add,
                    var("a"),
                    Expr::binary(BinaryOp::Mul, var("b"), Expr::Number(2.0))
                ),
                Expr::Number(10.0)
            )
        );
    }

    #[test]
    fn test_comparison_binds_tighter_than_boolean() {
        let expr = parse("x = 1 Or y <> 2 And !z").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Or,
                Expr::binary(BinaryOp::Eq, var("x"), Expr::Number(1.0)),
                Expr::binary(
                    BinaryOp::And,
                    Expr::binary(BinaryOp::NotEq, var("y"), Expr::Number(2.0)),
                    Expr::unary(UnaryOp::Not, var("z"))
                )
            )
        );
    }

    #[test]
    fn test_keyword_followed_by_paren_is_a_call() {
        let expr = parse("And(a, b)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "And".into(),
                args: vec![var("a"), var("b")],
            }
        );
        assert_eq!(
            parse("Not x").unwrap(),
            Expr::unary(UnaryOp::Not, var("x"))
        );
    }

    #[test]
    fn test_concat_between_comparison_and_additive() {
        let expr = parse(r#""n=" & 1 + 2"#).unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Concat,
                Expr::String("n=".into()),
                Expr::binary(BinaryOp::Add, Expr::Number(1.0), Expr::Number(2.0))
            )
        );
    }

    #[test]
    fn test_unary_minus_and_literals() {
        assert_eq!(
            parse("-x * 2").unwrap(),
            Expr::binary(
                BinaryOp::Mul,
                Expr::unary(UnaryOp::Negate, var("x")),
                Expr::Number(2.0)
            )
        );
        assert_eq!(parse("true").unwrap(), Expr::Bool(true));
        assert_eq!(
            parse("Blank()").unwrap(),
            Expr::Call {
                name: "Blank".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_syntax_errors_report_position() {
        assert!(matches!(
            parse("1 +"),
            Err(ExpressionError::Parse { position: 3, .. })
        ));
        assert!(matches!(
            parse("(1 + 2"),
            Err(ExpressionError::Parse { .. })
        ));
        assert!(matches!(
            parse("1 2"),
            Err(ExpressionError::Parse { position: 2, .. })
        ));
    }
}
