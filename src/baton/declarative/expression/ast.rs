// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for `=`-prefixed expressions

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    /// Dotted variable path such as `Local.count` or `turn.items.0`
    Variable(String),
    /// Function call: `Name(args...)`
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `Not` / `!`
    Not,
    /// `-`
    Negate,
}

/// Binary operators, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
    /// `&` string concatenation
    Concat,
    Add,
    Sub,
    Mul,
    Div,
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Or => write!(f, "Or"),
            BinaryOp::And => write!(f, "And"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Lte => write!(f, "<="),
            BinaryOp::Gte => write!(f, ">="),
            BinaryOp::Concat => write!(f, "&"),
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_display() {
        assert_eq!(format!("{}", BinaryOp::NotEq), "<>");
        assert_eq!(format!("{}", BinaryOp::Concat), "&");
        assert_eq!(format!("{}", BinaryOp::And), "And");
    }

    #[test]
    fn test_constructors_box_operands() {
        let expr = Expr::binary(BinaryOp::Add, Expr::Number(1.0), Expr::Number(2.0));
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Number(2.0)),
            }
        );
    }
}
