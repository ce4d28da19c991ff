//! Expression AST.
//!
//! Expressions are built with the helper constructors and the arithmetic
//! operator impls, then printed through a [`Dialect`]. `Display` uses the
//! loop-IR dialect handed to the external kernel compiler.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Float(f64),
    Int(i64),
    Var(String),
    Index { array: String, indices: Vec<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { func: Func, arg: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Eq | BinOp::Ne => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
            BinOp::Pow => 7,
        }
    }

    fn is_comparison(self) -> bool {
        self.precedence() == 3
    }

    /// Infix symbol shared by every dialect (logic operators excluded).
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "**",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exp,
    Log,
    Log10,
    Exp10,
    Abs,
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Func::Exp => write!(f, "exp"),
            Func::Log => write!(f, "log"),
            Func::Log10 => write!(f, "log10"),
            Func::Exp10 => write!(f, "exp10"),
            Func::Abs => write!(f, "abs"),
        }
    }
}

// ─── Construction ──────────────────────────────────────────────────

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn float(v: f64) -> Self {
        Expr::Float(v)
    }

    pub fn int(v: i64) -> Self {
        Expr::Int(v)
    }

    pub fn index<I>(array: impl Into<String>, indices: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        Expr::Index {
            array: array.into(),
            indices: indices.into_iter().map(Into::into).collect(),
        }
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn pow(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Pow, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Gt, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Eq, self, rhs.into())
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Ne, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinOp::Or, self, rhs.into())
    }

    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnOp::Not,
            operand: Box::new(self),
        }
    }

    /// Every variable and array name the expression reads.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Float(_) | Expr::Int(_) => {}
            Expr::Var(name) => out.push(name),
            Expr::Index { array, indices } => {
                out.push(array);
                for idx in indices {
                    idx.collect_names(out);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_names(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_names(out);
                rhs.collect_names(out);
            }
            Expr::Call { arg, .. } => arg.collect_names(out),
        }
    }

    /// Apply `f` to every sub-expression, children first.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Expr::Float(_) | Expr::Int(_) | Expr::Var(_) => {}
            Expr::Index { indices, .. } => {
                for idx in indices.iter_mut() {
                    idx.visit_mut(f);
                }
            }
            Expr::Unary { operand, .. } => operand.visit_mut(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_mut(f);
                rhs.visit_mut(f);
            }
            Expr::Call { arg, .. } => arg.visit_mut(f),
        }
        f(self);
    }
}

fn call(func: Func, arg: Expr) -> Expr {
    Expr::Call {
        func,
        arg: Box::new(arg),
    }
}

pub fn exp(arg: impl Into<Expr>) -> Expr {
    call(Func::Exp, arg.into())
}

pub fn log(arg: impl Into<Expr>) -> Expr {
    call(Func::Log, arg.into())
}

pub fn log10(arg: impl Into<Expr>) -> Expr {
    call(Func::Log10, arg.into())
}

pub fn exp10(arg: impl Into<Expr>) -> Expr {
    call(Func::Exp10, arg.into())
}

pub fn abs(arg: impl Into<Expr>) -> Expr {
    call(Func::Abs, arg.into())
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Float(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Int(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Int(v as i64)
    }
}

impl From<usize> for Expr {
    fn from(v: usize) -> Self {
        Expr::Int(v as i64)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::Var(name.to_string())
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

macro_rules! arith_impl {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

arith_impl!(Add, add, BinOp::Add);
arith_impl!(Sub, sub, BinOp::Sub);
arith_impl!(Mul, mul, BinOp::Mul);
arith_impl!(Div, div, BinOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnOp::Neg,
            operand: Box::new(self),
        }
    }
}

// ─── Printing ──────────────────────────────────────────────────────

/// Target-specific spelling of the leaves and operators of an expression.
/// Precedence and parenthesization are shared.
pub trait Dialect {
    fn var(&self, name: &str) -> String {
        name.to_string()
    }

    fn index(&self, array: &str, indices: Vec<String>) -> String {
        format!("{}[{}]", array, indices.join(", "))
    }

    fn func(&self, func: Func, arg: String) -> String {
        format!("{}({})", func, arg)
    }

    /// `Some(name)` prints `Pow` as a call `name(base, exponent)`.
    fn pow_function(&self) -> Option<&'static str> {
        None
    }

    fn logic(&self, op: BinOp) -> &'static str {
        op.symbol()
    }

    fn not(&self) -> &'static str {
        "not "
    }
}

/// The loop-IR dialect: Python-like operators, `**` for powers.
pub struct LoopyDialect;

impl Dialect for LoopyDialect {}

/// Shortest round-trip spelling of a float, always with a `.` or exponent.
pub fn format_float(v: f64) -> String {
    format!("{:?}", v)
}

const UNARY_PRECEDENCE: u8 = 6;

pub fn render(expr: &Expr, dialect: &dyn Dialect) -> String {
    render_prec(expr, dialect, 0)
}

fn wrap(text: String, prec: u8, parent: u8) -> String {
    if prec < parent {
        format!("({})", text)
    } else {
        text
    }
}

fn render_prec(expr: &Expr, d: &dyn Dialect, parent: u8) -> String {
    match expr {
        Expr::Float(v) => {
            let text = format_float(*v);
            if *v < 0.0 {
                wrap(text, UNARY_PRECEDENCE, parent)
            } else {
                text
            }
        }
        Expr::Int(v) => {
            let text = v.to_string();
            if *v < 0 {
                wrap(text, UNARY_PRECEDENCE, parent)
            } else {
                text
            }
        }
        Expr::Var(name) => d.var(name),
        Expr::Index { array, indices } => {
            let rendered = indices.iter().map(|i| render_prec(i, d, 0)).collect();
            d.index(array, rendered)
        }
        Expr::Unary { op, operand } => {
            let inner = render_prec(operand, d, UNARY_PRECEDENCE + 1);
            let text = match op {
                UnOp::Neg => format!("-{}", inner),
                UnOp::Not => format!("{}{}", d.not(), inner),
            };
            wrap(text, UNARY_PRECEDENCE, parent)
        }
        Expr::Binary { op, lhs, rhs } => {
            if *op == BinOp::Pow {
                if let Some(name) = d.pow_function() {
                    return format!(
                        "{}({}, {})",
                        name,
                        render_prec(lhs, d, 0),
                        render_prec(rhs, d, 0)
                    );
                }
            }
            let prec = op.precedence();
            let (lp, rp) = match op {
                BinOp::Pow => (prec + 1, prec),
                _ if op.is_comparison() => (prec + 1, prec + 1),
                _ => (prec, prec + 1),
            };
            let symbol = match op {
                BinOp::And | BinOp::Or => d.logic(*op),
                _ => op.symbol(),
            };
            let text = format!(
                "{} {} {}",
                render_prec(lhs, d, lp),
                symbol,
                render_prec(rhs, d, rp)
            );
            wrap(text, prec, parent)
        }
        Expr::Call { func, arg } => d.func(*func, render_prec(arg, d, 0)),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render(self, &LoopyDialect))
    }
}
