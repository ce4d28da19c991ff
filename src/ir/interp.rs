//! Reference interpreter for kernel IR.
//!
//! Evaluates instructions sequentially in `f64`, ignoring vectorization
//! and memory layout. Used to check generated rate expressions against
//! closed-form references.

use std::collections::HashMap;

use super::decl::{Bound, LoopDomain};
use super::expr::{BinOp, Expr, Func, UnOp};
use super::stmt::Stmt;
use crate::error::{Error, Result};

/// Dense row-major array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Array {
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn from_data(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self { shape, data }
    }

    fn offset(&self, idx: &[usize]) -> Option<usize> {
        if idx.len() != self.shape.len() {
            return None;
        }
        let mut off = 0;
        for (&i, &dim) in idx.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            off = off * dim + i;
        }
        Some(off)
    }

    pub fn get(&self, idx: &[usize]) -> Option<f64> {
        self.offset(idx).map(|o| self.data[o])
    }
}

fn fault(message: String) -> Error {
    Error::malformed("interpreter", message)
}

#[derive(Debug, Default)]
pub struct Machine {
    params: HashMap<String, i64>,
    scalars: HashMap<String, f64>,
    arrays: HashMap<String, Array>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_param(&mut self, name: &str, value: i64) {
        self.params.insert(name.to_string(), value);
    }

    pub fn param(&self, name: &str) -> Option<i64> {
        self.params.get(name).copied()
    }

    pub fn set_scalar(&mut self, name: &str, value: f64) {
        self.scalars.insert(name.to_string(), value);
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    pub fn set_array(&mut self, name: &str, array: Array) {
        self.arrays.insert(name.to_string(), array);
    }

    pub fn has_array(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn array(&self, name: &str) -> Option<&Array> {
        self.arrays.get(name)
    }

    fn indices(&self, array: &str, indices: &[Expr]) -> Result<Vec<usize>> {
        indices
            .iter()
            .map(|e| {
                let v = self.eval(e)?;
                if v < 0.0 || v.fract() != 0.0 || !v.is_finite() {
                    return Err(fault(format!("index {} of '{}' is not a valid index", v, array)));
                }
                Ok(v as usize)
            })
            .collect()
    }

    pub fn eval(&self, expr: &Expr) -> Result<f64> {
        match expr {
            Expr::Float(v) => Ok(*v),
            Expr::Int(v) => Ok(*v as f64),
            Expr::Var(name) => self
                .scalars
                .get(name)
                .copied()
                .or_else(|| self.params.get(name).map(|&v| v as f64))
                .ok_or_else(|| fault(format!("unbound variable '{}'", name))),
            Expr::Index { array, indices } => {
                let idx = self.indices(array, indices)?;
                let arr = self
                    .arrays
                    .get(array)
                    .ok_or_else(|| fault(format!("unknown array '{}'", array)))?;
                arr.get(&idx)
                    .ok_or_else(|| fault(format!("{}{:?} out of bounds {:?}", array, idx, arr.shape)))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnOp::Neg => -v,
                    UnOp::Not => truth(v == 0.0),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs)?;
                // Short-circuit so guarded reads never go out of bounds.
                match op {
                    BinOp::And if a == 0.0 => return Ok(0.0),
                    BinOp::Or if a != 0.0 => return Ok(1.0),
                    _ => {}
                }
                let b = self.eval(rhs)?;
                Ok(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                    BinOp::Lt => truth(a < b),
                    BinOp::Le => truth(a <= b),
                    BinOp::Gt => truth(a > b),
                    BinOp::Eq => truth(a == b),
                    BinOp::Ne => truth(a != b),
                    BinOp::And | BinOp::Or => truth(b != 0.0),
                })
            }
            Expr::Call { func, arg } => {
                let v = self.eval(arg)?;
                Ok(match func {
                    Func::Exp => v.exp(),
                    Func::Log => v.ln(),
                    Func::Log10 => v.log10(),
                    Func::Exp10 => 10f64.powf(v),
                    Func::Abs => v.abs(),
                })
            }
        }
    }

    fn bound(&self, bound: &Bound) -> Result<i64> {
        match bound {
            Bound::Const(v) => Ok(*v),
            Bound::Param(p) => self
                .params
                .get(p)
                .copied()
                .ok_or_else(|| fault(format!("unbound loop parameter '{}'", p))),
        }
    }

    /// Execute statements; loops take their bounds from `domains`.
    pub fn exec(&mut self, stmts: &[Stmt], domains: &[LoopDomain]) -> Result<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Assign(a) => {
                    let value = self.eval(&a.value)?;
                    match &a.target {
                        Expr::Var(name) => {
                            self.scalars.insert(name.clone(), value);
                        }
                        Expr::Index { array, indices } => {
                            let idx = self.indices(array, indices)?;
                            let arr = self
                                .arrays
                                .get_mut(array)
                                .ok_or_else(|| fault(format!("unknown array '{}'", array)))?;
                            let off = arr.offset(&idx).ok_or_else(|| {
                                fault(format!("{}{:?} out of bounds {:?}", array, idx, arr.shape))
                            })?;
                            arr.data[off] = value;
                        }
                        other => return Err(fault(format!("cannot assign to '{}'", other))),
                    }
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    if self.eval(cond)? != 0.0 {
                        self.exec(then_body, domains)?;
                    } else {
                        self.exec(else_body, domains)?;
                    }
                }
                Stmt::Loop { iname, body } => {
                    let domain = domains
                        .iter()
                        .find(|d| &d.iname == iname)
                        .ok_or_else(|| fault(format!("no domain for loop '{}'", iname)))?;
                    let lo = self.bound(&domain.lower)?;
                    let hi = self.bound(&domain.upper)?;
                    for i in lo..hi {
                        self.scalars.insert(iname.clone(), i as f64);
                        self.exec(body, domains)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
