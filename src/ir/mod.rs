//! Kernel IR: expressions, tagged instructions, loop domains, and argument
//! declarations.
//!
//! This is the vocabulary handed to the external kernel compiler. Rate
//! builders construct it directly; nothing is assembled from string
//! templates. The loop-IR text form is produced by pretty-printing:
//!
//! ```text
//! <> kf_temp = A[pos] {id=kf0}
//! for k
//!     if k < abs(beta[pos])
//!         kf_temp = kf_temp * T_val {id=kf1, dep=kf0:tval*}
//!     end
//! end
//! ```

pub mod decl;
pub mod expr;
pub mod interp;
pub mod stmt;
#[cfg(test)]
mod tests;

pub use decl::{ArgDecl, Bound, DType, Dim, Initializer, LoopDomain, Scope};
pub use expr::{abs, exp, exp10, log, log10, render, BinOp, Dialect, Expr, Func, LoopyDialect};
pub use interp::{Array, Machine};
pub use stmt::{temp, temp_int, Assign, Dep, InsnId, Stmt};
