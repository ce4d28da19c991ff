//! Instructions with dependency tags.
//!
//! Every assignment may carry an id and a list of dependencies. A dependency
//! names either one id or an id prefix (`kf*`), matching every instruction
//! whose id starts with it.

use std::fmt;

use super::decl::DType;
use super::expr::{render, Dialect, Expr};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InsnId(pub String);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dep {
    Id(InsnId),
    Prefix(String),
}

impl Dep {
    /// Parse `"a1"` or `"ind*"`.
    pub fn parse(text: &str) -> Self {
        match text.strip_suffix('*') {
            Some(prefix) => Dep::Prefix(prefix.to_string()),
            None => Dep::Id(InsnId(text.to_string())),
        }
    }

    pub fn matches(&self, id: &InsnId) -> bool {
        match self {
            Dep::Id(want) => want == id,
            Dep::Prefix(prefix) => id.0.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Id(id) => write!(f, "{}", id),
            Dep::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// `target = value`, optionally declaring `target` as a new temporary.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Expr,
    pub value: Expr,
    pub decl: Option<DType>,
    pub id: Option<InsnId>,
    pub deps: Vec<Dep>,
    pub atomic: bool,
}

impl Assign {
    pub fn new(target: impl Into<Expr>, value: impl Into<Expr>) -> Self {
        Self {
            target: target.into(),
            value: value.into(),
            decl: None,
            id: None,
            deps: Vec::new(),
            atomic: false,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(InsnId(id.to_string()));
        self
    }

    /// Add dependencies from a `:`-separated list such as `"a1:ind*"`.
    pub fn after(mut self, deps: &str) -> Self {
        self.deps
            .extend(deps.split(':').filter(|d| !d.is_empty()).map(Dep::parse));
        self
    }

    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    /// Name of the variable or array written.
    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            Expr::Var(name) => Some(name),
            Expr::Index { array, .. } => Some(array),
            _ => None,
        }
    }
}

/// Declare a new `double` temporary.
pub fn temp(name: &str, value: impl Into<Expr>) -> Assign {
    Assign {
        decl: Some(DType::F64),
        ..Assign::new(Expr::var(name), value)
    }
}

/// Declare a new `int` temporary.
pub fn temp_int(name: &str, value: impl Into<Expr>) -> Assign {
    Assign {
        decl: Some(DType::I32),
        ..Assign::new(Expr::var(name), value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(Assign),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Loop {
        iname: String,
        body: Vec<Stmt>,
    },
}

impl From<Assign> for Stmt {
    fn from(a: Assign) -> Self {
        Stmt::Assign(a)
    }
}

impl Stmt {
    pub fn when(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn when_else(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body,
        }
    }

    pub fn for_each(iname: &str, body: Vec<Stmt>) -> Self {
        Stmt::Loop {
            iname: iname.to_string(),
            body,
        }
    }
}

/// Visit every assignment in `stmts`, depth first.
pub fn for_each_assign<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Assign)) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => f(a),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                for_each_assign(then_body, f);
                for_each_assign(else_body, f);
            }
            Stmt::Loop { body, .. } => for_each_assign(body, f),
        }
    }
}

/// Mutable counterpart of [`for_each_assign`].
pub fn for_each_assign_mut(stmts: &mut [Stmt], f: &mut impl FnMut(&mut Assign)) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => f(a),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                for_each_assign_mut(then_body, f);
                for_each_assign_mut(else_body, f);
            }
            Stmt::Loop { body, .. } => for_each_assign_mut(body, f),
        }
    }
}

/// Every expression read by `stmts`: assignment values, target indices,
/// and branch conditions.
pub fn for_each_read<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Expr)) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => {
                f(&a.value);
                if let Expr::Index { indices, .. } = &a.target {
                    for idx in indices {
                        f(idx);
                    }
                }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                f(cond);
                for_each_read(then_body, f);
                for_each_read(else_body, f);
            }
            Stmt::Loop { body, .. } => for_each_read(body, f),
        }
    }
}

/// Apply `f` to every expression in `stmts`, including assignment targets
/// and branch conditions.
pub fn for_each_expr_mut(stmts: &mut [Stmt], f: &mut impl FnMut(&mut Expr)) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => {
                a.target.visit_mut(f);
                a.value.visit_mut(f);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                cond.visit_mut(f);
                for_each_expr_mut(then_body, f);
                for_each_expr_mut(else_body, f);
            }
            Stmt::Loop { body, .. } => for_each_expr_mut(body, f),
        }
    }
}

// ─── Loop-IR text ──────────────────────────────────────────────────

fn options(a: &Assign) -> String {
    let mut opts = Vec::new();
    if let Some(id) = &a.id {
        opts.push(format!("id={}", id));
    }
    if !a.deps.is_empty() {
        let deps: Vec<String> = a.deps.iter().map(|d| d.to_string()).collect();
        opts.push(format!("dep={}", deps.join(":")));
    }
    if a.atomic {
        opts.push("atomic".to_string());
    }
    if opts.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", opts.join(", "))
    }
}

/// Render statements as loop-IR instruction text, one line per entry.
pub fn render_loopy(stmts: &[Stmt], indent: usize, dialect: &dyn Dialect, out: &mut Vec<String>) {
    let pad = "    ".repeat(indent);
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => {
                let decl = match a.decl {
                    Some(DType::F64) => "<> ",
                    Some(DType::I32) => "<int32> ",
                    None => "",
                };
                out.push(format!(
                    "{}{}{} = {}{}",
                    pad,
                    decl,
                    render(&a.target, dialect),
                    render(&a.value, dialect),
                    options(a)
                ));
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                out.push(format!("{}if {}", pad, render(cond, dialect)));
                render_loopy(then_body, indent + 1, dialect, out);
                if !else_body.is_empty() {
                    out.push(format!("{}else", pad));
                    render_loopy(else_body, indent + 1, dialect, out);
                }
                out.push(format!("{}end", pad));
            }
            Stmt::Loop { iname, body } => {
                out.push(format!("{}for {}", pad, iname));
                render_loopy(body, indent + 1, dialect, out);
                out.push(format!("{}end", pad));
            }
        }
    }
}
