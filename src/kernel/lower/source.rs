//! Shared printer for the C-family backends.
//!
//! C and OpenCL differ only in address-space qualifiers, in how the batch
//! and reaction loops map onto hardware, and in a few intrinsic spellings.
//! Arrays are flattened: arguments follow the configured memory layout,
//! temporaries are always row-major.

use crate::compose::{BarrierKind, WrapperDefinition, WrapperStep};
use crate::config::MemoryLayout;
use crate::ir::expr::format_float;
use crate::ir::{
    render, ArgDecl, BinOp, Bound, DType, Dialect, Dim, Expr, Func, Initializer, Scope, Stmt,
};
use crate::kernel::{KernelDefinition, LoopTag, BATCH_INAME, REACTION_INAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flavor {
    C,
    OpenCl,
}

pub(super) fn ctype(dtype: DType) -> &'static str {
    match dtype {
        DType::F64 => "double",
        DType::I32 => "int",
    }
}

fn bound(b: &Bound) -> String {
    b.to_string()
}

/// Parenthesize anything that is not a bare identifier or number.
fn group(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        text.to_string()
    } else {
        format!("({})", text)
    }
}

/// Flat offset of `indices` into an array of `shape`.
pub(super) fn flatten(shape: &[Dim], indices: &[String], column_major: bool) -> String {
    match indices.len() {
        0 => "0".to_string(),
        1 => indices[0].clone(),
        n if column_major => {
            let mut acc = indices[n - 1].clone();
            for k in (0..n - 1).rev() {
                acc = format!("{} + {} * {}", group(&indices[k]), shape[k], group(&acc));
            }
            acc
        }
        n => {
            let mut acc = indices[0].clone();
            for k in 1..n {
                acc = format!("{} * {} + {}", group(&acc), shape[k], group(&indices[k]));
            }
            acc
        }
    }
}

/// Element count of a declaration, as C text.
fn flat_len(decl: &ArgDecl) -> String {
    if decl.shape.iter().all(|d| matches!(d, Dim::Const(_))) {
        let n: usize = decl
            .shape
            .iter()
            .map(|d| match d {
                Dim::Const(v) => *v,
                Dim::Param(_) => 1,
            })
            .product();
        return n.to_string();
    }
    let dims: Vec<String> = decl.shape.iter().map(|d| d.to_string()).collect();
    dims.join(" * ")
}

/// Constant tables live at file scope, so their names carry the kernel's.
pub(super) fn table_name(kernel: &KernelDefinition, name: &str) -> String {
    format!("{}_{}", kernel.name, name)
}

fn is_table(decl: &ArgDecl) -> bool {
    decl.scope == Scope::Global && decl.initializer.is_some()
}

struct CDialect<'a> {
    kernel: &'a KernelDefinition,
    flavor: Flavor,
}

impl Dialect for CDialect<'_> {
    fn var(&self, name: &str) -> String {
        match self.kernel.parameters.iter().find(|(p, _)| p == name) {
            Some((_, value)) => format_float(*value),
            None => name.to_string(),
        }
    }

    fn index(&self, array: &str, indices: Vec<String>) -> String {
        let Some(decl) = self.kernel.declaration(array) else {
            return format!("{}[{}]", array, indices.join("]["));
        };
        let name = if is_table(decl) {
            table_name(self.kernel, array)
        } else {
            array.to_string()
        };
        let column_major =
            decl.is_argument() && self.kernel.layout == MemoryLayout::ColumnMajor;
        format!("{}[{}]", name, flatten(&decl.shape, &indices, column_major))
    }

    fn func(&self, func: Func, arg: String) -> String {
        match (func, self.flavor) {
            (Func::Exp10, Flavor::C) => format!("pow(10.0, {})", arg),
            (Func::Abs, _) => format!("fabs({})", arg),
            _ => format!("{}({})", func, arg),
        }
    }

    fn pow_function(&self) -> Option<&'static str> {
        Some("pow")
    }

    fn logic(&self, op: BinOp) -> &'static str {
        match op {
            BinOp::Or => "||",
            _ => "&&",
        }
    }

    fn not(&self) -> &'static str {
        "!"
    }
}

fn param(decl: &ArgDecl, flavor: Flavor, read_only: bool) -> String {
    let ty = ctype(decl.dtype);
    if decl.is_scalar() {
        return format!("{} const {}", ty, decl.name);
    }
    let constness = if read_only { " const" } else { "" };
    match flavor {
        Flavor::C => format!("{}{} *restrict {}", ty, constness, decl.name),
        Flavor::OpenCl => format!("__global {}{} *restrict {}", ty, constness, decl.name),
    }
}

/// `void name(args)` without a trailing semicolon.
pub(super) fn signature(kernel: &KernelDefinition, flavor: Flavor) -> String {
    let params: Vec<String> = kernel
        .args
        .iter()
        .map(|a| param(a, flavor, a.read_only))
        .collect();
    format!("void {}({})", kernel.name, params.join(", "))
}

pub(super) fn wrapper_signature(wrapper: &WrapperDefinition, flavor: Flavor) -> String {
    let params: Vec<String> = wrapper.args.iter().map(|a| param(a, flavor, false)).collect();
    let qualifier = match flavor {
        Flavor::C => "",
        Flavor::OpenCl => "__kernel ",
    };
    format!("{}void {}({})", qualifier, wrapper.name, params.join(", "))
}

pub(super) fn constant_tables(kernel: &KernelDefinition, flavor: Flavor) -> Vec<String> {
    let qualifier = match flavor {
        Flavor::C => "static const",
        Flavor::OpenCl => "__constant",
    };
    kernel
        .temporaries
        .iter()
        .filter(|d| is_table(d))
        .filter_map(|decl| {
            let values: Vec<String> = match decl.initializer.as_ref()? {
                Initializer::F64(v) => v.iter().map(|x| format_float(*x)).collect(),
                Initializer::I32(v) => v.iter().map(|x| x.to_string()).collect(),
            };
            Some(format!(
                "{} {} {}[{}] = {{{}}};",
                qualifier,
                ctype(decl.dtype),
                table_name(kernel, &decl.name),
                flat_len(decl),
                values.join(", ")
            ))
        })
        .collect()
}

/// Writes one kernel function body.
pub(super) struct SourceWriter<'a> {
    kernel: &'a KernelDefinition,
    flavor: Flavor,
    dialect: CDialect<'a>,
    output: Vec<String>,
}

impl<'a> SourceWriter<'a> {
    pub(super) fn new(kernel: &'a KernelDefinition, flavor: Flavor) -> Self {
        Self {
            kernel,
            flavor,
            dialect: CDialect { kernel, flavor },
            output: Vec::new(),
        }
    }

    fn emit(&mut self, depth: usize, line: impl Into<String>) {
        self.output
            .push(format!("{}{}", "    ".repeat(depth), line.into()));
    }

    fn render(&self, e: &Expr) -> String {
        render(e, &self.dialect)
    }

    /// Complete function definition.
    pub(super) fn function(mut self) -> String {
        let kernel = self.kernel;
        self.emit(0, signature(kernel, self.flavor));
        self.emit(0, "{");
        self.stmts(&kernel.body, 1);
        self.emit(0, "}");
        self.output.join("\n")
    }

    fn stmts(&mut self, stmts: &[Stmt], depth: usize) {
        for stmt in stmts {
            match stmt {
                Stmt::Assign(a) => {
                    let target = self.render(&a.target);
                    if a.atomic && self.flavor == Flavor::OpenCl {
                        if let Some(delta) = increment_of(&a.target, &a.value) {
                            let delta = self.render(delta);
                            self.emit(depth, format!("atomic_add_f64(&{}, {});", target, delta));
                            continue;
                        }
                    }
                    let value = self.render(&a.value);
                    match a.decl {
                        Some(dtype) => {
                            self.emit(depth, format!("{} {} = {};", ctype(dtype), target, value))
                        }
                        None => self.emit(depth, format!("{} = {};", target, value)),
                    }
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    let cond = self.render(cond);
                    self.emit(depth, format!("if ({})", cond));
                    self.block(then_body, depth);
                    if !else_body.is_empty() {
                        self.emit(depth, "else");
                        self.block(else_body, depth);
                    }
                }
                Stmt::Loop { iname, body } => self.emit_loop(iname, body, depth),
            }
        }
    }

    fn block(&mut self, body: &[Stmt], depth: usize) {
        self.emit(depth, "{");
        self.stmts(body, depth + 1);
        self.emit(depth, "}");
    }

    fn private_arrays(&mut self, depth: usize) {
        let decls: Vec<String> = self
            .kernel
            .temporaries
            .iter()
            .filter(|d| d.scope == Scope::Private && !d.shape.is_empty())
            .map(|d| format!("{} {}[{}];", ctype(d.dtype), d.name, flat_len(d)))
            .collect();
        for decl in decls {
            self.emit(depth, decl);
        }
    }

    fn unroll_pragma(&mut self, iname: &str, depth: usize) {
        let kernel = self.kernel;
        let Some(split) = kernel
            .plan
            .splits
            .iter()
            .find(|s| s.iname == iname && s.inner_tag == LoopTag::Unroll)
        else {
            return;
        };
        let line = match self.flavor {
            Flavor::C => format!("#pragma GCC unroll {}", split.factor),
            Flavor::OpenCl => format!("#pragma unroll {}", split.factor),
        };
        self.emit(depth, line);
    }

    fn plain_loop(&mut self, iname: &str, body: &[Stmt], depth: usize) {
        let (lo, hi) = self.bounds(iname);
        self.unroll_pragma(iname, depth);
        self.emit(
            depth,
            format!("for (int {0} = {1}; {0} < {2}; ++{0})", iname, lo, hi),
        );
        self.block(body, depth);
    }

    fn emit_loop(&mut self, iname: &str, body: &[Stmt], depth: usize) {
        match (self.flavor, iname) {
            (Flavor::C, BATCH_INAME) => {
                let (lo, hi) = self.bounds(iname);
                self.emit(depth, "#pragma omp parallel for");
                self.emit(
                    depth,
                    format!("for (int {0} = {1}; {0} < {2}; ++{0})", iname, lo, hi),
                );
                self.emit(depth, "{");
                self.private_arrays(depth + 1);
                self.stmts(body, depth + 1);
                self.emit(depth, "}");
            }
            (Flavor::OpenCl, BATCH_INAME) => self.opencl_batch(body, depth),
            (Flavor::OpenCl, REACTION_INAME) => self.opencl_reaction(body, depth),
            _ => self.plain_loop(iname, body, depth),
        }
    }

    fn bounds(&self, iname: &str) -> (String, String) {
        match self.kernel.domain(iname) {
            Some(d) => (bound(&d.lower), bound(&d.upper)),
            None => ("0".to_string(), "0".to_string()),
        }
    }

    fn opencl_batch(&mut self, body: &[Stmt], depth: usize) {
        let (_, hi) = self.bounds(BATCH_INAME);
        let kernel = self.kernel;
        let plan = &kernel.plan;
        match plan.split_of(BATCH_INAME) {
            Some(split) => {
                self.emit(depth, format!("int const {} = get_local_id(0);", split.inner));
                self.emit(
                    depth,
                    format!(
                        "int const {} = get_group_id(0) * {} + {};",
                        BATCH_INAME, split.factor, split.inner
                    ),
                );
            }
            None if plan.split_of(REACTION_INAME).is_some() => {
                self.emit(depth, format!("int const {} = get_group_id(0);", BATCH_INAME));
            }
            None => {
                self.emit(depth, format!("int const {} = get_global_id(0);", BATCH_INAME));
            }
        }
        self.emit(depth, format!("if ({} < {})", BATCH_INAME, hi));
        self.emit(depth, "{");
        self.private_arrays(depth + 1);
        self.stmts(body, depth + 1);
        self.emit(depth, "}");
    }

    fn opencl_reaction(&mut self, body: &[Stmt], depth: usize) {
        let kernel = self.kernel;
        let split = match kernel.plan.split_of(REACTION_INAME) {
            Some(split) if split.inner_tag == LoopTag::Lane => split,
            Some(split) => {
                // Sequential lanes: widened arrays still index the lane.
                self.emit(depth, format!("int const {} = 0;", split.inner));
                return self.plain_loop(REACTION_INAME, body, depth);
            }
            None => return self.plain_loop(REACTION_INAME, body, depth),
        };
        let (lo, hi) = self.bounds(REACTION_INAME);
        let trips = match kernel.domain(REACTION_INAME).and_then(|d| d.const_len()) {
            Some(len) => ((len as usize).div_ceil(split.factor)).to_string(),
            None => format!(
                "(({}) - ({}) + {}) / {}",
                hi,
                lo,
                split.factor - 1,
                split.factor
            ),
        };
        self.emit(depth, format!("int const {} = get_local_id(0);", split.inner));
        self.unroll_pragma(&split.outer, depth);
        self.emit(
            depth,
            format!(
                "for (int {0} = 0; {0} < {1}; ++{0})",
                split.outer, trips
            ),
        );
        self.emit(depth, "{");
        self.emit(
            depth + 1,
            format!(
                "int const {} = {} + {} * {} + {};",
                REACTION_INAME, lo, split.outer, split.factor, split.inner
            ),
        );
        self.emit(depth + 1, format!("if ({} < {})", REACTION_INAME, hi));
        self.block(body, depth + 1);
        self.emit(depth, "}");
    }
}

/// `delta` when `value` is `target + delta`.
fn increment_of<'e>(target: &Expr, value: &'e Expr) -> Option<&'e Expr> {
    match value {
        Expr::Binary {
            op: BinOp::Add,
            lhs,
            rhs,
        } if lhs.as_ref() == target => Some(rhs),
        _ => None,
    }
}

/// Wrapper body: one call per step, barriers between them.
pub(super) fn wrapper_function(wrapper: &WrapperDefinition, flavor: Flavor) -> String {
    let mut out = vec![wrapper_signature(wrapper, flavor), "{".to_string()];
    for step in &wrapper.steps {
        let line = match (step, flavor) {
            (WrapperStep::Call { kernel, args }, _) => {
                format!("{}({});", kernel, args.join(", "))
            }
            (WrapperStep::Barrier(kind), Flavor::C) => {
                format!("/* {} barrier: calls run in order */", kind)
            }
            (WrapperStep::Barrier(BarrierKind::Global), Flavor::OpenCl) => {
                "barrier(CLK_GLOBAL_MEM_FENCE);".to_string()
            }
            (WrapperStep::Barrier(BarrierKind::Local), Flavor::OpenCl) => {
                "barrier(CLK_LOCAL_MEM_FENCE);".to_string()
            }
        };
        out.push(format!("    {}", line));
    }
    out.push("}".to_string());
    out.join("\n")
}

/// True if any assignment of `kernel` is atomic.
pub(super) fn uses_atomics(kernel: &KernelDefinition) -> bool {
    let mut found = false;
    crate::ir::stmt::for_each_assign(&kernel.body, &mut |a| found |= a.atomic);
    found
}
