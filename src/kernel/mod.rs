//! Kernel records: from rate-builder output to compiler-ready definitions.
//!
//! ```text
//! RateKernel ─→ KernelAssembler ─→ KernelInfo ─→ KernelDefinition ─→ KernelLowering
//!  (builder)      maps, args,        (generic      loop nest,           source text
//!                 assumptions         record)       vector plan
//! ```
//!
//! Every kernel iterates the batch of conditions with `j` and the members
//! of its family with `i`. Rate builders never see the index map: they
//! read `pos` (position within the family) and `idx` (mapped index), and
//! the assembler prepends whichever of the two the body reads.
//!
//! No rate-constant kernel accumulates across reactions; `with_accumulator`
//! is the hook for downstream kernels that do, and drives the atomics path.

pub mod lower;
#[cfg(test)]
mod tests;
mod vectorize;

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::{CodegenOptions, MemoryLayout};
use crate::error::{Error, Result};
use crate::ir::stmt::{for_each_assign, for_each_read};
use crate::ir::{log, temp, temp_int, ArgDecl, Array, DType, Dim, Expr, LoopDomain, Machine, Scope, Stmt};
use crate::mapping::{IndexMap, IndexMapBuilder};

pub use vectorize::{vectorize, LoopTag, Split, VectorPlan};

pub const REACTION_INAME: &str = "i";
pub const BATCH_INAME: &str = "j";
/// Position of the current member within its family.
pub const POSITION_VAR: &str = "pos";
/// Mapped index of the current member.
pub const TARGET_VAR: &str = "idx";
/// Table name of an explicit reaction-loop map.
pub const MAP_NAME: &str = "out_map";

// ─── Shared precomputes ────────────────────────────────────────────

/// Per-condition values computed once before the reaction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precompute {
    TInv,
    LogT,
    LogP,
}

impl Precompute {
    pub fn name(self) -> &'static str {
        match self {
            Precompute::TInv => "T_inv",
            Precompute::LogT => "logT",
            Precompute::LogP => "logP",
        }
    }

    pub fn input(self) -> &'static str {
        match self {
            Precompute::TInv | Precompute::LogT => "T_arr",
            Precompute::LogP => "P_arr",
        }
    }

    fn stmt(self) -> Stmt {
        let x = Expr::index(self.input(), [BATCH_INAME]);
        let value = match self {
            Precompute::TInv => Expr::float(1.0) / x,
            Precompute::LogT | Precompute::LogP => log(x),
        };
        temp(self.name(), value).into()
    }
}

/// Rewrite a kernel needs before it can run on vector lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFixup {
    /// Give every private array temporary a leading lane dimension.
    WidenPrivateArrays,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assumption {
    Positive(String),
    DivisibleBy(String, usize),
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assumption::Positive(p) => write!(f, "{} > 0", p),
            Assumption::DivisibleBy(p, w) => write!(f, "{} mod {} = 0", p, w),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedMap {
    pub name: String,
    pub map: IndexMap,
}

// ─── Builder output ────────────────────────────────────────────────

/// One family/tier as produced by a rate builder.
#[derive(Debug, Clone)]
pub struct RateKernel {
    pub name: String,
    /// Indices of the members, one per iteration.
    pub indices: Vec<usize>,
    /// Indices the reaction-loop map must point at, if not `indices`.
    pub alternate: Option<Vec<usize>>,
    pub force_zero: bool,
    pub pre: Vec<Precompute>,
    pub instructions: Vec<Stmt>,
    pub args: Vec<ArgDecl>,
    pub extra_loops: Vec<LoopDomain>,
    pub parameters: Vec<(String, f64)>,
    pub fixup: Option<VectorFixup>,
    /// Arrays updated by more than one reaction-loop iteration.
    pub accumulators: Vec<String>,
}

impl RateKernel {
    pub fn new(name: &str, indices: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            indices,
            alternate: None,
            force_zero: false,
            pre: Vec::new(),
            instructions: Vec::new(),
            args: Vec::new(),
            extra_loops: Vec::new(),
            parameters: Vec::new(),
            fixup: None,
            accumulators: Vec::new(),
        }
    }

    pub fn with_alternate(mut self, alternate: Vec<usize>) -> Self {
        self.alternate = Some(alternate);
        self
    }

    pub fn with_force_zero(mut self) -> Self {
        self.force_zero = true;
        self
    }

    pub fn with_pre(mut self, pre: &[Precompute]) -> Self {
        self.pre.extend_from_slice(pre);
        self
    }

    pub fn with_args(mut self, args: Vec<ArgDecl>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.instructions = body;
        self
    }

    pub fn with_loop(mut self, domain: LoopDomain) -> Self {
        self.extra_loops.push(domain);
        self
    }

    pub fn with_parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.push((name.to_string(), value));
        self
    }

    pub fn with_fixup(mut self, fixup: VectorFixup) -> Self {
        self.fixup = Some(fixup);
        self
    }

    /// Mark `array` as written by several members of the family.
    pub fn with_accumulator(mut self, array: &str) -> Self {
        self.accumulators.push(array.to_string());
        self
    }
}

// ─── Kernel info ───────────────────────────────────────────────────

/// Generic kernel record consumed by the composer.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelInfo {
    pub name: String,
    pub reaction_loop: LoopDomain,
    pub pre: Vec<Stmt>,
    pub instructions: Vec<Stmt>,
    pub post: Vec<Stmt>,
    /// Arguments and temporaries, in declaration order.
    pub args: Vec<ArgDecl>,
    pub extra_loops: Vec<LoopDomain>,
    pub maps: Vec<NamedMap>,
    pub assumptions: Vec<Assumption>,
    pub parameters: Vec<(String, f64)>,
    /// False when the kernel needs its fix-up before vectorizing.
    pub can_vectorize: bool,
    pub fixup: Option<VectorFixup>,
    pub accumulators: Vec<String>,
}

impl KernelInfo {
    /// Caller-supplied arguments (no temporaries).
    pub fn arguments(&self) -> impl Iterator<Item = &ArgDecl> {
        self.args.iter().filter(|a| a.is_argument())
    }

    pub fn arg(&self, name: &str) -> Option<&ArgDecl> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// Add `decl` unless an identical declaration exists; conflicting
/// declarations of one name are an error.
pub(crate) fn merge_arg(args: &mut Vec<ArgDecl>, decl: ArgDecl) -> Result<()> {
    match args.iter().find(|a| a.name == decl.name) {
        Some(existing) if existing.same_type(&decl) => Ok(()),
        Some(existing) => Err(Error::ArgumentConflict {
            name: decl.name.clone(),
            first: existing.signature(),
            second: decl.signature(),
        }),
        None => {
            args.push(decl);
            Ok(())
        }
    }
}

/// Turns builder output into kernel records, dropping empty families.
pub struct KernelAssembler<'a> {
    options: &'a CodegenOptions,
}

impl<'a> KernelAssembler<'a> {
    pub fn new(options: &'a CodegenOptions) -> Self {
        Self { options }
    }

    pub fn assemble(&self, kernel: RateKernel) -> Result<Option<KernelInfo>> {
        if kernel.indices.is_empty() {
            debug!(kernel = %kernel.name, "omitting kernel with no members");
            return Ok(None);
        }
        let map = IndexMapBuilder::new()
            .with_force_zero(kernel.force_zero)
            .build(&kernel.name, &kernel.indices, kernel.alternate.as_deref())?;

        let mut reads: HashSet<&str> = HashSet::new();
        for_each_read(&kernel.instructions, &mut |e| reads.extend(e.names()));

        let mut instructions: Vec<Stmt> = Vec::new();
        let mut maps = Vec::new();
        if reads.contains(POSITION_VAR) {
            instructions.push(
                temp_int(POSITION_VAR, map.position(REACTION_INAME))
                    .with_id("map_pos")
                    .into(),
            );
        }
        if reads.contains(TARGET_VAR) {
            instructions.push(
                temp_int(TARGET_VAR, map.target(REACTION_INAME, MAP_NAME))
                    .with_id("map_idx")
                    .into(),
            );
            if !map.is_contiguous() {
                maps.push(NamedMap {
                    name: MAP_NAME.to_string(),
                    map: map.clone(),
                });
            }
        }
        instructions.extend(kernel.instructions);

        let mut pre_keys = kernel.pre.clone();
        pre_keys.sort();
        pre_keys.dedup();
        let pre: Vec<Stmt> = pre_keys.iter().map(|p| p.stmt()).collect();

        let batch = self.options.problem_size.dim();
        let mut args = Vec::new();
        if let Some(n) = self.options.problem_size.param() {
            args.push(ArgDecl::value(n));
        }
        for p in &pre_keys {
            merge_arg(
                &mut args,
                ArgDecl::global(p.input(), vec![batch.clone()], DType::F64).read_only(),
            )?;
        }
        for decl in kernel.args {
            merge_arg(&mut args, decl)?;
        }
        for named in &maps {
            if let Some(decl) = named.map.declare(&named.name) {
                merge_arg(&mut args, decl)?;
            }
        }

        let mut assumptions = Vec::new();
        if let Some(n) = self.options.problem_size.param() {
            assumptions.push(Assumption::Positive(n.to_string()));
            if let Some(w) = self.options.lane_width() {
                assumptions.push(Assumption::DivisibleBy(n.to_string(), w));
            }
        }

        let info = KernelInfo {
            name: kernel.name,
            reaction_loop: map.domain(REACTION_INAME),
            pre,
            instructions,
            post: Vec::new(),
            args,
            extra_loops: kernel.extra_loops,
            maps,
            assumptions,
            parameters: kernel.parameters,
            can_vectorize: kernel.fixup.is_none(),
            fixup: kernel.fixup,
            accumulators: kernel.accumulators,
        };
        check_dependencies(&info)?;
        check_names(&info)?;
        debug!(
            kernel = %info.name,
            members = map.len(),
            contiguous = map.is_contiguous(),
            "assembled kernel"
        );
        Ok(Some(info))
    }
}

fn all_stmts(info: &KernelInfo) -> impl Iterator<Item = &[Stmt]> {
    [
        info.pre.as_slice(),
        info.instructions.as_slice(),
        info.post.as_slice(),
    ]
    .into_iter()
}

/// Every dependency must name an instruction of the kernel.
fn check_dependencies(info: &KernelInfo) -> Result<()> {
    let mut ids = Vec::new();
    for stmts in all_stmts(info) {
        for_each_assign(stmts, &mut |a| {
            if let Some(id) = &a.id {
                ids.push(id.clone());
            }
        });
    }
    let mut missing = None;
    for stmts in all_stmts(info) {
        for_each_assign(stmts, &mut |a| {
            for dep in &a.deps {
                if missing.is_none() && !ids.iter().any(|id| dep.matches(id)) {
                    missing = Some(dep.to_string());
                }
            }
        });
    }
    match missing {
        Some(dep) => Err(Error::malformed(
            &info.name,
            format!("dependency '{}' matches no instruction", dep),
        )),
        None => Ok(()),
    }
}

/// Every name read or written must be a declaration, a temporary, an
/// iname, or a fixed parameter.
fn check_names(info: &KernelInfo) -> Result<()> {
    let mut known: HashSet<&str> = HashSet::new();
    known.insert(BATCH_INAME);
    known.insert(&info.reaction_loop.iname);
    known.extend(info.extra_loops.iter().map(|d| d.iname.as_str()));
    known.extend(info.args.iter().map(|a| a.name.as_str()));
    known.extend(info.parameters.iter().map(|(p, _)| p.as_str()));
    for stmts in all_stmts(info) {
        for_each_assign(stmts, &mut |a| {
            if a.decl.is_some() {
                if let Some(name) = a.target_name() {
                    known.insert(name);
                }
            }
        });
    }

    let mut unknown: Option<String> = None;
    for stmts in all_stmts(info) {
        for_each_read(stmts, &mut |e| {
            for name in e.names() {
                if unknown.is_none() && !known.contains(name) {
                    unknown = Some(name.to_string());
                }
            }
        });
        for_each_assign(stmts, &mut |a| {
            if let Some(name) = a.target_name() {
                if unknown.is_none() && !known.contains(name) {
                    unknown = Some(name.to_string());
                }
            }
        });
    }
    match unknown {
        Some(name) => Err(Error::malformed(
            &info.name,
            format!("'{}' is not declared", name),
        )),
        None => Ok(()),
    }
}

// ─── Kernel definition ─────────────────────────────────────────────

/// A kernel as handed to a lowering backend: full loop nest, split
/// declarations, assumptions, and the vectorization plan.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelDefinition {
    pub name: String,
    /// Batch loop, reaction loop, then any extra loops.
    pub domains: Vec<LoopDomain>,
    /// `for j { pre; for i { instructions }; post }`
    pub body: Vec<Stmt>,
    pub args: Vec<ArgDecl>,
    pub temporaries: Vec<ArgDecl>,
    pub assumptions: Vec<Assumption>,
    pub parameters: Vec<(String, f64)>,
    pub layout: MemoryLayout,
    pub plan: VectorPlan,
    pub can_vectorize: bool,
    pub fixup: Option<VectorFixup>,
    pub accumulators: Vec<String>,
}

impl KernelDefinition {
    /// Wrap a kernel record in the standard loop nest.
    pub fn from_info(info: &KernelInfo, options: &CodegenOptions) -> Self {
        let mut inner = info.pre.clone();
        inner.push(Stmt::for_each(
            &info.reaction_loop.iname,
            info.instructions.clone(),
        ));
        inner.extend(info.post.iter().cloned());

        let mut domains = vec![
            LoopDomain::new(BATCH_INAME, 0i64, options.problem_size.bound()),
            info.reaction_loop.clone(),
        ];
        domains.extend(info.extra_loops.iter().cloned());

        let (args, temporaries): (Vec<ArgDecl>, Vec<ArgDecl>) =
            info.args.iter().cloned().partition(|a| a.is_argument());

        Self {
            name: info.name.clone(),
            domains,
            body: vec![Stmt::for_each(BATCH_INAME, inner)],
            args,
            temporaries,
            assumptions: info.assumptions.clone(),
            parameters: info.parameters.clone(),
            layout: options.memory_layout,
            plan: VectorPlan::default(),
            can_vectorize: info.can_vectorize,
            fixup: info.fixup,
            accumulators: info.accumulators.clone(),
        }
    }

    pub fn domain(&self, iname: &str) -> Option<&LoopDomain> {
        self.domains.iter().find(|d| d.iname == iname)
    }

    pub fn declaration(&self, name: &str) -> Option<&ArgDecl> {
        self.args
            .iter()
            .chain(&self.temporaries)
            .find(|a| a.name == name)
    }

    /// Names of the arguments the kernel writes.
    pub fn written_args(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for_each_assign(&self.body, &mut |a| {
            if let Some(name) = a.target_name() {
                let is_arg = self.args.iter().any(|d| d.name == name);
                if is_arg && !out.iter().any(|o| o == name) {
                    out.push(name.to_string());
                }
            }
        });
        out
    }

    /// Run the kernel on `machine` with the reference interpreter.
    ///
    /// Arguments must already be loaded; temporaries and fixed parameters
    /// are set up here.
    pub fn execute(&self, machine: &mut Machine) -> Result<()> {
        for decl in &self.temporaries {
            let mut shape = Vec::with_capacity(decl.shape.len());
            for dim in &decl.shape {
                shape.push(match dim {
                    Dim::Const(v) => *v,
                    Dim::Param(p) => machine.param(p).map(|v| v as usize).ok_or_else(|| {
                        Error::malformed(&self.name, format!("unbound size '{}'", p))
                    })?,
                });
            }
            let array = match (&decl.initializer, decl.scope) {
                (Some(init), _) => Array::from_data(shape, init.values_f64()),
                (None, Scope::Private) => Array::zeros(shape),
                (None, Scope::Global) => continue,
            };
            machine.set_array(&decl.name, array);
        }
        for (name, value) in &self.parameters {
            machine.set_scalar(name, *value);
        }
        machine.exec(&self.body, &self.domains)
    }
}
