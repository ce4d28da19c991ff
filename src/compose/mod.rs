//! KernelComposer: many kernel records in, one callable unit out.
//!
//! Kernels live in an arena ([`KernelGraph`]); edges and barriers refer to
//! them by index. Composition orders the calls so that every dependency and
//! every barrier's first kernel runs before the kernels waiting on it,
//! deduplicates the caller-visible arguments, and vectorizes every own
//! kernel with the same plan.
//!
//! ```text
//! kernels + depends_on + barriers
//!        │
//!        ├─ toposort ─→ call order
//!        ├─ merge_arg ─→ wrapper arguments (n first, read-write)
//!        └─ vectorize ─→ kernel definitions
//! ```

mod memory;

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, info};

use crate::config::CodegenOptions;
use crate::error::{Error, Result};
use crate::ir::ArgDecl;
use crate::kernel::lower::KernelLowering;
use crate::kernel::{merge_arg, vectorize, KernelDefinition, KernelInfo};

pub use memory::{ArrayRole, ManagedArray, MemoryManager};

// ─── Wrapper ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    Global,
    Local,
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierKind::Global => write!(f, "global"),
            BarrierKind::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WrapperStep {
    Call { kernel: String, args: Vec<String> },
    Barrier(BarrierKind),
}

/// The function that calls a composed sequence of kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperDefinition {
    pub name: String,
    pub args: Vec<ArgDecl>,
    pub steps: Vec<WrapperStep>,
}

impl WrapperDefinition {
    /// Kernel names in call order.
    pub fn calls(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                WrapperStep::Call { kernel, .. } => Some(kernel.as_str()),
                WrapperStep::Barrier(_) => None,
            })
            .collect()
    }

    /// Step index of the call to `kernel`.
    pub fn position(&self, kernel: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| matches!(s, WrapperStep::Call { kernel: k, .. } if k == kernel))
    }
}

// ─── Graph ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(usize);

#[derive(Debug, Clone)]
pub enum KernelNode {
    /// A kernel emitted with this unit.
    Own(KernelInfo),
    /// A kernel called here but compiled with a dependency.
    External(String),
}

impl KernelNode {
    pub fn name(&self) -> &str {
        match self {
            KernelNode::Own(info) => &info.name,
            KernelNode::External(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub first: KernelId,
    pub second: KernelId,
    pub kind: BarrierKind,
}

/// Arena of kernels with their ordering constraints.
#[derive(Debug, Default)]
pub struct KernelGraph {
    nodes: Vec<KernelNode>,
    /// `(kernel, prerequisite)`
    depends_on: Vec<(KernelId, KernelId)>,
    barriers: Vec<Barrier>,
    dependencies: Vec<ComposedKernel>,
}

impl KernelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: KernelInfo) -> KernelId {
        self.nodes.push(KernelNode::Own(info));
        KernelId(self.nodes.len() - 1)
    }

    /// Reference a kernel owned by a declared dependency.
    pub fn add_external(&mut self, name: &str) -> KernelId {
        self.nodes.push(KernelNode::External(name.to_string()));
        KernelId(self.nodes.len() - 1)
    }

    /// Declare a composed unit whose kernels may be referenced.
    pub fn add_dependency(&mut self, dependency: ComposedKernel) {
        self.dependencies.push(dependency);
    }

    pub fn depends_on(&mut self, kernel: KernelId, prerequisite: KernelId) {
        self.depends_on.push((kernel, prerequisite));
    }

    /// Make `second` wait for the effects of `first`.
    pub fn add_barrier(&mut self, first: KernelId, second: KernelId, kind: BarrierKind) {
        self.barriers.push(Barrier {
            first,
            second,
            kind,
        });
    }

    pub fn find(&self, name: &str) -> Option<KernelId> {
        self.nodes.iter().position(|n| n.name() == name).map(KernelId)
    }

    pub fn node(&self, id: KernelId) -> Option<&KernelNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    fn check(&self, id: KernelId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::UnknownKernel {
                name: format!("#{}", id.0),
            })
        }
    }

    /// Call order: prerequisites first, otherwise insertion order.
    fn order(&self) -> Result<Vec<KernelId>> {
        let mut graph: DiGraph<KernelId, ()> = DiGraph::new();
        let idx: Vec<NodeIndex> = (0..self.nodes.len())
            .map(|i| graph.add_node(KernelId(i)))
            .collect();
        for &(kernel, prerequisite) in &self.depends_on {
            self.check(kernel)?;
            self.check(prerequisite)?;
            graph.update_edge(idx[prerequisite.0], idx[kernel.0], ());
        }
        for b in &self.barriers {
            self.check(b.first)?;
            self.check(b.second)?;
            graph.update_edge(idx[b.first.0], idx[b.second.0], ());
        }

        let mut indegree: Vec<usize> = idx
            .iter()
            .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<usize> = (0..idx.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(idx.len());
        while let Some(next) = ready.pop_first() {
            order.push(KernelId(next));
            for succ in graph.neighbors_directed(idx[next], Direction::Outgoing) {
                let s = succ.index();
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    ready.insert(s);
                }
            }
        }

        if order.len() < idx.len() {
            let cycle = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
                .unwrap_or_default();
            let mut kernels: Vec<String> = cycle
                .iter()
                .map(|&n| self.nodes[graph[n].0].name().to_string())
                .collect();
            kernels.sort();
            return Err(Error::DependencyCycle { kernels });
        }
        Ok(order)
    }

    /// Definition of an external kernel, searched through the dependencies.
    fn resolve(&self, name: &str) -> Result<&KernelDefinition> {
        self.dependencies
            .iter()
            .find_map(|d| d.kernel(name))
            .ok_or_else(|| Error::UnknownKernel {
                name: name.to_string(),
            })
    }
}

// ─── Composer ──────────────────────────────────────────────────────

pub struct KernelComposer<'a> {
    options: &'a CodegenOptions,
}

impl<'a> KernelComposer<'a> {
    pub fn new(options: &'a CodegenOptions) -> Self {
        Self { options }
    }

    pub fn compose(&self, name: &str, graph: KernelGraph) -> Result<ComposedKernel> {
        let order = graph.order()?;

        let mut waits: IndexMap<KernelId, BarrierKind> = IndexMap::new();
        for b in graph.barriers() {
            let kind = match (waits.get(&b.second), b.kind) {
                (Some(BarrierKind::Global), _) | (_, BarrierKind::Global) => BarrierKind::Global,
                _ => BarrierKind::Local,
            };
            waits.insert(b.second, kind);
        }

        let mut args: Vec<ArgDecl> = Vec::new();
        if let Some(n) = self.options.problem_size.param() {
            let mut size = ArgDecl::value(n);
            size.read_only = false;
            args.push(size);
        }
        let mut kernels: Vec<KernelDefinition> = Vec::new();
        let mut externals: Vec<String> = Vec::new();
        let mut steps: Vec<WrapperStep> = Vec::new();

        for id in order {
            let node = graph
                .node(id)
                .ok_or_else(|| Error::UnknownKernel {
                    name: format!("#{}", id.0),
                })?;
            let def = match node {
                KernelNode::Own(info) => {
                    let mut def = KernelDefinition::from_info(info, self.options);
                    vectorize(&mut def, self.options)?;
                    def
                }
                KernelNode::External(name) => {
                    externals.push(name.clone());
                    graph.resolve(name)?.clone()
                }
            };
            for decl in &def.args {
                let mut decl = decl.clone();
                decl.read_only = false;
                merge_arg(&mut args, decl)?;
            }
            if let Some(kind) = waits.get(&id) {
                debug!(kernel = %def.name, kind = %kind, "inserting barrier");
                steps.push(WrapperStep::Barrier(*kind));
            }
            steps.push(WrapperStep::Call {
                kernel: def.name.clone(),
                args: def.args.iter().map(|a| a.name.clone()).collect(),
            });
            if matches!(node, KernelNode::Own(_)) {
                kernels.push(def);
            }
        }

        info!(
            unit = name,
            kernels = kernels.len(),
            external = externals.len(),
            args = args.len(),
            barriers = waits.len(),
            "composed kernel"
        );
        Ok(ComposedKernel {
            wrapper: WrapperDefinition {
                name: name.to_string(),
                args,
                steps,
            },
            kernels,
            externals,
            dependencies: graph.dependencies,
        })
    }
}

// ─── Output ────────────────────────────────────────────────────────

/// One composed, vectorized unit plus everything it links against.
#[derive(Debug, Clone)]
pub struct ComposedKernel {
    pub wrapper: WrapperDefinition,
    /// Own kernels in call order.
    pub kernels: Vec<KernelDefinition>,
    /// Called kernels compiled with a dependency.
    pub externals: Vec<String>,
    pub dependencies: Vec<ComposedKernel>,
}

impl ComposedKernel {
    pub fn name(&self) -> &str {
        &self.wrapper.name
    }

    /// An own kernel, or one owned by a dependency.
    pub fn kernel(&self, name: &str) -> Option<&KernelDefinition> {
        self.kernels
            .iter()
            .find(|k| k.name == name)
            .or_else(|| self.dependencies.iter().find_map(|d| d.kernel(name)))
    }

    pub fn arg(&self, name: &str) -> Option<&ArgDecl> {
        self.wrapper.args.iter().find(|a| a.name == name)
    }

    /// Own kernels and wrapper, without the header comment.
    fn body(&self, lowering: &dyn KernelLowering) -> String {
        let refs: Vec<&KernelDefinition> = self.kernels.iter().collect();
        let mut parts = Vec::new();
        let preamble = lowering.preamble(&refs);
        if !preamble.is_empty() {
            parts.push(preamble);
        }
        for name in &self.externals {
            if let Some(def) = self.dependencies.iter().find_map(|d| d.kernel(name)) {
                parts.push(lowering.declaration(def));
            }
        }
        for kernel in &self.kernels {
            parts.push(lowering.lower(kernel));
        }
        parts.push(lowering.lower_wrapper(&self.wrapper));
        parts.join("\n\n")
    }

    /// Stable content hash of the rendered unit.
    pub fn fingerprint(&self, lowering: &dyn KernelLowering) -> String {
        blake3::hash(self.body(lowering).as_bytes()).to_hex().to_string()
    }

    /// Complete source of the unit for one backend.
    pub fn source(&self, lowering: &dyn KernelLowering) -> String {
        let body = self.body(lowering);
        let hash = blake3::hash(body.as_bytes()).to_hex();
        format!(
            "{}\n{}\n\n{}\n",
            lowering.comment(&format!("{} ({})", self.name(), lowering.target_name())),
            lowering.comment(&format!("fingerprint {}", &hash.as_str()[..16])),
            body
        )
    }

    /// Declarations of the wrapper and every own kernel.
    pub fn header(&self, lowering: &dyn KernelLowering) -> String {
        let mut lines = vec![lowering.comment(&format!("{} declarations", self.name()))];
        for kernel in &self.kernels {
            lines.push(lowering.declaration(kernel));
        }
        lines.push(lowering.wrapper_declaration(&self.wrapper));
        lines.join("\n")
    }

    /// Sources of every dependency, depth first, for separate compilation.
    pub fn dependency_sources(&self, lowering: &dyn KernelLowering) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for dep in &self.dependencies {
            out.extend(dep.dependency_sources(lowering));
            out.push((dep.name().to_string(), dep.source(lowering)));
        }
        out
    }
}
