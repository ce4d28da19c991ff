//! Vectorization plan: loop splits and hardware tags.
//!
//! Wide vectorization splits the batch loop `j` and puts its inner block on
//! lanes. Deep vectorization splits the reaction loop `i` instead and keeps
//! `j` on work groups. The plan is recorded on the kernel definition; the
//! lowering backends realize it.

use std::fmt;

use tracing::{debug, warn};

use super::{KernelDefinition, VectorFixup, BATCH_INAME, REACTION_INAME};
use crate::config::{CodegenOptions, Lang, VectorLayout};
use crate::error::{Error, Result};
use crate::ir::stmt::{for_each_assign_mut, for_each_expr_mut};
use crate::ir::{Dim, Expr, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopTag {
    /// Work-group (outer parallel) axis.
    Group,
    /// Vector lane / work-item axis.
    Lane,
    Unroll,
    Ilp,
    /// Plain sequential loop.
    Sequential,
}

impl fmt::Display for LoopTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopTag::Group => write!(f, "g.0"),
            LoopTag::Lane => write!(f, "l.0"),
            LoopTag::Unroll => write!(f, "unr"),
            LoopTag::Ilp => write!(f, "ilp"),
            LoopTag::Sequential => write!(f, "for"),
        }
    }
}

/// `iname` becomes `outer * factor + inner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub iname: String,
    pub factor: usize,
    pub outer: String,
    pub inner: String,
    pub inner_tag: LoopTag,
    pub outer_tag: Option<LoopTag>,
}

impl Split {
    pub fn new(iname: &str, factor: usize, inner_tag: LoopTag, outer_tag: Option<LoopTag>) -> Self {
        Self {
            iname: iname.to_string(),
            factor,
            outer: format!("{}_outer", iname),
            inner: format!("{}_inner", iname),
            inner_tag,
            outer_tag,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "split_iname({}, {}, inner_tag={}",
            self.iname, self.factor, self.inner_tag
        )?;
        match self.outer_tag {
            Some(tag) => write!(f, ", outer_tag={})", tag),
            None => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorPlan {
    pub layout: VectorLayout,
    pub width: Option<usize>,
    pub splits: Vec<Split>,
    /// Tags of unsplit loops.
    pub tags: Vec<(String, LoopTag)>,
}

impl VectorPlan {
    pub fn split_of(&self, iname: &str) -> Option<&Split> {
        self.splits.iter().find(|s| s.iname == iname)
    }

    pub fn tag_of(&self, iname: &str) -> Option<LoopTag> {
        self.tags
            .iter()
            .find(|(name, _)| name == iname)
            .map(|(_, tag)| *tag)
    }

    /// The iname running on vector lanes, if any.
    pub fn lane_iname(&self) -> Option<&str> {
        self.splits
            .iter()
            .find(|s| s.inner_tag == LoopTag::Lane)
            .map(|s| s.inner.as_str())
    }

    /// Transformation lines for the loop-IR output.
    pub fn transforms(&self) -> Vec<String> {
        let mut out: Vec<String> = self.splits.iter().map(|s| s.to_string()).collect();
        for (iname, tag) in &self.tags {
            out.push(format!("tag_inames({}: {})", iname, tag));
        }
        out
    }
}

/// Attach the vectorization plan for `options` to `def`, applying the
/// kernel's fix-up when lanes would otherwise share private arrays.
pub fn vectorize(def: &mut KernelDefinition, options: &CodegenOptions) -> Result<()> {
    let mut plan = VectorPlan {
        layout: options.vector_layout,
        width: options.lane_width(),
        ..VectorPlan::default()
    };

    let loop_iname = match (options.vector_layout, options.lane_width()) {
        (VectorLayout::Wide, Some(w)) => {
            plan.splits.push(Split::new(
                BATCH_INAME,
                w,
                LoopTag::Lane,
                Some(LoopTag::Group),
            ));
            REACTION_INAME.to_string()
        }
        (VectorLayout::Deep, Some(w)) => {
            let split = Split::new(REACTION_INAME, w, LoopTag::Lane, None);
            let outer = split.outer.clone();
            plan.splits.push(split);
            plan.tags.push((BATCH_INAME.to_string(), LoopTag::Group));
            outer
        }
        _ => {
            if options.lang == Lang::OpenCl {
                plan.tags.push((BATCH_INAME.to_string(), LoopTag::Group));
            }
            REACTION_INAME.to_string()
        }
    };

    if let (Some(lane), Some(width)) = (plan.lane_iname().map(str::to_string), plan.width) {
        if !def.can_vectorize {
            match def.fixup {
                Some(VectorFixup::WidenPrivateArrays) => {
                    widen_private_arrays(def, &lane, width);
                    def.can_vectorize = true;
                }
                None => {
                    return Err(Error::Vectorization {
                        kernel: def.name.clone(),
                        message: "kernel needs a fix-up before vectorizing and has none"
                            .to_string(),
                    })
                }
            }
        }

        if plan.layout == VectorLayout::Deep && !def.accumulators.is_empty() {
            if options.use_atomics {
                mark_atomic(def);
            } else {
                warn!(
                    kernel = %def.name,
                    accumulators = ?def.accumulators,
                    "shared accumulation without atomics, running lanes sequentially"
                );
                if let Some(split) = plan.splits.iter_mut().find(|s| s.inner == lane) {
                    split.inner_tag = LoopTag::Sequential;
                }
            }
        }
    }

    if let Some(factor) = options.unroll {
        plan.splits
            .push(Split::new(&loop_iname, factor, LoopTag::Unroll, None));
    } else if options.ilp {
        plan.tags.push((loop_iname, LoopTag::Ilp));
    }

    debug!(
        kernel = %def.name,
        layout = %plan.layout,
        width = ?plan.width,
        splits = plan.splits.len(),
        "planned vectorization"
    );
    def.plan = plan;
    Ok(())
}

/// Give every private array a leading lane dimension and index it by `lane`.
fn widen_private_arrays(def: &mut KernelDefinition, lane: &str, width: usize) {
    let mut widened = Vec::new();
    for decl in def.temporaries.iter_mut() {
        if decl.scope == Scope::Private && !decl.shape.is_empty() && decl.initializer.is_none() {
            decl.shape.insert(0, Dim::Const(width));
            widened.push(decl.name.clone());
        }
    }
    for_each_expr_mut(&mut def.body, &mut |e| {
        if let Expr::Index { array, indices } = e {
            if widened.iter().any(|w| w == array) {
                indices.insert(0, Expr::var(lane));
            }
        }
    });
    debug!(kernel = %def.name, arrays = ?widened, "widened private arrays");
}

fn mark_atomic(def: &mut KernelDefinition) {
    let accumulators = def.accumulators.clone();
    for_each_assign_mut(&mut def.body, &mut |a| {
        if a.target_name().is_some_and(|t| accumulators.iter().any(|acc| acc == t)) {
            a.atomic = true;
        }
    });
}
