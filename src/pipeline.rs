//! End-to-end generation: mechanism records in, one composed kernel out.
//!
//! ```text
//! Mechanism → classify → rate kernels → assemble → KernelGraph → compose
//! ```
//!
//! Every stage either succeeds completely or halts generation with the
//! offending reaction, group or kernel named in the error.

use std::fmt;

use tracing::{debug, info};

use crate::classify::{Classification, ReactionClassifier};
use crate::compose::{BarrierKind, ComposedKernel, KernelComposer, KernelGraph, MemoryManager};
use crate::config::CodegenOptions;
use crate::error::Result;
use crate::kernel::KernelAssembler;
use crate::mechanism::Mechanism;
use crate::rates::{RateExpressionBuilder, KF};

/// Name of the composed unit.
pub const UNIT_NAME: &str = "rate_constants";

/// Result of one generation run.
#[derive(Debug, Clone)]
pub struct Generated {
    pub classification: Classification,
    pub composed: ComposedKernel,
}

impl Generated {
    /// Host-side arrays of the composed unit; `kf` is the only output.
    pub fn memory(&self, options: &CodegenOptions) -> MemoryManager {
        MemoryManager::for_kernel(options.lang, &self.composed, &[KF])
    }
}

/// Classify `mech` under the configured specialization mode.
pub fn classify(mech: &Mechanism, options: &CodegenOptions) -> Result<Classification> {
    mech.validate()?;
    ReactionClassifier::new(options.specialization).classify(mech)
}

/// Run the whole pipeline.
pub fn generate(mech: &Mechanism, options: &CodegenOptions) -> Result<Generated> {
    options.validate()?;
    let classification = classify(mech, options)?;
    let plan = RateExpressionBuilder::new(&classification, options).build()?;

    let assembler = KernelAssembler::new(options);
    let mut graph = KernelGraph::new();
    for kernel in plan.kernels {
        let name = kernel.name.clone();
        match assembler.assemble(kernel)? {
            Some(info) => {
                graph.add(info);
            }
            None => debug!(kernel = %name, "no members, kernel omitted"),
        }
    }
    for barrier in &plan.barriers {
        if let (Some(first), Some(second)) = (graph.find(&barrier.first), graph.find(&barrier.second)) {
            graph.add_barrier(first, second, BarrierKind::Global);
        }
    }

    let composed = KernelComposer::new(options).compose(UNIT_NAME, graph)?;
    info!(
        reactions = mech.n_reactions(),
        species = mech.n_species(),
        kernels = composed.kernels.len(),
        "generated rate-constant kernel"
    );
    Ok(Generated {
        classification,
        composed,
    })
}

/// Group and tier summary of a classification.
pub struct Summary<'a>(pub &'a Classification);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.0;
        writeln!(
            f,
            "{} species, {} reactions, {} specialization",
            c.n_species, c.n_reactions, c.mode
        )?;
        for group in c.groups() {
            writeln!(f, "{:<8} {:>5}", group.kind.to_string(), group.members.len())?;
        }
        for (t, form) in c.mode.forms().iter().enumerate() {
            let tier = crate::classify::Tier(t as u8);
            writeln!(
                f,
                "tier {} {:<9} simple {:>5}  falloff {:>5}",
                t,
                form.to_string(),
                c.simple.positions_of(tier).len(),
                c.falloff.base.positions_of(tier).len()
            )?;
        }
        write!(
            f,
            "troe {}, sri {}, lindemann {}",
            c.falloff.troe.positions.len(),
            c.falloff.sri.positions.len(),
            c.falloff.lindemann.len()
        )
    }
}
