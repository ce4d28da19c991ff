//! RateExpressionBuilder: closed-form rate-constant instructions per family.
//!
//! Every family becomes one [`RateKernel`] (the simple-Arrhenius family one
//! per tier, unless single-kernel mode is on). Kernels share these arrays,
//! all indexed `[j, ...]` over the batch of conditions:
//!
//! ```text
//! T_arr[n]            P_arr[n]           conc[n, nsp]
//! kf[n, nr]           kf_fall[n, nfall]  thd_conc[n, nthd]
//! Pr[n, nfall]        Fi[n, nfall]
//! Fcent, Atroe, Btroe [n, ntroe]         X[n, nsri]
//! ```
//!
//! Parameter tables are constant temporaries owned by each kernel.
//!
//! Split into submodules by family:
//! - `arrhenius`: simple and falloff-base tiers
//! - `pressure`: pressure-log and Chebyshev
//! - `third_body`: effective collision-partner concentration
//! - `falloff`: reduced pressure and blending functions

mod arrhenius;
mod falloff;
mod pressure;
#[cfg(test)]
mod tests;
mod third_body;

use tracing::{debug, info};

use crate::classify::{Classification, SpecializationMode};
use crate::config::CodegenOptions;
use crate::error::Result;
use crate::ir::{ArgDecl, DType, Dim, Expr};
use crate::kernel::{RateKernel, BATCH_INAME, POSITION_VAR, TARGET_VAR};

pub const T_ARR: &str = "T_arr";
pub const P_ARR: &str = "P_arr";
pub const CONC: &str = "conc";
pub const KF: &str = "kf";
pub const KF_FALL: &str = "kf_fall";
pub const THD_CONC: &str = "thd_conc";
pub const PR: &str = "Pr";
pub const FI: &str = "Fi";
pub const FCENT: &str = "Fcent";
pub const ATROE: &str = "Atroe";
pub const BTROE: &str = "Btroe";
pub const X_SRI: &str = "X";

/// Name of the gas-constant parameter substituted into the kernels.
pub const GAS_CONSTANT: &str = "R_u";

/// `name[j, index]`
fn at(name: &str, index: impl Into<Expr>) -> Expr {
    Expr::index(name, [Expr::var(BATCH_INAME), index.into()])
}

/// `name[pos]`
fn param(name: &str) -> Expr {
    Expr::index(name, [POSITION_VAR])
}

fn pos() -> Expr {
    Expr::var(POSITION_VAR)
}

fn idx() -> Expr {
    Expr::var(TARGET_VAR)
}

/// Shape catalogue of the shared arrays.
#[derive(Debug, Clone)]
pub struct SharedArrays {
    batch: Dim,
    n_species: usize,
    n_reactions: usize,
    n_fall: usize,
    n_thd: usize,
    n_troe: usize,
    n_sri: usize,
}

impl SharedArrays {
    pub fn new(classification: &Classification, options: &CodegenOptions) -> Self {
        Self {
            batch: options.problem_size.dim(),
            n_species: classification.n_species,
            n_reactions: classification.n_reactions,
            n_fall: classification.falloff.len(),
            n_thd: classification.third_body.len(),
            n_troe: classification.falloff.troe.positions.len(),
            n_sri: classification.falloff.sri.positions.len(),
        }
    }

    fn per_condition(&self, name: &str, width: usize) -> ArgDecl {
        ArgDecl::global(name, vec![self.batch.clone(), Dim::Const(width)], DType::F64)
    }

    pub fn temperature(&self) -> ArgDecl {
        ArgDecl::global(T_ARR, vec![self.batch.clone()], DType::F64).read_only()
    }

    pub fn pressure(&self) -> ArgDecl {
        ArgDecl::global(P_ARR, vec![self.batch.clone()], DType::F64).read_only()
    }

    pub fn concentrations(&self) -> ArgDecl {
        self.per_condition(CONC, self.n_species).read_only()
    }

    pub fn kf(&self) -> ArgDecl {
        self.per_condition(KF, self.n_reactions)
    }

    pub fn kf_fall(&self) -> ArgDecl {
        self.per_condition(KF_FALL, self.n_fall)
    }

    pub fn thd_conc(&self) -> ArgDecl {
        self.per_condition(THD_CONC, self.n_thd)
    }

    pub fn pr(&self) -> ArgDecl {
        self.per_condition(PR, self.n_fall)
    }

    pub fn fi(&self) -> ArgDecl {
        self.per_condition(FI, self.n_fall)
    }

    pub fn troe(&self) -> [ArgDecl; 3] {
        [
            self.per_condition(FCENT, self.n_troe),
            self.per_condition(ATROE, self.n_troe),
            self.per_condition(BTROE, self.n_troe),
        ]
    }

    pub fn sri(&self) -> ArgDecl {
        self.per_condition(X_SRI, self.n_sri)
    }
}

/// A reader-writer ordering between two kernels, by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBarrier {
    pub first: String,
    pub second: String,
}

/// Every rate kernel of a mechanism and the barriers between them.
#[derive(Debug, Clone)]
pub struct RatePlan {
    pub kernels: Vec<RateKernel>,
    pub barriers: Vec<RateBarrier>,
}

impl RatePlan {
    pub fn kernel(&self, name: &str) -> Option<&RateKernel> {
        self.kernels.iter().find(|k| k.name == name)
    }

    /// Names of the non-empty kernels whose names start with `prefix`.
    fn writers(&self, prefix: &str) -> Vec<String> {
        self.kernels
            .iter()
            .filter(|k| k.name.starts_with(prefix) && !k.indices.is_empty())
            .map(|k| k.name.clone())
            .collect()
    }
}

/// Builds rate kernels from a classification.
pub struct RateExpressionBuilder<'a> {
    classification: &'a Classification,
    options: &'a CodegenOptions,
    arrays: SharedArrays,
}

impl<'a> RateExpressionBuilder<'a> {
    pub fn new(classification: &'a Classification, options: &'a CodegenOptions) -> Self {
        Self {
            classification,
            options,
            arrays: SharedArrays::new(classification, options),
        }
    }

    pub fn arrays(&self) -> &SharedArrays {
        &self.arrays
    }

    /// One kernel per tier, or one branching kernel when split kernels are
    /// off. Fixed specialization has a single tier and ignores the switch.
    fn split_kernels(&self) -> bool {
        if self.classification.mode == SpecializationMode::Fixed {
            if !self.options.split_rate_kernels {
                info!("fixed specialization has one tier; split rate kernels stay on");
            }
            return true;
        }
        self.options.split_rate_kernels
    }

    /// All rate kernels in dependency order, with the barriers that keep
    /// each reader behind its writers.
    pub fn build(&self) -> Result<RatePlan> {
        let split = self.split_kernels();
        let mut kernels = Vec::new();
        kernels.extend(self.simple_kernels(split));
        kernels.push(self.plog_kernel());
        kernels.push(self.chebyshev_kernel());
        kernels.extend(self.falloff_base_kernels(split));
        kernels.push(self.third_body_kernel());
        kernels.push(self.reduced_pressure_kernel()?);
        kernels.push(self.troe_kernel());
        kernels.push(self.sri_kernel());
        kernels.push(self.lindemann_kernel());

        let mut plan = RatePlan {
            kernels,
            barriers: Vec::new(),
        };
        if plan.kernel(falloff::RED_PRES).is_some_and(|k| !k.indices.is_empty()) {
            let writers: Vec<String> = [
                arrhenius::SIMPLE,
                pressure::PLOG,
                pressure::CHEB,
                arrhenius::FALL_BASE,
                third_body::THD,
            ]
            .iter()
            .flat_map(|prefix| plan.writers(prefix))
            .collect();
            for first in writers {
                plan.barriers.push(RateBarrier {
                    first,
                    second: falloff::RED_PRES.to_string(),
                });
            }
            for second in [falloff::TROE, falloff::SRI, falloff::LIND] {
                if !plan.writers(second).is_empty() {
                    plan.barriers.push(RateBarrier {
                        first: falloff::RED_PRES.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
        debug!(
            kernels = plan.kernels.iter().filter(|k| !k.indices.is_empty()).count(),
            barriers = plan.barriers.len(),
            "built rate kernels"
        );
        Ok(plan)
    }
}
