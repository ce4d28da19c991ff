//! Effective third-body concentration.

use tracing::debug;

use super::{at, param, pos, RateExpressionBuilder, CONC, GAS_CONSTANT, P_ARR, THD_CONC, T_ARR};
use crate::classify::ThirdBodyKind;
use crate::ir::{temp, ArgDecl, Assign, Expr, LoopDomain, Stmt};
use crate::kernel::{RateKernel, BATCH_INAME};
use crate::mechanism::RU;

pub(super) const THD: &str = "thd";

impl RateExpressionBuilder<'_> {
    /// `thd_conc[j, pos] = eff_last·P/(R·T) + Σ eff'_k·conc[j, k]`.
    ///
    /// A single-species third body starts from zero and adds only its
    /// species. Unity third bodies have no corrections.
    pub(super) fn third_body_kernel(&self) -> RateKernel {
        let thd = &self.classification.third_body;
        let mut kernel = RateKernel::new(THD, (0..thd.len()).collect()).with_force_zero();
        if thd.is_empty() {
            return kernel;
        }

        let offset = || param("thd_offset") + "k";
        let total = Expr::index(P_ARR, [BATCH_INAME])
            / (Expr::var(GAS_CONSTANT) * Expr::index(T_ARR, [BATCH_INAME]));
        let mut body: Vec<Stmt> = vec![temp("thd_temp", total * param("thd_eff_last"))
            .with_id("thd_init")
            .into()];
        let mut sum_deps = String::from("thd_init");
        let species = ThirdBodyKind::Species.code();
        if thd.kinds.iter().any(|k| k.code() == species) {
            body.push(Stmt::when(
                param("thd_type").equals(species),
                vec![Assign::new(Expr::var("thd_temp"), 0.0)
                    .with_id("thd_species")
                    .after("thd_init")
                    .into()],
            ));
            sum_deps.push_str(":thd_species");
        }

        let max_count = thd.species_counts.iter().copied().max().unwrap_or(0);
        let mut args = vec![
            self.arrays.thd_conc(),
            self.arrays.pressure(),
            self.arrays.temperature(),
            ArgDecl::constant_f64("thd_eff_last", thd.eff_last.clone()),
            ArgDecl::constant_i32("thd_type", thd.kinds.iter().map(|k| k.code()).collect()),
        ];
        if max_count > 0 {
            let conc = Expr::index(
                CONC,
                [Expr::var(BATCH_INAME), Expr::index("thd_spec", [offset()])],
            );
            body.push(Stmt::for_each(
                "k",
                vec![Stmt::when(
                    Expr::var("k").lt(param("thd_count")),
                    vec![Assign::new(
                        Expr::var("thd_temp"),
                        Expr::var("thd_temp") + Expr::index("thd_eff", [offset()]) * conc,
                    )
                    .with_id("thd_sum")
                    .after(&sum_deps)
                    .into()],
                )],
            ));
            args.extend([
                self.arrays.concentrations(),
                ArgDecl::constant_i32("thd_count", to_i32(&thd.species_counts)),
                ArgDecl::constant_i32("thd_offset", to_i32(&thd.offsets)),
                ArgDecl::constant_i32("thd_spec", to_i32(&thd.species)),
                ArgDecl::constant_f64("thd_eff", thd.efficiencies.clone()),
            ]);
            kernel = kernel.with_loop(LoopDomain::new("k", 0usize, max_count));
        }
        body.push(
            Assign::new(at(THD_CONC, pos()), "thd_temp")
                .after("thd_*")
                .into(),
        );

        debug!(kernel = THD, members = thd.len(), max_count, "built third-body kernel");
        kernel
            .with_parameter(GAS_CONSTANT, RU)
            .with_args(args)
            .with_body(body)
    }
}

fn to_i32(values: &[usize]) -> Vec<i32> {
    values.iter().map(|&v| v as i32).collect()
}
