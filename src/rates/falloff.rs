//! Reduced pressure and falloff blending functions.
//!
//! ```text
//! Pr = [X]·k0/kinf
//! Lindemann  F = 1
//! Troe       F = Fcent^(1/(1 + (A/B)²))
//! SRI        F = (a·exp(−b/T) + exp(−T/c))^X · d·T^e
//! ```
//!
//! Falloff reactions carry their high-pressure rate in `kf` and the extra
//! low-pressure rate in `kf_fall`; chemically activated reactions swap the
//! two.

use tracing::debug;

use super::{
    at, idx, param, pos, RateExpressionBuilder, ATROE, BTROE, FCENT, FI, KF, KF_FALL, PR,
    THD_CONC, T_ARR, X_SRI,
};
use crate::error::Result;
use crate::ir::{exp, log10, temp, ArgDecl, Assign, Expr, Stmt};
use crate::kernel::{Precompute, RateKernel, BATCH_INAME};
use crate::mapping::IndexMapBuilder;

pub(super) const RED_PRES: &str = "red_pres";
pub(super) const TROE: &str = "fall_troe";
pub(super) const SRI: &str = "fall_sri";
pub(super) const LIND: &str = "fall_lind";

fn column<T>(items: &[T], f: impl Fn(&T) -> f64) -> Vec<f64> {
    items.iter().map(f).collect()
}

fn temperature() -> Expr {
    Expr::index(T_ARR, [BATCH_INAME])
}

/// `<> logPr = log10(Pr[j, idx]) {id=log_pr}`
fn log_pr() -> Stmt {
    temp("logPr", log10(at(PR, idx()))).with_id("log_pr").into()
}

impl RateExpressionBuilder<'_> {
    /// Kernel over a blending sub-family: it iterates the falloff members at
    /// `positions`, and its map points at those falloff positions.
    fn blending_kernel(&self, name: &str, positions: &[usize]) -> RateKernel {
        let members = &self.classification.falloff.members;
        let indices = positions.iter().map(|&p| members[p]).collect();
        RateKernel::new(name, indices).with_alternate(positions.to_vec())
    }

    /// `Pr[j, pos] = thd_conc[j, thd] * k0 / kinf` for every falloff member.
    pub(super) fn reduced_pressure_kernel(&self) -> Result<RateKernel> {
        let falloff = &self.classification.falloff;
        let kernel = RateKernel::new(RED_PRES, (0..falloff.len()).collect()).with_force_zero();
        if falloff.is_empty() {
            return Ok(kernel);
        }

        let mut tables = Vec::new();
        let fall_map = IndexMapBuilder::new().build("fall_map", &falloff.members, None)?;
        let kf_index = fall_map.lookup(pos(), "fall_map");
        tables.extend(fall_map.declare("fall_map"));

        let thd_index = if self.classification.falloff_needs_thd_map() {
            let thd_map = IndexMapBuilder::new()
                .with_force_explicit(true)
                .build("thd_map", &falloff.third_body_positions, None)?;
            tables.extend(thd_map.declare("thd_map"));
            thd_map.lookup(pos(), "thd_map")
        } else {
            pos()
        };

        let mut body: Vec<Stmt> = vec![
            temp("k0", at(KF_FALL, pos())).with_id("k0_fall").into(),
            temp("kinf", at(KF, kf_index.clone())).with_id("kinf_fall").into(),
        ];
        if falloff.chemically_activated.iter().any(|&c| c) {
            let codes = falloff
                .chemically_activated
                .iter()
                .map(|&c| i32::from(c))
                .collect();
            tables.push(ArgDecl::constant_i32("fall_type", codes));
            body.push(Stmt::when(
                param("fall_type").equals(1),
                vec![
                    Assign::new(Expr::var("k0"), at(KF, kf_index))
                        .with_id("k0_chem")
                        .after("k0_fall")
                        .into(),
                    Assign::new(Expr::var("kinf"), at(KF_FALL, pos()))
                        .with_id("kinf_chem")
                        .after("kinf_fall")
                        .into(),
                ],
            ));
        }
        body.push(
            Assign::new(
                at(PR, pos()),
                at(THD_CONC, thd_index) * "k0" / "kinf",
            )
            .after("k0*:kinf*")
            .into(),
        );

        debug!(
            kernel = RED_PRES,
            members = falloff.len(),
            thd_map = self.classification.falloff_needs_thd_map(),
            "built reduced-pressure kernel"
        );
        Ok(kernel
            .with_args(vec![
                self.arrays.pr(),
                self.arrays.kf().read_only(),
                self.arrays.kf_fall().read_only(),
                self.arrays.thd_conc().read_only(),
            ])
            .with_args(tables)
            .with_body(body))
    }

    pub(super) fn troe_kernel(&self) -> RateKernel {
        let troe = &self.classification.falloff.troe;
        let kernel = self.blending_kernel(TROE, &troe.positions);
        if troe.positions.is_empty() {
            return kernel;
        }

        let params = &troe.params;
        let mut tables = vec![
            ArgDecl::constant_f64("troe_a", column(params, |t| t.a)),
            ArgDecl::constant_f64("troe_T3", column(params, |t| t.t3)),
            ArgDecl::constant_f64("troe_T1", column(params, |t| t.t1)),
        ];

        let a = param("troe_a");
        let fcent = (Expr::float(1.0) - a.clone()) * exp(-temperature() / param("troe_T3"))
            + a * exp(-temperature() / param("troe_T1"));
        let mut body: Vec<Stmt> = vec![temp("Fcent_temp", fcent).with_id("fcent0").into()];
        let mut fcent_deps = "fcent0";
        if troe.params.iter().any(|t| t.t2 != 0.0) {
            tables.push(ArgDecl::constant_f64("troe_T2", column(params, |t| t.t2)));
            body.push(Stmt::when(
                param("troe_T2").not_equals(0.0),
                vec![Assign::new(
                    Expr::var("Fcent_temp"),
                    Expr::var("Fcent_temp")
                        + exp(-param("troe_T2") * Precompute::TInv.name()),
                )
                .with_id("fcent1")
                .after("fcent0")
                .into()],
            ));
            fcent_deps = "fcent*";
        }

        let blend: Vec<Stmt> = vec![
            Assign::new(at(FCENT, pos()), "Fcent_temp")
                .after(fcent_deps)
                .into(),
            temp("logFcent", log10(Expr::var("Fcent_temp")))
                .with_id("log_fcent")
                .after(fcent_deps)
                .into(),
            log_pr(),
            temp(
                "A_temp",
                Expr::var("logPr") - Expr::float(0.67) * "logFcent" - 0.4,
            )
            .with_id("a_troe")
            .after("log_*")
            .into(),
            temp(
                "B_temp",
                Expr::float(0.806) - Expr::float(1.1762) * "logFcent" - Expr::float(0.14) * "logPr",
            )
            .with_id("b_troe")
            .after("log_*")
            .into(),
            Assign::new(at(ATROE, pos()), "A_temp").after("a_troe").into(),
            Assign::new(at(BTROE, pos()), "B_temp").after("b_troe").into(),
            Assign::new(
                at(FI, idx()),
                Expr::var("Fcent_temp").pow(
                    Expr::float(1.0)
                        / (Expr::float(1.0) + (Expr::var("A_temp") / "B_temp").pow(2.0)),
                ),
            )
            .after("a_troe:b_troe")
            .into(),
        ];
        body.extend(blend);

        debug!(kernel = TROE, members = troe.positions.len(), "built Troe kernel");
        kernel
            .with_pre(&[Precompute::TInv])
            .with_args(vec![self.arrays.fi(), self.arrays.pr().read_only()])
            .with_args(self.arrays.troe().to_vec())
            .with_args(vec![self.arrays.temperature()])
            .with_args(tables)
            .with_body(body)
    }

    pub(super) fn sri_kernel(&self) -> RateKernel {
        let sri = &self.classification.falloff.sri;
        let kernel = self.blending_kernel(SRI, &sri.positions);
        if sri.positions.is_empty() {
            return kernel;
        }

        let params = &sri.params;
        let mut tables = vec![
            ArgDecl::constant_f64("sri_a", column(params, |s| s.a)),
            ArgDecl::constant_f64("sri_b", column(params, |s| s.b)),
            ArgDecl::constant_f64("sri_c", column(params, |s| s.c)),
        ];

        let base = param("sri_a") * exp(-param("sri_b") * Precompute::TInv.name())
            + exp(-temperature() / param("sri_c"));
        let mut body: Vec<Stmt> = vec![
            log_pr(),
            temp(
                "X_temp",
                Expr::float(1.0) / (Expr::float(1.0) + Expr::var("logPr") * "logPr"),
            )
            .with_id("x_sri")
            .after("log_pr")
            .into(),
            Assign::new(at(X_SRI, pos()), "X_temp").after("x_sri").into(),
            temp("Fi_temp", base.pow("X_temp"))
                .with_id("fi_base")
                .after("x_sri")
                .into(),
        ];
        // Defaults d = 1 and e = 0 make both factors exact no-ops.
        let mut last = "fi_base";
        if params.iter().any(|s| s.d != 1.0) {
            tables.push(ArgDecl::constant_f64("sri_d", column(params, |s| s.d)));
            body.push(
                Assign::new(Expr::var("Fi_temp"), Expr::var("Fi_temp") * param("sri_d"))
                    .with_id("fi_d")
                    .after(last)
                    .into(),
            );
            last = "fi_d";
        }
        if params.iter().any(|s| s.e != 0.0) {
            tables.push(ArgDecl::constant_f64("sri_e", column(params, |s| s.e)));
            body.push(
                Assign::new(
                    Expr::var("Fi_temp"),
                    Expr::var("Fi_temp") * temperature().pow(param("sri_e")),
                )
                .with_id("fi_e")
                .after(last)
                .into(),
            );
        }
        body.push(Assign::new(at(FI, idx()), "Fi_temp").after("fi_*").into());

        debug!(kernel = SRI, members = sri.positions.len(), "built SRI kernel");
        kernel
            .with_pre(&[Precompute::TInv])
            .with_args(vec![
                self.arrays.fi(),
                self.arrays.pr().read_only(),
                self.arrays.sri(),
                self.arrays.temperature(),
            ])
            .with_args(tables)
            .with_body(body)
    }

    pub(super) fn lindemann_kernel(&self) -> RateKernel {
        let positions = &self.classification.falloff.lindemann;
        let kernel = self.blending_kernel(LIND, positions);
        if positions.is_empty() {
            return kernel;
        }
        kernel
            .with_args(vec![self.arrays.fi()])
            .with_body(vec![Assign::new(at(FI, idx()), 1.0).into()])
    }
}
