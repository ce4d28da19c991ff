//! Pressure-log interpolation and Chebyshev polynomial kernels.

use tracing::debug;

use super::{at, idx, RateExpressionBuilder, KF};
use crate::ir::{
    exp, exp10, temp, temp_int, ArgDecl, Assign, DType, Dim, Expr, Initializer, LoopDomain, Stmt,
};
use crate::kernel::{Precompute, RateKernel, VectorFixup, POSITION_VAR};
use crate::mechanism::PlogEntry;

pub(super) const PLOG: &str = "plog";
pub(super) const CHEB: &str = "cheb";

/// Rows of `plog_params`: `ln P`, `ln A`, `b`, `Ta`.
const PLOG_ROWS: usize = 4;

/// `plog_params[row, pos, k]`
fn plog_param(row: usize, k: impl Into<Expr>) -> Expr {
    Expr::index("plog_params", [Expr::from(row), Expr::var(POSITION_VAR), k.into()])
}

fn pos_param(name: &str, k: impl Into<Expr>) -> Expr {
    Expr::index(name, [Expr::var(POSITION_VAR), k.into()])
}

/// Breakpoints of one reaction, at least two of them. A single entry is
/// repeated a decade higher in pressure so the bracket is always a pair.
fn breakpoints(entries: &[PlogEntry]) -> Vec<PlogEntry> {
    let mut points = entries.to_vec();
    if let [only] = entries {
        points.push(PlogEntry {
            pressure: only.pressure * 10.0,
            rate: only.rate,
        });
    }
    points
}

/// `[ln P, ln A, b, Ta]` rows for every reaction, each padded to `width`
/// with its last breakpoint.
fn plog_table(tables: &[Vec<PlogEntry>], width: usize) -> Vec<f64> {
    let mut values = vec![0.0; PLOG_ROWS * tables.len() * width];
    for (r, entries) in tables.iter().enumerate() {
        for k in 0..width {
            let Some(entry) = entries.get(k).or_else(|| entries.last()) else {
                continue;
            };
            let row = [
                entry.pressure.ln(),
                entry.rate.a.ln(),
                entry.rate.b,
                entry.rate.activation_temperature(),
            ];
            for (m, value) in row.into_iter().enumerate() {
                values[(m * tables.len() + r) * width + k] = value;
            }
        }
    }
    values
}

/// `2·x·p[n-1] - p[n-2]`
fn recurrence(poly: &str, x: &str) -> Expr {
    Expr::float(2.0) * x * Expr::index(poly, [Expr::var("p") - 1])
        - Expr::index(poly, [Expr::var("p") - 2])
}

impl RateExpressionBuilder<'_> {
    /// Log-linear interpolation in pressure between the two breakpoints
    /// bracketing `ln P`, clamped to the table range.
    ///
    /// ```text
    /// <int32> lo_ind = 0 {id=lo0}
    /// <int32> hi_ind = 1 {id=hi0}
    /// for k
    ///     if logP > plog_params[0, pos, k] and logP <= plog_params[0, pos, k + 1]
    ///         lo_ind = k {id=lo1, dep=lo0}
    ///         hi_ind = k + 1 {id=hi1, dep=hi0}
    ///     end
    /// end
    /// ...
    /// <> kf_temp = logk1 + (logk2 - logk1) * (logP_c - low[0]) / (high[0] - low[0])
    /// kf[j, idx] = exp(kf_temp)
    /// ```
    pub(super) fn plog_kernel(&self) -> RateKernel {
        let plog = &self.classification.plog;
        let kernel = RateKernel::new(PLOG, plog.members.clone());
        if plog.members.is_empty() {
            return kernel;
        }

        let tables: Vec<Vec<PlogEntry>> = plog.tables.iter().map(|t| breakpoints(t)).collect();
        let width = tables.iter().map(Vec::len).max().unwrap_or(2).max(2);
        let counts: Vec<i32> = tables.iter().map(|t| t.len() as i32).collect();
        let params = ArgDecl::constant(
            "plog_params",
            vec![PLOG_ROWS, tables.len(), width],
            Initializer::F64(plog_table(&tables, width)),
        );

        let log_p = Precompute::LogP.name();
        let last = Expr::index("plog_num", [POSITION_VAR]) - 1;
        let mut body: Vec<Stmt> = vec![
            temp_int("lo_ind", 0i64).with_id("lo0").into(),
            temp_int("hi_ind", 1i64).with_id("hi0").into(),
            Stmt::for_each(
                "k",
                vec![Stmt::when(
                    Expr::var(log_p)
                        .gt(plog_param(0, "k"))
                        .and(Expr::var(log_p).le(plog_param(0, Expr::var("k") + 1))),
                    vec![
                        Assign::new(Expr::var("lo_ind"), "k")
                            .with_id("lo1")
                            .after("lo0")
                            .into(),
                        Assign::new(Expr::var("hi_ind"), Expr::var("k") + 1)
                            .with_id("hi1")
                            .after("hi0")
                            .into(),
                    ],
                )],
            ),
            Stmt::when(
                Expr::var(log_p).gt(plog_param(0, last.clone())),
                vec![
                    Assign::new(Expr::var("lo_ind"), last.clone() - 1)
                        .with_id("lo2")
                        .after("lo1")
                        .into(),
                    Assign::new(Expr::var("hi_ind"), last)
                        .with_id("hi2")
                        .after("hi1")
                        .into(),
                ],
            ),
        ];

        // Clamp into the bracket so out-of-range pressures reuse the
        // boundary rate.
        body.push(temp("logP_c", log_p).with_id("clamp0").into());
        body.push(Stmt::when(
            Expr::var("logP_c").lt(plog_param(0, "lo_ind")),
            vec![Assign::new(Expr::var("logP_c"), plog_param(0, "lo_ind"))
                .with_id("clamp1")
                .after("clamp0:lo*")
                .into()],
        ));
        body.push(Stmt::when(
            Expr::var("logP_c").gt(plog_param(0, "hi_ind")),
            vec![Assign::new(Expr::var("logP_c"), plog_param(0, "hi_ind"))
                .with_id("clamp2")
                .after("clamp1:hi*")
                .into()],
        ));

        let m_at = |ind: &str| {
            Expr::index(
                "plog_params",
                [Expr::var("m"), Expr::var(POSITION_VAR), Expr::var(ind)],
            )
        };
        body.push(Stmt::for_each(
            "m",
            vec![
                Assign::new(Expr::index("low", ["m"]), m_at("lo_ind"))
                    .with_id("fill_lo")
                    .after("lo*")
                    .into(),
                Assign::new(Expr::index("high", ["m"]), m_at("hi_ind"))
                    .with_id("fill_hi")
                    .after("hi*")
                    .into(),
            ],
        ));

        let log_k = |arr: &str| {
            Expr::index(arr, [1usize])
                + Expr::index(arr, [2usize]) * Precompute::LogT.name()
                - Expr::index(arr, [3usize]) * Precompute::TInv.name()
        };
        let p_lo = Expr::index("low", [0usize]);
        let p_hi = Expr::index("high", [0usize]);
        body.push(temp("logk1", log_k("low")).with_id("logk1").after("fill_lo").into());
        body.push(temp("logk2", log_k("high")).with_id("logk2").after("fill_hi").into());
        body.push(
            temp(
                "kf_temp",
                Expr::var("logk1")
                    + (Expr::var("logk2") - "logk1") * (Expr::var("logP_c") - p_lo.clone())
                        / (p_hi - p_lo),
            )
            .with_id("kf_interp")
            .after("logk*:clamp*")
            .into(),
        );
        body.push(
            Assign::new(at(KF, idx()), exp(Expr::var("kf_temp")))
                .after("kf_interp")
                .into(),
        );

        debug!(kernel = PLOG, members = tables.len(), breakpoints = width, "built pressure-log kernel");
        kernel
            .with_pre(&[Precompute::LogP, Precompute::LogT, Precompute::TInv])
            .with_loop(LoopDomain::new("k", 0usize, width - 1))
            .with_loop(LoopDomain::new("m", 0usize, PLOG_ROWS))
            .with_args(vec![
                self.arrays.kf(),
                params,
                ArgDecl::constant_i32("plog_num", counts),
                ArgDecl::private("low", vec![Dim::Const(PLOG_ROWS)], DType::F64),
                ArgDecl::private("high", vec![Dim::Const(PLOG_ROWS)], DType::F64),
            ])
            .with_body(body)
            .with_fixup(VectorFixup::WidenPrivateArrays)
    }

    /// Bivariate Chebyshev expansion in reduced inverse temperature and
    /// reduced log pressure, `kf = 10^Σ c[m, k]·T_m(Tred)·T_k(Pred)`.
    pub(super) fn chebyshev_kernel(&self) -> RateKernel {
        let cheb = &self.classification.cheb;
        let mut kernel = RateKernel::new(CHEB, cheb.members.clone());
        if cheb.members.is_empty() {
            return kernel;
        }

        let n = cheb.params.len();
        let max_t = cheb.params.iter().map(|c| c.n_temperature()).max().unwrap_or(1);
        let max_p = cheb.params.iter().map(|c| c.n_pressure()).max().unwrap_or(1);
        let degree = max_t.max(max_p).max(2);

        let mut coeffs = vec![0.0; n * max_t * max_p];
        let mut tlim = Vec::with_capacity(2 * n);
        let mut plim = Vec::with_capacity(2 * n);
        for (r, params) in cheb.params.iter().enumerate() {
            for (m, row) in params.coeffs.iter().enumerate() {
                for (k, &c) in row.iter().enumerate() {
                    coeffs[(r * max_t + m) * max_p + k] = c;
                }
            }
            tlim.extend([1.0 / params.t_min, 1.0 / params.t_max]);
            plim.extend([params.p_min.ln(), params.p_max.ln()]);
        }

        let reduced = |x: Expr, lim: &str| {
            let lo = pos_param(lim, 0usize);
            let hi = pos_param(lim, 1usize);
            (Expr::float(2.0) * x - (lo.clone() + hi.clone())) / (hi - lo)
        };
        let t_red = reduced(Expr::var(Precompute::TInv.name()), "cheb_tlim");
        let p_red = reduced(Expr::var(Precompute::LogP.name()), "cheb_plim");

        let mut body: Vec<Stmt> = vec![
            temp("Tred", t_red).with_id("tred").into(),
            temp("Pred", p_red).with_id("pred").into(),
            Assign::new(Expr::index("temp_poly", [0usize]), 1.0)
                .with_id("tpoly0")
                .into(),
            Assign::new(Expr::index("temp_poly", [1usize]), "Tred")
                .with_id("tpoly1")
                .after("tred")
                .into(),
            Assign::new(Expr::index("pres_poly", [0usize]), 1.0)
                .with_id("ppoly0")
                .into(),
            Assign::new(Expr::index("pres_poly", [1usize]), "Pred")
                .with_id("ppoly1")
                .after("pred")
                .into(),
        ];
        if degree > 2 {
            body.push(Stmt::for_each(
                "p",
                vec![
                    Assign::new(Expr::index("temp_poly", ["p"]), recurrence("temp_poly", "Tred"))
                        .with_id("tpoly_rec")
                        .after("tpoly0:tpoly1")
                        .into(),
                    Assign::new(Expr::index("pres_poly", ["p"]), recurrence("pres_poly", "Pred"))
                        .with_id("ppoly_rec")
                        .after("ppoly0:ppoly1")
                        .into(),
                ],
            ));
            kernel = kernel.with_loop(LoopDomain::new("p", 2usize, degree));
        }
        body.push(temp("kf_temp", 0.0).with_id("kf_init").into());
        body.push(Stmt::for_each(
            "m",
            vec![Stmt::for_each(
                "k",
                vec![Assign::new(
                    Expr::var("kf_temp"),
                    Expr::var("kf_temp")
                        + Expr::index("cheb_coeffs", ["pos", "m", "k"])
                            * Expr::index("temp_poly", ["m"])
                            * Expr::index("pres_poly", ["k"]),
                )
                .with_id("kf_sum")
                .after("kf_init:tpoly*:ppoly*")
                .into()],
            )],
        ));
        body.push(
            Assign::new(at(KF, idx()), exp10(Expr::var("kf_temp")))
                .after("kf_sum")
                .into(),
        );

        debug!(kernel = CHEB, members = n, max_t, max_p, "built Chebyshev kernel");
        kernel
            .with_pre(&[Precompute::TInv, Precompute::LogP])
            .with_loop(LoopDomain::new("m", 0usize, max_t))
            .with_loop(LoopDomain::new("k", 0usize, max_p))
            .with_args(vec![
                self.arrays.kf(),
                ArgDecl::constant("cheb_coeffs", vec![n, max_t, max_p], Initializer::F64(coeffs)),
                ArgDecl::constant("cheb_tlim", vec![n, 2], Initializer::F64(tlim)),
                ArgDecl::constant("cheb_plim", vec![n, 2], Initializer::F64(plim)),
                ArgDecl::private("temp_poly", vec![Dim::Const(degree)], DType::F64),
                ArgDecl::private("pres_poly", vec![Dim::Const(degree)], DType::F64),
            ])
            .with_body(body)
            .with_fixup(VectorFixup::WidenPrivateArrays)
    }
}
