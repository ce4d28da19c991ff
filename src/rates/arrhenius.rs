//! Tiered Arrhenius kernels for the simple family and the falloff base rate.

use tracing::debug;

use super::{at, idx, param, RateExpressionBuilder, T_ARR};
use crate::classify::{ArrheniusForm, ArrheniusTable, Tier};
use crate::ir::{abs, exp, temp, ArgDecl, Assign, Expr, LoopDomain, Stmt};
use crate::kernel::{Precompute, RateKernel, BATCH_INAME};

/// Prefix of the kernels writing `kf` from the simple family.
pub(super) const SIMPLE: &str = "simple";
/// Prefix of the kernels writing `kf_fall` from the falloff parameter sets.
pub(super) const FALL_BASE: &str = "fall_arrhenius";

/// Rows of an Arrhenius table evaluated by one kernel.
struct TierRows<'t> {
    table: &'t ArrheniusTable,
    rows: Vec<usize>,
}

impl TierRows<'_> {
    fn column(&self, f: impl Fn(usize) -> f64) -> Vec<f64> {
        self.rows.iter().map(|&r| f(r)).collect()
    }

    fn a(&self) -> Vec<f64> {
        self.column(|r| self.table.rates[r].a)
    }

    /// `ln A` for positive `A`; rows with negative `A` use the literal form.
    fn ln_a(&self) -> Vec<f64> {
        self.column(|r| {
            let a = self.table.rates[r].a;
            if a > 0.0 {
                a.ln()
            } else {
                0.0
            }
        })
    }

    fn beta(&self) -> Vec<f64> {
        self.column(|r| self.table.rates[r].b)
    }

    fn ta(&self) -> Vec<f64> {
        self.column(|r| self.table.rates[r].activation_temperature())
    }

    fn has_negative_a(&self) -> bool {
        self.rows.iter().any(|&r| self.table.rates[r].a < 0.0)
    }

    fn max_power(&self) -> usize {
        self.rows
            .iter()
            .map(|&r| self.table.rates[r].b.abs() as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Where a family's evaluations land.
#[derive(Clone, Copy)]
enum Target {
    /// `kf[j, reaction]`
    Reaction,
    /// `kf_fall[j, falloff position]`
    Falloff,
}

fn precomputes(form: ArrheniusForm) -> &'static [Precompute] {
    match form {
        ArrheniusForm::AOnly => &[],
        ArrheniusForm::BetaInt | ArrheniusForm::TaExp => &[Precompute::TInv],
        ArrheniusForm::BetaExp => &[Precompute::LogT],
        ArrheniusForm::Full => &[Precompute::LogT, Precompute::TInv],
    }
}

/// Closed form of an exponential tier. Negative prefactors cannot be
/// logged, so those tiers multiply a literal `A`.
fn exponential(form: ArrheniusForm, literal: bool) -> Expr {
    let beta = || param("beta") * Precompute::LogT.name();
    let ta = || param("Ta") * Precompute::TInv.name();
    if literal {
        let e = match form {
            ArrheniusForm::BetaExp => beta(),
            ArrheniusForm::TaExp => -param("Ta") * Precompute::TInv.name(),
            _ => beta() - ta(),
        };
        return param("A") * exp(e);
    }
    exp(match form {
        ArrheniusForm::BetaExp => param("lnA") + beta(),
        ArrheniusForm::TaExp => param("lnA") - ta(),
        _ => param("lnA") + beta() - ta(),
    })
}

/// `<> T_val = T_arr[j] {id=tval0}`
fn t_val() -> Stmt {
    temp("T_val", Expr::index(T_ARR, [BATCH_INAME]))
        .with_id("tval0")
        .into()
}

/// `T^b` by repeated multiplication, applied to `kf_temp`; `1/T` stands in
/// for `T` when `b < 0`.
///
/// ```text
/// if beta[pos] < 0.0
///     T_val = T_inv {id=tval1, dep=tval0}
/// end
/// for k
///     if k < abs(beta[pos])
///         kf_temp = kf_temp * T_val {id=kf_mul, dep=kf_init:tval*}
///     end
/// end
/// ```
fn integer_power() -> Vec<Stmt> {
    vec![
        Stmt::when(
            param("beta").lt(0.0),
            vec![Assign::new(Expr::var("T_val"), Precompute::TInv.name())
                .with_id("tval1")
                .after("tval0")
                .into()],
        ),
        Stmt::for_each(
            "k",
            vec![Stmt::when(
                Expr::var("k").lt(abs(param("beta"))),
                vec![Assign::new(Expr::var("kf_temp"), Expr::var("kf_temp") * "T_val")
                    .with_id("kf_mul")
                    .after("kf_init:tval*")
                    .into()],
            )],
        ),
    ]
}

impl RateExpressionBuilder<'_> {
    fn output(&self, target: Target) -> ArgDecl {
        match target {
            Target::Reaction => self.arrays.kf(),
            Target::Falloff => self.arrays.kf_fall(),
        }
    }

    fn output_at(target: Target) -> Expr {
        match target {
            Target::Reaction => at(super::KF, idx()),
            Target::Falloff => at(super::KF_FALL, idx()),
        }
    }

    /// Start a kernel over `rows` of `table`.
    fn rows_kernel(name: &str, rows: &TierRows<'_>, target: Target) -> RateKernel {
        let indices: Vec<usize> = rows.rows.iter().map(|&r| rows.table.members[r]).collect();
        let kernel = RateKernel::new(name, indices);
        match target {
            Target::Reaction => kernel,
            // Rows of the falloff base table are falloff positions.
            Target::Falloff => kernel.with_alternate(rows.rows.clone()),
        }
    }

    /// One kernel evaluating a single tier.
    fn tier_kernel(
        &self,
        name: &str,
        table: &ArrheniusTable,
        tier: Tier,
        target: Target,
    ) -> RateKernel {
        let rows = TierRows {
            table,
            rows: table.positions_of(tier),
        };
        let form = self.classification.mode.form(tier);
        let mut kernel = Self::rows_kernel(name, &rows, target);
        if rows.rows.is_empty() {
            return kernel;
        }

        let literal = rows.has_negative_a();
        let mut tables = Vec::new();
        let mut body: Vec<Stmt> = Vec::new();
        match form {
            ArrheniusForm::AOnly => {
                tables.push(ArgDecl::constant_f64("A", rows.a()));
                body.push(Assign::new(Self::output_at(target), param("A")).into());
            }
            ArrheniusForm::BetaInt => {
                tables.push(ArgDecl::constant_f64("A", rows.a()));
                tables.push(ArgDecl::constant_f64("beta", rows.beta()));
                body.push(temp("kf_temp", param("A")).with_id("kf_init").into());
                body.push(t_val());
                body.extend(integer_power());
                body.push(
                    Assign::new(Self::output_at(target), "kf_temp")
                        .after("kf_mul")
                        .into(),
                );
                kernel = kernel
                    .with_loop(LoopDomain::new("k", 0usize, rows.max_power()))
                    .with_args(vec![self.arrays.temperature()]);
            }
            _ => {
                if literal {
                    tables.push(ArgDecl::constant_f64("A", rows.a()));
                } else {
                    tables.push(ArgDecl::constant_f64("lnA", rows.ln_a()));
                }
                if form != ArrheniusForm::TaExp {
                    tables.push(ArgDecl::constant_f64("beta", rows.beta()));
                }
                if form != ArrheniusForm::BetaExp {
                    tables.push(ArgDecl::constant_f64("Ta", rows.ta()));
                }
                body.push(Assign::new(Self::output_at(target), exponential(form, literal)).into());
            }
        }

        debug!(kernel = name, %form, members = rows.rows.len(), literal, "built tier kernel");
        kernel
            .with_pre(precomputes(form))
            .with_args(vec![self.output(target)])
            .with_args(tables)
            .with_body(body)
    }

    /// One kernel branching on a per-row tier code.
    fn branching_kernel(&self, name: &str, table: &ArrheniusTable, target: Target) -> RateKernel {
        let rows = TierRows {
            table,
            rows: (0..table.len()).collect(),
        };
        let mut kernel = Self::rows_kernel(name, &rows, target);
        if rows.rows.is_empty() {
            return kernel;
        }

        let mode = self.classification.mode;
        let rtype: Vec<i32> = table.tiers.iter().map(|t| t.0 as i32).collect();
        let mut body: Vec<Stmt> = vec![temp("kf_temp", param("A")).with_id("kf_init").into()];
        let mut pre: Vec<Precompute> = Vec::new();
        let mut max_power = 0;
        for (t, &form) in mode.forms().iter().enumerate() {
            let tier = Tier(t as u8);
            let tier_rows = TierRows {
                table,
                rows: table.positions_of(tier),
            };
            if tier_rows.rows.is_empty() || form == ArrheniusForm::AOnly {
                continue;
            }
            pre.extend_from_slice(precomputes(form));
            let branch: Vec<Stmt> = match form {
                ArrheniusForm::BetaInt => {
                    max_power = max_power.max(tier_rows.max_power());
                    body.push(t_val());
                    integer_power()
                }
                _ => vec![Assign::new(
                    Expr::var("kf_temp"),
                    exponential(form, tier_rows.has_negative_a()),
                )
                .with_id(&format!("kf_tier{}", t))
                .after("kf_init")
                .into()],
            };
            body.push(Stmt::when(
                param("rtype").equals(t as i64),
                branch,
            ));
        }
        body.push(
            Assign::new(Self::output_at(target), "kf_temp")
                .with_id("store")
                .after("kf*")
                .into(),
        );

        if max_power > 0 {
            kernel = kernel
                .with_loop(LoopDomain::new("k", 0usize, max_power))
                .with_args(vec![self.arrays.temperature()]);
        }
        debug!(kernel = name, members = rows.rows.len(), "built branching kernel");
        kernel
            .with_pre(&pre)
            .with_args(vec![
                self.output(target),
                ArgDecl::constant_f64("A", rows.a()),
                ArgDecl::constant_f64("lnA", rows.ln_a()),
                ArgDecl::constant_f64("beta", rows.beta()),
                ArgDecl::constant_f64("Ta", rows.ta()),
                ArgDecl::constant_i32("rtype", rtype),
            ])
            .with_body(body)
    }

    fn arrhenius_kernels(
        &self,
        prefix: &str,
        table: &ArrheniusTable,
        target: Target,
        split: bool,
    ) -> Vec<RateKernel> {
        if !split {
            return vec![self.branching_kernel(prefix, table, target)];
        }
        let mode = self.classification.mode;
        mode.forms()
            .iter()
            .enumerate()
            .map(|(t, form)| {
                let name = format!("{}_{}", prefix, form);
                self.tier_kernel(&name, table, Tier(t as u8), target)
            })
            .collect()
    }

    /// `kf` for every elementary, third-body and falloff reaction.
    pub(super) fn simple_kernels(&self, split: bool) -> Vec<RateKernel> {
        self.arrhenius_kernels(SIMPLE, &self.classification.simple, Target::Reaction, split)
    }

    /// `kf_fall` from each falloff reaction's extra parameter set.
    pub(super) fn falloff_base_kernels(&self, split: bool) -> Vec<RateKernel> {
        self.arrhenius_kernels(
            FALL_BASE,
            &self.classification.falloff.base,
            Target::Falloff,
            split,
        )
    }
}
