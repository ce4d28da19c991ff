use super::*;
use crate::classify::ReactionClassifier;
use crate::ir::stmt::render_loopy;
use crate::ir::{Array, Initializer, LoopDomain, LoopyDialect, Machine, Stmt};
use crate::config::VectorLayout;
use crate::kernel::{vectorize, KernelAssembler, KernelDefinition};
use crate::mechanism::{
    Arrhenius, Blending, Chebyshev, Falloff, FalloffLimit, Mechanism, PlogEntry, RateLaw,
    Reaction, Sri, ThirdBody, Troe, RU,
};

const TEMPERATURES: [f64; 3] = [300.0, 1000.0, 2500.0];
const PRESSURES: [f64; 3] = [1.0e4, 101325.0, 1.0e6];

fn arr(a: f64, b: f64, ea: f64) -> Arrhenius {
    Arrhenius::new(a, b, ea)
}

fn elementary(a: f64, b: f64, ea: f64) -> Reaction {
    Reaction::new(RateLaw::Elementary { rate: arr(a, b, ea) })
}

fn mechanism(n_species: usize, reactions: Vec<Reaction>) -> Mechanism {
    let species = (0..n_species).map(|i| format!("S{}", i)).collect();
    Mechanism::new(species, reactions)
}

fn plan(mech: &Mechanism, opts: &CodegenOptions) -> (Classification, RatePlan) {
    let classification = ReactionClassifier::new(opts.specialization)
        .classify(mech)
        .unwrap();
    let plan = RateExpressionBuilder::new(&classification, opts)
        .build()
        .unwrap();
    (classification, plan)
}

fn machine(temperatures: &[f64], pressures: &[f64]) -> Machine {
    let mut m = Machine::new();
    m.set_param("n", temperatures.len() as i64);
    m.set_array(T_ARR, Array::from_data(vec![temperatures.len()], temperatures.to_vec()));
    m.set_array(P_ARR, Array::from_data(vec![pressures.len()], pressures.to_vec()));
    m
}

/// Run one kernel, allocating zeroed arrays for arguments not yet loaded.
fn run(opts: &CodegenOptions, kernel: &RateKernel, m: &mut Machine) {
    let info = KernelAssembler::new(opts)
        .assemble(kernel.clone())
        .unwrap()
        .unwrap();
    let def = KernelDefinition::from_info(&info, opts);
    for decl in def.args.iter().filter(|a| !a.is_scalar()) {
        if m.has_array(&decl.name) {
            continue;
        }
        let shape = decl
            .shape
            .iter()
            .map(|d| match d {
                Dim::Const(v) => *v,
                Dim::Param(p) => m.param(p).unwrap() as usize,
            })
            .collect();
        m.set_array(&decl.name, Array::zeros(shape));
    }
    def.execute(m).unwrap();
}

/// Run every non-empty kernel of the plan in order.
fn run_all(opts: &CodegenOptions, plan: &RatePlan, m: &mut Machine) {
    for kernel in plan.kernels.iter().filter(|k| !k.indices.is_empty()) {
        run(opts, kernel, m);
    }
}

fn value(m: &Machine, array: &str, j: usize, i: usize) -> f64 {
    m.array(array).unwrap().get(&[j, i]).unwrap()
}

fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
    let rel = ((actual - expected) / expected).abs();
    assert!(
        rel <= tol,
        "{}: got {:e}, expected {:e} (relative error {:e})",
        what,
        actual,
        expected,
        rel
    );
}

fn non_empty(plan: &RatePlan) -> Vec<&str> {
    plan.kernels
        .iter()
        .filter(|k| !k.indices.is_empty())
        .map(|k| k.name.as_str())
        .collect()
}

fn loopy_text(stmts: &[Stmt]) -> String {
    let mut out = Vec::new();
    render_loopy(stmts, 0, &LoopyDialect, &mut out);
    out.join("\n")
}

// ─── Arrhenius ─────────────────────────────────────────────────────

/// One reaction per column of the tier table, plus a negative integer
/// exponent and a negative prefactor.
fn arrhenius_mechanism() -> Mechanism {
    mechanism(
        2,
        vec![
            elementary(1.0e13, 0.0, 0.0),
            elementary(2.0e10, 2.0, 0.0),
            elementary(3.0e8, -1.0, 0.0),
            elementary(1.0e9, 0.5, 0.0),
            elementary(5.0e12, 0.0, 1.2e8),
            elementary(4.0e11, 1.5, 8.0e7),
            elementary(-2.0e9, 0.7, 4.0e7).duplicate(),
        ],
    )
}

#[test]
fn test_every_tier_matches_arrhenius() {
    let mech = arrhenius_mechanism();
    for mode in [
        SpecializationMode::Fixed,
        SpecializationMode::Hybrid,
        SpecializationMode::Full,
    ] {
        for split in [true, false] {
            let opts = CodegenOptions::default()
                .with_specialization(mode)
                .with_split_rate_kernels(split);
            let (_, plan) = plan(&mech, &opts);
            let mut m = machine(&TEMPERATURES, &PRESSURES);
            run_all(&opts, &plan, &mut m);
            for (i, reaction) in mech.reactions.iter().enumerate() {
                let rate = reaction.rate.base_rate().unwrap();
                for (j, &t) in TEMPERATURES.iter().enumerate() {
                    assert_close(
                        value(&m, KF, j, i),
                        rate.eval(t),
                        1e-12,
                        &format!("mode {} split {} reaction {} T {}", mode, split, i, t),
                    );
                }
            }
        }
    }
}

#[test]
fn test_full_mode_kernel_per_form() {
    let opts = CodegenOptions::default().with_specialization(SpecializationMode::Full);
    let (_, plan) = plan(&arrhenius_mechanism(), &opts);
    assert_eq!(
        non_empty(&plan),
        vec![
            "simple_a_only",
            "simple_beta_int",
            "simple_beta_exp",
            "simple_ta_exp",
            "simple_full"
        ]
    );
    assert_eq!(plan.kernel("simple_beta_int").unwrap().indices, vec![1, 2]);
    assert!(plan.barriers.is_empty());
}

#[test]
fn test_empty_tiers_stay_empty() {
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&mechanism(1, vec![elementary(1.0e13, 0.0, 0.0)]), &opts);
    assert_eq!(non_empty(&plan), vec!["simple_a_only"]);
    assert!(plan.kernel("simple_beta_int").unwrap().indices.is_empty());
    assert!(KernelAssembler::new(&opts)
        .assemble(plan.kernel("simple_full").unwrap().clone())
        .unwrap()
        .is_none());
}

#[test]
fn test_exponential_form_text() {
    let opts = CodegenOptions::default().with_specialization(SpecializationMode::Full);
    let (_, plan) = plan(&arrhenius_mechanism(), &opts);
    let ta = loopy_text(&plan.kernel("simple_ta_exp").unwrap().instructions);
    insta::assert_snapshot!(ta, @"kf[j, idx] = exp(lnA[pos] - Ta[pos] * T_inv)");
    let full = loopy_text(&plan.kernel("simple_full").unwrap().instructions);
    insta::assert_snapshot!(full, @"kf[j, idx] = A[pos] * exp(beta[pos] * logT - Ta[pos] * T_inv)");
}

#[test]
fn test_integer_power_uses_loop() {
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&arrhenius_mechanism(), &opts);
    let kernel = plan.kernel("simple_beta_int").unwrap();
    assert_eq!(kernel.extra_loops, vec![LoopDomain::new("k", 0usize, 2usize)]);
    let text = loopy_text(&kernel.instructions);
    assert!(text.contains("if beta[pos] < 0.0"));
    assert!(text.contains("kf_temp = kf_temp * T_val {id=kf_mul, dep=kf_init:tval*}"));
    assert!(!text.contains("exp("));
}

#[test]
fn test_single_kernel_branches_on_tier() {
    let opts = CodegenOptions::default().with_split_rate_kernels(false);
    let (classification, plan) = plan(&arrhenius_mechanism(), &opts);
    assert_eq!(non_empty(&plan), vec!["simple"]);
    let kernel = plan.kernel("simple").unwrap();
    let rtype = kernel.args.iter().find(|a| a.name == "rtype").unwrap();
    let expected: Vec<i32> = classification.simple.tiers.iter().map(|t| t.0 as i32).collect();
    assert_eq!(rtype.initializer, Some(Initializer::I32(expected)));
    let text = loopy_text(&kernel.instructions);
    assert!(text.contains("if rtype[pos] == 1"));
    assert!(text.contains("if rtype[pos] == 2"));
    assert!(!text.contains("rtype[pos] == 0"));
}

#[test]
fn test_fixed_mode_keeps_split_kernels() {
    let opts = CodegenOptions::default()
        .with_specialization(SpecializationMode::Fixed)
        .with_split_rate_kernels(false);
    let (_, plan) = plan(&arrhenius_mechanism(), &opts);
    assert_eq!(non_empty(&plan), vec!["simple_full"]);
}

// ─── Pressure-log ──────────────────────────────────────────────────

fn plog_entries() -> Vec<PlogEntry> {
    vec![
        PlogEntry {
            pressure: 1.0e4,
            rate: arr(1.0e10, 0.5, 2.0e7),
        },
        PlogEntry {
            pressure: 1.0e5,
            rate: arr(4.0e11, 0.0, 5.0e7),
        },
        PlogEntry {
            pressure: 1.0e6,
            rate: arr(2.0e12, -0.5, 6.0e7),
        },
    ]
}

fn plog_mechanism(entries: Vec<PlogEntry>) -> Mechanism {
    mechanism(
        2,
        vec![
            elementary(1.0e13, 0.0, 0.0),
            Reaction::new(RateLaw::Plog { entries }),
        ],
    )
}

fn plog_at(pressures: &[f64]) -> Machine {
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&plog_mechanism(plog_entries()), &opts);
    let mut m = machine(&TEMPERATURES, pressures);
    run(&opts, plan.kernel("plog").unwrap(), &mut m);
    m
}

#[test]
fn test_plog_reproduces_breakpoints() {
    let entries = plog_entries();
    let pressures: Vec<f64> = entries.iter().map(|e| e.pressure).collect();
    let m = plog_at(&pressures);
    for (j, entry) in entries.iter().enumerate() {
        assert_close(
            value(&m, KF, j, 1),
            entry.rate.eval(TEMPERATURES[j]),
            1e-12,
            &format!("breakpoint {}", j),
        );
    }
}

#[test]
fn test_plog_interpolates_in_log_pressure() {
    let entries = plog_entries();
    let midpoint = (entries[0].pressure * entries[1].pressure).sqrt();
    let m = plog_at(&[midpoint, midpoint, midpoint]);
    for (j, &t) in TEMPERATURES.iter().enumerate() {
        let expected = (entries[0].rate.eval(t) * entries[1].rate.eval(t)).sqrt();
        assert_close(value(&m, KF, j, 1), expected, 1e-10, "geometric mean");
    }
}

#[test]
fn test_plog_clamps_outside_table() {
    let entries = plog_entries();
    let m = plog_at(&[10.0, 1.0e9, 1.0e3]);
    let t = TEMPERATURES;
    assert_close(value(&m, KF, 0, 1), entries[0].rate.eval(t[0]), 1e-12, "below");
    assert_close(value(&m, KF, 1, 1), entries[2].rate.eval(t[1]), 1e-12, "above");
    assert_close(value(&m, KF, 2, 1), entries[0].rate.eval(t[2]), 1e-12, "below");
}

#[test]
fn test_single_entry_plog_is_pressure_independent() {
    let entry = plog_entries()[1];
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&plog_mechanism(vec![entry]), &opts);
    let mut m = machine(&TEMPERATURES, &PRESSURES);
    run(&opts, plan.kernel("plog").unwrap(), &mut m);
    for (j, &t) in TEMPERATURES.iter().enumerate() {
        assert_close(value(&m, KF, j, 1), entry.rate.eval(t), 1e-12, "single entry");
    }
}

#[test]
fn test_plog_widens_private_arrays_under_deep_vectorization() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 4);
    let (_, plan) = plan(&plog_mechanism(plog_entries()), &opts);
    let info = KernelAssembler::new(&opts)
        .assemble(plan.kernel("plog").unwrap().clone())
        .unwrap()
        .unwrap();
    assert!(!info.can_vectorize);
    let mut def = KernelDefinition::from_info(&info, &opts);
    vectorize(&mut def, &opts).unwrap();
    let low = def.declaration("low").unwrap();
    assert_eq!(low.shape, vec![Dim::Const(4), Dim::Const(4)]);
}

// ─── Chebyshev ─────────────────────────────────────────────────────

fn chebyshev(coeffs: Vec<Vec<f64>>) -> Chebyshev {
    Chebyshev {
        coeffs,
        t_min: 300.0,
        t_max: 3000.0,
        p_min: 1.0e3,
        p_max: 1.0e7,
    }
}

/// Direct summation with `T_n(x) = cos(n·acos(x))`.
fn chebyshev_reference(c: &Chebyshev, t: f64, p: f64) -> f64 {
    let t_red = (2.0 / t - 1.0 / c.t_min - 1.0 / c.t_max) / (1.0 / c.t_max - 1.0 / c.t_min);
    let p_red = (2.0 * p.log10() - c.p_min.log10() - c.p_max.log10())
        / (c.p_max.log10() - c.p_min.log10());
    let cheb = |n: usize, x: f64| (n as f64 * x.acos()).cos();
    let mut sum = 0.0;
    for (m, row) in c.coeffs.iter().enumerate() {
        for (k, &coeff) in row.iter().enumerate() {
            sum += coeff * cheb(m, t_red) * cheb(k, p_red);
        }
    }
    10f64.powf(sum)
}

#[test]
fn test_chebyshev_matches_direct_sum() {
    let params = [
        chebyshev(vec![
            vec![8.2, 0.35, -0.05],
            vec![-0.9, 0.21, 0.03],
            vec![0.12, -0.07, 0.01],
        ]),
        chebyshev(vec![vec![6.1, 0.4, -0.1, 0.02], vec![-1.3, 0.15, 0.05, -0.01]]),
    ];
    let mech = mechanism(
        2,
        params
            .iter()
            .map(|c| Reaction::new(RateLaw::Chebyshev(c.clone())))
            .collect(),
    );
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&mech, &opts);
    let kernel = plan.kernel("cheb").unwrap();
    assert!(kernel
        .extra_loops
        .contains(&LoopDomain::new("p", 2usize, 4usize)));

    let temperatures = [500.0, 1200.0, 2400.0];
    let pressures = [5.0e3, 1.0e5, 3.0e6];
    let mut m = machine(&temperatures, &pressures);
    run(&opts, kernel, &mut m);
    for (i, c) in params.iter().enumerate() {
        for j in 0..3 {
            assert_close(
                value(&m, KF, j, i),
                chebyshev_reference(c, temperatures[j], pressures[j]),
                1e-10,
                &format!("reaction {} condition {}", i, j),
            );
        }
    }
}

// ─── Third bodies ──────────────────────────────────────────────────

fn third_body(tb: ThirdBody) -> Reaction {
    Reaction::new(RateLaw::ThirdBody {
        rate: arr(1.0e12, 0.0, 0.0),
        third_body: tb,
    })
}

/// Concentrations consistent with the ideal-gas total `P/(R·T)`.
fn concentrations(fractions: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut conc = Vec::new();
    let mut totals = Vec::new();
    for (&t, &p) in TEMPERATURES.iter().zip(PRESSURES.iter()) {
        let total = p / (RU * t);
        totals.push(total);
        conc.extend(fractions.iter().map(|f| f * total));
    }
    (conc, totals)
}

#[test]
fn test_third_body_concentration() {
    let explicit = vec![(0, 2.0), (2, 0.5)];
    let mech = mechanism(
        3,
        vec![
            third_body(ThirdBody::Mix {
                efficiencies: explicit.clone(),
            }),
            third_body(ThirdBody::Unity),
            third_body(ThirdBody::Species { species: 1 }),
            third_body(ThirdBody::Mix {
                efficiencies: vec![(1, 3.0)],
            }),
        ],
    );
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&mech, &opts);
    let fractions = [0.2, 0.3, 0.5];
    let (conc, totals) = concentrations(&fractions);
    let mut m = machine(&TEMPERATURES, &PRESSURES);
    m.set_array(CONC, Array::from_data(vec![3, 3], conc.clone()));
    run(&opts, plan.kernel("thd").unwrap(), &mut m);

    let efficiency = |list: &[(usize, f64)], sp: usize| {
        list.iter().find(|&&(s, _)| s == sp).map_or(1.0, |&(_, e)| e)
    };
    for j in 0..3 {
        let c = &conc[j * 3..j * 3 + 3];
        let mix: f64 = (0..3).map(|sp| efficiency(explicit.as_slice(), sp) * c[sp]).sum();
        let mix2: f64 = (0..3).map(|sp| efficiency(&[(1, 3.0)], sp) * c[sp]).sum();
        assert_close(value(&m, THD_CONC, j, 0), mix, 1e-12, "mix with last species");
        assert_close(value(&m, THD_CONC, j, 1), totals[j], 1e-12, "unity");
        assert_close(value(&m, THD_CONC, j, 2), c[1], 1e-12, "single species");
        assert_close(value(&m, THD_CONC, j, 3), mix2, 1e-12, "mix");
    }
}

// ─── Falloff ───────────────────────────────────────────────────────

const TROE: Troe = Troe {
    a: 0.6,
    t3: 100.0,
    t1: 2000.0,
    t2: 5000.0,
};

const SRI: Sri = Sri {
    a: 0.5,
    b: 200.0,
    c: 800.0,
    d: 1.2,
    e: 0.3,
};

fn falloff(rate: Arrhenius, limit: FalloffLimit, blending: Blending, tb: ThirdBody) -> Reaction {
    Reaction::new(RateLaw::Falloff {
        rate,
        falloff: Falloff {
            limit,
            blending,
            third_body: tb,
        },
    })
}

fn falloff_mechanism() -> Mechanism {
    mechanism(
        2,
        vec![
            elementary(1.0e13, 0.0, 0.0),
            falloff(
                arr(6.0e14, 0.0, 1.5e7),
                FalloffLimit::Low(arr(1.0e18, -1.0, 0.0)),
                Blending::Troe(TROE),
                ThirdBody::Mix {
                    efficiencies: vec![(0, 2.0)],
                },
            ),
            falloff(
                arr(2.0e16, -1.2, 0.0),
                FalloffLimit::High(arr(3.0e12, 0.3, 2.0e7)),
                Blending::Sri(SRI),
                ThirdBody::Unity,
            ),
            falloff(
                arr(1.0e13, 0.0, 0.0),
                FalloffLimit::Low(arr(5.0e16, 0.0, 0.0)),
                Blending::Lindemann,
                ThirdBody::Species { species: 1 },
            ),
        ],
    )
}

fn troe_reference(t: f64, pr: f64) -> (f64, f64) {
    let fcent = (1.0 - TROE.a) * (-t / TROE.t3).exp()
        + TROE.a * (-t / TROE.t1).exp()
        + (-TROE.t2 / t).exp();
    let log_fcent = fcent.log10();
    let c = -0.4 - 0.67 * log_fcent;
    let n = 0.75 - 1.27 * log_fcent;
    let f1 = (pr.log10() + c) / (n - 0.14 * (pr.log10() + c));
    (fcent, 10f64.powf(log_fcent / (1.0 + f1 * f1)))
}

fn sri_reference(t: f64, pr: f64) -> f64 {
    let x = 1.0 / (1.0 + pr.log10().powi(2));
    SRI.d * (SRI.a * (-SRI.b / t).exp() + (-t / SRI.c).exp()).powf(x) * t.powf(SRI.e)
}

#[test]
fn test_falloff_blending() {
    let mech = falloff_mechanism();
    let opts = CodegenOptions::default();
    let (classification, plan) = plan(&mech, &opts);
    assert!(!classification.falloff_needs_thd_map());

    let fractions = [0.4, 0.6];
    let mut conc = Vec::new();
    for (&t, &p) in TEMPERATURES.iter().zip(PRESSURES.iter()) {
        conc.extend(fractions.iter().map(|f| f * p / (RU * t)));
    }
    let mut m = machine(&TEMPERATURES, &PRESSURES);
    m.set_array(CONC, Array::from_data(vec![3, 2], conc));
    run_all(&opts, &plan, &mut m);

    let rates: Vec<(Arrhenius, Arrhenius)> = mech.reactions[1..]
        .iter()
        .map(|r| match &r.rate {
            RateLaw::Falloff { rate, falloff } => (*rate, *falloff.limit.rate()),
            _ => unreachable!(),
        })
        .collect();
    for (j, &t) in TEMPERATURES.iter().enumerate() {
        // Troe: falloff, extra set is k0.
        let (kinf, low) = rates[0];
        let pr = value(&m, THD_CONC, j, 0) * low.eval(t) / kinf.eval(t);
        assert_close(value(&m, PR, j, 0), pr, 1e-12, "troe Pr");
        let (fcent, fi) = troe_reference(t, pr);
        assert_close(value(&m, FCENT, j, 0), fcent, 1e-12, "Fcent");
        assert_close(value(&m, FI, j, 0), fi, 1e-10, "troe F");

        // SRI: chemically activated, main rate is k0.
        let (k0, high) = rates[1];
        let pr = value(&m, THD_CONC, j, 1) * k0.eval(t) / high.eval(t);
        assert_close(value(&m, PR, j, 1), pr, 1e-12, "sri Pr");
        assert_close(value(&m, FI, j, 1), sri_reference(t, pr), 1e-10, "sri F");

        assert_eq!(value(&m, FI, j, 2), 1.0);
    }
}

#[test]
fn test_falloff_barriers() {
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&falloff_mechanism(), &opts);
    let pairs: Vec<(&str, &str)> = plan
        .barriers
        .iter()
        .map(|b| (b.first.as_str(), b.second.as_str()))
        .collect();
    assert!(pairs.contains(&("simple_a_only", "red_pres")));
    assert!(pairs.contains(&("thd", "red_pres")));
    assert!(pairs.contains(&("red_pres", "fall_troe")));
    assert!(pairs.contains(&("red_pres", "fall_sri")));
    assert!(pairs.contains(&("red_pres", "fall_lind")));
    assert!(pairs
        .iter()
        .any(|(first, _)| first.starts_with("fall_arrhenius")));
    assert!(pairs
        .iter()
        .all(|&(first, second)| first == "red_pres" || second == "red_pres"));
}

#[test]
fn test_falloff_reads_third_body_through_map() {
    let mech = mechanism(
        2,
        vec![
            third_body(ThirdBody::Unity),
            falloff(
                arr(1.0e13, 0.0, 0.0),
                FalloffLimit::Low(arr(5.0e16, 0.0, 0.0)),
                Blending::Lindemann,
                ThirdBody::Species { species: 0 },
            ),
        ],
    );
    let opts = CodegenOptions::default();
    let (classification, plan) = plan(&mech, &opts);
    assert!(classification.falloff_needs_thd_map());
    let red_pres = plan.kernel("red_pres").unwrap();
    assert!(red_pres.args.iter().any(|a| a.name == "thd_map"));

    let mut conc = Vec::new();
    for (&t, &p) in TEMPERATURES.iter().zip(PRESSURES.iter()) {
        conc.extend([0.25 * p / (RU * t), 0.75 * p / (RU * t)]);
    }
    let mut m = machine(&TEMPERATURES, &PRESSURES);
    m.set_array(CONC, Array::from_data(vec![3, 2], conc.clone()));
    run_all(&opts, &plan, &mut m);
    for (j, &t) in TEMPERATURES.iter().enumerate() {
        let expected = conc[j * 2] * 5.0e16 / 1.0e13;
        assert_close(value(&m, PR, j, 0), expected, 1e-12, "mapped Pr");
        assert_close(value(&m, THD_CONC, j, 0), PRESSURES[j] / (RU * t), 1e-12, "unity");
    }
}

#[test]
fn test_no_falloff_no_barriers() {
    let opts = CodegenOptions::default();
    let (_, plan) = plan(&plog_mechanism(plog_entries()), &opts);
    assert!(plan.barriers.is_empty());
    assert_eq!(non_empty(&plan), vec!["simple_a_only", "plog"]);
}
