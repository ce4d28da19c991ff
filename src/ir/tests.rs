use super::stmt::render_loopy;
use super::*;

#[test]
fn test_expr_precedence() {
    let a = Expr::var("a");
    let b = Expr::var("b");
    let c = Expr::var("c");
    assert_eq!((a.clone() + b.clone() * c.clone()).to_string(), "a + b * c");
    assert_eq!(((a.clone() + b.clone()) * c.clone()).to_string(), "(a + b) * c");
    assert_eq!((a.clone() - (b.clone() - c.clone())).to_string(), "a - (b - c)");
    assert_eq!((a.clone() - b.clone() - c.clone()).to_string(), "a - b - c");
    assert_eq!((a.clone() / (b.clone() * c.clone())).to_string(), "a / (b * c)");
    assert_eq!(
        (a.clone() + b.clone()).pow(Expr::int(2)).to_string(),
        "(a + b) ** 2"
    );
    assert_eq!((-a.clone()).pow(Expr::int(2)).to_string(), "(-a) ** 2");
    assert_eq!(Expr::float(-2.0).pow(b.clone()).to_string(), "(-2.0) ** b");
    assert_eq!(
        a.clone().lt(b.clone()).and(b.clone().le(c.clone())).to_string(),
        "a < b and b <= c"
    );
    assert_eq!((-(a.clone() + b)).to_string(), "-(a + b)");
    assert_eq!(exp(a * 2.0).to_string(), "exp(a * 2.0)");
}

#[test]
fn test_float_spelling() {
    assert_eq!(Expr::float(1.0).to_string(), "1.0");
    assert_eq!(Expr::float(1e-20).to_string(), "1e-20");
    assert_eq!(Expr::float(0.806).to_string(), "0.806");
}

#[test]
fn test_index_and_names() {
    let e = Expr::index("kf", [Expr::index("out_map", ["i"]), Expr::var("j")]) * Expr::var("T_inv");
    assert_eq!(e.to_string(), "kf[out_map[i], j] * T_inv");
    assert_eq!(e.names(), vec!["kf", "out_map", "i", "j", "T_inv"]);
}

#[test]
fn test_dep_matching() {
    let dep = Dep::parse("ind*");
    assert!(dep.matches(&InsnId("ind10".into())));
    assert!(!dep.matches(&InsnId("lo".into())));
    assert_eq!(Dep::parse("a1"), Dep::Id(InsnId("a1".into())));
    assert_eq!(dep.to_string(), "ind*");
}

#[test]
fn test_render_loopy_block() {
    let stmts: Vec<Stmt> = vec![
        temp("kf_temp", Expr::index("A", ["pos"])).with_id("kf0").into(),
        Stmt::for_each(
            "k",
            vec![Stmt::when(
                Expr::var("k").lt(abs(Expr::index("beta", ["pos"]))),
                vec![Assign::new("kf_temp", Expr::var("kf_temp") * "T_val")
                    .with_id("kf1")
                    .after("kf0:tval*")
                    .into()],
            )],
        ),
        temp_int("offset", Expr::index("thd_offset", ["pos"])).into(),
    ];
    let mut out = Vec::new();
    render_loopy(&stmts, 0, &LoopyDialect, &mut out);
    insta::assert_snapshot!(out.join("\n"), @r"
    <> kf_temp = A[pos] {id=kf0}
    for k
        if k < abs(beta[pos])
            kf_temp = kf_temp * T_val {id=kf1, dep=kf0:tval*}
        end
    end
    <int32> offset = thd_offset[pos]
    ");
}

#[test]
fn test_domain_text() {
    let d = LoopDomain::new("i", 5usize, 9usize);
    assert_eq!(d.to_string(), "5 <= i < 9");
    assert_eq!(d.to_set(), "{[i]: 5 <= i < 9}");
    assert_eq!(d.const_len(), Some(4));
    assert_eq!(LoopDomain::new("j", 0i64, "n").const_len(), None);
}

#[test]
fn test_arg_signature() {
    let kf = ArgDecl::global("kf", vec![Dim::Const(53), Dim::Param("n".into())], DType::F64);
    assert_eq!(kf.signature(), "float64[53, n]");
    assert!(kf.is_argument());
    let a = ArgDecl::constant_f64("A", vec![1.0, 2.0]);
    assert!(!a.is_argument());
    assert!(a.read_only);
    assert_eq!(ArgDecl::value("n").signature(), "int32");
}

#[test]
fn test_interpreter_loop_and_branch() {
    let stmts: Vec<Stmt> = vec![
        temp("acc", 0.0).into(),
        Stmt::for_each(
            "k",
            vec![Stmt::when_else(
                Expr::var("k").lt(2),
                vec![Assign::new("acc", Expr::var("acc") + Expr::index("x", ["k"])).into()],
                vec![Assign::new("acc", Expr::var("acc") * 10.0).into()],
            )],
        ),
        Assign::new(Expr::index("out", [0usize]), "acc").into(),
    ];
    let mut m = Machine::new();
    m.set_array("x", Array::from_data(vec![3], vec![1.5, 2.5, 100.0]));
    m.set_array("out", Array::zeros(vec![1]));
    m.exec(&stmts, &[LoopDomain::new("k", 0i64, 3i64)]).unwrap();
    assert_eq!(m.array("out").unwrap().data, vec![40.0]);
}

#[test]
fn test_interpreter_short_circuit_guard() {
    let guarded = Expr::var("k")
        .lt(1)
        .and(Expr::index("x", [Expr::var("k")]).gt(0.0));
    let mut m = Machine::new();
    m.set_array("x", Array::from_data(vec![1], vec![2.0]));
    m.set_scalar("k", 5.0);
    assert_eq!(m.eval(&guarded).unwrap(), 0.0);
    m.set_scalar("k", 0.0);
    assert_eq!(m.eval(&guarded).unwrap(), 1.0);
}

#[test]
fn test_interpreter_out_of_bounds() {
    let mut m = Machine::new();
    m.set_array("x", Array::zeros(vec![2]));
    let err = m.eval(&Expr::index("x", [Expr::int(2)])).unwrap_err();
    assert!(err.to_string().contains("out of bounds"));
}
