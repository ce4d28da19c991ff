use super::lower::{create_kernel_lowering, CLowering, KernelLowering, LoopyLowering, OpenClLowering};
use super::*;
use crate::config::{Lang, ProblemSize, VectorLayout};
use crate::ir::stmt::for_each_read;
use crate::ir::{Assign, Expr};

fn kf_arg(opts: &CodegenOptions) -> ArgDecl {
    ArgDecl::global("kf", vec![opts.problem_size.dim(), Dim::Const(10)], DType::F64)
}

/// `kf[j, idx] = A[pos]` over `indices`.
fn copy_kernel(opts: &CodegenOptions, indices: Vec<usize>) -> RateKernel {
    let values: Vec<f64> = (1..=indices.len()).map(|v| v as f64).collect();
    RateKernel::new("simple_a_only", indices)
        .with_args(vec![kf_arg(opts), ArgDecl::constant_f64("A", values)])
        .with_body(vec![Assign::new(
            Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
            Expr::index("A", [POSITION_VAR]),
        )
        .into()])
}

fn assemble(opts: &CodegenOptions, kernel: RateKernel) -> KernelInfo {
    KernelAssembler::new(opts).assemble(kernel).unwrap().unwrap()
}

fn definition(opts: &CodegenOptions, kernel: RateKernel) -> KernelDefinition {
    let mut def = KernelDefinition::from_info(&assemble(opts, kernel), opts);
    vectorize(&mut def, opts).unwrap();
    def
}

// ─── Assembler ─────────────────────────────────────────────────────

#[test]
fn test_empty_kernel_is_omitted() {
    let opts = CodegenOptions::default();
    let out = KernelAssembler::new(&opts)
        .assemble(copy_kernel(&opts, Vec::new()))
        .unwrap();
    assert!(out.is_none());
}

#[test]
fn test_contiguous_map_prepends_position_and_index() {
    let opts = CodegenOptions::default();
    let info = assemble(&opts, copy_kernel(&opts, vec![5, 6, 7, 8]));
    assert_eq!(info.reaction_loop, LoopDomain::new("i", 5i64, 9i64));
    assert!(info.maps.is_empty());
    assert_eq!(info.instructions.len(), 3);
    let names: Vec<&str> = info.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["n", "kf", "A"]);
    assert_eq!(info.arguments().count(), 2);
    assert_eq!(
        info.assumptions,
        vec![Assumption::Positive("n".to_string())]
    );
}

#[test]
fn test_explicit_map_declares_table() {
    let opts = CodegenOptions::default();
    let info = assemble(&opts, copy_kernel(&opts, vec![1, 3, 7]));
    assert_eq!(info.reaction_loop, LoopDomain::new("i", 0i64, 3i64));
    assert_eq!(info.maps.len(), 1);
    let table = info.arg(MAP_NAME).unwrap();
    assert_eq!(table.initializer, Some(crate::ir::Initializer::I32(vec![1, 3, 7])));
    assert!(!table.is_argument());
}

#[test]
fn test_position_only_kernel_has_no_index() {
    let opts = CodegenOptions::default();
    let kernel = RateKernel::new("fall_lind", vec![2, 4])
        .with_args(vec![kf_arg(&opts)])
        .with_body(vec![Assign::new(
            Expr::index("kf", [Expr::var(BATCH_INAME), Expr::var(POSITION_VAR)]),
            1.0,
        )
        .into()]);
    let info = assemble(&opts, kernel);
    assert_eq!(info.instructions.len(), 2);
    assert!(info.maps.is_empty());
    assert!(info.arg(MAP_NAME).is_none());
}

#[test]
fn test_precomputes_are_shared_and_sorted() {
    let opts = CodegenOptions::default();
    let kernel = copy_kernel(&opts, vec![0, 1]).with_pre(&[
        Precompute::LogP,
        Precompute::TInv,
        Precompute::LogT,
        Precompute::TInv,
    ]);
    let info = assemble(&opts, kernel);
    assert_eq!(info.pre.len(), 3);
    let mut out = Vec::new();
    crate::ir::stmt::render_loopy(&info.pre, 0, &crate::ir::LoopyDialect, &mut out);
    assert_eq!(
        out,
        vec![
            "<> T_inv = 1.0 / T_arr[j]",
            "<> logT = log(T_arr[j])",
            "<> logP = log(P_arr[j])",
        ]
    );
    let names: Vec<&str> = info.arguments().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["n", "T_arr", "P_arr", "kf"]);
    assert!(info.arg("T_arr").unwrap().read_only);
}

#[test]
fn test_lane_width_adds_divisibility() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Wide, 4);
    let info = assemble(&opts, copy_kernel(&opts, vec![0, 1]));
    let text: Vec<String> = info.assumptions.iter().map(|a| a.to_string()).collect();
    assert_eq!(text, vec!["n > 0", "n mod 4 = 0"]);

    let fixed = CodegenOptions::default().with_problem_size(ProblemSize::Fixed(16));
    let info = assemble(&fixed, copy_kernel(&fixed, vec![0, 1]));
    assert!(info.assumptions.is_empty());
    assert!(info.arg("n").is_none());
}

#[test]
fn test_unknown_dependency_is_malformed() {
    let opts = CodegenOptions::default();
    let kernel = copy_kernel(&opts, vec![0, 1]).with_body(vec![Assign::new(
        Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
        Expr::index("A", [POSITION_VAR]),
    )
    .after("kf_temp*")
    .into()]);
    let err = KernelAssembler::new(&opts).assemble(kernel).unwrap_err();
    assert!(
        matches!(&err, Error::MalformedKernel { kernel, message }
            if kernel == "simple_a_only" && message.contains("kf_temp*")),
        "{}",
        err
    );
}

#[test]
fn test_prefix_dependency_matches() {
    let opts = CodegenOptions::default();
    let kernel = copy_kernel(&opts, vec![0, 1]).with_body(vec![
        temp("kf_temp", Expr::index("A", [POSITION_VAR]))
            .with_id("kf_temp0")
            .into(),
        Assign::new(Expr::index("kf", [BATCH_INAME, TARGET_VAR]), Expr::var("kf_temp"))
            .after("kf_temp*:map_idx")
            .into(),
    ]);
    assert!(KernelAssembler::new(&opts).assemble(kernel).is_ok());
}

#[test]
fn test_undeclared_name_is_malformed() {
    let opts = CodegenOptions::default();
    let kernel = copy_kernel(&opts, vec![0, 1]).with_body(vec![Assign::new(
        Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
        Expr::index("B", [POSITION_VAR]),
    )
    .into()]);
    let err = KernelAssembler::new(&opts).assemble(kernel).unwrap_err();
    assert!(err.to_string().contains("'B' is not declared"), "{}", err);
}

#[test]
fn test_conflicting_argument_in_one_kernel() {
    let opts = CodegenOptions::default();
    let kernel = copy_kernel(&opts, vec![0, 1]).with_args(vec![ArgDecl::global(
        "kf",
        vec![opts.problem_size.dim()],
        DType::F64,
    )]);
    assert!(matches!(
        KernelAssembler::new(&opts).assemble(kernel),
        Err(Error::ArgumentConflict { .. })
    ));
}

#[test]
fn test_execute_contiguous_kernel() {
    let opts = CodegenOptions::default();
    let def = KernelDefinition::from_info(&assemble(&opts, copy_kernel(&opts, vec![5, 6, 7, 8])), &opts);
    let mut machine = Machine::new();
    machine.set_param("n", 2);
    machine.set_array("kf", Array::zeros(vec![2, 10]));
    def.execute(&mut machine).unwrap();
    let kf = machine.array("kf").unwrap();
    assert_eq!(kf.get(&[0, 5]), Some(1.0));
    assert_eq!(kf.get(&[1, 7]), Some(3.0));
    assert_eq!(kf.get(&[1, 4]), Some(0.0));
    assert_eq!(def.written_args(), vec!["kf"]);
}

#[test]
fn test_execute_explicit_kernel() {
    let opts = CodegenOptions::default();
    let def = KernelDefinition::from_info(&assemble(&opts, copy_kernel(&opts, vec![9, 2, 4])), &opts);
    let mut machine = Machine::new();
    machine.set_param("n", 1);
    machine.set_array("kf", Array::zeros(vec![1, 10]));
    def.execute(&mut machine).unwrap();
    let kf = machine.array("kf").unwrap();
    assert_eq!(kf.get(&[0, 9]), Some(1.0));
    assert_eq!(kf.get(&[0, 2]), Some(2.0));
    assert_eq!(kf.get(&[0, 4]), Some(3.0));
}

// ─── Vectorization ─────────────────────────────────────────────────

#[test]
fn test_wide_splits_batch_loop() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Wide, 4);
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert_eq!(def.plan.lane_iname(), Some("j_inner"));
    assert_eq!(
        def.plan.transforms(),
        vec!["split_iname(j, 4, inner_tag=l.0, outer_tag=g.0)"]
    );
}

#[test]
fn test_deep_splits_reaction_loop() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 8);
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert_eq!(def.plan.lane_iname(), Some("i_inner"));
    assert_eq!(def.plan.tag_of(BATCH_INAME), Some(LoopTag::Group));
    assert_eq!(
        def.plan.transforms(),
        vec!["split_iname(i, 8, inner_tag=l.0)", "tag_inames(j: g.0)"]
    );
}

#[test]
fn test_unroll_and_ilp() {
    let mut opts = CodegenOptions::default().with_lang(Lang::C);
    opts.unroll = Some(2);
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert_eq!(def.plan.transforms(), vec!["split_iname(i, 2, inner_tag=unr)"]);
    let c = CLowering::new().lower(&def);
    assert!(c.contains("        #pragma GCC unroll 2\n        for (int i = 0; i < 2; ++i)"));

    let mut opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 4);
    opts.unroll = Some(2);
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert!(def
        .plan
        .transforms()
        .contains(&"split_iname(i_outer, 2, inner_tag=unr)".to_string()));

    let mut opts = CodegenOptions::default().with_lang(Lang::C);
    opts.ilp = true;
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert_eq!(def.plan.transforms(), vec!["tag_inames(i: ilp)"]);
}

/// A kernel staging its rate through a private array.
fn staged_kernel(opts: &CodegenOptions) -> RateKernel {
    copy_kernel(opts, vec![0, 1, 2, 3])
        .with_args(vec![ArgDecl::private("low", vec![Dim::Const(2)], DType::F64)])
        .with_body(vec![
            Assign::new(Expr::index("low", [0]), Expr::index("A", [POSITION_VAR])).into(),
            Assign::new(
                Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
                Expr::index("low", [0]),
            )
            .into(),
        ])
}

#[test]
fn test_private_arrays_need_fixup() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 4);
    let info = assemble(&opts, staged_kernel(&opts));
    assert!(info.can_vectorize);

    let mut kernel = staged_kernel(&opts);
    kernel.fixup = None;
    let mut info = assemble(&opts, kernel);
    info.can_vectorize = false;
    let mut def = KernelDefinition::from_info(&info, &opts);
    match vectorize(&mut def, &opts) {
        Err(Error::Vectorization { kernel, .. }) => assert_eq!(kernel, "simple_a_only"),
        other => panic!("expected a vectorization error, got {:?}", other),
    }

    // Without lanes nothing needs fixing.
    let plain = CodegenOptions::default();
    let mut def = KernelDefinition::from_info(&info, &plain);
    assert!(vectorize(&mut def, &plain).is_ok());
}

#[test]
fn test_fixup_widens_private_arrays() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 4);
    let kernel = staged_kernel(&opts).with_fixup(VectorFixup::WidenPrivateArrays);
    let def = definition(&opts, kernel);
    assert!(def.can_vectorize);
    let low = def.declaration("low").unwrap();
    assert_eq!(low.shape, vec![Dim::Const(4), Dim::Const(2)]);

    let mut lane_indexed = 0;
    for_each_read(&def.body, &mut |e| {
        if let Expr::Index { array, indices } = e {
            if array == "low" {
                assert_eq!(indices[0], Expr::var("i_inner"));
                lane_indexed += 1;
            }
        }
    });
    assert_eq!(lane_indexed, 1);

    let cl = OpenClLowering::new().lower(&def);
    assert!(cl.contains("double low[8];"));
    assert!(cl.contains("low[i_inner * 2 + 0] = simple_a_only_A[pos];"));
}

fn accumulating_kernel(opts: &CodegenOptions) -> RateKernel {
    copy_kernel(opts, vec![0, 1, 2, 3])
        .with_accumulator("kf")
        .with_body(vec![Assign::new(
            Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
            Expr::index("kf", [BATCH_INAME, TARGET_VAR]) + Expr::index("A", [POSITION_VAR]),
        )
        .into()])
}

#[test]
fn test_deep_accumulation_uses_atomics() {
    let opts = CodegenOptions::default()
        .with_vector(VectorLayout::Deep, 2)
        .with_atomics(true);
    let def = definition(&opts, accumulating_kernel(&opts));
    let cl = OpenClLowering::new();
    let source = cl.lower(&def);
    assert!(source.contains("atomic_add_f64(&kf[j * 10 + idx], simple_a_only_A[pos]);"));
    assert!(cl.preamble(&[&def]).contains("atom_cmpxchg"));
    assert!(source.contains("int const j = get_group_id(0);"));
    assert!(source.contains("int const i_inner = get_local_id(0);"));
    assert!(source.contains("for (int i_outer = 0; i_outer < 2; ++i_outer)"));
    assert!(source.contains("int const i = 0 + i_outer * 2 + i_inner;"));
}

#[test]
fn test_deep_accumulation_without_atomics_is_sequential() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Deep, 2);
    let def = definition(&opts, accumulating_kernel(&opts));
    assert_eq!(
        def.plan.split_of(REACTION_INAME).unwrap().inner_tag,
        LoopTag::Sequential
    );
    let source = OpenClLowering::new().lower(&def);
    assert!(!source.contains("atomic_add_f64"));
    assert!(source.contains("int const i_inner = 0;"));
    assert!(!OpenClLowering::new().preamble(&[&def]).contains("atom_cmpxchg"));
}

#[test]
fn test_wide_accumulation_needs_no_atomics() {
    let opts = CodegenOptions::default().with_vector(VectorLayout::Wide, 2);
    let def = definition(&opts, accumulating_kernel(&opts));
    let source = OpenClLowering::new().lower(&def);
    assert!(!source.contains("atomic_add_f64"));
    assert!(source.contains("int const j = get_group_id(0) * 2 + j_inner;"));
}

// ─── Lowering ──────────────────────────────────────────────────────

#[test]
fn test_create_kernel_lowering() {
    for (name, target) in [
        ("loopy", "loopy"),
        ("ir", "loopy"),
        ("c", "c"),
        ("opencl", "opencl"),
        ("cl", "opencl"),
    ] {
        assert_eq!(create_kernel_lowering(name).unwrap().target_name(), target);
    }
    assert!(create_kernel_lowering("cuda").is_none());
    assert_eq!(lower::lowering_for(Lang::C).target_name(), "c");
}

#[test]
fn test_loopy_kernel_text() {
    let opts = CodegenOptions::default().with_lang(Lang::C);
    let def = definition(&opts, copy_kernel(&opts, vec![5, 6, 7, 8]));
    insta::assert_snapshot!(LoopyLowering::new().lower(&def), @r"
    kernel simple_a_only
    domains:
        {[j]: 0 <= j < n}
        {[i]: 5 <= i < 9}
    args:
        global int32 n (read-only)
        global float64[n, 10] kf
    temporaries:
        global float64[4] A (read-only) = [1.0, 2.0, 3.0, 4.0]
    assumptions:
        n > 0
    instructions:
        for j
            for i
                <int32> pos = i - 5 {id=map_pos}
                <int32> idx = i {id=map_idx}
                kf[j, idx] = A[pos]
            end
        end
    ");
    assert_eq!(
        LoopyLowering::new().declaration(&def),
        "simple_a_only(n, kf)"
    );
}

#[test]
fn test_c_kernel_text() {
    let opts = CodegenOptions::default().with_lang(Lang::C);
    let def = definition(&opts, copy_kernel(&opts, vec![5, 6, 7, 8]));
    insta::assert_snapshot!(CLowering::new().lower(&def), @r"
    static const double simple_a_only_A[4] = {1.0, 2.0, 3.0, 4.0};

    void simple_a_only(int const n, double *restrict kf)
    {
        #pragma omp parallel for
        for (int j = 0; j < n; ++j)
        {
            for (int i = 5; i < 9; ++i)
            {
                int pos = i - 5;
                int idx = i;
                kf[j * 10 + idx] = simple_a_only_A[pos];
            }
        }
    }
    ");
}

#[test]
fn test_column_major_arguments() {
    let opts = CodegenOptions::default()
        .with_lang(Lang::C)
        .with_memory_layout(MemoryLayout::ColumnMajor);
    let def = definition(&opts, copy_kernel(&opts, vec![0, 1]));
    assert!(CLowering::new()
        .lower(&def)
        .contains("kf[j + n * idx] = simple_a_only_A[pos];"));
    assert!(LoopyLowering::new()
        .lower(&def)
        .contains("global float64[n, 10] kf order=F"));
}

#[test]
fn test_opencl_kernel_text() {
    let opts = CodegenOptions::default();
    let def = definition(&opts, copy_kernel(&opts, vec![1, 3, 7]));
    let cl = OpenClLowering::new();
    let source = cl.lower(&def);
    assert!(source.contains("__constant int simple_a_only_out_map[3] = {1, 3, 7};"));
    assert!(source.contains("void simple_a_only(int const n, __global double *restrict kf)"));
    assert!(source.contains("int const j = get_global_id(0);"));
    assert!(source.contains("int idx = simple_a_only_out_map[i];"));
    assert_eq!(
        cl.declaration(&def),
        "void simple_a_only(int const n, __global double *restrict kf);"
    );
    assert_eq!(cl.preamble(&[&def]), "#pragma OPENCL EXTENSION cl_khr_fp64 : enable");
}

#[test]
fn test_fixed_parameters_are_inlined() {
    let opts = CodegenOptions::default().with_lang(Lang::C);
    let kernel = copy_kernel(&opts, vec![0, 1])
        .with_parameter("R_u", 8314.4621)
        .with_body(vec![Assign::new(
            Expr::index("kf", [BATCH_INAME, TARGET_VAR]),
            Expr::index("A", [POSITION_VAR]) * Expr::var("R_u"),
        )
        .into()]);
    let def = definition(&opts, kernel);
    assert!(CLowering::new()
        .lower(&def)
        .contains("kf[j * 10 + idx] = simple_a_only_A[pos] * 8314.4621;"));
    assert!(LoopyLowering::new()
        .lower(&def)
        .contains("parameters:\n    R_u = 8314.4621"));
}
