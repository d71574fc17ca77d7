//! Integration tests for the pass pipeline and the lowering pipeline.

use std::collections::{HashMap, HashSet};
use tensorpoly::bridge::Expr;
use tensorpoly::codegen::{AstBuilder, AstNode, BuildOptions};
use tensorpoly::graph::{ops, DataType, Program, ProgramBuilder, ProgramDesc};
use tensorpoly::pass::{apply, PassRegistry, Target};
use tensorpoly::polyhedral::parse::{parse_context, MAX_LITERAL};
use tensorpoly::polyhedral::{IterationDomain, Schedule, ScheduleGroup};
use tensorpoly::utils::errors::{CompileError, ConfigErrorKind};
use tensorpoly::{lower, LoweringRequest, StageDesc};

fn fetch(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn op_types(program: &Program) -> Vec<&str> {
    program.instructions().iter().map(|i| i.op_type.as_str()).collect()
}

fn input_names<'a>(program: &'a Program, index: usize) -> Vec<&'a str> {
    program.instructions()[index].inputs.iter().map(|&v| program.name(v)).collect()
}

/// Every input is a program input or an output of an earlier instruction.
fn assert_topological(program: &Program) {
    let mut available: HashSet<_> = program.inputs().iter().copied().collect();
    for (index, instr) in program.instructions().iter().enumerate() {
        for input in &instr.inputs {
            assert!(available.contains(input), "instruction {} reads `{}` before it exists", index, program.name(*input));
        }
        available.extend(instr.outputs.iter().copied());
    }
}

/// matmul(A, B) -> V; add(V, bias) -> Out
fn gemm_program(extra_reader: bool) -> Program {
    let mut b = ProgramBuilder::new();
    let a = b.input("A", vec![4, 8], DataType::Float32).unwrap();
    let w = b.input("B", vec![8, 16], DataType::Float32).unwrap();
    let bias = b.input("bias", vec![4, 16], DataType::Float32).unwrap();
    let v = b.matmul(a, w, "V").unwrap();
    b.add(v, bias, "Out").unwrap();
    if extra_reader {
        b.relu(v, "Act").unwrap();
    }
    b.build()
}

#[test]
fn test_scenario_a_fusion() {
    let registry = PassRegistry::with_builtin_passes();
    let mut program = gemm_program(false);
    apply(&registry, &mut program, &fetch(&["Out"]), &Target::nvgpu(), &["gemm_rewriter"]).unwrap();

    assert_eq!(op_types(&program), vec![ops::FUSED_GEMM]);
    let mut inputs = input_names(&program, 0);
    inputs.sort_unstable();
    assert_eq!(inputs, vec!["A", "B", "bias"]);
    assert_eq!(program.name(program.instructions()[0].outputs[0]), "Out");
    assert!(!program.produces("V"));
    assert_topological(&program);
}

#[test]
fn test_scenario_b_shared_matmul_not_fused() {
    let registry = PassRegistry::with_builtin_passes();
    let mut program = gemm_program(true);
    apply(&registry, &mut program, &fetch(&["Out", "Act"]), &Target::nvgpu(), &["gemm_rewriter"]).unwrap();

    assert_eq!(op_types(&program), vec![ops::MATMUL, ops::ELEMENTWISE_ADD, ops::RELU]);
    assert_eq!(input_names(&program, 1), vec!["V", "bias"]);
    assert_eq!(input_names(&program, 2), vec!["V"]);
}

#[test]
fn test_fetched_matmul_not_fused() {
    let registry = PassRegistry::with_builtin_passes();
    let mut program = gemm_program(false);
    apply(&registry, &mut program, &fetch(&["V", "Out"]), &Target::nvgpu(), &["gemm_rewriter"]).unwrap();
    assert_eq!(op_types(&program), vec![ops::MATMUL, ops::ELEMENTWISE_ADD]);
}

#[test]
fn test_readers_follow_fused_output() {
    let mut b = ProgramBuilder::new();
    let a = b.input("A", vec![4, 4], DataType::Float32).unwrap();
    let w = b.input("W", vec![4, 4], DataType::Float32).unwrap();
    let bias = b.input("bias", vec![4, 4], DataType::Float32).unwrap();
    let v = b.matmul(a, w, "V").unwrap();
    let out = b.add(bias, v, "Out").unwrap();
    let y = b.relu(out, "Y").unwrap();
    b.add(out, y, "Z").unwrap();
    let mut program = b.build();

    let registry = PassRegistry::with_builtin_passes();
    apply(&registry, &mut program, &fetch(&["Z"]), &Target::nvgpu(), &["gemm_rewriter"]).unwrap();

    assert_eq!(op_types(&program), vec![ops::FUSED_GEMM, ops::RELU, ops::ELEMENTWISE_ADD]);
    let fused = program.instructions()[0].outputs[0];
    assert_eq!(program.name(fused), "Out");
    assert_eq!(program.instructions()[1].inputs, vec![fused]);
    assert_eq!(program.instructions()[2].inputs[0], fused);
    assert_eq!(program.lookup("Out"), Some(fused));
    assert_topological(&program);
}

#[test]
fn test_fusion_skipped_on_host() {
    let registry = PassRegistry::with_builtin_passes();
    let mut program = gemm_program(false);
    apply(&registry, &mut program, &fetch(&["Out"]), &Target::host(), &["gemm_rewriter"]).unwrap();
    assert_eq!(op_types(&program), vec![ops::MATMUL, ops::ELEMENTWISE_ADD]);
}

#[test]
fn test_unknown_pass_leaves_program_untouched() {
    let registry = PassRegistry::with_builtin_passes();
    let mut program = gemm_program(false);
    let before = program.to_string();
    let err = apply(&registry, &mut program, &fetch(&["Out"]), &Target::nvgpu(), &["gemm_rewriter", "no_such_pass"])
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownPass));
    assert_eq!(program.to_string(), before);
}

#[test]
fn test_pass_pipeline_keeps_fetch_ids() {
    let mut b = ProgramBuilder::new();
    let x = b.input("X", vec![2, 2], DataType::Float32).unwrap();
    let w = b.input("W", vec![2, 2], DataType::Float32).unwrap();
    let i = b.identity(x, "I").unwrap();
    let v = b.matmul(i, w, "V").unwrap();
    let out = b.add(v, x, "Out").unwrap();
    b.identity(out, "Y").unwrap();
    b.relu(x, "Unused").unwrap();
    let mut program = b.build();

    let registry = PassRegistry::with_builtin_passes();
    let passes = ["remove_identity", "gemm_rewriter", "dead_code_elimination"];
    apply(&registry, &mut program, &fetch(&["Y"]), &Target::nvgpu(), &passes).unwrap();

    assert_eq!(op_types(&program), vec![ops::FUSED_GEMM, ops::IDENTITY]);
    assert_eq!(input_names(&program, 0), vec!["X", "W", "X"]);
    assert!(program.produces("Y"));
    assert_topological(&program);
}

#[test]
fn test_program_description_pipeline() {
    let json = r#"{
        "inputs": [
            { "id": "A", "shape": [4, 8], "dtype": "float32" },
            { "id": "B", "shape": [8, 2], "dtype": "float32" },
            { "id": "bias", "shape": [4, 2], "dtype": "float32" }
        ],
        "instructions": [
            { "op": "matmul", "inputs": ["A", "B"], "outputs": [{ "id": "V", "shape": [4, 2], "dtype": "float32" }] },
            { "op": "elementwise_add", "inputs": ["V", "bias"], "outputs": [{ "id": "Out", "shape": [4, 2], "dtype": "float32" }] }
        ]
    }"#;
    let program = ProgramDesc::from_json(json).unwrap().into_program().unwrap();
    let config = tensorpoly::CompilerConfig {
        target: Target::nvgpu(),
        fetch_ids: vec!["Out".into()],
        ..Default::default()
    };
    let optimized = tensorpoly::optimize(program, &config).unwrap();
    let desc = ProgramDesc::from_program(&optimized);
    assert_eq!(desc.instructions.len(), 1);
    assert_eq!(desc.instructions[0].op, ops::FUSED_GEMM);
    assert_eq!(desc.instructions[0].outputs[0].id, "Out");
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

fn box_points(n_dim: usize, lo: i64, hi: i64) -> Vec<Vec<i64>> {
    let mut points = vec![Vec::new()];
    for _ in 0..n_dim {
        points = points
            .into_iter()
            .flat_map(|p| {
                (lo..=hi).map(move |v| {
                    let mut q = p.clone();
                    q.push(v);
                    q
                })
            })
            .collect();
    }
    points
}

/// Domain points of every stage in lexicographic timestamp order.
fn brute_force(domains: &[IterationDomain], group: &ScheduleGroup, params: &HashMap<String, i64>) -> Vec<(String, Vec<i64>)> {
    let mut stamped = Vec::new();
    for (k, domain) in domains.iter().enumerate() {
        let schedule = group.get(&domain.name).unwrap();
        let dom_params: Vec<i64> = domain.param_names().iter().map(|p| params[p]).collect();
        let map_params: Vec<i64> = schedule.map.param_names().iter().map(|p| params[p]).collect();
        for point in box_points(domain.n_dim(), -8, 8) {
            if domain.set.contains(&point, &dom_params) {
                let time = schedule.map.apply(&point, &map_params);
                stamped.push((time, k, domain.name.clone(), point));
            }
        }
    }
    let depth = stamped.iter().map(|(t, ..)| t.len()).max().unwrap_or(0);
    for (t, ..) in &mut stamped {
        t.resize(depth, 0);
    }
    stamped.sort();
    stamped.into_iter().map(|(_, _, name, point)| (name, point)).collect()
}

fn check_enumeration(context: &str, stages: &[(&str, &str)], options: BuildOptions, param_values: &[(&str, i64)]) {
    let domains: Vec<IterationDomain> = stages.iter().map(|(d, _)| IterationDomain::parse(d).unwrap()).collect();
    let mut group = ScheduleGroup::new();
    for (_, s) in stages {
        group.push(Schedule::parse(s).unwrap());
    }
    let mut builder = AstBuilder::new(parse_context(context).unwrap(), domains.clone(), group.clone()).unwrap();
    builder.set_build_options(options).unwrap();
    let ast = builder.build().unwrap().clone();

    for &(name, value) in param_values {
        let params: HashMap<String, i64> = [(name.to_string(), value)].into_iter().collect();
        let mut env = params.clone();
        env.extend(builder.const_param_bindings());
        assert_eq!(
            ast.instances(&env).unwrap(),
            brute_force(&domains, &group, &params),
            "{} = {}\n{}",
            name,
            value,
            ast
        );
    }
}

fn n_values(range: std::ops::RangeInclusive<i64>) -> Vec<(&'static str, i64)> {
    range.map(|n| ("N", n)).collect()
}

#[test]
fn test_triangle_enumeration() {
    check_enumeration(
        "[N] -> { : N >= 0 }",
        &[("[N] -> { S[i, j] : 0 <= i < N and 0 <= j <= i }", "[N] -> { S[i, j] -> [i, j] }")],
        BuildOptions::new(),
        &n_values(0..=5),
    );
}

#[test]
fn test_fused_stages_enumeration() {
    check_enumeration(
        "[N] -> { : N >= 0 }",
        &[
            ("[N] -> { S[i] : 0 <= i < N }", "[N] -> { S[i] -> [i, 0, 0] }"),
            ("[N] -> { T[i, j] : 0 <= i < N and i <= j < N }", "[N] -> { T[i, j] -> [i, j, 1] }"),
        ],
        BuildOptions::new(),
        &n_values(0..=4),
    );
}

#[test]
fn test_shifted_sequence_enumeration() {
    check_enumeration(
        "[N] -> { : N >= 0 }",
        &[
            ("{ A[i] : 0 <= i < 3 }", "{ A[i] -> [1, i + 2] }"),
            ("[N] -> { B[i] : 0 <= i < N }", "[N] -> { B[i] -> [0, i] }"),
        ],
        BuildOptions::new(),
        &n_values(0..=3),
    );
}

#[test]
fn test_loop_options_preserve_order() {
    let stages = [
        ("{ S[i, j] : 0 <= i < 5 and i <= j < 5 }", "{ S[i, j] -> [i, j, 0] }"),
        ("{ T[i] : 1 <= i < 4 }", "{ T[i] -> [i, 0, 1] }"),
    ];
    for options in ["{ }", "{ separate[0] }", "{ unroll[0] }", "{ separate[0]; unroll[2] }", "{ unroll[1] }"] {
        check_enumeration("{ : }", &stages, options.parse().unwrap(), &[("N", 0)]);
    }
}

#[test]
fn test_single_point_axis_keeps_loop() {
    let request = LoweringRequest {
        context: "[N] -> { : N >= 1 }".into(),
        stages: vec![StageDesc::new("[N] -> { S[i, j] : i = 3 and 0 <= j < N }")],
        ..Default::default()
    };
    let mut builder = request.builder().unwrap();
    assert_eq!(builder.params(), vec!["N"]);
    assert_eq!(builder.const_bindings().len(), 1);
    assert_eq!(builder.const_bindings()[0].value, 3);

    let ast = builder.build().unwrap().clone();
    assert_eq!(ast.loops_for_axis("S", "i").len(), 1);

    let lowered = lower(&request).unwrap();
    assert_eq!(lowered.const_params.values().copied().collect::<Vec<_>>(), vec![3]);
    let mut env: HashMap<String, i64> = [("N".to_string(), 2)].into_iter().collect();
    let mut trace = Vec::new();
    lowered.expr.run(&mut env, &mut trace).unwrap();
    assert_eq!(trace, vec![("S".to_string(), vec![3, 0]), ("S".to_string(), vec![3, 1])]);
}

#[test]
fn test_identical_builders_identical_asts() {
    let request = LoweringRequest {
        context: "[N, M] -> { : N >= 1 and M >= 1 }".into(),
        stages: vec![
            StageDesc::new("[N, M] -> { S[i, j] : 0 <= i < N and 0 <= j < M }")
                .with_schedule("[N, M] -> { S[i, j] -> [0, i, j] }"),
            StageDesc::new("[N] -> { T[i] : i = 0 }").with_schedule("[N] -> { T[i] -> [1, i, 0] }"),
        ],
        iterator_names: vec!["t".into(), "x".into()],
        build_options: "{ separate[1] }".into(),
    };
    let first = lower(&request).unwrap();
    let second = lower(&request).unwrap();
    assert_eq!(first.ast, second.ast);
    assert_eq!(first.expr, second.expr);
    assert_eq!(first.ast.to_string(), second.ast.to_string());
}

#[test]
fn test_floor_division_survives_bridge() {
    let request = LoweringRequest {
        context: "[N] -> { : }".into(),
        stages: vec![StageDesc::new("[N] -> { S[i] : 2i >= N and 3i <= 10 }")],
        ..Default::default()
    };
    let lowered = lower(&request).unwrap();
    assert!(lowered.expr.to_string().contains("floor_div"));

    for n in -7..=7 {
        let params: HashMap<String, i64> = [("N".to_string(), n)].into_iter().collect();
        let expected: Vec<(String, Vec<i64>)> = (-8..=8)
            .filter(|&i| 2 * i >= n && 3 * i <= 10)
            .map(|i| ("S".to_string(), vec![i]))
            .collect();
        let mut env = params.clone();
        let mut trace = Vec::new();
        lowered.expr.run(&mut env, &mut trace).unwrap();
        assert_eq!(trace, expected, "N = {}", n);
        assert_eq!(lowered.ast.instances(&params).unwrap(), expected);
    }
}

#[test]
fn test_unbounded_loop_range() {
    let request = LoweringRequest { stages: vec![StageDesc::new("{ S[i] : i >= 2 }")], ..Default::default() };
    let lowered = lower(&request).unwrap();
    let Expr::Block(stmts) = &lowered.expr else {
        panic!("unexpected root {}", lowered.expr);
    };
    match &stmts[0] {
        Expr::For { range, .. } => {
            assert!(!range.is_finite());
            assert_eq!(*range.min(), Expr::IntImm(2));
        }
        other => panic!("expected a loop, found {}", other),
    }
}

#[test]
fn test_dropped_stage_reports_absent() {
    let request = LoweringRequest {
        context: "[N] -> { : N >= 0 }".into(),
        stages: vec![
            StageDesc::new("[N] -> { A[i] : 0 <= i < N }"),
            StageDesc::new("[N] -> { B[i] : 0 <= i < N and N < 0 }"),
        ],
        ..Default::default()
    };
    let mut builder = request.builder().unwrap();
    let ast: AstNode = builder.build().unwrap().clone();
    assert!(ast.contains_stmt("A"));
    assert!(!builder.contains_statement("B").unwrap());
    assert!(builder.axis2ast("B").unwrap().is_empty());
}

fn lowering_error_kind(request: &LoweringRequest) -> Option<ConfigErrorKind> {
    let err = lower(request).expect_err("lowering should fail");
    err.downcast_ref::<CompileError>().and_then(CompileError::config_kind)
}

#[test]
fn test_extreme_bounds_are_rejected() {
    for (domain, options) in [
        ("{ S[i] : -9000000000000000000 <= i <= 9000000000000000000 }", "{ unroll[0] }"),
        ("{ S[i] : 0 <= i <= 9223372036854775807 }", "{ separate[0] }"),
    ] {
        let request = LoweringRequest {
            stages: vec![StageDesc::new(domain)],
            build_options: options.into(),
            ..Default::default()
        };
        assert_eq!(lowering_error_kind(&request), Some(ConfigErrorKind::Overflow), "{}", domain);
    }

    // Each literal is in range, but scheduling multiplies them.
    let request = LoweringRequest {
        stages: vec![StageDesc::new(
            "{ S[i, j] : 0 <= i < 4 and 0 <= j < 4 and 1152921504606846976 i - 1152921504606846976 j <= 5 }",
        )
        .with_schedule("{ S[i, j] -> [i + 1152921504606846976, j] }")],
        ..Default::default()
    };
    assert_eq!(lowering_error_kind(&request), Some(ConfigErrorKind::Overflow));
}

#[test]
fn test_largest_bounds_lower_under_every_option() {
    let domain = format!("{{ S[i] : -{0} <= i <= {0} }}", MAX_LITERAL);
    let header = format!("for (c0 = -{0}; c0 <= {0}; c0 += 1)", MAX_LITERAL);
    for options in ["", "{ unroll[0] }", "{ separate[0] }"] {
        let request = LoweringRequest {
            stages: vec![StageDesc::new(domain.clone())],
            build_options: options.into(),
            ..Default::default()
        };
        let lowered = lower(&request).unwrap();
        assert_eq!(lowered.ast.loop_count(), 1, "{}", options);
        assert!(lowered.ast.render().contains(&header), "{}", lowered.ast);
    }
}
