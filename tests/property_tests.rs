//! Property tests: pass pipelines keep programs well formed, and lowering
//! enumerates exactly the domain points.

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::collections::{HashMap, HashSet};
use tensorpoly::graph::{DataType, Program, ProgramBuilder};
use tensorpoly::pass::{apply, PassRegistry, Target};
use tensorpoly::{lower, LoweringRequest, StageDesc};

#[derive(Debug, Clone)]
enum OpSpec {
    MatMul(usize, usize),
    Add(usize, usize),
    Relu(usize),
    Identity(usize),
}

fn op_spec() -> impl Strategy<Value = OpSpec> {
    prop_oneof![
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| OpSpec::MatMul(a, b)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| OpSpec::Add(a, b)),
        any::<usize>().prop_map(OpSpec::Relu),
        any::<usize>().prop_map(OpSpec::Identity),
    ]
}

/// Operand indices are taken modulo the variables defined so far, so every
/// generated program is topologically valid.
fn build_program(specs: &[OpSpec]) -> Program {
    let mut b = ProgramBuilder::new();
    let mut vars = vec![
        b.input("x0", vec![4, 4], DataType::Float32).unwrap(),
        b.input("x1", vec![4, 4], DataType::Float32).unwrap(),
    ];
    for (k, spec) in specs.iter().enumerate() {
        let pick = |i: usize| vars[i % vars.len()];
        let out = format!("v{}", k);
        let id = match *spec {
            OpSpec::MatMul(a, c) => b.matmul(pick(a), pick(c), &out),
            OpSpec::Add(a, c) => b.add(pick(a), pick(c), &out),
            OpSpec::Relu(a) => b.relu(pick(a), &out),
            OpSpec::Identity(a) => b.identity(pick(a), &out),
        }
        .unwrap();
        vars.push(id);
    }
    b.build()
}

fn pass_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("remove_identity"), Just("gemm_rewriter"), Just("dead_code_elimination")]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, failure_persistence: None, ..ProptestConfig::default() })]

    #[test]
    fn prop_passes_keep_topology_and_fetch_ids(
        specs in prop::collection::vec(op_spec(), 1..12),
        fetch_mask in prop::collection::vec(any::<bool>(), 12),
        passes in prop::collection::vec(pass_name(), 0..5),
        gpu in any::<bool>(),
    ) {
        let mut program = build_program(&specs);
        let fetch: HashSet<String> = (0..specs.len())
            .filter(|&k| fetch_mask[k])
            .map(|k| format!("v{}", k))
            .collect();
        let target = if gpu { Target::nvgpu() } else { Target::host() };
        let registry = PassRegistry::with_builtin_passes();

        let result = apply(&registry, &mut program, &fetch, &target, &passes);
        prop_assert!(result.is_ok(), "{:?}", result);

        let mut available: HashSet<_> = program.inputs().iter().copied().collect();
        for instr in program.instructions() {
            for input in &instr.inputs {
                prop_assert!(available.contains(input));
            }
            available.extend(instr.outputs.iter().copied());
        }
        for id in &fetch {
            prop_assert!(program.produces(id), "fetch id `{}` lost", id);
        }
    }

    #[test]
    fn prop_box_lowering_enumerates_points(
        bounds in prop::collection::vec((-3i64..3, 0i64..4), 1..4),
        n in 0i64..5,
    ) {
        let axes: Vec<String> = (0..bounds.len()).map(|d| format!("x{}", d)).collect();
        let mut constraints: Vec<String> = bounds
            .iter()
            .zip(&axes)
            .map(|((lo, extent), a)| format!("{} <= {} <= {}", lo, a, lo + extent))
            .collect();
        // The innermost axis also depends on a parameter.
        constraints.push(format!("{} < N + 3", axes[axes.len() - 1]));
        let domain = format!("[N] -> {{ S[{}] : {} }}", axes.join(", "), constraints.join(" and "));
        let request = LoweringRequest {
            context: "[N] -> { : N >= 0 }".into(),
            stages: vec![StageDesc::new(domain)],
            ..Default::default()
        };
        let lowered = lower(&request).unwrap();

        let mut expected: Vec<Vec<i64>> = vec![Vec::new()];
        for (d, (lo, extent)) in bounds.iter().enumerate() {
            let hi = if d == bounds.len() - 1 { (lo + extent).min(n + 2) } else { lo + extent };
            expected = expected
                .into_iter()
                .flat_map(|p| (*lo..=hi).map(move |v| { let mut q = p.clone(); q.push(v); q }))
                .collect();
        }

        let mut env: HashMap<String, i64> = [("N".to_string(), n)].into_iter().collect();
        env.extend(lowered.const_params.clone());
        let got: Vec<Vec<i64>> = lowered.ast.instances(&env).unwrap().into_iter().map(|(_, p)| p).collect();
        prop_assert_eq!(&got, &expected);

        let mut trace = Vec::new();
        lowered.expr.run(&mut env, &mut trace).unwrap();
        let bridged: Vec<Vec<i64>> = trace.into_iter().map(|(_, p)| p).collect();
        prop_assert_eq!(bridged, expected);
    }
}
