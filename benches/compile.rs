use std::{collections::BTreeMap, hint::black_box};

use criterion::Criterion;
use mpc_bridge::{Circuit, CircuitCompiler, CircuitInfo, PartySetting, Values};

/// A circuit over two `n` bit inputs using every gate type, with `4 * n` gates.
fn circuit(n: usize) -> Circuit {
    let mut gates = vec![];
    for i in 0..n {
        gates.push(format!("2 1 {i} {} {} XOR", n + i, 2 * n + i));
        gates.push(format!("2 1 {i} {} {} OR", n + i, 3 * n + i));
    }
    for i in 0..n {
        gates.push(format!(
            "2 1 {} {} {} AND",
            2 * n + i,
            3 * n + (i + 1) % n,
            4 * n + i
        ));
    }
    for i in 0..n {
        gates.push(format!("1 1 {} {} NOT", 4 * n + i, 5 * n + i));
    }
    Circuit {
        bristol: format!(
            "{} {}\n2 {n} {n}\n1 {n}\n\n{}",
            gates.len(),
            6 * n,
            gates.join("\n")
        ),
        info: CircuitInfo {
            input_name_to_wire_index: BTreeMap::from([("a".to_string(), 0), ("b".to_string(), n)]),
            output_name_to_wire_index: BTreeMap::from([("c".to_string(), 5 * n)]),
        },
    }
}

pub fn compile_benchmark(c: &mut Criterion) {
    let settings = [
        PartySetting::new("alice", ["a"], ["c"]),
        PartySetting::new("bob", ["b"], ["c"]),
    ];
    for n in [64, 4096] {
        let circuit = circuit(n);
        c.bench_function(&format!("compile {n} bit circuit"), |b| {
            b.iter(|| CircuitCompiler::new(black_box(&circuit), black_box(&settings)))
        });

        let compiler = CircuitCompiler::new(&circuit, &settings).expect("valid circuit");
        c.bench_function(&format!("render {n} bit circuit"), |b| {
            b.iter(|| black_box(compiler.lowered()).to_string())
        });
    }

    let compiler = CircuitCompiler::new(&circuit(64), &settings).expect("valid circuit");
    let inputs: [Values; 2] = [
        Values::from([("a".to_string(), 12345.into())]),
        Values::from([("b".to_string(), 67890.into())]),
    ];
    c.bench_function("eval 64 bit circuit", |b| {
        b.iter(|| compiler.eval(black_box(&inputs)))
    });
}
