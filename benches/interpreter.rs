use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mython::lexer::Lexer;
use mython::runtime::Context;
use mython::{interpreter, parser};

const WORKLOADS: [(&str, &str); 1] = [("fib", "tests/programs/bench_fib/program.my")];

fn load_source(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

fn bench_interpreter(c: &mut Criterion) {
    for (label, path) in WORKLOADS {
        let source = load_source(path);

        c.bench_function(&format!("tokenize_{label}"), |b| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(&source)).expect("tokenize");
                black_box(lexer);
            })
        });

        c.bench_function(&format!("parse_{label}"), |b| {
            b.iter(|| {
                let mut lexer = Lexer::new(black_box(&source)).expect("tokenize");
                let program = parser::parse_program(&mut lexer).expect("parse");
                black_box(program);
            })
        });

        c.bench_function(&format!("execute_prepared_{label}"), |b| {
            let mut lexer = Lexer::new(&source).expect("tokenize");
            let program = parser::parse_program(&mut lexer).expect("parse");
            b.iter(|| {
                let mut sink = Vec::new();
                let mut context = Context::new(&mut sink);
                interpreter::execute_program(black_box(&program), &mut context)
                    .expect("execute");
                black_box(sink);
            })
        });

        c.bench_function(&format!("full_pipeline_{label}"), |b| {
            b.iter(|| {
                let mut output = Vec::new();
                mython::run(black_box(&source), &mut output).expect("run");
                black_box(output);
            })
        });
    }
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
