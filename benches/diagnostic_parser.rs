use criterion::{Criterion, criterion_group, criterion_main};
use modide::services::DiagnosticParser;
use std::hint::black_box;

/// Output of a failing javac run over a mid-sized mod: `errors` located errors, each with
/// snippet and caret, plus a few unlocated notes and the summary line.
fn javac_output(errors: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(errors * 3 + 4);
    lines.push("warning: [options] bootstrap class path not set in conjunction with -source 8".to_string());
    for i in 0..errors {
        lines.push(format!(
            "src/main/java/com/example/coolmod/block/Block{}.java:{}: error: cannot find symbol",
            i % 40,
            i + 1
        ));
        lines.push("        BlockState state = world.getBlockState(pos);".to_string());
        lines.push("        ^".to_string());
        lines.push("  symbol:   class BlockState".to_string());
    }
    lines.push("Note: Some input files use unchecked or unsafe operations.".to_string());
    lines.push(format!("{} errors", errors));
    lines
}

fn bench_parse(c: &mut Criterion) {
    let parser = DiagnosticParser::javac();

    for errors in [10, 100, 1000] {
        let output = javac_output(errors);
        c.bench_function(&format!("parse_javac_{}_errors", errors), |b| {
            b.iter(|| parser.parse_lines(black_box(&output).iter().map(String::as_str)))
        });
    }
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
