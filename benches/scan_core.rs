use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rendermedic::detect::{DetectorSet, SourceText};
use rendermedic::fix::{Candidate, DelimiterBalanceVerifier, Verifier};
use rendermedic::index::Language;
use rendermedic::lexer::{lex, Balance};
use std::path::Path;

fn synthetic_module(components: usize) -> String {
    let mut out = String::from("import React from 'react'\n\n");
    for i in 0..components {
        out.push_str(&format!(
            "/* component {i} */\nexport function Widget{i}({{ label }}) {{\n  const text = `item ${{label}} #{i}`\n  return (\n    <div className=\"widget\">\n      Hello widget\n      {{text}}\n    </div>\n  )\n}}\n\n"
        ));
    }
    out
}

fn bench_lex(c: &mut Criterion) {
    let source = synthetic_module(500);
    c.bench_function("lex_500_components", |b| {
        b.iter(|| {
            let lexed = lex(black_box(&source));
            black_box(lexed.balance);
        });
    });
}

fn bench_verifier(c: &mut Criterion) {
    let original = synthetic_module(200);
    let candidate = Candidate {
        content: original.replacen("Hello widget", "/* Hello widget */", 1),
        expected_shift: Balance::zero(),
    };
    let verifier = DelimiterBalanceVerifier;
    c.bench_function("verify_comment_edit", |b| {
        b.iter(|| black_box(verifier.verify(black_box(&original), &candidate).is_ok()));
    });
}

fn bench_detectors(c: &mut Criterion) {
    let source = synthetic_module(500);
    let detectors = DetectorSet::builtin().expect("builtin detectors");
    let non_code = lex(&source).non_code;
    let text = SourceText {
        path: Path::new("src/widgets.tsx"),
        language: Language::Tsx,
        content: &source,
        non_code: &non_code,
    };
    c.bench_function("detectors_500_components", |b| {
        b.iter(|| black_box(detectors.run(black_box(&text)).len()));
    });
}

criterion_group!(scan_core, bench_lex, bench_verifier, bench_detectors);
criterion_main!(scan_core);
