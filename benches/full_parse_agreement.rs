use criterion::{black_box, criterion_group, criterion_main, Criterion};

use featchart::{EarleyParser, Grammar};

const AGREEMENT_SRC: &str = include_str!("../grammars/agreement.fgr");
const PP_SRC: &str = include_str!("../grammars/pp-attachment.fgr");

fn parse(g: &Grammar, input: &[&str]) -> usize {
  EarleyParser::new(g).parse(input).map(|t| t.len()).unwrap_or(0)
}

fn criterion_benchmark(c: &mut Criterion) {
  let agreement = AGREEMENT_SRC.parse::<Grammar>().unwrap();
  let pp = PP_SRC.parse::<Grammar>().unwrap();

  let simple_input = "john barks".split(' ').collect::<Vec<_>>();
  let agreeing_input = "these dogs eat the cookies".split(' ').collect::<Vec<_>>();
  let ambiguous_input = "I saw the man in the park with a telescope"
    .split(' ')
    .collect::<Vec<_>>();

  c.bench_function("parse simple", |b| {
    b.iter(|| parse(black_box(&agreement), black_box(&simple_input)))
  });

  c.bench_function("parse agreement", |b| {
    b.iter(|| parse(black_box(&agreement), black_box(&agreeing_input)))
  });

  c.bench_function("parse attachment ambiguity", |b| {
    b.iter(|| parse(black_box(&pp), black_box(&ambiguous_input)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
