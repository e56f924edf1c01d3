use criterion::{criterion_group, criterion_main, Criterion};
use yaml_stream::{EventData, Parser, Scanner, TokenData};

static VERY_LARGE_YAML: &[u8] = include_bytes!("very_large.yml");

pub fn scanning(c: &mut Criterion) {
    c.bench_function("yaml-stream scan large", |b| {
        b.iter(|| {
            let mut input = VERY_LARGE_YAML;
            let mut scanner = Scanner::new();
            scanner.set_input(&mut input);
            loop {
                let token = scanner.scan().expect("scan");
                if matches!(token.data, TokenData::StreamEnd) {
                    break;
                }
            }
        })
    });
}

pub fn parsing(c: &mut Criterion) {
    c.bench_function("yaml-stream parse large", |b| {
        b.iter(|| {
            let mut input = VERY_LARGE_YAML;
            let mut parser = Parser::new();
            parser.set_input(&mut input);
            loop {
                let event = parser.parse().expect("parse");
                if matches!(event.data, EventData::StreamEnd) {
                    break;
                }
            }
        })
    });
}

criterion_group!(benches, scanning, parsing);
criterion_main!(benches);
