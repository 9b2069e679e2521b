use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_message::parser::BodyParsers;
use micro_message_bencher::{TestCase, TestFile};

static FIELDS: TestFile = TestFile::new("fields.txt", include_str!("../resources/multipart/fields.txt"))
    .with_content_type("multipart/form-data; boundary=----FormBoundary7MA4YWxkTrZu0gW");
static FILES: TestFile = TestFile::new("files.txt", include_str!("../resources/multipart/files.txt"))
    .with_content_type("multipart/form-data; boundary=\"upload-boundary\"");

fn create_test_cases() -> Vec<TestCase> {
    vec![TestCase::small("fields", FIELDS), TestCase::large("files", FILES)]
}

fn benchmark_multipart_decoder(criterion: &mut Criterion) {
    let parsers = BodyParsers::default();
    let mut group = criterion.benchmark_group("multipart_decoder");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.bytes()));
        group.bench_with_input(BenchmarkId::new(case.group().label(), case.name()), &case, |b, case| {
            b.iter_batched(
                || case.file().content().as_bytes().to_vec(),
                |body| {
                    let decoded = parsers.decode(case.file().content_type(), &body).expect("fixture should decode");
                    black_box(decoded)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(multipart, benchmark_multipart_decoder);
criterion_main!(multipart);
