use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_message::codec::parse_message;
use micro_message::protocol::{HttpMessage, Request, ServerParams, ServerRequest};
use micro_message_bencher::{TestCase, TestFile};

static SMALL_REQUEST: TestFile = TestFile::new("get_small.txt", include_str!("../resources/request/get_small.txt"));
static LARGE_REQUEST: TestFile = TestFile::new("get_large.txt", include_str!("../resources/request/get_large.txt"));
static FORM_REQUEST: TestFile = TestFile::new("post_form.txt", include_str!("../resources/request/post_form.txt"));

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("small_request", SMALL_REQUEST),
        TestCase::large("large_request", LARGE_REQUEST),
        TestCase::small("form_request", FORM_REQUEST),
    ]
}

fn benchmark_parse_message(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("parse_message");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.bytes()));
        group.bench_with_input(BenchmarkId::new(case.group().label(), case.name()), &case, |b, case| {
            b.iter(|| black_box(parse_message(case.file().content().as_bytes()).expect("fixture should be a valid message")));
        });
    }

    group.finish();
}

fn benchmark_round_trip(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_round_trip");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.bytes()));
        group.bench_with_input(BenchmarkId::new(case.group().label(), case.name()), &case, |b, case| {
            b.iter(|| {
                let request = Request::parse(case.file().content().as_bytes()).expect("fixture should be a valid request");
                black_box(request.to_bytes().expect("request should serialize"))
            });
        });
    }

    group.finish();
}

fn benchmark_server_request(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("server_request");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.bytes()));
        group.bench_with_input(BenchmarkId::new(case.group().label(), case.name()), &case, |b, case| {
            b.iter(|| {
                let request = ServerRequest::parse(case.file().content().as_bytes(), ServerParams::new())
                    .expect("fixture should be a valid request");
                black_box(request.parsed_body().cloned().expect("fixture body should decode"))
            });
        });
    }

    group.finish();
}

criterion_group!(parser, benchmark_parse_message, benchmark_round_trip, benchmark_server_request);
criterion_main!(parser);
