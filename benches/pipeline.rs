use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::future::{BoxFuture, join_all};
use reqpipe::policies::HttpLogDetailLevel;
use reqpipe::prelude::{
    ClientOptions, Error, Next, Pipeline, PipelineBuilder, Policy, Request, Response, RetryPolicy,
};
use reqpipe::transport::FnTransport;
use reqpipe::{HeaderCollection, ResponseBody};
use tokio::runtime::Runtime;

struct PassThrough;

impl Policy for PassThrough {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        next.run_async(request)
    }
}

fn ok_transport() -> FnTransport<impl Fn(Request) -> Result<Response, Error> + Send + Sync> {
    FnTransport::new(|request: Request| {
        Ok(Response::new(
            200,
            HeaderCollection::new(),
            ResponseBody::from_bytes(bytes::Bytes::from_static(br#"{"ok":true}"#)),
            request.head(),
        ))
    })
}

fn benchmark_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn standard_pipeline() -> Pipeline {
    PipelineBuilder::from_options(
        ClientOptions::new()
            .retry(RetryPolicy::standard())
            .log_level(HttpLogDetailLevel::None),
    )
    .transport(ok_transport())
    .build()
    .expect("standard pipeline should build")
}

fn bench_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_depth_blocking");
    group.sample_size(80);

    for depth in [0_usize, 4, 16] {
        let mut builder = Pipeline::builder();
        for _ in 0..depth {
            builder = builder.policy(PassThrough);
        }
        let pipeline = builder
            .transport(ok_transport())
            .build()
            .expect("pass-through pipeline should build");

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let request =
                    Request::get("https://api.example.com/v1/ping").expect("valid bench url");
                let response = pipeline
                    .send(request)
                    .expect("pass-through request should succeed");
                black_box(response.status());
            });
        });
    }

    group.finish();
}

fn bench_standard_async(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let pipeline = standard_pipeline();

    let mut group = c.benchmark_group("standard_policies_async");
    group.sample_size(80);
    group.bench_function("get_200", |b| {
        b.to_async(&runtime).iter(|| async {
            let request = Request::get("https://api.example.com/v1/ping").expect("valid bench url");
            let response = pipeline
                .send_async(request)
                .await
                .expect("standard request should succeed");
            black_box(response.status());
        });
    });
    group.finish();
}

fn bench_concurrent_async(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let pipeline = Arc::new(standard_pipeline());

    let mut group = c.benchmark_group("concurrent_async_throughput");
    group.sample_size(40);

    for concurrency in [8_usize, 64] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                let pipeline = Arc::clone(&pipeline);
                b.to_async(&runtime).iter(|| {
                    let pipeline = Arc::clone(&pipeline);
                    async move {
                        let calls = (0..concurrency).map(|index| {
                            let request = Request::get(&format!(
                                "https://api.example.com/v1/items/{index}"
                            ))
                            .expect("valid bench url");
                            pipeline.send_async(request)
                        });
                        for response in join_all(calls).await {
                            black_box(
                                response
                                    .expect("concurrent request should succeed")
                                    .status(),
                            );
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chain_depth,
    bench_standard_async,
    bench_concurrent_async
);
criterion_main!(benches);
