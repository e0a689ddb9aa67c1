//! Load testing for the router.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use rexroute::http::Context;
use rexroute::routing::Router;

mod common;

fn bench_router() -> Router {
    let mut router = Router::with_defaults(&Default::default());
    for i in 0..50 {
        router
            .get(&format!("/filler/{i}/{{name}}"), |ctx: Context| async move {
                ctx.text(StatusCode::OK, "filler")
            })
            .unwrap();
    }
    router
        .get("/items/{id:int}", |ctx: Context| async move {
            let id = ctx.int_param("id").unwrap_or_default();
            ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }));
        })
        .unwrap();
    router
}

#[tokio::test]
async fn test_load_performance() {
    let server = common::start_server(bench_router()).await;

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let url = server.url(&format!("/items/{task}"));
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies: Vec<Duration> = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_requests, "every request should succeed");

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");
}
