use std::sync::Arc;
use std::time::Instant;

use logship::noop::NoopTransport;
use logship::{fields, Client, ClientConfig, Level};

#[tokio::main]
async fn main() {
    let config = ClientConfig::new("load-test", "http://localhost:4005")
        .with_minimum_level(Level::Debug)
        .with_queue_capacity(100_000);
    let client = Client::with_transport(config, Arc::new(NoopTransport)).expect("valid config");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        client.error("default load test error", fields! { "iteration" => i });
    }

    let elapsed = start.elapsed();
    println!(
        "default config: submitted {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let report = client.shutdown().await;
    println!(
        "shutdown: sent {} records, {} unflushed, timed out: {}",
        report.sent, report.unflushed, report.timed_out
    );
}
