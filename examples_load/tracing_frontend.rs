use std::sync::Arc;

use logship::init::init_tracing;
use logship::noop::NoopTransport;
use logship::{Client, ClientConfig};
use tracing::{error, info, info_span, warn, Instrument};

async fn handle_request(request_id: u64) {
    info!(path = "/checkout", "request received");
    if request_id % 3 == 0 {
        warn!(latency_ms = 870, "slow upstream");
    }
    if request_id % 5 == 0 {
        error!(code = 502, "upstream failed");
    }
}

#[tokio::main]
async fn main() {
    let client = Client::with_transport(
        ClientConfig::new("tracing-demo", "http://localhost:4005"),
        Arc::new(NoopTransport),
    )
    .expect("valid config");

    init_tracing(client.logger()).expect("no other global subscriber");

    for request_id in 0..20u64 {
        handle_request(request_id)
            .instrument(info_span!("request", request_id, user = "user_789"))
            .await;
    }

    client.flush().await;
    let stats = client.stats();
    println!("enqueued {} records, sent {}", stats.enqueued, stats.sent);

    let report = client.shutdown().await;
    println!("shutdown clean: {}", report.is_clean());
}
