//! Drive a running Pulseboard server with generated metrics and executions
//!
//! Usage: loadgen [metrics_per_batch] [batches]
//!
//! PULSEBOARD_URL defaults to http://localhost:8080. Set PULSEBOARD_TOKEN
//! when the server requires a bearer token.

use pulseboard::stats::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Instant;

const ENTITIES: &[(&str, &[&str])] = &[
    ("dashboard", &["sales", "marketing", "support", "finance"]),
    ("campaign", &["spring-launch", "retargeting", "newsletter"]),
    ("workflow", &["lead-sync", "invoice-export", "nightly-report"]),
];
const METRICS: &[(&str, &str, f64, f64)] = &[
    ("revenue", "usd", 100.0, 25_000.0),
    ("conversion_rate", "percent", 0.5, 12.0),
    ("active_users", "count", 10.0, 5_000.0),
    ("page_load_ms", "ms", 80.0, 2_400.0),
];
const AUTOMATIONS: &[(&str, &str)] = &[
    ("lead-sync", "CRM lead sync"),
    ("invoice-export", "Invoice export"),
    ("nightly-report", "Nightly report"),
];

fn generate_metrics(count: usize, rng: &mut StdRng) -> Value {
    let metrics: Vec<Value> = (0..count)
        .map(|_| {
            let (entity_type, ids) = ENTITIES[rng.gen_range(0..ENTITIES.len())];
            let (name, unit, low, high) = METRICS[rng.gen_range(0..METRICS.len())];
            json!({
                "entity_type": entity_type,
                "entity_id": ids[rng.gen_range(0..ids.len())],
                "name": name,
                "unit": unit,
                "value": (rng.gen_range(low..high) * 100.0_f64).round() / 100.0,
                "tags": { "source": "loadgen" }
            })
        })
        .collect();

    json!({ "metrics": metrics })
}

fn authorized(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

fn print_latency(label: &str, latency: &Distribution) {
    println!(
        "  {:<12} avg={:.1}ms min={:.1}ms max={:.1}ms p50={:.1}ms p99={:.1}ms",
        label, latency.avg, latency.min, latency.max, latency.p50, latency.p99
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let per_batch: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let batches: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
    let base_url =
        std::env::var("PULSEBOARD_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("PULSEBOARD_TOKEN").ok();

    println!("Pulseboard load generator");
    println!("=========================");
    println!("Target:             {}", base_url);
    println!("Metrics per batch:  {}", per_batch);
    println!("Batches:            {}", batches);
    println!();

    let client = Client::new();
    let mut rng = StdRng::seed_from_u64(12345);

    print!("Recording metrics... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let start = Instant::now();
    let mut latencies = Vec::with_capacity(batches);
    let mut accepted = 0u64;
    for _ in 0..batches {
        let body = generate_metrics(per_batch, &mut rng);
        let sent = Instant::now();
        let response = authorized(client.post(format!("{}/api/metrics/batch", base_url)), token.as_deref())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            eprintln!("Error: {}", response.text().await?);
            return Ok(());
        }
        latencies.push(sent.elapsed().as_secs_f64() * 1000.0);
        let result: Value = response.json().await?;
        accepted += result["inserted"].as_u64().unwrap_or(0);
    }
    let elapsed = start.elapsed();
    println!("done");
    println!("  Accepted:    {}", accepted);
    println!("  Metrics/sec: {:.0}", accepted as f64 / elapsed.as_secs_f64());
    print_latency("Batch", &Distribution::from_samples(latencies));
    println!();

    print!("Running executions... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let mut latencies = Vec::new();
    let mut failed = 0usize;
    for i in 0..batches {
        let (automation_id, automation_name) = AUTOMATIONS[i % AUTOMATIONS.len()];
        let sent = Instant::now();
        let created: Value = authorized(
            client.post(format!("{}/api/automation/executions", base_url)),
            token.as_deref(),
        )
        .json(&json!({
            "automation_id": automation_id,
            "automation_name": automation_name,
            "trigger": "loadgen"
        }))
        .send()
        .await?
        .json()
        .await?;

        let Some(id) = created["id"].as_str() else {
            eprintln!("Error: {}", created);
            return Ok(());
        };
        let executions = format!("{}/api/automation/executions/{}", base_url, id);
        authorized(client.post(format!("{}/start", executions)), token.as_deref())
            .send()
            .await?;

        let finish = if rng.gen_bool(0.1) {
            failed += 1;
            authorized(client.post(format!("{}/fail", executions)), token.as_deref())
                .json(&json!({ "error": "simulated failure" }))
        } else {
            authorized(client.post(format!("{}/complete", executions)), token.as_deref())
                .json(&json!({ "output": { "records": rng.gen_range(1..500) } }))
        };
        finish.send().await?;
        latencies.push(sent.elapsed().as_secs_f64() * 1000.0);
    }
    println!("done");
    println!("  Executions:  {} ({} failed)", batches, failed);
    print_latency("Lifecycle", &Distribution::from_samples(latencies));
    println!();

    println!("Server performance summary:");
    let summary: Value = authorized(
        client.get(format!("{}/api/performanceMonitoring/summary", base_url)),
        token.as_deref(),
    )
    .send()
    .await?
    .json()
    .await?;
    println!(
        "  Requests: {}  p95: {}ms  error rate: {}%",
        summary["requests"], summary["response_time"]["p95"], summary["error_rate"]
    );

    Ok(())
}
