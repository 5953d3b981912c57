use anyhow::Result;
use colored::Colorize;
use llm_telemetry::{
    config, Config, DeliveryMode, Generation, IngestionClient, MemoryDeadLetterSink, Span, Trace,
    Usage,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Execute the ping command
///
/// Sends one trace with a span and a generation, delivering inline so the
/// outcome of the request is reported here.
pub async fn execute(path: Option<&Path>, name: &str) -> Result<()> {
    // a probe reports the first failure instead of waiting out the backoff
    let cfg = Config {
        max_retries: 0,
        ..config::load_config(path)?
    };
    println!("{} {}", "Pinging".yellow(), cfg.ingestion_url());

    let dead_letters = Arc::new(MemoryDeadLetterSink::new());
    let client = IngestionClient::builder(cfg)
        .delivery_mode(DeliveryMode::Inline)
        .dead_letter_sink(dead_letters.clone())
        .build()?;

    let start = Instant::now();
    let trace = client
        .trace(Trace {
            input: Some(json!({"ping": true})),
            ..Trace::new(name)
        })
        .await?;
    let trace_id = trace.id.clone().unwrap_or_default();

    let mut span = client.span(Span::new(trace_id.clone(), "ping-span")).await?;
    let mut generation = client
        .generation(Generation {
            parent_observation_id: span.id.clone(),
            model: Some("ping-model".to_string()),
            ..Generation::new(trace_id.clone(), "ping-generation")
        })
        .await?;

    generation.usage = Some(Usage {
        input: Some(1),
        output: Some(1),
        total: Some(2),
        unit: Some("TOKENS".to_string()),
    });
    generation.end();
    client.update_generation(&generation).await?;

    span.end();
    client.update_span(&span).await?;

    let result = client.flush().await;
    client.shutdown().await?;

    match result {
        Ok(()) if dead_letters.is_empty() => {
            println!(
                "{} trace {} delivered in {}ms",
                "✓".green(),
                trace_id,
                start.elapsed().as_millis()
            );
            Ok(())
        }
        Ok(()) => {
            for letter in dead_letters.take_all() {
                println!(
                    "{} {} {}",
                    "✗".red(),
                    letter.envelope.event_type.as_str(),
                    letter.reason
                );
            }
            anyhow::bail!("some records were rejected by the ingestion API")
        }
        Err(e) => {
            println!("{} {}", "✗ Delivery failed:".red(), e);
            Err(e.into())
        }
    }
}
