//! Minimal text generation through the broker.
//!
//! Run with: cargo run --example simple_llm

use llm_broker::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let gateway = OllamaGateway::new();
    let broker = LlmBroker::new("qwen3:32b", Arc::new(gateway), None);

    let messages = vec![LlmMessage::user("Explain what Rust is in one sentence.")];

    println!("Generating response...");
    let response = broker.generate(&messages, None, None, None).await?;

    println!("\nResponse: {}", response);

    Ok(())
}
