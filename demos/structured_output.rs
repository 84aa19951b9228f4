//! Structured output: the reply is deserialized straight into a Rust type.
//!
//! Run with: cargo run --example structured_output

use llm_broker::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
struct Sentiment {
    label: String,
    confidence: f32,
    reasoning: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let broker = LlmBroker::new("qwen3:32b", Arc::new(OllamaGateway::new()), None);

    let messages = vec![LlmMessage::user(
        "Analyze the sentiment of this text: 'I absolutely love this product! It exceeded all my expectations.'",
    )];

    println!("Generating structured sentiment analysis...");
    let sentiment: Sentiment = broker.generate_object(&messages, None, None).await?;

    println!("\nSentiment Analysis:");
    println!("  Label: {}", sentiment.label);
    println!("  Confidence: {:.2}", sentiment.confidence);
    println!("  Reasoning: {}", sentiment.reasoning);

    Ok(())
}
