//! Streaming text generation with tool calling
//!
//! Text is printed as it arrives. When the model asks for `resolve_date`, the broker
//! runs it between rounds and keeps streaming the model's follow-up.
//!
//! Run with: cargo run --example streaming

use futures::stream::StreamExt;
use llm_broker::llm::broker::LlmBroker;
use llm_broker::llm::gateways::ollama::OllamaGateway;
use llm_broker::llm::models::LlmMessage;
use llm_broker::llm::tools::{LlmTool, SimpleDateTool};
use std::io::Write;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("Streaming response with tool calling enabled...\n");

    let gateway = Arc::new(OllamaGateway::new());
    let broker = LlmBroker::new("qwen3:32b", gateway, None);

    let tools: Vec<Box<dyn LlmTool>> = vec![Box::new(SimpleDateTool::new())];

    let messages = vec![LlmMessage::user(
        "Tell me a short story about a dragon. In your story, reference several dates \
         relative to today, like 'three days from now' or 'last week'. Keep it brief.",
    )];

    let mut stream = broker.generate_stream(&messages, Some(&tools), None, None);

    while let Some(result) = stream.next().await {
        match result {
            Ok(chunk) => {
                print!("{}", chunk);
                std::io::stdout().flush()?;
            }
            Err(e) => eprintln!("\nError: {}", e),
        }
    }

    println!("\n\nDone!");
    Ok(())
}
