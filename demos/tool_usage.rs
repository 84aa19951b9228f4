//! Tool calling with the broker.
//!
//! The model is given a date resolver and a clock. Whatever calls it makes are run
//! by the broker and fed back until it produces a final answer.
//!
//! Set `OPENAI_API_KEY` to use OpenAI instead of a local Ollama server.
//!
//! Run with: RUST_LOG=llm_broker=debug cargo run --example tool_usage

use llm_broker::llm::tools::{CurrentDatetimeTool, SimpleDateTool};
use llm_broker::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let broker = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            LlmBroker::new("gpt-4o-mini", Arc::new(OpenAIGateway::with_api_key(key)), None)
        }
        _ => LlmBroker::new("qwen3:32b", Arc::new(OllamaGateway::new()), None),
    }
    .with_max_tool_rounds(8);

    let tools: Vec<Box<dyn LlmTool>> =
        vec![Box::new(SimpleDateTool::new()), Box::new(CurrentDatetimeTool::new())];

    let messages = vec![
        LlmMessage::system("Use the tools to answer questions about dates."),
        LlmMessage::user("What is the date next Friday, and what time is it right now?"),
    ];

    let response = broker.generate(&messages, Some(&tools), None, None).await?;
    println!("{}", response);

    Ok(())
}
