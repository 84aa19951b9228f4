//! Interactive chat with tracing
//!
//! Every turn gets its own correlation ID. When you exit, the events recorded for
//! each turn are printed, grouped by that ID.
//!
//! ```bash
//! cargo run --example tracer_demo
//! ```

use llm_broker::llm::tools::SimpleDateTool;
use llm_broker::prelude::*;
use llm_broker::tracer::{of_type, with_correlation_id, ToolCallTracerEvent};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    println!("{}", "=".repeat(80));
    println!("Interactive Chat with Tracer Demonstration");
    println!("{}", "=".repeat(80));
    println!("Ask about dates (e.g. 'What day is tomorrow?'). Empty input exits.");
    println!();

    let tracer = Arc::new(TracerSystem::default());
    let gateway = Arc::new(OllamaGateway::new());
    let broker = LlmBroker::new("qwen2.5:7b", gateway, Some(tracer.clone())).with_source("tracer_demo");

    let tools: Vec<Box<dyn LlmTool>> = vec![Box::new(SimpleDateTool::new())];
    let mut conversation = vec![LlmMessage::system(
        "You are a helpful assistant. Use resolve_date for relative dates.",
    )];
    let mut turns = Vec::new();

    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        let correlation_id = Uuid::new_v4().to_string();
        conversation.push(LlmMessage::user(line.trim()));

        match broker
            .generate(&conversation, Some(&tools), None, Some(correlation_id.clone()))
            .await
        {
            Ok(reply) => {
                println!("Assistant: {}\n", reply);
                conversation.push(LlmMessage::assistant(reply));
            }
            Err(e) => eprintln!("Error: {}\n", e),
        }
        turns.push(correlation_id);
    }

    println!("\n{}", "=".repeat(80));
    println!("Trace Summary: {} events recorded", tracer.len());
    println!("{}", "=".repeat(80));

    for (i, correlation_id) in turns.iter().enumerate() {
        let filter = with_correlation_id(correlation_id.as_str());
        println!("\nTurn {} ({})", i + 1, correlation_id);
        for summary in tracer.get_event_summaries(None, None, Some(&filter)) {
            println!("{}\n", summary);
        }
    }

    let tool_calls = tracer.count_events(None, None, Some(&of_type::<ToolCallTracerEvent>()));
    println!("Tool calls across the session: {}", tool_calls);

    Ok(())
}
