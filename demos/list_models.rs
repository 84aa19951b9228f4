//! List the models each configured provider can serve
//!
//! ```bash
//! cargo run --example list_models
//! ```
//!
//! Ollama is queried at `OLLAMA_HOST` (default http://localhost:11434). OpenAI is
//! queried only when `OPENAI_API_KEY` is set.

use llm_broker::prelude::*;

fn print_models(provider: &str, result: Result<Vec<String>>) {
    println!("{} Models:", provider);
    match result {
        Ok(models) if models.is_empty() => println!("  No models found."),
        Ok(models) => {
            for model in models {
                println!("- {}", model);
            }
        }
        Err(e) => eprintln!("  Error: {}", e),
    }
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    print_models("Ollama", OllamaGateway::new().get_available_models().await);

    if std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.is_empty()) {
        print_models("OpenAI", OpenAIGateway::new().get_available_models().await);
    }

    Ok(())
}
