use futures::StreamExt;
use sambung_ai::{ChatClient, ChatMessage, ModelRegistry, ProviderConfig, ProviderKind, StreamEvent};
use std::io::Write;

const PROMPT: &str = "Reply with the single word: pong";

/// Run one streamed completion against `provider` and report what came back.
pub async fn run_doctor(provider: ProviderKind, model: Option<&str>, api_key: Option<&str>) -> anyhow::Result<()> {
    let client = ChatClient::builder().build();
    let model = model.unwrap_or_else(|| ModelRegistry::default_model(provider));

    let mut config = ProviderConfig::new(provider, model);
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }

    println!("\n📋 Checking {}/{}...", provider, model);
    if ModelRegistry::lookup(provider, model).is_none() {
        println!("  Catalogue:  ⚠️  not a known model, trying anyway");
    }

    let mut events = match client.stream("doctor", &config, vec![ChatMessage::user(PROMPT)]).await {
        Ok(events) => events,
        Err(e) => {
            println!("  Setup:      ❌ {:?}: {}", e.kind, e.message);
            return Ok(());
        }
    };

    print!("  Output:     ");
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Delta { text } => {
                print!("{}", text);
                stdout.flush()?;
            }
            StreamEvent::Finish { finish_reason, usage } => {
                println!();
                println!(
                    "  Stream:     ✅ {} tokens ({} in / {} out), finish={:?}",
                    usage.total_tokens, usage.prompt_tokens, usage.completion_tokens, finish_reason
                );
            }
            StreamEvent::Error { error } => {
                println!();
                println!("  Stream:     ❌ {:?}: {}", error.kind, error.message);
                if let Some(tips) = error.details.and_then(|d| d.troubleshooting) {
                    for tip in tips {
                        println!("              - {}", tip);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Print the model catalogue, optionally for one provider.
pub fn print_models(provider: Option<ProviderKind>) {
    let client = ChatClient::builder().build();
    for info in client.list_models(provider) {
        println!(
            "{:<11} {:<40} {:>8}  {:<6} {}",
            info.provider.as_str(),
            info.id,
            info.context_window,
            format!("{:?}", info.cost_tier).to_lowercase(),
            info.best_for
        );
    }
}
