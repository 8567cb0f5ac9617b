//! Interactive console for exercising scenario dialogs.
//!
//! Loads a scenario directory and runs a single-conversation REPL:
//! messages go through intent matching and dialog execution exactly as
//! they would from a real channel. `:reload` re-reads the directory,
//! `:quit` exits.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use scenarist::runtime::Attachment;
use scenarist::store::DirectoryStore;
use scenarist::{System, SystemConfig};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scenarist", about = "Scenario dialog console")]
struct Args {
    /// Directory holding scenario JSON documents
    #[arg(short, long, default_value = "./scenarios")]
    scenarios: String,

    /// Optional system config file (JSON)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };

    let store = Arc::new(DirectoryStore::new(&args.scenarios));
    let system = System::new(config, store);
    let report = system.reload().await?;
    println!(
        "loaded {} dialog(s): {}",
        report.dialogs.len(),
        report.dialogs.join(", ")
    );
    for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.name, skipped.reason);
    }

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            ":quit" => break,
            ":reload" => {
                match system.reload().await {
                    Ok(report) => println!("reloaded {} dialog(s)", report.dialogs.len()),
                    Err(e) => warn!("reload failed: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let reply = system.handle_message("console", line).await?;
        for message in reply.messages {
            println!("{}", message.text);
            for attachment in &message.attachments {
                match attachment {
                    Attachment::Image(url) => println!("  [image] {}", url),
                    Attachment::Card {
                        title,
                        button_label,
                        button_url,
                    } => println!("  [card] {} ({} -> {})", title, button_label, button_url),
                }
            }
            if let Some(input) = &message.input {
                if !input.choices.is_empty() {
                    println!("  ({})", input.choices.join(" / "));
                } else {
                    println!("  (expecting {})", input.kind);
                }
            }
        }
    }
    Ok(())
}
