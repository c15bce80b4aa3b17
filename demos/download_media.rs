//! Download a single URL as mp3 or mp4
//!
//! This demo shows the caller-facing flow of media-dl:
//! - Building a configuration
//! - Creating an orchestrator
//! - Streaming events (including raw tool output) to the terminal
//! - Cancelling on Ctrl+C
//!
//! ```bash
//! cargo run --example download_media -- https://example.com/watch?id=abc mp3
//! ```

use media_dl::config::{Config, FileCollisionAction};
use media_dl::{Event, Orchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("usage: download_media <url> [mp3|mp4]");
        std::process::exit(2);
    };
    let format = args.next().unwrap_or_else(|| "mp3".to_string());

    // Bundled tools are looked up in ./bin when MEDIA_DL_ENV=development,
    // otherwise next to the executable; PATH is the fallback either way
    let mut config = Config::default();
    config.download.file_collision = FileCollisionAction::Rename;

    let orchestrator = Orchestrator::new(config).await?;
    println!(
        "fetch tool: {}\ntranscoder: {}\nsaving to:  {}",
        orchestrator.tool_paths().fetcher.display(),
        orchestrator.tool_paths().transcoder.display(),
        orchestrator.config().download_dir().display()
    );

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Output { line, .. } => println!("  | {}", line),
                Event::AwaitingDestination { suggested, .. } => {
                    println!("Saving as {}", suggested.display())
                }
                Event::MetadataResolved { title, .. } => println!("Found: {}", title),
                _ => {}
            }
        }
    });

    let canceller = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling...");
            canceller.cancel_all().await;
        }
    });

    let response = orchestrator.download_media(&url, &format).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    orchestrator.shutdown().await?;
    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}
