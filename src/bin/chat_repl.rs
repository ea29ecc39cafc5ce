//! Interactive terminal client for the vaani session engine.

use std::io::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vaani::prefs::PreferencesStore;
use vaani::speech::{CpalRecorder, CpalSink};
use vaani::{ConfigStore, EngineConfig, InputState, SessionManager, VoiceOrchestrator};

/// Vaani: multilingual voice assistant client.
#[derive(Parser)]
#[command(name = "vaani", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the session language (e.g. "hi").
    #[arg(short, long)]
    language: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session.
    Chat,

    /// Start a push-to-talk voice session.
    Voice,

    /// List available audio devices.
    Devices,

    /// Probe the backend health endpoint.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vaani=info,reqwest=warn,hyper=warn")),
        )
        .init();

    let cli = Cli::parse();

    let store = match cli.config {
        Some(ref path) => ConfigStore::new(path),
        None => ConfigStore::new(ConfigStore::default_path()),
    };
    let mut config = store.load()?;

    // Language resolution: CLI flag, then saved preference, then config.
    let prefs_store = PreferencesStore::new(PreferencesStore::default_path());
    let prefs = prefs_store.load()?;
    config.session.language = cli.language.unwrap_or(prefs.language);
    config.validate()?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config, prefs_store).await,
        Command::Voice => run_voice(config).await,
        Command::Devices => list_devices(),
        Command::Health => probe_health(config).await,
    }
}

async fn run_chat(config: EngineConfig, prefs_store: PreferencesStore) -> anyhow::Result<()> {
    println!("Vaani v{}", env!("CARGO_PKG_VERSION"));

    let language = config.session.language.clone();
    let manager = SessionManager::new(&config)?;
    let session = manager.start(&language).await?;
    println!(
        "Session {} started in '{}'. Type a question, '/lang <code>' to switch language,\n'/clear' to reset, '/quit' to exit.\n",
        session.id, session.language
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                match manager.clear() {
                    Ok(()) => println!("history cleared"),
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }
            _ if line.starts_with("/lang ") => {
                let code = line.trim_start_matches("/lang ").trim();
                match manager.change_language(code).await {
                    Ok(session) => {
                        let mut prefs = prefs_store.load().unwrap_or_default();
                        prefs.language = session.language.clone();
                        if let Err(e) = prefs_store.save(&prefs) {
                            tracing::warn!(error = %e, "could not persist language preference");
                        }
                        println!("language switched to '{}'", session.language);
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }
            _ => {}
        }

        let handle = manager
            .send_streaming(
                line,
                |token| {
                    print!("{token}");
                    let _ = std::io::stdout().flush();
                },
                |sources| {
                    if !sources.is_empty() {
                        println!();
                        for source in sources {
                            println!("  [{}] {} <{}>", source.score, source.title, source.url);
                        }
                    }
                },
            )
            .await;

        match handle {
            Ok(handle) => match handle.finished().await {
                Ok(Some(turn)) if turn.fallback => {
                    println!("\n(no reliable answer: {})", turn.content)
                }
                Ok(Some(_)) => println!(),
                Ok(None) => println!("\n(cancelled)"),
                Err(e) => eprintln!("\nerror: {e}"),
            },
            Err(e) => eprintln!("error: {e}"),
        }
    }

    println!("bye");
    Ok(())
}

async fn run_voice(config: EngineConfig) -> anyhow::Result<()> {
    println!("Vaani v{}", env!("CARGO_PKG_VERSION"));

    let language = config.session.language.clone();
    let manager = SessionManager::new(&config)?;
    let session = manager.start(&language).await?;
    let mut voice = VoiceOrchestrator::from_config(&config)?;
    println!(
        "Session {} started in '{}'. Press Enter to start recording, Enter again\nto send, '/quit' to exit.\n",
        session.id, session.language
    );

    let stdin = std::io::stdin();
    loop {
        let prompt = match voice.input_state() {
            InputState::Recording => "recording... press Enter to send > ",
            _ => "press Enter to talk > ",
        };
        print!("{prompt}");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "/quit" | "/exit" => break,
            _ => {}
        }

        if voice.input_state() != InputState::Recording {
            if let Err(e) = voice.start_recording() {
                eprintln!("error: {e}");
            }
            continue;
        }

        match voice.converse(&manager).await {
            Ok(Some(turn)) if turn.fallback => {
                println!("(no reliable answer: {})", turn.content)
            }
            Ok(Some(turn)) => println!("{}", turn.content),
            Ok(None) => {}
            Err(e) => eprintln!("error: {e}"),
        }
    }

    println!("bye");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalRecorder::list_input_devices()? {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in CpalSink::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

async fn probe_health(config: EngineConfig) -> anyhow::Result<()> {
    let client = vaani::backend::BackendClient::new(&config.backend)?;
    let health = client.health().await?;
    println!(
        "{} {} ({}): up {:.0}s",
        health.service, health.version, health.status, health.uptime_seconds
    );
    Ok(())
}
