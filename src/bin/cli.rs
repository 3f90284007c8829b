//! CLI binary for friday.

use clap::{Parser, Subcommand};
use friday::access::AccessMode;
use friday::audio::{MicRecorder, SpeakerOutput};
use friday::auth::{Authenticator, FixedAuthenticator, GalleryAuthenticator, MicVoiceprintProbe};
use friday::intent::KeywordIntentClassifier;
use friday::llm::OllamaClient;
use friday::session::{self, Engines};
use friday::stt::{ConsoleStt, HttpStt, SpeechToText};
use friday::tts::{ConsoleTts, HttpTts, TextToSpeech};
use friday::{AssistantConfig, RuntimeEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Friday: a private voice assistant with owner-gated memory.
#[derive(Parser)]
#[command(name = "friday", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "FRIDAY_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a conversation.
    Chat {
        /// Type instead of speaking; replies are printed instead of spoken.
        #[arg(long)]
        text: bool,
        /// Skip owner authentication and run as a guest.
        #[arg(long)]
        guest: bool,
    },

    /// Record a voice sample and add it to the owner gallery.
    Enroll,

    /// Inspect long-term memory.
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// List available audio devices.
    Devices,
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Print the most recent memories (owner only).
    Recall {
        /// Maximum number of records to show.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("friday=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Chat {
        text: false,
        guest: false,
    }) {
        Command::Chat { text, guest } => run_chat(config, text, guest).await,
        Command::Enroll => run_enroll(config).await,
        Command::Memory {
            action: MemoryCommand::Recall { limit },
        } => run_recall(config, limit).await,
        Command::Devices => list_devices(),
    }
}

/// Load and validate the configuration, so every command fails early on bad values.
fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<AssistantConfig> {
    let default_path = AssistantConfig::default_config_path();
    let config = match explicit {
        Some(path) => AssistantConfig::from_file(path)?,
        None if default_path.exists() => {
            info!("loading config from {}", default_path.display());
            AssistantConfig::from_file(&default_path)?
        }
        None => AssistantConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_authenticator(
    config: &AssistantConfig,
    guest: bool,
) -> anyhow::Result<Box<dyn Authenticator>> {
    if guest {
        return Ok(Box::new(FixedAuthenticator(AccessMode::Guest)));
    }
    let probe = MicVoiceprintProbe::new(
        MicRecorder::new(&config.audio),
        Duration::from_secs_f32(config.auth.probe_duration_secs),
    );
    Ok(Box::new(GalleryAuthenticator::from_dir(
        &config.auth.gallery_dir,
        probe,
    )?))
}

async fn run_chat(config: AssistantConfig, text: bool, guest: bool) -> anyhow::Result<()> {
    println!("Friday v{}", env!("CARGO_PKG_VERSION"));

    let (stt, tts): (Box<dyn SpeechToText>, Box<dyn TextToSpeech>) = if text {
        let eof_phrase = config
            .session
            .exit_phrases
            .first()
            .cloned()
            .unwrap_or_else(|| "exit".to_owned());
        (
            Box::new(ConsoleStt::stdin("You: ", eof_phrase)),
            Box::new(ConsoleTts::new(config.llm.assistant_name.clone())),
        )
    } else {
        (
            Box::new(HttpStt::new(&config.stt, MicRecorder::new(&config.audio))),
            Box::new(HttpTts::new(&config.tts, SpeakerOutput::new(&config.audio))),
        )
    };

    let engines = Engines {
        stt,
        tts,
        classifier: Box::new(KeywordIntentClassifier::new(&config.intent)),
        llm: Box::new(OllamaClient::new(&config.llm)?),
    };

    if !guest {
        println!("\nAuthenticating... please say a few words.");
    }
    let mut authenticator = build_authenticator(&config, guest)?;
    let assistant_name = config.llm.assistant_name.clone();
    let exit_hint = config.session.exit_phrases.join(", ");
    let pipeline = session::start(config, authenticator.as_mut(), engines).await?;
    println!("Access mode: {}", pipeline.access());

    let (events_tx, _) = broadcast::channel::<RuntimeEvent>(64);
    if !text {
        spawn_transcript_printer(events_tx.subscribe(), assistant_name);
    }
    let pipeline = pipeline.with_runtime_events(events_tx);
    let cancel = pipeline.cancel_token();

    // Handle Ctrl+C
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    println!("\nReady! Say one of [{exit_hint}] to finish. Press Ctrl+C to quit.\n");
    pipeline.run().await?;
    Ok(())
}

/// Echo the spoken conversation to the terminal in voice mode.
fn spawn_transcript_printer(mut rx: broadcast::Receiver<RuntimeEvent>, assistant_name: String) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(RuntimeEvent::Utterance(text)) => println!("You: {text}"),
                Ok(RuntimeEvent::Reply { text, .. }) => println!("{assistant_name}: {text}"),
                Ok(RuntimeEvent::SessionEnded) | Err(broadcast::error::RecvError::Closed) => break,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    });
}

async fn run_enroll(config: AssistantConfig) -> anyhow::Result<()> {
    let clip = Duration::from_secs_f32(config.auth.probe_duration_secs);
    let mut probe = MicVoiceprintProbe::new(MicRecorder::new(&config.audio), clip);

    println!(
        "Recording {:.1}s owner sample, please speak naturally...",
        clip.as_secs_f32()
    );
    let path = friday::auth::enroll(&mut probe, &config.auth.gallery_dir).await?;
    println!("Saved voiceprint to {}", path.display());
    Ok(())
}

async fn run_recall(config: AssistantConfig, limit: Option<usize>) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(config.memory.recall_limit);
    let mut authenticator = build_authenticator(&config, false)?;
    println!("Authenticating... please say a few words.");
    let outcome = session::recall(&config, authenticator.as_mut(), limit).await?;
    println!("{}", outcome.message());
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in MicRecorder::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in SpeakerOutput::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}
