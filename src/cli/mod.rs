//! Command-line interface parsing and process bootstrap.
//!
//! Startup order: settings, logging, shutdown signals, engine, then the
//! interactive session (or only the engine in headless mode).

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::backend::HttpBackendFactory;
use crate::core::config::data::default_config_path;
use crate::core::config::{path_display, Settings, SettingsStore};
use crate::core::credentials::default_credential_store;
use crate::core::engine::{Engine, DEFAULT_HEARTBEAT, DEFAULT_SHUTDOWN_GRACE};
use crate::core::session::Session;
use crate::core::shutdown::spawn_signal_listener;
use crate::core::workspace::{Workspace, WorkspaceStore};
use crate::ui::chat_loop::{ChatLoop, ChatServices, ExitReason, StdinLineReader};
use crate::ui::keystroke::{CrosstermKeyProbe, KeyProbe};
use crate::ui::renderer::Renderer;
use crate::ui::secret::HiddenSecretPrompt;
use crate::ui::terminal::{install_panic_hook, RawModeController};
use crate::utils::logging::{init_logging, LogTarget};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", commit ",
    env!("VERGEN_GIT_SHA"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "subconscious", version, long_version = LONG_VERSION)]
#[command(about = "Streaming terminal chat with press-any-key interruption")]
#[command(
    long_about = "Subconscious streams model responses into the terminal. Press any key while a \
response is streaming to stop it.\n\n\
Commands at the prompt:\n\
  /model <provider>:<model>   Select the provider and model\n\
  /key <provider>             Store a provider credential (typed without echo)\n\
  /config                     Show the active configuration\n\
  /help                       List commands\n\
  /exit, /quit                Leave the session\n\n\
Environment Variables:\n\
  LOG_LEVEL          Log filter (default: info, debug with --dev)\n\
  OPENAI_API_KEY     Fallback credential for openai (likewise ANTHROPIC_API_KEY, ...)"
)]
pub struct Args {
    /// Keep data and settings apart from a normal install and log at debug level
    #[arg(long, global = true)]
    pub dev: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start the interactive session (default)
    Chat,
    /// Run only the background engine until interrupted
    Engine,
}

impl Commands {
    fn label(self) -> &'static str {
        match self {
            Commands::Chat => "chat",
            Commands::Engine => "engine",
        }
    }

    fn log_target(self) -> LogTarget {
        match self {
            Commands::Chat => LogTarget::File,
            Commands::Engine => LogTarget::Stderr,
        }
    }
}

impl Args {
    pub fn mode(&self) -> Commands {
        self.command.unwrap_or(Commands::Chat)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| default_config_path(self.dev))
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main(args));
    // The stdin reader thread may still be parked in a blocking read.
    runtime.shutdown_background();
    result
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let mode = args.mode();
    let store = SettingsStore::new(args.config_path());
    let (settings, save_error) = store.load_or_init(args.dev)?;

    match init_logging(&settings, args.dev, mode.log_target()) {
        Ok(Some(path)) => {
            if args.dev {
                eprintln!("Logging to {}", path_display(&path));
            }
        }
        Ok(None) => {}
        Err(err) => eprintln!("Logging disabled: {err}"),
    }
    if let Some(err) = save_error {
        warn!(error = %err, "could not save initial settings");
    }
    info!(
        mode = mode.label(),
        dev = args.dev,
        settings = %path_display(store.path()),
        version = env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let shutdown = CancellationToken::new();
    let signals = spawn_signal_listener(shutdown.clone());
    let engine = Engine::start(&settings, &shutdown, DEFAULT_HEARTBEAT).await;

    let outcome = match mode {
        Commands::Engine => {
            eprintln!("{}", settings.summary(mode.label(), args.dev, store.path()));
            eprintln!("Engine running. Press Ctrl+C to stop.");
            shutdown.cancelled().await;
            Ok(())
        }
        Commands::Chat => {
            install_panic_hook();
            let workspace = engine.workspace().clone();
            let persisted = engine.is_persisted();
            run_session(settings, store, &workspace, persisted, args.dev, shutdown.clone())
                .await
                .map(|reason| info!(reason = ?reason, "session ended"))
        }
    };

    shutdown.cancel();
    if !engine.shutdown(DEFAULT_SHUTDOWN_GRACE).await {
        warn!("engine shutdown timed out");
    }
    let _ = signals.await;
    info!("stopped");
    outcome
}

async fn run_session(
    settings: Settings,
    store: SettingsStore,
    workspace: &Workspace,
    persisted: bool,
    dev: bool,
    shutdown: CancellationToken,
) -> Result<ExitReason, Box<dyn Error>> {
    let transcript = if persisted {
        match WorkspaceStore::new(&settings).open_transcript(workspace) {
            Ok(transcript) => Some(transcript),
            Err(err) => {
                warn!(error = %err, "transcript disabled");
                None
            }
        }
    } else {
        None
    };

    println!(
        "Subconscious {} | workspace: {} | model: {}",
        env!("CARGO_PKG_VERSION"),
        workspace.name,
        settings
            .model_label()
            .unwrap_or_else(|| "(none, use /model)".to_string())
    );
    println!("Type /help for commands. Press any key to interrupt a response.");

    let services = ChatServices {
        credentials: default_credential_store(),
        backends: Arc::new(HttpBackendFactory::new()),
        terminal: RawModeController::crossterm(),
        probes: Box::new(|| Box::new(CrosstermKeyProbe) as Box<dyn KeyProbe>),
        secrets: Box::new(HiddenSecretPrompt),
        renderer: Renderer::default(),
        settings_store: store,
        transcript,
        dev,
    };
    let lines = StdinLineReader::spawn()?;
    let mut chat = ChatLoop::new(Session::new(settings), services, lines, io::stdout(), shutdown);
    Ok(chat.run().await)
}
