//! Command-line interface parsing and the interactive chat loop.
//!
//! Startup runs in a fixed order: logging, configuration, model client, tool
//! registry, then the session controller. The loop reads lines from stdin and
//! routes them to slash commands or to the model.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::commands::{execute, parse_input, CommandResult, Input};
use crate::core::chat_client::{ChatBackend, ModelClient};
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::error::ValidationError;
use crate::core::options::OptionKind;
use crate::core::reply::ResponseView;
use crate::core::session::{SessionController, SessionSettings};
use crate::mcp::providers_from_config;
use crate::tools::{BuiltinTools, ToolRegistry};
use crate::ui::{InputSource, StdinInput, TerminalView};
use crate::utils::logging::{init_file_logging, DEFAULT_LOG_FILE};

const PROMPT: &str = "> ";

#[derive(Parser, Debug)]
#[command(name = "ollamarama")]
#[command(version)]
#[command(about = "A terminal chatbot for local LLMs served by Ollama")]
#[command(
    long_about = "Ollamarama is a terminal chatbot for models served by an Ollama instance. \
It can adopt any persona, stream replies as they are generated, hide the model's \
<think> reasoning, and optionally let the model call tools, including tools \
offered by MCP servers listed in the configuration.\n\n\
Configuration:\n\
  --config PATH, else ./config.toml, ./config.json, else the platform config\n\
  directory (for example ~/.config/ollamarama/config.toml).\n\n\
Controls:\n\
  Enter             Send the message\n\
  \\ at line end     Continue the message on the next line\n\
  Ctrl+C            Stop the reply being generated, or quit at the prompt\n\
  Ctrl+D            Quit\n\n\
Type /help in the chat for the list of commands."
)]
pub struct Args {
    /// Start with this persona instead of the configured one
    #[arg(short = 'p', long, value_name = "TEXT", conflicts_with_all = ["stock", "custom"])]
    pub persona: Option<String>,

    /// Start without any system prompt
    #[arg(short = 's', long, conflicts_with = "custom")]
    pub stock: bool,

    /// Start with a custom system prompt used verbatim
    #[arg(short = 'c', long, value_name = "TEXT")]
    pub custom: Option<String>,

    /// Model to use: a configured name or a full model id
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the Ollama server
    #[arg(short = 'b', long, value_name = "URL")]
    pub api_base: Option<String>,

    /// Sampling temperature (0-1)
    #[arg(short = 't', long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling top_p (0-1)
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Repetition penalty (0-2)
    #[arg(short = 'r', long)]
    pub repeat_penalty: Option<f64>,

    /// Start with tool calling enabled
    #[arg(long)]
    pub tools: bool,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Do not strip one layer of wrapping double quotes from non-streamed replies
    #[arg(long)]
    pub keep_quotes: bool,

    /// Configuration file to load
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where to write the session log
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    fn option_overrides(&self) -> impl Iterator<Item = (OptionKind, f64)> {
        [
            (OptionKind::Temperature, self.temperature),
            (OptionKind::TopP, self.top_p),
            (OptionKind::RepeatPenalty, self.repeat_penalty),
        ]
        .into_iter()
        .filter_map(|(kind, value)| value.map(|value| (kind, value)))
    }
}

/// Session settings from the configuration with command-line overrides
/// applied. Option overrides and the startup prompt also become what `/reset`
/// restores.
///
/// The model is selected separately so an unknown name can be reported
/// without aborting startup.
pub fn startup_settings(args: &Args, config: &Config) -> Result<SessionSettings, ValidationError> {
    let mut settings = SessionSettings::from_config(config);
    for (kind, value) in args.option_overrides() {
        settings.options.set(kind, value)?;
    }
    if let Some(persona) = &args.persona {
        settings.personality = persona.clone();
    }
    if args.stock {
        settings.personality.clear();
    }
    settings.custom_prompt = args.custom.clone();
    settings.tools_enabled = args.tools;
    settings.streaming = !args.no_stream;
    Ok(settings)
}

/// Cancels the current turn when Ctrl+C arrives. The watcher stops when the
/// guard is dropped.
struct InterruptGuard {
    cancel: CancellationToken,
    watcher: JoinHandle<()>,
}

impl InterruptGuard {
    fn arm() -> Self {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Ctrl+C received, cancelling turn");
                    cancel.cancel();
                }
            })
        };
        Self { cancel, watcher }
    }

    fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    if let Err(err) = init_file_logging(&log_file) {
        eprintln!(
            "Warning: could not open log file {}: {err}",
            path_display(&log_file)
        );
    }

    let (config, config_path) = Config::load(args.config.as_deref())?;
    info!(config = %path_display(&config_path), "Configuration loaded");

    let mut settings = startup_settings(&args, &config)?;
    if settings.default_model.is_empty() {
        return Err(format!("No models configured in {}", path_display(&config_path)).into());
    }
    let mut view = TerminalView::stdout();
    if let Some(model) = &args.model {
        if let Err(err) = settings.select_model(model) {
            view.error(&format!("{err}. Using {}", settings.default_model));
        }
    }

    let api_base = args.api_base.as_deref().unwrap_or(&config.api_base);
    let client = ModelClient::new(api_base, config.request_timeout())?
        .with_quote_normalization(config.normalize_quotes && !args.keep_quotes);
    info!(api = client.api_url(), model = %settings.default_model, "Model client ready");
    let backend: Arc<dyn ChatBackend> = Arc::new(client);

    let registry = ToolRegistry::discover(BuiltinTools::load()?, providers_from_config(&config)).await;
    let mut session = SessionController::new(backend, registry, settings, view);
    let banner = banner(&session, &config_path);
    session.view_mut().notice(&banner);

    {
        let guard = InterruptGuard::arm();
        let _ = session.reset(guard.token()).await;
    }

    let mut input = StdinInput::new();
    chat_loop(&mut session, &mut input).await;
    info!("Session ended");
    Ok(())
}

fn banner<V: ResponseView>(session: &SessionController<V>, config_path: &Path) -> String {
    let tools = if session.tools_enabled() {
        format!("on, {} available", session.registry().len())
    } else {
        "off".to_string()
    };
    format!(
        "Model: {} | Tools: {} | Config: {}\nType /help for commands.",
        session.model(),
        tools,
        path_display(config_path)
    )
}

/// Reads and dispatches lines until the user quits or input ends.
pub async fn chat_loop<I: InputSource + ?Sized>(
    session: &mut SessionController<TerminalView<std::io::Stdout>>,
    input: &mut I,
) {
    loop {
        let line = match input.read_line(PROMPT).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("Failed to read input: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let guard = InterruptGuard::arm();
        match parse_input(&line) {
            Input::Message(text) => {
                let _ = session.send(&text, guard.token()).await;
            }
            Input::Command(command) => {
                match execute(command, session, input, guard.token()).await {
                    CommandResult::Continue => {}
                    CommandResult::ClearScreen => session.view_mut().clear_screen(),
                    CommandResult::Quit => break,
                }
            }
        }
    }
}
