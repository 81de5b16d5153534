//! padscan - gamepad navigation over on-screen text
//!
//! Hosts the engine against a snapshot surface file. Synthetic events go to
//! stdout as JSON lines, or to a terminal preview that simulates the popup.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use padscan::config::Config;
use padscan::core::tokenizer::TokenizeReply;
use padscan::core::Engine;
use padscan::data::{PopupEvent, SurfaceEvent};
use padscan::frontend::{Frontend, FrontendEvent, KeyAction, PreviewView, SimulatedPopupLookup, TuiFrontend};
use padscan::lookup::{JsonLinesLookup, LookupTool};
use padscan::network::{InputServerConnection, ServerMessage};
use padscan::surface::{SnapshotSurface, SurfaceFileWatcher, TextSurface};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the surface file's modification time is checked
const SURFACE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "padscan")]
#[command(about = "Gamepad navigation over on-screen text for dictionary lookups", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Snapshot surface to navigate (JSON, reloaded when the file changes)
    #[arg(short, long, value_name = "FILE")]
    surface: Option<PathBuf>,

    /// Where synthetic events go
    #[arg(long, value_enum, default_value = "stdout")]
    sink: SinkType,

    /// Input server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Input server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Custom data directory (default: ~/.padscan)
    /// Can also be set via PADSCAN_DIR environment variable
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkType {
    /// One JSON object per line on stdout; popup notifications on stdin
    Stdout,
    /// Terminal preview with a simulated popup
    Preview,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration and any validation warnings
    CheckConfig,
    /// Print the built-in default configuration
    DumpDefaultConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_to_file = cli.command.is_none() && cli.sink == SinkType::Preview;
    init_logging(log_to_file)?;

    // Set custom data directory if specified (via CLI or environment variable)
    if let Some(data_dir) = &cli.data_dir {
        std::env::set_var("PADSCAN_DIR", data_dir);
        info!("Using custom data directory: {:?}", data_dir);
    } else if let Ok(env_dir) = std::env::var("PADSCAN_DIR") {
        info!("Using data directory from PADSCAN_DIR: {}", env_dir);
    }

    if let Some(Commands::DumpDefaultConfig) = cli.command {
        print!("{}", Config::default_toml());
        return Ok(());
    }

    let mut config = Config::load_with_options(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }

    if let Some(Commands::CheckConfig) = cli.command {
        return check_config(&cli, &config);
    }

    let surface_path = cli
        .surface
        .clone()
        .context("--surface FILE is required to run")?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = match cli.sink {
        SinkType::Stdout => runtime.block_on(run_stdout(config, &surface_path)),
        SinkType::Preview => runtime.block_on(run_preview(config, &surface_path)),
    };
    // The stdin reader can still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

fn init_logging(to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if to_file {
        // The preview owns the terminal, so we write to a file
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("padscan.log")
            .context("Failed to open padscan.log")?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        // stdout carries the event stream
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn check_config(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.config {
        Some(path) => println!("# config: {:?}", path),
        None => println!("# config: {:?}", Config::config_path()?),
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", contents);

    let warnings = config.validate();
    if warnings.is_empty() {
        eprintln!("Config is valid");
    } else {
        for warning in &warnings {
            eprintln!("warning: {}", warning);
        }
    }
    Ok(())
}

/// Engine plus every channel feeding it
struct Host<L: LookupTool> {
    engine: Engine<SnapshotSurface, L>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    token_rx: mpsc::UnboundedReceiver<TokenizeReply>,
    surface_rx: mpsc::UnboundedReceiver<SurfaceEvent>,
    watcher: SurfaceFileWatcher,
    network: tokio::task::JoinHandle<()>,
}

impl<L: LookupTool> Host<L> {
    fn start(config: Config, surface_path: &Path, lookup: L) -> Result<Self> {
        let mut surface = SnapshotSurface::load(surface_path)?;
        let watcher = SurfaceFileWatcher::new(surface_path);
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        surface.on_mutate(surface_tx);
        info!(
            "Loaded surface {:?} ({} blocks)",
            surface_path,
            surface.document().blocks.len()
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (token_tx, token_rx) = mpsc::unbounded_channel();

        let conn = &config.connection;
        let network = tokio::spawn(InputServerConnection::run(
            conn.host.clone(),
            conn.port,
            Duration::from_millis(conn.reconnect_delay_ms),
            server_tx,
            command_rx,
        ));

        let mut engine = Engine::new(config, surface, lookup);
        engine.set_outbound(command_tx);
        engine.set_token_replies(token_tx);

        Ok(Self {
            engine,
            server_rx,
            token_rx,
            surface_rx,
            watcher,
            network,
        })
    }

    fn on_server_message(&mut self, msg: ServerMessage, now: Instant) {
        match msg {
            ServerMessage::Message(msg) => self.engine.handle_inbound(msg, now),
            ServerMessage::Connected => self.engine.on_connection(true, now),
            ServerMessage::Disconnected => self.engine.on_connection(false, now),
        }
    }

    /// Apply everything already queued; true if anything arrived
    fn drain(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Ok(msg) = self.server_rx.try_recv() {
            self.on_server_message(msg, now);
            changed = true;
        }
        while let Ok(reply) = self.token_rx.try_recv() {
            self.engine.on_local_tokens(reply, now);
            changed = true;
        }
        while self.surface_rx.try_recv().is_ok() {
            self.engine.on_surface_mutated();
            changed = true;
        }
        changed
    }

    fn reload_surface(&mut self) {
        match self.watcher.poll() {
            Ok(Some(document)) => {
                info!("Surface file {:?} changed, reloading", self.watcher.path());
                self.engine.surface_mut().replace(document);
            }
            Ok(None) => {}
            Err(e) => warn!("{:#}", e),
        }
    }

    async fn shutdown(mut self) {
        self.engine.deactivate(Instant::now());
        self.network.abort();
        let _ = self.network.await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Popup lifecycle notifications from the host, one JSON object per line
async fn read_popup_events(popup_tx: mpsc::UnboundedSender<PopupEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<PopupEvent>(line) {
                    Ok(event) => {
                        if popup_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring popup notification {:?}: {}", line, e),
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

async fn run_stdout(config: Config, surface_path: &Path) -> Result<()> {
    let mut host = Host::start(config, surface_path, JsonLinesLookup::new(std::io::stdout()))?;

    let (popup_tx, mut popup_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_popup_events(popup_tx));

    let mut reload = tokio::time::interval(SURFACE_POLL_INTERVAL);
    reload.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let deadline = host.engine.next_deadline();
        tokio::select! {
            Some(msg) = host.server_rx.recv() => host.on_server_message(msg, Instant::now()),
            Some(reply) = host.token_rx.recv() => host.engine.on_local_tokens(reply, Instant::now()),
            Some(_) = host.surface_rx.recv() => host.engine.on_surface_mutated(),
            Some(event) = popup_rx.recv() => host.engine.on_popup_event(event),
            _ = reload.tick() => host.reload_surface(),
            _ = sleep_until_deadline(deadline) => host.engine.tick(Instant::now()),
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
        host.engine.flush_refresh(Instant::now());
    }

    host.shutdown().await;
    Ok(())
}

fn apply_key_action<S: TextSurface, L: LookupTool>(engine: &mut Engine<S, L>, action: KeyAction, now: Instant) {
    match action {
        KeyAction::Navigate(direction) => engine.manual_navigate(direction, now),
        KeyAction::Confirm => engine.confirm(now),
        KeyAction::Cancel => engine.cancel(now),
        KeyAction::ToggleTokenMode => engine.manual_toggle_token_mode(now),
        KeyAction::ToggleNavigation => engine.manual_toggle(now),
        KeyAction::RequestFurigana | KeyAction::Quit => {}
    }
}

async fn run_preview(config: Config, surface_path: &Path) -> Result<()> {
    let (popup_tx, mut popup_rx) = mpsc::unbounded_channel();
    let mut host = Host::start(config, surface_path, SimulatedPopupLookup::new(popup_tx))?;
    let (furigana_tx, mut furigana_rx) = mpsc::unbounded_channel::<String>();

    let mut frontend = TuiFrontend::new()?;
    let (width, height) = frontend.size();
    debug!("Preview terminal is {}x{}", width, height);

    let mut furigana_note: Option<String> = None;
    let mut last_reload = Instant::now();
    let mut needs_render = true;
    let mut running = true;

    while running {
        // Blocks for at most the poll timeout, which paces the loop
        let events = frontend.poll_events()?;
        let now = Instant::now();

        for event in events {
            match event {
                FrontendEvent::Key { code, modifiers } => match KeyAction::from_key(code, modifiers) {
                    Some(KeyAction::Quit) => running = false,
                    Some(KeyAction::RequestFurigana) => {
                        if let Some(rx) = host.engine.request_cursor_furigana(now) {
                            let tx = furigana_tx.clone();
                            tokio::spawn(async move {
                                let note = match rx.await {
                                    Ok(Ok(result)) => format!("furigana: {}", result.annotated()),
                                    Ok(Err(e)) => format!("furigana: {}", e),
                                    Err(_) => return,
                                };
                                let _ = tx.send(note);
                            });
                        }
                    }
                    Some(action) => apply_key_action(&mut host.engine, action, now),
                    None => {}
                },
                FrontendEvent::Resize { .. } => {}
                FrontendEvent::Quit => running = false,
            }
            needs_render = true;
        }

        if now.duration_since(last_reload) >= SURFACE_POLL_INTERVAL {
            last_reload = now;
            host.reload_surface();
        }

        if host.drain(now) {
            needs_render = true;
        }
        while let Ok(event) = popup_rx.try_recv() {
            host.engine.on_popup_event(event);
            needs_render = true;
        }
        while let Ok(note) = furigana_rx.try_recv() {
            furigana_note = Some(note);
            needs_render = true;
        }

        if host.engine.next_deadline().is_some_and(|d| d <= now) {
            host.engine.tick(now);
            needs_render = true;
        }
        host.engine.flush_refresh(now);

        if needs_render {
            let mut activity = host.engine.lookup().activity();
            if let Some(note) = &furigana_note {
                activity.insert(0, note.clone());
            }
            frontend.render(&PreviewView::capture(&host.engine, activity))?;
            needs_render = false;
        }
    }

    frontend.cleanup()?;
    host.shutdown().await;
    Ok(())
}
