use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use metro::config::{ClockSource, Config};
use metro::engine::Engine;
use metro::midi::{list_ports, MidiInputHandle, MidiOutputHandle};
use metro::output::TraceSink;
use metro::{voices, Transport};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "metro",
    version,
    about = "MIDI performance scheduler locked to a clock pulse stream"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a performance
    Run(RunArgs),
    /// List MIDI input and output ports
    Ports,
    /// List built-in voices
    Voices,
}

#[derive(Args)]
struct RunArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Substring of the MIDI port name to connect to
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    bpm: Option<f64>,
    #[arg(long, value_enum)]
    clock: Option<ClockSource>,
    /// Voice started on the root track
    #[arg(long)]
    voice: Option<String>,
    /// Trace output instead of opening MIDI ports
    #[arg(long)]
    dry_run: bool,
    /// Run without the interactive prompt
    #[arg(long)]
    no_repl: bool,
}

impl RunArgs {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(clock) = self.clock {
            config.clock = clock;
        }
        if let Some(voice) = &self.voice {
            config.voice = voice.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Ports => print_ports(),
        Command::Voices => {
            println!("{}", "🎵 Built-in voices:".bold());
            for name in voices::NAMES {
                if let Some(voice) = voices::by_name(name) {
                    println!("  {:<8} {}", voice.name().cyan(), voice.description());
                }
            }
            Ok(())
        }
    }
}

fn print_ports() -> Result<()> {
    let ports = list_ports()?;
    let sections = [
        ("🎹 MIDI inputs:", &ports.inputs),
        ("🎹 MIDI outputs:", &ports.outputs),
    ];
    for (title, names) in sections {
        println!("{}", title.bold());
        if names.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for (i, name) in names.iter().enumerate() {
            println!("  {}. {}", i + 1, name.cyan());
        }
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.config()?;
    let settings = config.settings()?;
    let voice = voices::by_name(&config.voice)
        .ok_or_else(|| anyhow!("unknown voice '{}'", config.voice))?;

    let (event_tx, event_rx) = mpsc::channel(config.queue_capacity);
    let (control_tx, control_rx) = mpsc::channel(config.queue_capacity);
    let overflow = Arc::new(AtomicU64::new(0));

    // Ports are opened before anything is sent.
    let (transport, _input) = if args.dry_run {
        if config.clock == ClockSource::External {
            tracing::warn!("dry run has no input port; nothing will drive the clock");
        }
        (Transport::new(voice, TraceSink, settings), None)
    } else {
        let output = MidiOutputHandle::open(&config.port)?;
        let input = match MidiInputHandle::open(&config.port, event_tx.clone(), overflow.clone()) {
            Ok(input) => Some(input),
            Err(err) if config.clock == ClockSource::Internal => {
                tracing::warn!(error = %err, "no MIDI input, transport messages will be ignored");
                None
            }
            Err(err) => return Err(err.into()),
        };
        (Transport::new(voice, output, settings), input)
    };
    drop(event_tx);

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let repl = if args.no_repl {
        drop(control_tx);
        None
    } else {
        Some(metro::repl::spawn(control_tx, done_rx)?)
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    let engine = Engine::new(transport.clone(), config.clock, event_rx, control_rx)
        .with_overflow_counter(overflow);

    let outcome = local.block_on(&runtime, async move {
        let outcome = tokio::select! {
            result = engine.run() => result.map_err(anyhow::Error::from),
            signal = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                signal.map_err(anyhow::Error::from)
            }
        };
        transport.stop().await;
        outcome
    });

    drop(done_tx);
    if let Some(repl) = repl {
        let _ = repl.join();
    }
    outcome
}
