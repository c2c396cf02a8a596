//! # imc-probe
//!
//! A small command-line collaborator of the `imc-runtime` library: it
//! opens a file or TCP byte source, subscribes to decoded IMC frames
//! (optionally narrowed to one message or one category), and prints
//! them to stdout. The Rust analogue of `subscriber.run()` /
//! `print_information` in the Python original, generalized to any
//! message rather than a single hardcoded follow-reference example.
//!
//! Only consumes `imc_runtime`'s public subscription/send interfaces —
//! it is deliberately an external user of the crate, not part of it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use imc_runtime::dispatcher::Delivered;
use imc_runtime::schema::builtins;
use imc_runtime::logging::ColorizedFormatter;
use imc_runtime::transport::{FileTransport, TcpTransport};
use imc_runtime::{ByteTransport, Catalog, Dispatcher, Selector};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// imc-probe - Listen to an IMC byte stream and print decoded frames
///
/// Connects to a vehicle or console's IMC endpoint (a TCP socket) or
/// replays a captured byte stream (a file), decodes frames against an
/// IMC schema, and prints every frame it sees. Narrow the output to one
/// message or category with `--message`/`--category`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
struct Args {
    /// TCP address to connect to, e.g. 127.0.0.1:6002
    #[arg(long, conflicts_with = "file")]
    tcp: Option<SocketAddr>,

    /// Path to a captured IMC byte stream to replay
    #[arg(long, conflicts_with = "tcp")]
    file: Option<PathBuf>,

    /// Path to an IMC.xml schema file; falls back to a small built-in
    /// catalog (Heartbeat/Announce/EntityList/EstimatedState/... ) if
    /// not given.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Only print messages with this abbreviation, e.g. EstimatedState
    #[arg(long, conflicts_with = "category")]
    message: Option<String>,

    /// Only print messages in this category, e.g. Navigation
    #[arg(long, conflicts_with = "message")]
    category: Option<String>,

    /// Stop after this many seconds (useful for scripted captures)
    #[arg(long)]
    timeout: Option<u64>,

    /// Log file path, or "stderr" to log there instead of a rolling file
    #[arg(long, help_heading = "Output and Logging")]
    log_file: Option<String>,

    /// Silence user-facing decoded-frame output on stdout
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    quiet: bool,

    /// Increase diagnostic log verbosity on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    verbose: u8,
}

fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;
    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("imc_probe.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "imc_probe.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_log_layer).with(stdout_log).init();
    guard
}

fn load_catalog(args: &Args) -> Result<Catalog> {
    match &args.schema {
        Some(path) => {
            imc_runtime::schema::xml::load(path).with_context(|| format!("loading IMC schema from {path:?}"))
        }
        None => {
            info!("no --schema given, using the built-in offline catalog");
            Ok(builtins::catalog())
        }
    }
}

fn open_transport(args: &Args) -> Result<Box<dyn ByteTransport>> {
    if let Some(addr) = args.tcp {
        Ok(Box::new(TcpTransport::new(addr)))
    } else if let Some(path) = &args.file {
        Ok(Box::new(FileTransport::new(path.clone(), None)))
    } else {
        anyhow::bail!("one of --tcp or --file is required")
    }
}

fn print_frame(msg: &imc_runtime::Message) {
    println!("{} {}", format!("[{}]", msg.abbrev()).green().bold(), describe_fields(msg));
}

fn describe_fields(msg: &imc_runtime::Message) -> String {
    msg.descriptor
        .fields
        .keys()
        .filter_map(|name| msg.get(name).map(|v| format!("{name}={v:?}")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let catalog = load_catalog(&args)?;
    let transport = open_transport(&args)?;

    info!("imc-probe starting, sync word {:#06x}", catalog.sync_word);

    let bus = imc_runtime::MessageBus::spawn(transport, catalog.sync_word)
        .await
        .context("opening transport")?;

    let catalog = std::sync::Arc::new(catalog);
    let mut dispatcher = Dispatcher::new(catalog.clone());
    let stop = dispatcher.stop_handle();

    let selector = match (&args.message, &args.category) {
        (Some(abbrev), _) => Selector::Abbrev(abbrev.clone()),
        (None, Some(category)) => Selector::Category(category.clone()),
        (None, None) => Selector::All,
    };

    dispatcher.subscribe(selector, None, None, |delivered, _handle| async move {
        match delivered {
            Delivered::Known(msg) => print_frame(&msg),
            Delivered::Unknown(u) => {
                println!("{} mgid={} ({} bytes)", "[Unknown]".yellow().bold(), u.mgid, u.contents.len());
            }
        }
    });

    if let Some(secs) = args.timeout {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            stop.stop();
        });
    }

    if let Err(err) = dispatcher.run(bus).await {
        error!(%err, "dispatch loop exited with an error");
        return Err(err.into());
    }

    Ok(())
}
