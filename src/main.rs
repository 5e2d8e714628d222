//! staticfs - serve a directory tree with cached file handles
//!
//! Runs a small HTTP server on top of the file handler, or resolves a
//! single request path from the command line.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use staticfs::server::HttpServer;
use staticfs::{Config, FsHandler};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        root: Option<PathBuf>,
        listen: Option<String>,
    },
    /// Resolve one request path and print its body
    Cat {
        root: PathBuf,
        path: String,
        strip_slashes: i64,
    },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"staticfs - Serve static files with cached file handles

USAGE:
    staticfs [--config <file>] [serve [root] [listen]]
    staticfs [--config <file>] cat <root> <request-path> [strip_slashes]
    staticfs help

COMMANDS:
    serve   Serve files over HTTP until Ctrl+C (default)
    cat     Resolve a request path and write the response body to stdout
    help    Show this help message

EXAMPLES:
    # Serve ./public on 127.0.0.1:8000
    staticfs serve ./public 127.0.0.1:8000

    # Print the listing generated for /assets/ with one segment stripped
    staticfs cat ./public /static/assets/ 1

CONFIG:
    JSON file with the keys root, strip_slashes, cache_ttl_secs,
    max_idle_readers and listen. Command line arguments take precedence.

ENVIRONMENT:
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        None | Some("serve") => Ok(Command::Serve {
            root: args.get(1).map(PathBuf::from),
            listen: args.get(2).cloned(),
        }),
        Some("cat") => {
            if args.len() < 3 {
                return Err(anyhow!(
                    "Usage: staticfs cat <root> <request-path> [strip_slashes]"
                ));
            }
            let strip_slashes = match args.get(3) {
                Some(s) => s
                    .parse()
                    .with_context(|| format!("Invalid strip_slashes: {}", s))?,
                None => 0,
            };
            Ok(Command::Cat {
                root: PathBuf::from(&args[1]),
                path: args[2].clone(),
                strip_slashes,
            })
        }
        Some("help" | "--help" | "-h") => Ok(Command::Help),
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

/// Split off a leading `--config <file>` option
fn load_config(args: &mut Vec<String>) -> Result<Config> {
    if args.first().map(String::as_str) != Some("--config") {
        return Ok(Config::default());
    }
    if args.len() < 2 {
        return Err(anyhow!("--config requires a file argument"));
    }
    let path = PathBuf::from(args.remove(1));
    args.remove(0);
    Config::from_file(&path)
}

async fn serve(mut config: Config, root: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    if let Some(root) = root {
        config.root = root;
    }
    if let Some(listen) = listen {
        config.listen = listen;
    }

    let handler = Arc::new(FsHandler::new(&config));
    handler.start();

    let mut server = HttpServer::new(Arc::clone(&handler));
    let addr = server.start(&config.listen).await?;
    info!(
        root = %config.root_dir().display(),
        addr = %addr,
        "Serving files. Press Ctrl+C to stop."
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c().await?;

    info!("Received shutdown signal, stopping...");
    server_handle.abort();
    handler.stop().await;
    handler.cache().log_metrics();

    info!("Shutdown complete.");
    Ok(())
}

fn cat(config: Config, root: PathBuf, path: String, strip_slashes: i64) -> Result<()> {
    let config = Config {
        root,
        strip_slashes,
        ..config
    };
    let handler = FsHandler::new(&config);

    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };
    let desc = handler
        .open(path.as_bytes(), &path)
        .with_context(|| format!("Cannot serve {}", path))?;
    info!(
        content_type = %desc.content_type(),
        length = desc.content_length(),
        "Resolved {}",
        path
    );

    let mut reader = handler.readers().acquire(&desc);
    let mut stdout = io::stdout().lock();
    io::copy(&mut reader, &mut stdout).context("Failed to write body")?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = load_config(&mut args)?;

    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Serve { root, listen } => serve(config, root, listen).await,
        Command::Cat {
            root,
            path,
            strip_slashes,
        } => cat(config, root, path, strip_slashes),
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}
