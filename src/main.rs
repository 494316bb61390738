//! Netreplay CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use netreplay::{FixtureCodec, FixtureStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: netreplay inspect <session-dir>");
                process::exit(1);
            }
            inspect(&PathBuf::from(&args[2])).await
        }
        "purge" => {
            if args.len() < 4 {
                eprintln!("Usage: netreplay purge <directory-hint> <session-name>");
                process::exit(1);
            }
            purge(Path::new(&args[2]), &args[3]).await
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'netreplay' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn usage() {
    eprintln!("Netreplay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: netreplay <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  inspect <session-dir>                   List recorded fixtures");
    eprintln!("  purge <directory-hint> <session-name>   Delete a session's fixtures");
}

async fn inspect(dir: &Path) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Directory not found: {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_fixture = path.extension().is_some_and(|ext| ext == "json")
            && !entry.file_name().to_string_lossy().starts_with('.');
        if is_fixture {
            paths.push(path);
        }
    }
    paths.sort();

    println!("Session directory: {}", dir.display());
    println!("Fixtures: {}", paths.len());
    println!();

    let codec = FixtureCodec::default();
    let mut corrupt = 0;
    for path in &paths {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match codec.parse(&bytes, path) {
            Ok(fixture) => {
                println!("{name}");
                println!("  {} {} -> {}", fixture.request_type, fixture.service, fixture.status_code);
                println!(
                    "  request body: {}, response body: {} ({} bytes encoded)",
                    encoding(fixture.request_body.is_base64_encoded),
                    encoding(fixture.response_data.is_base64_encoded),
                    fixture.response_data.data.len()
                );
            }
            Err(e) => {
                corrupt += 1;
                println!("{name}");
                println!("  CORRUPT: {e}");
            }
        }
    }

    if corrupt > 0 {
        println!();
        println!("{corrupt} corrupt fixture(s)");
    }
    Ok(())
}

fn encoding(is_base64: bool) -> &'static str {
    if is_base64 {
        "base64"
    } else {
        "text"
    }
}

async fn purge(directory_hint: &Path, session_name: &str) -> anyhow::Result<()> {
    let store = FixtureStore::for_session(directory_hint, session_name)?;
    store.remove_session_directory().await?;
    println!("Purged {}", store.session_dir()?.display());
    Ok(())
}
