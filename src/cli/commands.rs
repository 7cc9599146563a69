use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::{
    app::{get_config_dir, init_config, load_config, load_config_from, Config},
    backends::{BackendResult, ChatRequest, ReasoningConfig},
    runtime::{build_services, handle_request_body, into_http_reply, Services},
};

use super::{Cli, Commands};

/// Number of prelude characters shown by `status`
const PRELUDE_PREVIEW_CHARS: usize = 50;

/// Handle CLI subcommands, returning the process exit code
pub async fn handle_command(cli: &Cli) -> Result<i32> {
    if let Commands::Init = cli.command {
        println!("Initializing Switchyard configuration...");
        let path = init_config()?;
        println!("Configuration written to {}", path.display());
        return Ok(0);
    }

    let config = resolve_config(cli.config.as_deref())?;
    let services = build_services(&config)?;

    match &cli.command {
        Commands::Ask {
            prompt,
            model,
            backend,
            effort,
            summary,
            json,
        } => {
            let mut request = ChatRequest::new(model.clone(), prompt.clone());
            if effort.is_some() || summary.is_some() {
                request.reasoning = Some(ReasoningConfig {
                    effort: effort.clone(),
                    summary: summary.clone(),
                });
            }
            ask(&services, &request, backend.as_deref(), *json).await
        }
        Commands::Request { file, backend } => {
            let raw = read_body(file.as_deref()).await?;
            let reply =
                handle_request_body(&services.dispatcher, raw.as_deref(), backend.as_deref()).await;

            println!("HTTP {}", reply.status);
            for (name, value) in &reply.headers {
                println!("{}: {}", name, value);
            }
            println!();
            println!("{}", reply.body);
            Ok(if reply.status == 200 { 0 } else { 1 })
        }
        Commands::List => {
            list_backends(&services);
            Ok(0)
        }
        Commands::Status => {
            show_status(&services, cli.config.as_deref()).await;
            Ok(0)
        }
        Commands::Init => Ok(0),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

async fn ask(
    services: &Services,
    request: &ChatRequest,
    backend: Option<&str>,
    as_json: bool,
) -> Result<i32> {
    let outcome = services.dispatcher.dispatch(request, backend).await;

    match &outcome.result {
        BackendResult::Success(response) => {
            if as_json {
                let value = json!({
                    "provider": outcome.backend_id,
                    "content": response.content,
                    "metadata": response.metadata,
                    "isStreaming": response.is_streaming,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", response.content);
            }
            Ok(0)
        }
        BackendResult::Failure(failure) => {
            eprintln!("{} {}", "[ERROR]".red(), failure);
            println!("{}", into_http_reply(&outcome, &request.model).body);
            Ok(1)
        }
    }
}

/// Body from a file, or from stdin for `-` and no argument. Blank means missing.
async fn read_body(file: Option<&Path>) -> Result<Option<String>> {
    let raw = match file {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read request body from {}", path.display()))?,
        _ => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read request body from stdin")?;
            raw
        }
    };
    Ok(Some(raw).filter(|raw| !raw.trim().is_empty()))
}

fn list_backends(services: &Services) {
    let policy = services.dispatcher.policy();
    println!("Registered backends:");
    for registration in services.dispatcher.registry().list() {
        let mut tags = Vec::new();
        if registration.id == policy.default {
            tags.push("default");
        }
        if policy.fallback.as_deref() == Some(registration.id.as_str()) {
            tags.push("fallback");
        }
        let suffix = if tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", tags.join(", "))
        };
        println!("  • {} - {}{}", registration.id.green(), registration.name, suffix);
    }
}

async fn show_status(services: &Services, config_path: Option<&Path>) {
    println!("Switchyard Status:");
    println!();

    for status in services.dispatcher.backend_statuses().await {
        let details = status.details.unwrap_or_else(|| "no status probe".to_string());
        if status.authenticated {
            println!("  [OK] {}: {}", status.name, details);
        } else {
            println!("  {} {}: {}", "[ERROR]".red(), status.name, details);
        }
    }

    let instructions = &services.instructions;
    match instructions.cached_prefix(PRELUDE_PREVIEW_CHARS).await {
        Some(prefix) => println!(
            "  [OK] Instruction cache: {} ({:?}...)",
            instructions.content_path().display(),
            prefix
        ),
        None => println!(
            "  [WARNING] Instruction cache: empty (fetched from {} on first use)",
            instructions.url()
        ),
    }

    let config_file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => get_config_dir().ok().map(|dir: PathBuf| dir.join("config.toml")),
    };
    match config_file {
        Some(path) if path.exists() => println!("  [OK] Configuration: {}", path.display()),
        _ => println!("  [WARNING] Configuration: Not found (using defaults)"),
    }

    println!();
}
