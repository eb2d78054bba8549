// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Loan Intake CLI entrypoint.
//!
//! By default this serves MCP over streamable HTTP at `http://<host>:<port>/mcp`, plain JSON tool
//! routes under `/mcp/tools`, and a liveness check at `/health`.
//!
//! Use `--stdio` to run the MCP server over stdin/stdout instead (intended for local tool
//! integrations). Logs always go to stderr.

use std::error::Error;
use std::sync::Arc;

use loan_intake::analysis::{
    AzureCliTokenProvider, ContentUnderstandingClient, JobEngine, StaticTokenProvider,
    TokenProvider,
};
use loan_intake::config::{ServerConfig, PLACEHOLDER_ENDPOINT};
use loan_intake::mcp::{Dispatcher, LoanMcp};
use loan_intake::transport::{self, HttpTransport};
use tracing_subscriber::EnvFilter;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--host <addr>] [--port <port>] [--stateless]\n  {program} --stdio\n\nHTTP mode (default) serves MCP at `http://<host>:<port>/mcp` and liveness at `/health`.\n--host/--port override MCP_HOST/MCP_PORT (defaults 127.0.0.1:8000; port 0 = ephemeral).\n--stateless serves every request without a session (same as MCP_STATELESS=true).\nIdle sessions close after MCP_SESSION_KEEP_ALIVE_SECS (default 1800; 0 = never).\n\n--stdio serves MCP over stdin/stdout and cannot be combined with HTTP options.\n\nThe analysis backend is configured with AZURE_AI_SERVICES_ENDPOINT and, optionally,\nAZURE_AI_SERVICES_TOKEN (otherwise the Azure CLI login is used)."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    stdio: bool,
    stateless: bool,
    host: Option<String>,
    port: Option<u16>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdio" => {
                if options.stdio {
                    return Err(());
                }
                options.stdio = true;
            }
            "--stateless" => {
                if options.stateless {
                    return Err(());
                }
                options.stateless = true;
            }
            "--host" => {
                if options.host.is_some() {
                    return Err(());
                }
                let host = args.next().ok_or(())?;
                if host.trim().is_empty() {
                    return Err(());
                }
                options.host = Some(host);
            }
            "--port" => {
                if options.port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.port = Some(port);
            }
            _ => return Err(()),
        }
    }

    if options.stdio && (options.stateless || options.host.is_some() || options.port.is_some()) {
        return Err(());
    }

    Ok(options)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_dispatcher(config: &ServerConfig) -> Result<Arc<Dispatcher>, Box<dyn Error>> {
    if config.endpoint().is_none() {
        tracing::warn!(
            placeholder = PLACEHOLDER_ENDPOINT,
            "AZURE_AI_SERVICES_ENDPOINT is not set; tool calls will fail until it is configured"
        );
    }
    let backend =
        ContentUnderstandingClient::new(config.endpoint_or_placeholder(), config.request_timeout())?
            .with_analyzer_id(config.content_understanding_analyzer.as_str())
            .with_api_version(config.content_understanding_api_version.as_str());

    let tokens: Arc<dyn TokenProvider> = match config.static_token() {
        Some(token) => Arc::new(StaticTokenProvider::new(token)),
        None => {
            tracing::info!("no AZURE_AI_SERVICES_TOKEN; using Azure CLI credentials");
            Arc::new(AzureCliTokenProvider::default())
        }
    };

    let engine = JobEngine::new(Arc::new(backend), tokens).with_policy(config.poll_policy());
    Ok(Arc::new(Dispatcher::new(engine)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "loan-intake".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        init_tracing();

        let mut config = ServerConfig::load()?;
        if let Some(host) = options.host {
            config.mcp_host = host;
        }
        if let Some(port) = options.port {
            config.mcp_port = port;
        }
        if options.stateless {
            config.mcp_stateless = true;
        }

        let dispatcher = build_dispatcher(&config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

        if options.stdio {
            tracing::info!("serving MCP over stdio");
            runtime.block_on(LoanMcp::new(dispatcher).serve_stdio())?;
            return Ok(());
        }

        runtime.block_on(async move {
            let mode = config.session_mode();
            let listener =
                tokio::net::TcpListener::bind((config.mcp_host.as_str(), config.mcp_port)).await?;
            let addr = listener.local_addr()?;
            tracing::info!(
                mode = mode.as_str(),
                "serving MCP at http://{addr}{} (REST: http://{addr}{}, health: http://{addr}{})",
                transport::MCP_PATH,
                transport::TOOLS_PATH,
                transport::HEALTH_PATH
            );

            let http = HttpTransport::new(dispatcher, mode, config.session_keep_alive());
            transport::serve(listener, http, shutdown_signal()).await?;
            tracing::info!("server stopped");
            Ok::<(), Box<dyn Error>>(())
        })?;

        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("loan-intake: {err}");
        std::process::exit(1);
    }
}
