// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{debug, error};

use honeydash_core::artifacts::ArtifactPager;
use honeydash_core::forwarder::{Forwarder, ForwardingBatch};
use honeydash_core::logger::{env_filter, Formatter};
use honeydash_core::logs::{
    project, FieldSelection, LogQuery, LogQueryEngine, LogRecord, ProjectionSpec, SchemaRegistry,
    SourceKind, Subtype,
};
use honeydash_core::services::{LifecycleController, OperationReport, ServiceDescriptor};
use honeydash_core::siem::{ForwardingTargetController, TargetReport};
use honeydash_core::status::{ServiceTag, StatusAggregator, TargetTag};
use honeydash_core::{HoneydashConfig, HttpTransport, Transport};

#[derive(Parser, Debug)]
#[command(
    name = "honeydash",
    version,
    about = "Manage HoneyDash honeypots and forward their events to a SIEM"
)]
struct Cli {
    /// Control API base URL [env: HONEYDASH_API_URL]
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// trace, debug, info, warn or error [env: HONEYDASH_LOG_LEVEL]
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the state of every honeypot and of the forwarding target
    Status,
    /// Drive a honeypot through its lifecycle
    Service {
        #[arg(value_enum)]
        service: Source,
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Control the forwarding target
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Query recorded events, optionally forwarding the projected result
    Logs {
        #[arg(value_enum)]
        source: Source,
        /// Event category (session, http, ftp, mysql)
        #[arg(long)]
        subtype: Option<Subtype>,
        /// Maximum number of records [env: HONEYDASH_LOG_LIMIT]
        #[arg(long)]
        limit: Option<u32>,
        /// Event type filter, e.g. cowrie.login.success
        #[arg(long)]
        event_id: Option<String>,
        /// Lower bound, RFC 3339 or YYYY-MM-DDTHH:MM[:SS] (UTC)
        #[arg(long)]
        since: Option<String>,
        /// Comma-separated fields to keep; defaults to the whole schema
        #[arg(long)]
        fields: Option<String>,
        /// Send the projected records to the forwarding target
        #[arg(long, default_value_t = false)]
        forward: bool,
    },
    /// List captured binaries
    Binaries {
        #[arg(value_enum)]
        source: Source,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceAction {
    Install,
    Configure,
    Start,
    Stop,
    Cleanup,
    SetupRedirect,
    SetPath { path: String },
}

#[derive(Subcommand, Debug)]
enum TargetAction {
    Start,
    Stop,
    SearchToken,
    CreateToken,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Source {
    Cowrie,
    Dionaea,
}

impl From<Source> for SourceKind {
    fn from(source: Source) -> Self {
        match source {
            Source::Cowrie => SourceKind::Cowrie,
            Source::Dionaea => SourceKind::Dionaea,
        }
    }
}

impl Source {
    fn descriptor(self) -> ServiceDescriptor {
        match self {
            Source::Cowrie => ServiceDescriptor::cowrie(),
            Source::Dionaea => ServiceDescriptor::dionaea(),
        }
    }
}

fn load_config(cli: &Cli) -> Result<HoneydashConfig> {
    let mut config = HoneydashConfig::from_env().context("invalid environment configuration")?;
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.to_lowercase();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level))
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("setting default subscriber failed: {e}"))?;
    debug!("Logging subsystem enabled");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &HoneydashConfig) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config)?);

    match command {
        Command::Status => status(config, transport).await,
        Command::Service { service, action } => {
            let mut controller = LifecycleController::new(service.descriptor(), transport);
            let report = match action {
                ServiceAction::Install => controller.install().await,
                ServiceAction::Configure => controller.configure().await,
                ServiceAction::Start => controller.start().await,
                ServiceAction::Stop => controller.stop().await,
                ServiceAction::Cleanup => controller.cleanup().await,
                ServiceAction::SetupRedirect => controller.setup_redirect().await,
                ServiceAction::SetPath { path } => controller.set_custom_install_path(&path).await,
            }?;
            print_service_report(&report);
            if let Some(port) = controller.redirect().and_then(|r| r.relocated_port) {
                println!("real SSH daemon moved to port {port}");
            }
            Ok(())
        }
        Command::Target { action } => {
            let mut target = ForwardingTargetController::new(&config.forward_target, transport);
            let report = match action {
                TargetAction::Start => target.start().await,
                TargetAction::Stop => target.stop().await,
                TargetAction::SearchToken => target.search_token().await,
                TargetAction::CreateToken => target.ensure_token().await,
            }?;
            print_target_report(&config.forward_target, &report);
            Ok(())
        }
        Command::Logs {
            source,
            subtype,
            limit,
            event_id,
            since,
            fields,
            forward,
        } => {
            let mut query = LogQuery::new(source.into())
                .with_limit(limit.unwrap_or(config.default_log_limit))?
                .with_event_id(event_id.as_deref().unwrap_or_default());
            if let Some(subtype) = subtype {
                query = query.with_subtype(subtype)?;
            }
            if let Some(since) = since {
                query = query.since(&since)?;
            }
            let spec = match fields {
                Some(list) => ProjectionSpec::parse_list(&list),
                None => default_spec(&query)?,
            };
            logs(config, transport, &query, &spec, forward).await
        }
        Command::Binaries { source, page } => {
            let mut pager = ArtifactPager::new(source.into(), transport);
            let listing = pager.load(page).await?;
            println!("page {}/{}", listing.page, listing.total_pages);
            for artifact in &listing.artifacts {
                println!("{}  {:>10}  {}", artifact.hash, artifact.size, artifact.timestamp);
            }
            Ok(())
        }
    }
}

async fn status(config: &HoneydashConfig, transport: Arc<dyn Transport>) -> Result<()> {
    let snapshot = StatusAggregator::new(
        ServiceDescriptor::builtin(),
        config.forward_target.clone(),
        transport,
    )
    .poll()
    .await;

    for service in &snapshot.services {
        match &service.status {
            Ok(status) => println!(
                "{:<10} {:<24} {}",
                service.descriptor.name,
                ServiceTag::from_status(status),
                status.install_path.as_deref().unwrap_or("-")
            ),
            Err(e) => println!("{:<10} {:<24} {e}", service.descriptor.name, "unavailable"),
        }
    }
    match &snapshot.target {
        Ok(status) => {
            let tag = TargetTag::from_status(status);
            let note = if tag.action_required() {
                "create a collector token before forwarding"
            } else {
                ""
            };
            println!("{:<10} {:<24} {note}", snapshot.target_name, tag);
        }
        Err(e) => println!("{:<10} {:<24} {e}", snapshot.target_name, "unavailable"),
    }

    if snapshot.is_complete() {
        Ok(())
    } else {
        Err(anyhow!("some components could not be reached"))
    }
}

fn default_spec(query: &LogQuery) -> Result<ProjectionSpec> {
    let registry = SchemaRegistry::builtin();
    let kind = query.source_kind();
    let subtype = query.subtype().unwrap_or_else(|| kind.default_subtype());
    let schema = registry
        .latest(kind, subtype)
        .ok_or_else(|| anyhow!("no schema registered for {kind}/{subtype}"))?;
    Ok(FieldSelection::new(schema.clone()).spec())
}

async fn logs(
    config: &HoneydashConfig,
    transport: Arc<dyn Transport>,
    query: &LogQuery,
    spec: &ProjectionSpec,
    forward: bool,
) -> Result<()> {
    let snapshot = LogQueryEngine::new(transport.clone()).query(query).await?;
    let records = project(snapshot, spec);

    println!("{} records", records.len());
    for (index, record) in records.iter().enumerate() {
        println!("--- record {} ---", index + 1);
        print_record(record);
    }

    if !forward {
        return Ok(());
    }
    let mut target = ForwardingTargetController::new(&config.forward_target, transport.clone());
    let status = target.refresh().await?;
    let batch = ForwardingBatch::new(records);
    let ack = Forwarder::new(&config.forward_target, transport)
        .forward(&status, &batch)
        .await?;
    println!(
        "forwarded {} records to {}{}",
        ack.records,
        config.forward_target,
        ack.message.map(|m| format!(": {m}")).unwrap_or_default()
    );
    Ok(())
}

fn print_record(record: &LogRecord) {
    for (field, value) in record.iter() {
        match value {
            Value::String(text) => println!("{field}: {text}"),
            other => println!("{field}: {other}"),
        }
    }
}

fn print_service_report(report: &OperationReport) {
    println!(
        "{}: {}",
        report.operation,
        report.message.as_deref().unwrap_or("done")
    );
    match (&report.status, &report.refresh_error) {
        (Some(status), _) => println!(
            "installed={} configured={} running={}",
            status.installed,
            status
                .configured
                .map_or_else(|| "n/a".to_string(), |c| c.to_string()),
            status.running
        ),
        (None, error) => println!(
            "status unavailable: {}",
            error.as_deref().unwrap_or("not read")
        ),
    }
}

fn print_target_report(name: &str, report: &TargetReport) {
    println!(
        "{name} {}: {}",
        report.operation,
        report.message.as_deref().unwrap_or("done")
    );
    match (&report.status, &report.refresh_error) {
        (Some(status), _) => println!(
            "installed={} running={} token={}",
            status.installed,
            status.running,
            if status.credential_present {
                "present"
            } else {
                "missing"
            }
        ),
        (None, error) => println!(
            "status unavailable: {}",
            error.as_deref().unwrap_or("not read")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_arguments() {
        let cli = Cli::try_parse_from([
            "honeydash",
            "logs",
            "dionaea",
            "--subtype",
            "ftp",
            "--limit",
            "5",
            "--fields",
            "src_ip,username",
            "--forward",
        ])
        .unwrap();
        match cli.command {
            Command::Logs {
                source,
                subtype,
                limit,
                fields,
                forward,
                ..
            } => {
                assert!(matches!(source, Source::Dionaea));
                assert_eq!(subtype, Some(Subtype::Ftp));
                assert_eq!(limit, Some(5));
                assert_eq!(fields.as_deref(), Some("src_ip,username"));
                assert!(forward);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_service_set_path_arguments() {
        let cli =
            Cli::try_parse_from(["honeydash", "service", "cowrie", "set-path", "/opt/cowrie"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Service {
                service: Source::Cowrie,
                action: ServiceAction::SetPath { ref path }
            } if path == "/opt/cowrie"
        ));
    }

    #[test]
    fn test_default_spec_uses_latest_schema() {
        let query = LogQuery::new(SourceKind::Cowrie);
        let spec = default_spec(&query).unwrap();
        assert_eq!(spec.fields().first().map(String::as_str), Some("eventid"));
        assert!(spec.contains("honeypot"));
    }
}
