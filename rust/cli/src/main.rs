mod config;
mod types;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use clap::{Parser, Subcommand, ValueEnum};
use config::Configuration;
use conformance::{
    suite::{Selection, DEFAULT_CONCURRENCY},
    AwsIdentityProvider, ConformanceSuite, IdentityProvider,
};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Checks provisioned IAM policies, roles, groups and users")]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true)]
    region: Option<String>,

    /// Sends IAM and STS requests to this endpoint instead of AWS.
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Maximum number of checks in flight.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Option<RootCommand>,
}

#[derive(Subcommand)]
enum RootCommand {
    /// Run every check
    Run,
    /// Check policy documents
    Policies,
    /// Check policies attached to roles
    Roles,
    /// Check policies attached to groups
    Groups,
    /// Check group membership of users
    Users,
    /// Print the checks without calling AWS
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl RootCommand {
    fn selection(&self) -> Option<Selection> {
        match self {
            RootCommand::Run => Some(Selection::All),
            RootCommand::Policies => Some(Selection::Policies),
            RootCommand::Roles => Some(Selection::Roles),
            RootCommand::Groups => Some(Selection::Groups),
            RootCommand::Users => Some(Selection::Users),
            RootCommand::List => None,
        }
    }
}

const EXIT_CHECKS_FAILED: u8 = 1;
const EXIT_SETUP_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let program = Cli::parse();

    let Some(command) = program.command else {
        eprintln!("No command provided");
        return ExitCode::from(EXIT_SETUP_FAILED);
    };

    let Some(selection) = command.selection() else {
        for check in Selection::All.checks() {
            println!("{}", check);
        }
        return ExitCode::SUCCESS;
    };

    let config = match Configuration::load(program.config) {
        Ok(config) => config.merge(Configuration {
            profile: program.profile,
            region: program.region,
            endpoint_url: program.endpoint_url,
            concurrency: program.concurrency,
        }),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };

    match handle_run(&config, selection, program.format).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_CHECKS_FAILED),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_SETUP_FAILED)
        }
    }
}

async fn load_sdk_config(app_config: &Configuration) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(profile) = &app_config.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &app_config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint_url) = &app_config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}

/// Returns whether every selected check passed.
async fn handle_run(app_config: &Configuration, selection: Selection, format: Format) -> anyhow::Result<bool> {
    let sdk_config = load_sdk_config(app_config).await;
    debug!(region = ?sdk_config.region(), "loaded sdk config");

    let iam_client = Arc::new(aws_sdk_iam::Client::new(&sdk_config));
    let sts_client = Arc::new(aws_sdk_sts::Client::new(&sdk_config));
    let provider = AwsIdentityProvider::new(iam_client, sts_client);

    // Unresolvable credentials abort the run before any check starts.
    provider
        .resolve_account_id()
        .await
        .context("cannot resolve caller identity")?;

    let suite =
        ConformanceSuite::new(provider).with_concurrency(app_config.concurrency.unwrap_or(DEFAULT_CONCURRENCY));
    let report = suite.run(selection).await;

    match format {
        Format::Text => println!("{}", types::render_text(&report)),
        Format::Json => {
            let output = types::ReportOutput::new(&report, chrono::Utc::now());
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(report.all_passed())
}
