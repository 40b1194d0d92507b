//! policy-attach CLI
//!
//! Applies a TOML policy-attachment declaration to AWS IAM, keeping the last
//! observed membership in a JSON state file.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use policy_attach::{
    reconcile, AttachmentError, AwsIamClient, Declaration, Plan, PolicyAttachmentResource,
    ReadOutcome, ReconcilableResource, ResourceState,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "policy-attach")]
#[command(about = "Keep an IAM managed policy attached to the declared users, roles, and groups")]
struct Args {
    /// Declaration file (TOML)
    #[arg(short = 'c', long, default_value = "attachment.toml")]
    config: PathBuf,

    /// State file (JSON); defaults to the declaration path with a .state.json extension
    #[arg(short = 's', long)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the calls `apply` would issue
    Plan,
    /// Create or update the attachment
    Apply {
        /// Print the apply report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-read remote membership into the state file
    Refresh,
    /// Detach the policy from every recorded principal
    Destroy,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| args.config.with_extension("state.json"));

    let declaration = Declaration::load(&args.config)
        .with_context(|| format!("loading declaration {:?}", args.config))?;
    let state = ResourceState::load_or_new(&state_path, &declaration.attachment)
        .with_context(|| format!("loading state {:?}", state_path))?;

    info!(
        "Policy attachment '{}' -> {}",
        declaration.attachment.name, declaration.attachment.policy_arn
    );

    let client = AwsIamClient::from_env()?;
    let mut resource = PolicyAttachmentResource::from_state(state);

    match args.command {
        Command::Plan => {
            let plan = if resource.id().is_some() {
                match reconcile::read(&client, &resource.state().attachment)? {
                    ReadOutcome::Found(observed) => reconcile::plan(&observed, &declaration.members),
                    ReadOutcome::NotFound => {
                        warn!("Policy no longer exists; apply would recreate the attachment");
                        Plan::attach_all(&declaration.members)
                    }
                }
            } else {
                Plan::attach_all(&declaration.members)
            };
            println!("{}", plan);
        }
        Command::Apply { json } => {
            if resource.id().is_some() {
                resource.read(&client)?;
            }
            let outcome = if resource.id().is_some() {
                resource.update(&client, &declaration)
            } else {
                resource.create(&client, &declaration)
            };
            if let Err(err) = outcome {
                report_failure(&err);
                bail!(err);
            }

            resource.state().save(&state_path)?;
            if let Some(report) = resource.last_report() {
                if json {
                    println!("{}", serde_json::to_string_pretty(report)?);
                } else {
                    for entry in &report.entries {
                        println!("{}", entry.op);
                    }
                    println!("{} calls issued", report.calls_issued());
                }
            }
        }
        Command::Refresh => {
            resource.read(&client)?;
            resource.state().save(&state_path)?;
            if resource.id().is_none() {
                println!("Policy not found; attachment dropped from state");
            } else {
                println!("{}", serde_json::to_string_pretty(&resource.state().members)?);
            }
        }
        Command::Destroy => {
            if resource.id().is_none() {
                bail!("nothing to destroy: {:?} records no attachment", state_path);
            }
            if let Err(err) = resource.delete(&client) {
                report_failure(&err);
                bail!(err);
            }
            resource.state().save(&state_path)?;
            println!("Destroyed policy attachment '{}'", declaration.attachment.name);
        }
    }

    Ok(())
}

/// List the calls that landed before a partial failure; nothing is rolled back
fn report_failure(err: &AttachmentError) {
    if let Some(agg) = err.as_aggregate() {
        for op in agg.report.applied() {
            warn!("applied before failure: {}", op);
        }
        for op in agg.report.skipped() {
            warn!("not attempted: {}", op);
        }
    }
}
