/*!
Podsnap CLI - checkpoint, list, delete and restore sandboxed pods.

The CLI talks to the cluster through `kubectl`. Settings come from an optional
JSON config file, then `PODSNAP_*` environment variables, then flags.
*/

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use podsnap_core::observability::{init_observability, LogFormat, PodsnapMetrics};
use podsnap_core::{
    parse_labels, snapshot_controller_ready, CleanupReport, ClientConfig, ConnectionConfig,
    DeleteFilter, KubectlClient, RetentionManager, SessionConfig, SnapshotCatalog, SnapshotError,
    SnapshotPhase, SnapshotRecord, SnapshotSession,
};
use podsnap_poll::{Clock, SystemClock};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::{info, warn};

const DEFAULT_TEMPLATE: &str = "python-counter-template";

#[derive(Parser)]
#[command(name = "podsnap")]
#[command(about = "Checkpoint and restore sandboxed pods with the pod snapshot controller")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "plain")]
    log_format: LogFormatArg,

    /// Namespace sandboxes and snapshots live in
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// JSON client configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics when the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormatArg {
    Plain,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Plain => LogFormat::Plain,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateArg {
    Pending,
    Ready,
    Failed,
}

impl From<StateArg> for SnapshotPhase {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Pending => SnapshotPhase::Pending,
            StateArg::Ready => SnapshotPhase::Ready,
            StateArg::Failed => SnapshotPhase::Failed,
        }
    }
}

/// How the restored sandbox is reached
#[derive(Args, Clone, Debug)]
struct ConnectionArgs {
    /// Router URL; skips gateway discovery
    #[arg(long)]
    api_url: Option<String>,

    /// Gateway fronting the sandbox router
    #[arg(long)]
    gateway_name: Option<String>,

    /// Namespace of the gateway (defaults to the sandbox namespace)
    #[arg(long)]
    gateway_namespace: Option<String>,

    /// Port the sandbox server listens on
    #[arg(long, default_value_t = 8888)]
    server_port: u16,
}

impl From<ConnectionArgs> for ConnectionConfig {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            api_url: args.api_url,
            gateway_name: args.gateway_name,
            gateway_namespace: args.gateway_namespace,
            server_port: args.server_port,
        }
    }
}

/// Template and labels of the sandbox to create
#[derive(Args, Clone, Debug)]
struct SandboxArgs {
    /// SandboxTemplate the claim refers to
    #[arg(long, default_value = DEFAULT_TEMPLATE)]
    template_name: String,

    /// Labels for the sandbox claim
    #[arg(long, num_args = 1.., value_name = "KEY=VALUE")]
    labels: Vec<String>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

impl SandboxArgs {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.template_name)
            .with_labels(parse_labels(&self.labels))
            .with_connection(self.connection.clone().into())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the snapshot controller is running
    Ready,
    /// List a policy's snapshots, newest first
    List {
        /// Snapshot policy name
        #[arg(short, long)]
        policy: String,
        /// Include snapshots that are not Ready
        #[arg(short, long)]
        all: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a snapshot policy and where it stores snapshots
    Policy {
        /// Snapshot policy name
        policy: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Checkpoint the pod of an existing sandbox
    Checkpoint {
        /// Sandbox name
        #[arg(short, long)]
        sandbox: String,
        /// Trigger name, unique within the namespace
        #[arg(short, long)]
        trigger: String,
        /// Seconds to wait for the controller
        #[arg(long)]
        timeout: Option<u64>,
        /// Do not require a running snapshot controller
        #[arg(long)]
        skip_controller_check: bool,
    },
    /// Delete one snapshot by id, or a policy's snapshots matching predicates
    Delete {
        /// Exact snapshot to delete
        #[arg(long)]
        snapshot_id: Option<String>,
        /// Policy whose snapshots are considered
        #[arg(short, long)]
        policy: Option<String>,
        /// Only snapshots produced by this trigger
        #[arg(long)]
        trigger: Option<String>,
        /// Only snapshots in this state
        #[arg(long, value_enum)]
        state: Option<StateArg>,
        /// Only snapshots created before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Start a sandbox, restoring from a snapshot
    Restore {
        /// Snapshot to restore; the controller's latest match when omitted
        #[arg(long)]
        snapshot_id: Option<String>,
        /// Claim name (defaults to `<snapshot>-from-snapshot`)
        #[arg(long)]
        claim_name: Option<String>,
        /// Delete the sandbox again once it is running
        #[arg(long)]
        cleanup: bool,
        #[command(flatten)]
        sandbox: SandboxArgs,
    },
    /// Run the counter scenario: checkpoint twice, then restore each snapshot
    Demo {
        /// Seconds between checkpoints
        #[arg(long, default_value_t = 10)]
        interval: u64,
        #[command(flatten)]
        sandbox: SandboxArgs,
    },
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl From<&SnapshotRecord> for SnapshotRow {
    fn from(record: &SnapshotRecord) -> Self {
        Self {
            id: record.snapshot_id.clone(),
            state: record.state.to_string(),
            trigger: record.trigger_name.clone().unwrap_or_else(|| "-".to_string()),
            created: record
                .created_at
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            location: record
                .storage_location
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    init_observability(cli.log_format.into(), level)?;

    let config = load_config(&cli)?;
    let client = KubectlClient::from_config(&config.kubectl);

    match cli.command {
        Commands::Ready => check_ready(&client, &config)?,
        Commands::List { policy, all, json } => {
            list_snapshots(&client, &config, &policy, all, json)?
        }
        Commands::Policy { policy, json } => show_policy(&client, &config, &policy, json)?,
        Commands::Checkpoint {
            sandbox,
            trigger,
            timeout,
            skip_controller_check,
        } => checkpoint(
            client,
            config,
            &sandbox,
            &trigger,
            timeout.map(Duration::from_secs),
            !skip_controller_check,
        )?,
        Commands::Delete {
            snapshot_id,
            policy,
            trigger,
            state,
            before,
            force,
        } => {
            let filter = DeleteFilter {
                snapshot_id,
                policy_name: policy,
                trigger_name: trigger,
                state: state.map(Into::into),
                created_before: before,
            };
            delete_snapshots(&client, &config, &filter, force)?
        }
        Commands::Restore {
            snapshot_id,
            claim_name,
            cleanup,
            sandbox,
        } => restore(
            client,
            config,
            &sandbox,
            snapshot_id.as_deref(),
            claim_name,
            cleanup,
        )?,
        Commands::Demo { interval, sandbox } => {
            run_demo(client, config, &sandbox, Duration::from_secs(interval))?
        }
    }

    if cli.print_metrics {
        println!("{}", PodsnapMetrics::global().gather_metrics()?);
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
        config.validate()?;
    }
    Ok(config)
}

fn check_ready(client: &KubectlClient, config: &ClientConfig) -> Result<(), anyhow::Error> {
    if snapshot_controller_ready(client, &config.controller) {
        println!(
            "✓ Snapshot controller is running in namespace '{}'",
            config.controller.namespace
        );
        Ok(())
    } else {
        bail!(
            "No running '{}' pod in namespace '{}'",
            config.controller.name,
            config.controller.namespace
        )
    }
}

fn list_snapshots(
    client: &KubectlClient,
    config: &ClientConfig,
    policy: &str,
    all: bool,
    json: bool,
) -> Result<(), anyhow::Error> {
    info!("Listing snapshots of policy {} in {}", policy, config.namespace);

    let records =
        SnapshotCatalog::new(client, &config.namespace).list_snapshots(policy, !all)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No snapshots found for policy '{policy}'");
    } else {
        let table = Table::new(records.iter().map(SnapshotRow::from));
        println!("{table}");
    }

    Ok(())
}

fn show_policy(
    client: &KubectlClient,
    config: &ClientConfig,
    policy: &str,
    json: bool,
) -> Result<(), anyhow::Error> {
    let summary = SnapshotCatalog::new(client, &config.namespace).describe_policy(policy)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Policy Details:");
    println!("  Name: {}", summary.policy_name);
    println!("  Selector: {}", serde_json::to_string(&summary.selector)?);
    if let Some(retention) = &summary.retention {
        if let Some(max) = retention.max_snapshots {
            println!("  Max Snapshots: {max}");
        }
        if let Some(hours) = retention.max_age_hours {
            println!("  Max Age: {hours}h");
        }
    }
    if let Some(storage) = &summary.storage_config {
        println!("  Storage Config: {storage}");
    }
    if let Some(location) = &summary.storage_location {
        println!("  Storage Location: {location}");
    }

    Ok(())
}

fn checkpoint(
    client: KubectlClient,
    config: ClientConfig,
    sandbox: &str,
    trigger: &str,
    timeout: Option<Duration>,
    require_controller: bool,
) -> Result<(), anyhow::Error> {
    let mut session =
        SnapshotSession::attach(client, SystemClock, config, sandbox, require_controller)?;
    info!("Checkpointing pod {} of sandbox {}", session.pod_name(), sandbox);

    let result = session.checkpoint(trigger, timeout);
    report_cleanup(&session.close());

    let outcome = result?;
    match outcome.snapshot_name {
        Some(snapshot) => println!(
            "✓ Checkpoint '{trigger}' produced snapshot {snapshot} in {:.1?}",
            outcome.elapsed
        ),
        None => println!(
            "✓ Checkpoint '{trigger}' completed in {:.1?}; no snapshot is listed for it yet",
            outcome.elapsed
        ),
    }

    Ok(())
}

fn delete_snapshots(
    client: &KubectlClient,
    config: &ClientConfig,
    filter: &DeleteFilter,
    force: bool,
) -> Result<(), anyhow::Error> {
    if !force && !confirm(&format!("Delete snapshots matching {}?", describe_filter(filter)))? {
        println!("Deletion cancelled");
        return Ok(());
    }

    match RetentionManager::new(client, &config.namespace).delete_snapshots(filter) {
        Ok(0) => println!("No matching snapshots"),
        Ok(deleted) => println!("✓ Deleted {deleted} snapshot(s)"),
        Err(SnapshotError::PartialDeletion { deleted, failures }) => {
            for (snapshot, error) in &failures {
                warn!("Failed to delete {}: {}", snapshot, error);
            }
            bail!(
                "Deleted {deleted} snapshot(s), {} deletion(s) failed",
                failures.len()
            );
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn restore(
    client: KubectlClient,
    config: ClientConfig,
    sandbox: &SandboxArgs,
    snapshot_id: Option<&str>,
    claim_name: Option<String>,
    cleanup: bool,
) -> Result<(), anyhow::Error> {
    let mut session_config = sandbox.session_config().keep_sandbox(!cleanup);
    if let Some(id) = snapshot_id {
        session_config = session_config
            .with_snapshot_id(id)
            .with_claim_name(format!("{id}-from-snapshot"));
    }
    if let Some(name) = claim_name {
        session_config = session_config.with_claim_name(name);
    }

    let session = SnapshotSession::open(client, SystemClock, config, session_config)?;
    let sandbox_name = session.sandbox_name().to_string();
    println!(
        "✓ Sandbox {sandbox_name} is running pod {}",
        session.pod_name()
    );
    if let Some(target) = session.restore_target() {
        println!("  Restore: {target}");
    }
    match session.endpoint() {
        Ok(endpoint) => println!("  Endpoint: {endpoint}"),
        Err(e) => warn!("Could not resolve endpoint: {}", e),
    }

    report_cleanup(&session.close());
    if !cleanup {
        println!("  Sandbox kept; delete claim '{sandbox_name}' when done");
    }

    Ok(())
}

/// Checkpoint a counting sandbox twice, then check that each restore resumes
/// from at least the count it was taken at
fn run_demo(
    client: KubectlClient,
    config: ClientConfig,
    sandbox: &SandboxArgs,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    let clock = SystemClock;
    let count_pattern = Regex::new(r"Count: (\d+)")?;
    let run_id = Utc::now().format("%H%M%S").to_string();

    let mut session = SnapshotSession::open(
        client.clone(),
        clock,
        config.clone(),
        sandbox.session_config(),
    )?;
    println!(
        "✓ Sandbox {} started with pod {}",
        session.sandbox_name(),
        session.pod_name()
    );

    let mut snapshots = Vec::new();
    for step in 1..=2u32 {
        clock.sleep(interval);
        let after = interval * step;
        let trigger = format!("counter-{}s-{run_id}", after.as_secs());
        let outcome = session.checkpoint(&trigger, None)?;
        let snapshot = outcome
            .snapshot_name
            .ok_or_else(|| anyhow!("Checkpoint '{trigger}' produced no snapshot"))?;
        println!("✓ Checkpoint after {after:?}: {snapshot}");
        snapshots.push((after, snapshot));
    }
    report_cleanup(&session.close());

    for (index, (after, snapshot)) in snapshots.iter().enumerate().rev() {
        let next = snapshots.get(index + 1).map(|(next, _)| *next);
        let restored = SnapshotSession::open(
            client.clone(),
            clock,
            config.clone(),
            sandbox
                .session_config()
                .with_snapshot_id(snapshot)
                .with_claim_name(format!("{snapshot}-from-snapshot")),
        )?;
        clock.sleep(Duration::from_secs(2));
        let count = last_count(&count_pattern, &restored.pod_logs()?);
        report_cleanup(&restored.close());

        let Some(count) = count else {
            bail!("Restored {snapshot}: no counter output in pod logs");
        };
        check_restored_count(count, *after, next)
            .map_err(|e| anyhow!("Restored {snapshot}: {e}"))?;
        println!("✓ Restored {snapshot}: counter resumed at {count}");
    }

    Ok(())
}

/// A restored counter must have resumed from its own checkpoint: at least the
/// seconds elapsed when it was taken, and short of the next checkpoint's
fn check_restored_count(
    count: u64,
    after: Duration,
    next: Option<Duration>,
) -> Result<(), anyhow::Error> {
    if count < after.as_secs() {
        bail!("counter at {count}, expected at least {}", after.as_secs());
    }
    if let Some(next) = next {
        if count >= next.as_secs() {
            bail!(
                "counter at {count}, expected below {} (state of a later checkpoint)",
                next.as_secs()
            );
        }
    }
    Ok(())
}

fn last_count(pattern: &Regex, logs: &str) -> Option<u64> {
    pattern
        .captures_iter(logs)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn report_cleanup(report: &CleanupReport) {
    for (name, error) in &report.failed {
        warn!("Failed to clean up {}: {}", name, error);
    }
}

fn describe_filter(filter: &DeleteFilter) -> String {
    if let Some(id) = &filter.snapshot_id {
        return format!("id '{id}'");
    }
    let mut parts = vec![format!(
        "policy '{}'",
        filter.policy_name.as_deref().unwrap_or_default()
    )];
    if let Some(trigger) = &filter.trigger_name {
        parts.push(format!("trigger '{trigger}'"));
    }
    if let Some(state) = filter.state {
        parts.push(format!("state {state}"));
    }
    if let Some(cutoff) = filter.created_before {
        parts.push(format!("created before {}", format_timestamp(cutoff)));
    }
    parts.join(", ")
}

fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    use std::io::{self, Write};
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
