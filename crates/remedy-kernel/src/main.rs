use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use remedy_kernel::logging::verify_chain;
use remedy_kernel::policy::PlanShape;
use remedy_kernel::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Command::new("remedy-kernel")
        .version(remedy_kernel::VERSION)
        .about("Incident remediation plan scheduler")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Dispatch commands against an in-memory repository (dry-run executor)")
                .arg(config_arg())
                .arg(
                    Arg::new("incidents")
                        .long("incidents")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of incident records"),
                )
                .arg(
                    Arg::new("commands")
                        .long("commands")
                        .default_value("-")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of command inputs ('-' reads stdin)"),
                )
                .arg(
                    Arg::new("audit-out")
                        .long("audit-out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the audit chain to this file"),
                )
                .arg(
                    Arg::new("fail-on-reject")
                        .long("fail-on-reject")
                        .action(ArgAction::SetTrue)
                        .help("Exit non-zero if any command was rejected"),
                ),
        )
        .subcommand(
            Command::new("preview")
                .about("Build, batch and score the configured playbook for a severity")
                .arg(config_arg())
                .arg(
                    Arg::new("severity")
                        .long("severity")
                        .default_value("high")
                        .help("Incident severity: low, medium, high, critical or extreme"),
                ),
        )
        .subcommand(
            Command::new("verify-audit")
                .about("Verify the hash chain of an exported audit log")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("preview", args)) => preview(args),
        Some(("verify-audit", args)) => verify_audit(args),
        _ => bail!("unknown subcommand"),
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration (engine, policy, steps)")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> Result<RemedyConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => Ok(RemedyConfig::load(path)?),
        None => Ok(RemedyConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading commands from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("--{name} is required"))
}

async fn run(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;

    let incidents_path = required_path(args, "incidents")?;
    let incidents: Vec<IncidentRecord> = serde_json::from_str(&read_input(incidents_path)?)
        .with_context(|| format!("parsing incidents from {}", incidents_path.display()))?;
    let commands: Vec<serde_json::Value> =
        serde_json::from_str(&read_input(required_path(args, "commands")?)?)
            .context("parsing commands")?;

    let repository = Arc::new(InMemoryRepository::with_incidents(incidents));
    let playbook = Arc::new(StaticPlaybook::new(config.steps.clone()));
    let center = CommandCenter::new(&config, repository, playbook, Arc::new(DryRunExecutor));

    let mut outcomes = Vec::with_capacity(commands.len());
    for raw in commands {
        // a malformed entry only rejects itself
        outcomes.push(center.dispatch_json(&raw.to_string()).await);
    }
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    if let Some(path) = args.get_one::<PathBuf>("audit-out") {
        let entries = center.audit_log().entries();
        std::fs::write(path, serde_json::to_vec_pretty(&entries)?)
            .with_context(|| format!("writing audit log to {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = entries.len(), "audit log written");
    }

    let rejected = outcomes.iter().filter(|o| !o.is_success()).count();
    if rejected > 0 && args.get_flag("fail-on-reject") {
        bail!("{rejected} of {} commands rejected", outcomes.len());
    }
    Ok(())
}

fn preview(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let severity: Severity = args
        .get_one::<String>("severity")
        .map_or("high", String::as_str)
        .parse()
        .map_err(anyhow::Error::msg)?;

    let incident = IncidentRecord::new("preview", "preview", severity);
    let playbook = StaticPlaybook::new(config.steps.clone());
    let plan = PlanGraph::build_from(&incident, playbook.candidate_steps(&incident))?;
    let batches = BatchScheduler::new(config.engine.max_concurrency).partition(&plan)?;
    let decision = PolicyGate::new(config.policy.clone()).evaluate(&incident, &plan, &batches)?;
    let shape = PlanShape::measure(&plan, &batches)?;

    let report = serde_json::json!({
        "severity": severity,
        "order": plan.topological_order()?,
        "entryNodes": plan.entry_nodes(),
        "exitNodes": plan.exit_nodes()?,
        "batches": batches,
        "shape": shape,
        "decision": decision,
        "fingerprint": plan.fingerprint(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn verify_audit(args: &ArgMatches) -> Result<()> {
    let path = required_path(args, "file")?;
    let entries: Vec<CommandAudit> = serde_json::from_str(&read_input(path)?)
        .with_context(|| format!("parsing audit log {}", path.display()))?;
    verify_chain(&entries)?;
    println!("audit chain intact ({} entries)", entries.len());
    Ok(())
}
