//! cordon command-line interface
//!
//! Subcommands operate on the active intent profile (or `--intent NAME`):
//! evaluating packets, auditing the rendered chain for shadowed rules and
//! unreachable published ports, diffing management modes, and editing rules.

use clap::{Parser, Subcommand};
use cordon::core::analysis::analyze;
use cordon::core::diagnose::{explain_shadow, explain_unreachable};
use cordon::core::intent::{
    DEFAULT_INTENT_NAME, IntentError, delete_intent, list_intents, load_intent, rename_intent,
    save_intent,
};
use cordon::core::parse::parse_expr;
use cordon::validators::{check_reserved_ip, check_well_known_port, validate_label};
use cordon::{
    Chain, Error, Intent, Packet, PortMapping, Protocol, Result, RuleManagement, Verdict,
    Workload, evaluate, render,
};
use std::net::IpAddr;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cordon", version, about = "Firewall chain precedence simulator and auditor")]
struct Cli {
    /// Intent profile to operate on (defaults to the configured active intent)
    #[arg(long, global = true)]
    intent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the configuration and a summary of the active intent
    Status,
    /// List intent profiles
    List,
    /// Evaluate a packet against the rendered chain
    ///
    /// PACKET is PROTOCOL/PORT (e.g. tcp/8089) or a bare protocol for icmp.
    Eval {
        packet: String,
        /// Source address of the packet (default: unspecified)
        #[arg(long)]
        from: Option<IpAddr>,
        /// Override the configured management mode
        #[arg(long)]
        mode: Option<RuleManagement>,
    },
    /// Audit the rendered chain for shadowed rules and unreachable ports
    Check {
        /// Override the configured management mode
        #[arg(long)]
        mode: Option<RuleManagement>,
    },
    /// Print the rendered chain
    Export {
        /// Output as JSON instead of chain text
        #[arg(long)]
        json: bool,
        /// Override the configured management mode
        #[arg(long)]
        mode: Option<RuleManagement>,
    },
    /// Diff the chain as rendered under the two management modes
    Diff,
    /// Show or switch the configured rule-management mode
    Mode {
        /// New mode; omit to print the current one
        mode: Option<RuleManagement>,
    },
    /// Edit administrator rules in the intent
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Edit declared workloads in the intent
    #[command(subcommand)]
    Workload(WorkloadCommand),
    /// Manage intent profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand)]
enum RuleCommand {
    /// Append a rule, e.g. `cordon rule add "drop tcp/8089 from 10.0.0.0/24"`
    Add {
        expr: String,
        /// Human-readable label (defaults to the expression itself)
        #[arg(long)]
        label: Option<String>,
    },
    /// Remove a rule by label or id
    Remove { rule: String },
    /// List the intent's administrator rules
    List,
}

#[derive(Subcommand)]
enum WorkloadCommand {
    /// Declare a workload and its published ports, e.g. `api 8089:8080/tcp`
    Add {
        name: String,
        /// Published ports as HOST:CONTAINER[/proto]
        #[arg(required = true)]
        published: Vec<PortMapping>,
    },
    /// Remove a declared workload
    Remove { name: String },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Delete an intent profile (the default profile is protected)
    Delete { name: String },
    /// Rename an intent profile
    Rename { old: String, new: String },
}

fn init_logging() {
    let Some(mut path) = cordon::utils::get_state_dir() else {
        return;
    };
    path.push("cordon.log");

    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::sync::Arc::new(file))
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .try_init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = cordon::utils::ensure_dirs() {
        eprintln!("error: cannot create storage directories: {e}");
        return ExitCode::FAILURE;
    }
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads the intent the command should operate on.
///
/// A missing default profile is an empty intent carrying the configured
/// default policy, not an error; any other missing profile is reported.
async fn load_target_intent(name: &str, fallback_policy: cordon::Action) -> Result<Intent> {
    match load_intent(name).await {
        Ok(intent) => Ok(intent),
        Err(IntentError::NotFound(_)) if name == DEFAULT_INTENT_NAME => {
            let mut intent = Intent::new();
            intent.default_policy = fallback_policy;
            Ok(intent)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_verdict(packet: &Packet, verdict: &Verdict) {
    match &verdict.matched {
        Some(matched) => println!(
            "{packet} -> {} (rule #{} [{}] \"{}\")",
            verdict.action, matched.index, matched.origin, matched.label
        ),
        None => println!("{packet} -> {} (default policy)", verdict.action),
    }
}

fn parse_packet(spec: &str, from: Option<IpAddr>) -> Result<Packet> {
    let (proto, port) = match spec.split_once('/') {
        Some((proto, port)) => {
            let port = port.parse::<u16>().map_err(|_| Error::Validation {
                field: "packet".to_string(),
                message: format!("invalid port '{port}'"),
            })?;
            (proto, Some(port))
        }
        None => (spec, None),
    };

    let protocol = proto.parse::<Protocol>().map_err(|_| Error::Validation {
        field: "packet".to_string(),
        message: format!("unknown protocol '{proto}'"),
    })?;
    if protocol == Protocol::Any {
        return Err(Error::Validation {
            field: "packet".to_string(),
            message: "a packet carries a concrete protocol, not 'any'".to_string(),
        });
    }
    if matches!(protocol, Protocol::Tcp | Protocol::Udp) && port.is_none() {
        return Err(Error::Validation {
            field: "packet".to_string(),
            message: format!("{protocol} packets need a port, e.g. {protocol}/8089"),
        });
    }

    Ok(Packet {
        protocol,
        port,
        source: from.unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
    })
}

fn render_for(intent: &Intent, config_mode: RuleManagement, override_mode: Option<RuleManagement>) -> Chain {
    render(intent, override_mode.unwrap_or(config_mode))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = cordon::config::load_config().await;
    let intent_name = cli.intent.unwrap_or_else(|| config.active_intent.clone());

    match cli.command {
        Command::Status => {
            let intent = load_target_intent(&intent_name, config.default_policy).await?;
            let chain = render(&intent, config.management);
            println!("intent:          {intent_name}");
            println!("management:      {}", config.management);
            println!("default policy:  {}", intent.default_policy);
            println!("admin rules:     {}", intent.rules.len());
            println!("workloads:       {}", intent.workloads.len());
            println!("rendered chain:  {} rules", chain.len());

            let report = analyze(&chain, &intent.published());
            if report.is_clean() {
                println!("audit:           clean");
            } else {
                println!(
                    "audit:           {} shadow finding(s), {} unreachable port(s); run `cordon check`",
                    report.shadows.len(),
                    report.unreachable.len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::List => {
            let intents = list_intents().await?;
            if intents.is_empty() {
                println!("{DEFAULT_INTENT_NAME} (empty)");
            }
            for name in intents {
                if name == config.active_intent {
                    println!("{name} (active)");
                } else {
                    println!("{name}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Eval { packet, from, mode } => {
            let intent = load_target_intent(&intent_name, config.default_policy).await?;
            let chain = render_for(&intent, config.management, mode);
            let packet = parse_packet(&packet, from)?;
            let verdict = evaluate(&chain, &packet);
            print_verdict(&packet, &verdict);

            if config.audit_enabled {
                cordon::audit::log_evaluate(
                    &packet.to_string(),
                    verdict.action.as_str(),
                    verdict.default_applied(),
                )
                .await;
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Check { mode } => {
            let intent = load_target_intent(&intent_name, config.default_policy).await?;
            let chain = render_for(&intent, config.management, mode);
            let report = analyze(&chain, &intent.published());

            if config.audit_enabled {
                let violations = report
                    .shadows
                    .iter()
                    .filter(|s| s.kind == cordon::ShadowKind::PolicyViolation)
                    .count();
                cordon::audit::log_analyze(
                    violations,
                    report.shadows.len(),
                    report.unreachable.len(),
                )
                .await;
            }

            if report.is_clean() {
                println!("chain is clean: no shadowed rules, all published ports reachable");
                return Ok(ExitCode::SUCCESS);
            }

            for finding in &report.shadows {
                let diagnosis = explain_shadow(finding);
                println!("[{}] {}", finding.kind, diagnosis.user_message);
                for suggestion in &diagnosis.suggestions {
                    println!("    - {suggestion}");
                }
                if let Some(url) = &diagnosis.help_url {
                    println!("    see: {url}");
                }
            }
            for port in &report.unreachable {
                let diagnosis = explain_unreachable(port);
                println!("[unreachable] {}", diagnosis.user_message);
                for suggestion in &diagnosis.suggestions {
                    println!("    - {suggestion}");
                }
            }

            if report.has_violations() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Command::Export { json, mode } => {
            let intent = load_target_intent(&intent_name, config.default_policy).await?;
            let chain = render_for(&intent, config.management, mode);
            if json {
                println!("{}", serde_json::to_string_pretty(&chain)?);
            } else {
                print!("{}", chain.to_text());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Diff => {
            let intent = load_target_intent(&intent_name, config.default_policy).await?;
            let runtime = render(&intent, RuleManagement::RuntimeManaged).to_text();
            let admin = render(&intent, RuleManagement::AdminManaged).to_text();

            let diff = similar::TextDiff::from_lines(runtime.as_str(), admin.as_str());
            print!(
                "{}",
                diff.unified_diff()
                    .context_radius(3)
                    .header("runtime-managed", "admin-managed")
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Mode { mode } => {
            let Some(new_mode) = mode else {
                println!("{}", config.management);
                return Ok(ExitCode::SUCCESS);
            };

            if new_mode == config.management {
                println!("management mode already {new_mode}");
                return Ok(ExitCode::SUCCESS);
            }

            let old = config.management;
            config.management = new_mode;
            cordon::config::save_config(&config).await?;

            if config.audit_enabled {
                cordon::audit::log_mode_switch(old.as_ref(), new_mode.as_ref()).await;
            }

            println!("management mode: {old} -> {new_mode}");
            println!(
                "note: the runtime daemon reads this flag once at start. Restart the daemon \
                 and recreate containers with published ports for it to take effect."
            );
            if new_mode == RuleManagement::AdminManaged {
                println!(
                    "note: published ports are no longer auto-provisioned; add accept rules \
                     for any that should stay reachable (`cordon check` lists them)."
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Rule(cmd) => run_rule(cmd, &intent_name, &config).await,

        Command::Workload(cmd) => {
            let mut intent = load_target_intent(&intent_name, config.default_policy).await?;
            match cmd {
                WorkloadCommand::Add { name, published } => {
                    intent.workloads.retain(|w| w.name != name);
                    intent.workloads.push(Workload::new(name.clone(), published));
                    save_intent(&intent_name, &intent).await?;
                    println!("declared workload '{name}'");
                }
                WorkloadCommand::Remove { name } => {
                    let before = intent.workloads.len();
                    intent.workloads.retain(|w| w.name != name);
                    if intent.workloads.len() == before {
                        return Err(Error::Validation {
                            field: "workload".to_string(),
                            message: format!("no workload named '{name}'"),
                        });
                    }
                    save_intent(&intent_name, &intent).await?;
                    println!("removed workload '{name}'");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Profile(cmd) => {
            match cmd {
                ProfileCommand::Delete { name } => {
                    delete_intent(&name).await?;
                    if config.active_intent == name {
                        config.active_intent = DEFAULT_INTENT_NAME.to_string();
                        cordon::config::save_config(&config).await?;
                    }
                    if config.audit_enabled {
                        cordon::audit::log_delete_intent(&name).await;
                    }
                    println!("deleted intent '{name}'");
                }
                ProfileCommand::Rename { old, new } => {
                    rename_intent(&old, &new).await?;
                    if config.active_intent == old {
                        config.active_intent = new.clone();
                        cordon::config::save_config(&config).await?;
                    }
                    println!("renamed intent '{old}' to '{new}'");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_rule(
    cmd: RuleCommand,
    intent_name: &str,
    config: &cordon::config::AppConfig,
) -> Result<ExitCode> {
    let mut intent = load_target_intent(intent_name, config.default_policy).await?;

    match cmd {
        RuleCommand::Add { expr, label } => {
            if intent.rules.len() >= cordon::core::chain::MAX_RULES {
                return Err(Error::Validation {
                    field: "rules".to_string(),
                    message: format!(
                        "intent already holds the maximum of {} rules",
                        cordon::core::chain::MAX_RULES
                    ),
                });
            }
            let parsed = parse_expr(&expr)?;

            let label = match label {
                Some(l) => validate_label(&l).map_err(|message| Error::Validation {
                    field: "label".to_string(),
                    message,
                })?,
                None => expr.clone(),
            };

            if let Some(ports) = parsed.ports
                && let Some(note) = check_well_known_port(ports.start)
            {
                println!("note: {note}");
            }
            if let Some(source) = parsed.source
                && let Some(note) = check_reserved_ip(source)
            {
                println!("note: {note}");
            }

            let rule = parsed.into_rule(label);
            println!("added rule \"{}\" ({})", rule.label, rule.id);
            intent.rules.push(rule);

            save_intent(intent_name, &intent).await?;
            if config.audit_enabled {
                cordon::audit::log_save_intent(intent_name, intent.rules.len(), true, None).await;
            }
            Ok(ExitCode::SUCCESS)
        }

        RuleCommand::Remove { rule } => {
            let before = intent.rules.len();
            if let Ok(id) = rule.parse::<uuid::Uuid>() {
                intent.rules.retain(|r| r.id != id);
            } else {
                intent.rules.retain(|r| r.label != rule);
            }
            if intent.rules.len() == before {
                return Err(Error::RuleNotFound(rule));
            }

            save_intent(intent_name, &intent).await?;
            if config.audit_enabled {
                cordon::audit::log_save_intent(intent_name, intent.rules.len(), true, None).await;
            }
            println!("removed {} rule(s)", before - intent.rules.len());
            Ok(ExitCode::SUCCESS)
        }

        RuleCommand::List => {
            if intent.rules.is_empty() {
                println!("no administrator rules in '{intent_name}'");
            }
            for (i, rule) in intent.rules.iter().enumerate() {
                let mut desc = String::new();
                if rule.protocol != Protocol::Any {
                    desc.push_str(rule.protocol.as_str());
                }
                if let Some(ports) = &rule.ports {
                    desc.push_str(&format!("/{ports}"));
                }
                if let Some(source) = &rule.source {
                    desc.push_str(&format!(" from {source}"));
                }
                println!(
                    "{i:3}. [{}] {} {} \"{}\" ({})",
                    if rule.enabled { "on " } else { "off" },
                    rule.action,
                    desc.trim(),
                    rule.label,
                    rule.id
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
