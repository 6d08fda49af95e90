//! warden CLI: inspect and manage ACLs of an oxigraph store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use graph_warden::acl::{AccessMode, GateResult, ModeSet, SecureGraph};
use graph_warden::config::{SecurityConfig, Settings};
use graph_warden::model::{Agent, Context, Resource, named_node};
use graph_warden::store::{GraphStore, OxGraphStore};

#[derive(Parser)]
#[command(name = "warden", version, about = "ACL-aware mutation authorization for RDF stores")]
struct Cli {
    /// Data directory of the oxigraph store.
    #[arg(long, global = true, default_value = ".graph-warden")]
    data_dir: PathBuf,

    /// Security config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the access modes an agent holds on a resource.
    Modes {
        /// Resource IRI.
        #[arg(long)]
        resource: String,

        /// Agent IRI or user name.
        #[arg(long)]
        agent: String,

        /// Contexts holding the authorizations (default: metadata context).
        #[arg(long = "context")]
        contexts: Vec<String>,
    },

    /// List the contexts an agent may read.
    Readable {
        /// Agent IRI or user name.
        #[arg(long)]
        agent: String,

        /// Contexts to check (default: every context in the store).
        #[arg(long = "context")]
        contexts: Vec<String>,
    },

    /// Grant access modes on a context or resource.
    Grant {
        /// Resource or context IRI the authorization applies to.
        #[arg(long)]
        target: String,

        /// Agent IRI or user name receiving the modes.
        #[arg(long)]
        grantee: String,

        /// Comma-separated modes, e.g. "read,write-restricted".
        #[arg(long, value_delimiter = ',', required = true)]
        mode: Vec<String>,

        /// Context storing the authorization (default: metadata context).
        #[arg(long)]
        context: Option<String>,

        /// Acting agent (default: system agent).
        #[arg(long = "as")]
        acting: Option<String>,
    },

    /// Record an agent as owner of a context.
    Register {
        /// Context IRI.
        #[arg(long)]
        context: String,

        /// Agent IRI or user name.
        #[arg(long)]
        owner: String,
    },

    /// Check how the context gate treats a write by an agent.
    Check {
        /// Agent IRI or user name.
        #[arg(long)]
        agent: String,

        /// Target contexts.
        #[arg(long = "context", required = true)]
        contexts: Vec<String>,

        /// Check removal instead of addition.
        #[arg(long)]
        remove: bool,
    },
}

#[derive(Serialize)]
struct ModesReport {
    resource: String,
    agent: String,
    modes: ModeSet,
}

#[derive(Serialize)]
struct ContextMode {
    context: String,
    mode: Option<AccessMode>,
}

#[derive(Serialize)]
struct CheckReport {
    agent: String,
    contexts: Vec<ContextMode>,
    outcome: String,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SecurityConfig::load(path)?,
        None => SecurityConfig::default(),
    };
    let settings = config.validate()?;
    let store = Arc::new(OxGraphStore::open(&cli.data_dir)?);
    let graph = SecureGraph::new(store.clone(), settings.clone());

    match cli.command {
        Commands::Modes {
            resource,
            agent,
            contexts,
        } => {
            let agent = resolve_agent(&settings, &agent)?;
            let resource = Resource::named(&resource)?;
            let contexts = contexts_or(&contexts, &settings.metadata_context)?;
            let modes = graph.oracle().modes_for(&resource, &agent, &contexts)?;
            if cli.json {
                let report = ModesReport {
                    resource: resource.to_string(),
                    agent: agent.to_string(),
                    modes,
                };
                print_json(&report)?;
            } else {
                println!("{agent} on {resource}: {modes}");
            }
        }

        Commands::Readable { agent, contexts } => {
            let agent = resolve_agent(&settings, &agent)?;
            let requested = if contexts.is_empty() {
                store.contexts()?
            } else {
                parse_contexts(&contexts)?
            };
            let readable = graph.filter_readable(&requested, &agent)?;
            if cli.json {
                let names: Vec<String> = readable.iter().map(|c| c.as_str().to_string()).collect();
                print_json(&names)?;
            } else if readable.is_empty() {
                println!("{agent} cannot read any of {} context(s).", requested.len());
            } else {
                println!("Readable by {agent} ({}):", readable.len());
                for ctx in &readable {
                    println!("  {ctx}");
                }
            }
        }

        Commands::Grant {
            target,
            grantee,
            mode,
            context,
            acting,
        } => {
            let target = named_node(&target)?;
            let grantee = resolve_agent(&settings, &grantee)?;
            let modes = parse_modes(&mode)?;
            let context = match context {
                Some(c) => named_node(&c)?,
                None => settings.metadata_context.clone(),
            };
            let acting = match acting {
                Some(a) => resolve_agent(&settings, &a)?,
                None => settings.system_agent.clone(),
            };
            let auth = graph.grant(&target, &grantee, &modes, &context, &acting)?;
            println!("Granted {modes} on {target} to {grantee} ({auth})");
        }

        Commands::Register { context, owner } => {
            let context = named_node(&context)?;
            let owner = resolve_agent(&settings, &owner)?;
            if graph.register_context(&context, &owner)? {
                println!("{owner} now owns {context}");
            } else {
                println!("{context} unchanged (already owned, or {owner} cannot own contexts)");
            }
        }

        Commands::Check {
            agent,
            contexts,
            remove,
        } => {
            let agent = resolve_agent(&settings, &agent)?;
            let contexts = parse_contexts(&contexts)?;
            let mut per_context = Vec::with_capacity(contexts.len());
            for ctx in &contexts {
                per_context.push(ContextMode {
                    context: ctx.as_str().to_string(),
                    mode: graph.gate().write_mode_for(ctx, &agent)?,
                });
            }
            let required = if remove {
                ModeSet::for_removals()
            } else {
                ModeSet::for_additions()
            };
            let outcome = match graph.gate().authorize(&agent, &[], &contexts, &required) {
                Ok(GateResult::Unrestricted) => "unrestricted".to_string(),
                Ok(GateResult::Restricted) => "restricted".to_string(),
                Err(e) => format!("denied: {e}"),
            };
            if cli.json {
                print_json(&CheckReport {
                    agent: agent.to_string(),
                    contexts: per_context,
                    outcome,
                })?;
            } else {
                for cm in &per_context {
                    let mode = cm.mode.map_or_else(|| "none".to_string(), |m| m.to_string());
                    println!("  {:<40} {mode}", cm.context);
                }
                println!("{agent}: {outcome}");
            }
        }
    }

    Ok(())
}

/// Full IRIs pass through; bare names are placed in the user namespace.
fn resolve_agent(settings: &Settings, value: &str) -> Result<Agent> {
    if value.contains(':') {
        Ok(named_node(value)?)
    } else {
        Ok(settings.agent_for_username(value)?)
    }
}

fn parse_contexts(values: &[String]) -> Result<Vec<Context>> {
    values
        .iter()
        .map(|v| named_node(v).map_err(Into::into))
        .collect()
}

fn contexts_or(values: &[String], fallback: &Context) -> Result<Vec<Context>> {
    if values.is_empty() {
        Ok(vec![fallback.clone()])
    } else {
        parse_contexts(values)
    }
}

fn parse_modes(names: &[String]) -> Result<ModeSet> {
    names
        .iter()
        .map(|name| {
            AccessMode::from_name(name.trim())
                .ok_or_else(|| miette::miette!("unknown access mode: {name}"))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
