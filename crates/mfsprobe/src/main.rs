//! mfsprobe -- find the active MooseFS master and query it.
//!
//! Usage:
//!   mfsprobe                                   # Roster of all masters
//!   mfsprobe --hosts m1,m2 leader              # Active master summary
//!   mfsprobe cs-command maint-on 10.0.0.5      # Chunk server maintenance
//!   mfsprobe fanout 10.0.0.1 10.0.0.2:9421     # Raw concurrent node-info

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use mfsprobe::config::ProbeConfig;
use mfsprobe::report::{self, LeaderReport};
use mfsprobe::resolve::parse_endpoint;
use mfsprobe::{expand_tilde, ClusterResolver, Dispatcher, MasterConnection};
use mfsprobe_protocol::commands::{CLTOMA_INFO, MATOCL_INFO};
use mfsprobe_protocol::{ChunkServerCommand, CommandStatus, NodeInfo, DEFAULTS};
use mfsprobe_topology::{sort_roster, NodeRole, RosterOrder};

#[derive(Parser)]
#[command(name = "mfsprobe", about = "MooseFS master discovery and administration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.mfsprobe/config.toml")]
    config: String,

    /// Master host list (overrides config), separated by `;`, `,` or spaces
    #[arg(short = 'H', long)]
    hosts: Option<String>,

    /// Master client port (overrides config)
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Address of the previously known leader, probed first
    #[arg(long)]
    leader_hint: Option<Ipv4Addr>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every master with its role (default)
    Masters {
        /// endpoint, version, role, metaversion or clock
        #[arg(long, default_value = "endpoint")]
        order: RosterOrder,
        #[arg(long)]
        reverse: bool,
    },
    /// Show the active master
    Leader,
    /// List metaloggers connected to the active master
    Metaloggers,
    /// Send a maintenance command about one chunk server (leader only)
    CsCommand {
        action: CsAction,
        ip: Ipv4Addr,
        #[arg(default_value_t = DEFAULTS.chunkserver_client_port)]
        port: u16,
    },
    /// Remove a client session (leader only)
    SessionRemove { id: u32 },
    /// Send node-info to the given addresses concurrently
    Fanout {
        /// `ip` or `ip:port`
        #[arg(required = true)]
        addrs: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CsAction {
    Remove,
    BackToWork,
    MaintOn,
    MaintOff,
    TmpRemove,
}

impl From<CsAction> for ChunkServerCommand {
    fn from(a: CsAction) -> Self {
        match a {
            CsAction::Remove => ChunkServerCommand::Remove,
            CsAction::BackToWork => ChunkServerCommand::BackToWork,
            CsAction::MaintOn => ChunkServerCommand::MaintenanceOn,
            CsAction::MaintOff => ChunkServerCommand::MaintenanceOff,
            CsAction::TmpRemove => ChunkServerCommand::TmpRemove,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mfsprobe=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let mut cfg = ProbeConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(hosts) = cli.hosts {
        cfg.master.hosts = hosts;
    }
    if let Some(port) = cli.port {
        cfg.master.port = port;
    }
    if cli.leader_hint.is_some() {
        cfg.master.leader_hint = cli.leader_hint;
    }

    let command = cli.command.unwrap_or(Commands::Masters {
        order: RosterOrder::default(),
        reverse: false,
    });

    match command {
        Commands::Masters { order, reverse } => masters(&cfg, order, reverse, cli.json).await?,
        Commands::Leader => leader(&cfg, cli.json).await?,
        Commands::Metaloggers => {
            let mut resolver = ClusterResolver::from_config(&cfg).await;
            let master = active_master(&mut resolver)?;
            let list = master.metaloggers().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", report::render_metaloggers(&list));
            }
        }
        Commands::CsCommand { action, ip, port } => {
            let mut resolver = ClusterResolver::from_config(&cfg).await;
            let master = resolver.leader_master()?;
            let command = ChunkServerCommand::from(action);
            let status = master.cs_command(command, ip, port).await?;
            print_status(&format!("{command} {ip}:{port}"), status, cli.json)?;
        }
        Commands::SessionRemove { id } => {
            let mut resolver = ClusterResolver::from_config(&cfg).await;
            let master = resolver.leader_master()?;
            let status = master.session_remove(id).await?;
            print_status(&format!("remove session {id}"), status, cli.json)?;
        }
        Commands::Fanout { addrs } => fanout(&cfg, &addrs, cli.json).await?,
    }

    Ok(())
}

fn active_master(resolver: &mut ClusterResolver) -> anyhow::Result<&mut MasterConnection> {
    if let Some(err) = resolver.error() {
        return Err(err.into());
    }
    resolver
        .master()
        .ok_or_else(|| anyhow::anyhow!("no active master"))
}

fn print_status(what: &str, status: CommandStatus, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", json!({ "command": what, "status": status }));
    } else {
        println!("{what}: {status}");
    }
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn masters(
    cfg: &ProbeConfig,
    order: RosterOrder,
    reverse: bool,
    as_json: bool,
) -> anyhow::Result<()> {
    let mut resolver = ClusterResolver::from_config(cfg).await;
    let consistency = resolver.consistency().await;
    let mut roster = resolver.roster().await.to_vec();
    sort_roster(&mut roster, order, reverse);
    let rows = report::roster_rows(&roster, &consistency);

    if as_json {
        let value = json!({
            "hosts": resolver.hosts(),
            "found": resolver.found(),
            "active": resolver.master_endpoint(),
            "consistency": consistency,
            "error": resolver.error().map(|e| e.to_string()),
            "masters": rows,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print!("{}", report::render_roster(&rows, &consistency));
    if let Some(err) = resolver.error() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn leader(cfg: &ProbeConfig, as_json: bool) -> anyhow::Result<()> {
    let resolver = ClusterResolver::from_config(cfg).await;
    if let Some(err) = resolver.error() {
        return Err(err.into());
    }
    let (Some(endpoint), Some(role), Some(info)) = (
        resolver.master_endpoint(),
        resolver.master_role(),
        resolver.master_info(),
    ) else {
        anyhow::bail!("no active master");
    };
    let summary = match resolver.cluster_summary() {
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "no cluster counters in node info");
            None
        }
        None => None,
    };
    let view = LeaderReport {
        endpoint,
        role,
        version: info.version.release().to_string(),
        summary,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", report::render_leader(&view));
    }
    Ok(())
}

async fn fanout(cfg: &ProbeConfig, addrs: &[String], as_json: bool) -> anyhow::Result<()> {
    let mut endpoints = Vec::with_capacity(addrs.len());
    for a in addrs {
        let ep = parse_endpoint(a, cfg.master.port)
            .with_context(|| format!("not an IPv4 address: {a}"))?;
        endpoints.push(ep);
    }

    let dispatcher = Dispatcher::from_config(cfg);
    let replies = dispatcher
        .run(&endpoints, CLTOMA_INFO, MATOCL_INFO, bytes::Bytes::new())
        .await;

    // Sorted for stable output; the map itself is unordered.
    let mut out = BTreeMap::new();
    for ep in &endpoints {
        let key = ep.key();
        let line = match replies.get(&key) {
            None => json!({ "answered": false }),
            Some(reply) => match NodeInfo::decode(reply) {
                Ok(info) => json!({
                    "answered": true,
                    "length": reply.len(),
                    "version": info.version.release().to_string(),
                    "role": NodeRole::from_info(&info).to_string(),
                }),
                Err(e) => json!({ "answered": true, "length": reply.len(), "error": e.to_string() }),
            },
        };
        out.insert(key, line);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (key, v) in &out {
            let text = match (v.get("role"), v.get("error")) {
                (Some(role), _) => format!(
                    "{} {}",
                    role.as_str().unwrap_or_default(),
                    v["version"].as_str().unwrap_or_default()
                ),
                (None, Some(err)) => err.as_str().unwrap_or_default().to_string(),
                (None, None) => "no answer".to_string(),
            };
            println!("{key:<21} {text}");
        }
    }
    tracing::info!(
        answered = replies.len(),
        asked = endpoints.len(),
        "fan-out finished"
    );
    Ok(())
}
