#![forbid(unsafe_code)]

//! agg80211 command line tool.
//!
//! `check-config` validates a TOML configuration, `decode` dissects captured
//! A-MSDU, A-MPDU and block-ack action bodies, and `simulate` drives two
//! link layers over an in-process loopback channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use byte_unit::{Byte, UnitType};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use console::style;
use serde::Serialize;
use tracing::info;

use agg80211_core::{AggConfig, MacAddress, NoopStats, StatsSink};
use agg80211_mac::{
    parse_action, parse_ampdu, parse_amsdu, ActionBody, DataHeader, DataUnit, FrameKind,
    LinkCounters, LinkLayer, LoopbackLink, MacError, Node, QueueCounters, TxKind,
};
use agg80211_telemetry::{init_tracing, PrometheusStats};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level override (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to the TOML configuration
        path: PathBuf,
    },
    /// Decode a hex encoded frame body
    Decode {
        #[arg(value_enum)]
        kind: DecodeKind,
        /// Hex octets, whitespace and colons are ignored
        hex: String,
        /// A-MSDU subframes carry mesh control
        #[arg(long)]
        mesh: bool,
    },
    /// Run two link layers against each other over a loopback channel
    Simulate {
        /// Configuration used by both nodes
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Data units sent from A to B
        #[arg(short, long, default_value = "200")]
        frames: usize,
        /// Data units sent from B to A
        #[arg(long, default_value = "0")]
        reverse: usize,
        /// Payload length in octets
        #[arg(long, default_value = "256")]
        len: usize,
        /// One way channel latency in microseconds
        #[arg(long, default_value = "100")]
        latency_us: u64,
        /// Simulation step in microseconds
        #[arg(long, default_value = "50")]
        step_us: u64,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Print node A's Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DecodeKind {
    Amsdu,
    Ampdu,
    Action,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Serialize)]
struct NodeReport {
    address: String,
    delivered: usize,
    link: LinkCounters,
    queue: QueueCounters,
    sessions_opened: u64,
    session_timeouts: u64,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    elapsed_us: u128,
    steps: usize,
    actions: usize,
    units: usize,
    aggregates: usize,
    blocks: usize,
    largest_block: usize,
    a: NodeReport,
    b: NodeReport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::CheckConfig { path } => {
            let cfg =
                AggConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;
            init_tracing(cli.log_level.as_deref().or(cfg.log_level.as_deref()))?;
            cmd_check_config(&cfg)
        }
        Commands::Decode { kind, hex, mesh } => {
            init_tracing(cli.log_level.as_deref())?;
            cmd_decode(kind, &hex, mesh)
        }
        Commands::Simulate {
            config,
            frames,
            reverse,
            len,
            latency_us,
            step_us,
            format,
            metrics,
        } => {
            let cfg = match config {
                Some(path) => {
                    AggConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
                }
                None => {
                    let mut cfg = AggConfig::default();
                    cfg.block_ack.allow_all = true;
                    cfg
                }
            };
            init_tracing(cli.log_level.as_deref().or(cfg.log_level.as_deref()))?;
            if step_us == 0 {
                bail!("--step-us must be non-zero");
            }
            let sim = Simulation {
                frames,
                reverse,
                len,
                latency: Duration::from_micros(latency_us),
                step: Duration::from_micros(step_us),
            };
            cmd_simulate(cfg, sim, format, metrics)
        }
    }
}

fn cmd_check_config(cfg: &AggConfig) -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Setting", "Value"]);
    let address = cfg.address.map(|a| a.to_string()).unwrap_or_else(|| "-".into());
    let peers = cfg.block_ack.allowed_peers()?;
    let rows: Vec<(&str, String)> = vec![
        ("address", address),
        ("aggregation.enabled", cfg.aggregation.enabled.to_string()),
        ("aggregation.max_aggregate_len", cfg.aggregation.max_aggregate_len.to_string()),
        ("queue.frame_capacity", capacity(cfg.queue.frame_capacity)),
        ("queue.edca", cfg.queue.edca.to_string()),
        ("queue.max_msdu_len", cfg.queue.max_msdu_len.to_string()),
        ("block_ack.enabled", cfg.block_ack.enabled.to_string()),
        ("block_ack.min_block", cfg.block_ack.min_block.to_string()),
        ("block_ack.max_block", cfg.block_ack.max_block.to_string()),
        ("block_ack.auto_threshold", cfg.block_ack.auto_threshold.to_string()),
        ("block_ack.block_ack_timeout_ms", cfg.block_ack.block_ack_timeout_ms.to_string()),
        ("block_ack.addba_failure_timeout_ms", cfg.block_ack.addba_failure_timeout_ms.to_string()),
        ("block_ack.reset_block_timeout_ms", cfg.block_ack.reset_block_timeout_ms.to_string()),
        ("block_ack.buffer_size", cfg.block_ack.buffer_size.to_string()),
        ("block_ack.allow_all", cfg.block_ack.allow_all.to_string()),
        (
            "block_ack.allow_list",
            peers.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", "),
        ),
        ("block_ack.reset_after_send", cfg.block_ack.reset_after_send.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    println!("{}", style("Configuration OK").green());
    println!("{table}");
    Ok(())
}

fn capacity(n: usize) -> String {
    if n == 0 {
        "unbounded".into()
    } else {
        n.to_string()
    }
}

fn cmd_decode(kind: DecodeKind, input: &str, mesh: bool) -> Result<()> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    let bytes = hex::decode(&cleaned).context("input is not valid hex")?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    match kind {
        DecodeKind::Amsdu => {
            let subframes = parse_amsdu(&bytes, mesh)?;
            table.set_header(vec!["#", "DA", "SA", "Mesh", "Length"]);
            for (i, sub) in subframes.iter().enumerate() {
                let mesh = sub
                    .mesh
                    .map(|(ttl, seq)| format!("ttl={ttl} seq={seq}"))
                    .unwrap_or_else(|| "-".into());
                table.add_row(vec![
                    i.to_string(),
                    sub.da.to_string(),
                    sub.sa.to_string(),
                    mesh,
                    sub.body.len().to_string(),
                ]);
            }
        }
        DecodeKind::Ampdu => {
            let mpdus = parse_ampdu(&bytes)?;
            table.set_header(vec!["#", "Length", "Leading octets"]);
            for (i, mpdu) in mpdus.iter().enumerate() {
                let head = &mpdu[..mpdu.len().min(8)];
                table.add_row(vec![i.to_string(), mpdu.len().to_string(), hex::encode(head)]);
            }
        }
        DecodeKind::Action => {
            let (rest, body) = parse_action(&bytes).map_err(MacError::from)?;
            if !rest.is_empty() {
                println!("{}", style(format!("{} trailing octets ignored", rest.len())).yellow());
            }
            table.set_header(vec!["Field", "Value"]);
            for (field, value) in action_fields(&body) {
                table.add_row(vec![field.to_string(), value]);
            }
        }
    }
    println!("{table}");
    Ok(())
}

fn action_fields(body: &ActionBody) -> Vec<(&'static str, String)> {
    let mut rows = vec![("action", body.name().to_string())];
    match body {
        ActionBody::AddbaRequest(req) => {
            rows.push(("dialog_token", req.dialog_token.to_string()));
            rows.push(("tid", req.params.tid.to_string()));
            rows.push(("buffer_size", req.params.buffer_size.to_string()));
            rows.push(("amsdu_supported", req.params.amsdu_supported.to_string()));
            rows.push(("immediate_policy", req.params.immediate_policy.to_string()));
            rows.push(("timeout_tu", req.timeout_tu.to_string()));
            rows.push(("starting_seq", req.starting_seq.to_string()));
        }
        ActionBody::AddbaResponse(resp) => {
            rows.push(("dialog_token", resp.dialog_token.to_string()));
            rows.push(("status", resp.status.to_string()));
            rows.push(("tid", resp.params.tid.to_string()));
            rows.push(("buffer_size", resp.params.buffer_size.to_string()));
            rows.push(("timeout_tu", resp.timeout_tu.to_string()));
        }
        ActionBody::Delba(delba) => {
            rows.push(("initiator", delba.initiator.to_string()));
            rows.push(("tid", delba.tid.to_string()));
            rows.push(("reason", delba.reason.to_string()));
        }
        ActionBody::Unknown { .. } => {}
    }
    rows
}

struct Simulation {
    frames: usize,
    reverse: usize,
    len: usize,
    latency: Duration,
    step: Duration,
}

fn cmd_simulate(
    cfg: AggConfig,
    sim: Simulation,
    format: OutputFormat,
    metrics: bool,
) -> Result<()> {
    let a_addr = cfg.address.unwrap_or_else(|| MacAddress::local(1));
    let b_addr =
        if a_addr == MacAddress::local(2) { MacAddress::local(1) } else { MacAddress::local(2) };
    let prometheus = Arc::new(PrometheusStats::new()?);
    let a_stats: Arc<dyn StatsSink> = prometheus.clone();
    let a = LinkLayer::new(a_addr, cfg.clone(), a_stats)?;
    let b = LinkLayer::new(b_addr, cfg, Arc::new(NoopStats))?;
    let mut link = LoopbackLink::new(a, b, sim.latency);

    info!(
        frames = sim.frames,
        reverse = sim.reverse,
        len = sim.len,
        "starting loopback simulation"
    );
    for _ in 0..sim.frames {
        link.send(Node::A, DataUnit::zeroed(DataHeader::new(b_addr, a_addr), sim.len))?;
    }
    for _ in 0..sim.reverse {
        link.send(Node::B, DataUnit::zeroed(DataHeader::new(a_addr, b_addr), sim.len))?;
    }
    let steps = link.run_until_idle(sim.step, 1_000_000)?;

    let report = summarize(&link, steps);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }
    if metrics {
        println!("{}", prometheus.render()?);
    }
    if report.b.delivered != sim.frames || report.a.delivered != sim.reverse {
        bail!(
            "delivery mismatch: B got {} of {}, A got {} of {}",
            report.b.delivered,
            sim.frames,
            report.a.delivered,
            sim.reverse
        );
    }
    Ok(())
}

fn summarize(link: &LoopbackLink, steps: usize) -> SimulationReport {
    let mut actions = 0;
    let mut units = 0;
    let mut aggregates = 0;
    let mut blocks = 0;
    let mut largest_block = 0;
    for record in link.log() {
        match record.kind {
            TxKind::Action(_) => actions += 1,
            TxKind::Data(FrameKind::Aggregate) => aggregates += 1,
            TxKind::Data(FrameKind::Block) => {
                blocks += 1;
                largest_block = largest_block.max(record.entries);
            }
            TxKind::Data(_) => units += 1,
        }
    }
    SimulationReport {
        elapsed_us: link.now().as_micros(),
        steps,
        actions,
        units,
        aggregates,
        blocks,
        largest_block,
        a: node_report(link, Node::A),
        b: node_report(link, Node::B),
    }
}

fn node_report(link: &LoopbackLink, node: Node) -> NodeReport {
    let layer = link.node(node);
    let (opened, timeouts) = layer
        .sessions()
        .records()
        .fold((0, 0), |(o, t), (_, rec)| (o + rec.sessions_opened, t + rec.timeouts));
    NodeReport {
        address: layer.address().to_string(),
        delivered: link.delivered(node).len(),
        link: layer.counters().clone(),
        queue: layer.queue().counters().clone(),
        sessions_opened: opened,
        session_timeouts: timeouts,
    }
}

fn print_report(report: &SimulationReport) {
    println!("{}", style("Simulation Results:").bold().green());
    let mut channel = Table::new();
    channel.load_preset(UTF8_FULL);
    channel.set_header(vec!["Metric", "Value"]);
    channel.add_row(vec!["Simulated time".to_string(), format!("{} µs", report.elapsed_us)]);
    channel.add_row(vec!["Steps".to_string(), report.steps.to_string()]);
    channel.add_row(vec!["Action frames".to_string(), report.actions.to_string()]);
    channel.add_row(vec!["Single units".to_string(), report.units.to_string()]);
    channel.add_row(vec!["A-MSDUs".to_string(), report.aggregates.to_string()]);
    channel.add_row(vec!["Blocks".to_string(), report.blocks.to_string()]);
    channel.add_row(vec!["Largest block".to_string(), report.largest_block.to_string()]);
    println!("{channel}");

    let mut nodes = Table::new();
    nodes.load_preset(UTF8_FULL);
    nodes.set_header(vec![
        "Node",
        "Delivered",
        "Data sent",
        "Blocks sent",
        "Bytes sent",
        "Dropped",
        "Sessions",
        "Timeouts",
    ]);

    for (name, node) in [("A", &report.a), ("B", &report.b)] {
        nodes.add_row(vec![
            format!("{name} ({})", node.address),
            node.delivered.to_string(),
            node.link.data_sent.to_string(),
            node.link.blocks_sent.to_string(),
            Byte::from_u64(node.link.bytes_sent).get_appropriate_unit(UnitType::Binary).to_string(),
            node.queue.dropped.iter().sum::<u64>().to_string(),
            node.sessions_opened.to_string(),
            node.session_timeouts.to_string(),
        ]);
    }
    println!("{nodes}");
}
