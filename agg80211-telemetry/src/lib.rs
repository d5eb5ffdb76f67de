#![forbid(unsafe_code)]

//! Telemetry for the agg80211 engine.
//!
//! [`PrometheusStats`] implements the engine's [`StatsSink`] on top of a
//! private Prometheus registry and renders it in the text exposition format.
//! [`init_tracing`] installs the process-wide `tracing` subscriber.

use agg80211_core::{AccessCategory, MacAddress, StatsSink};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const NAMESPACE: &str = "agg80211";

/// Session states exported as one gauge series each.
const SESSION_STATES: [&str; 4] = ["DEFAULT", "WAIT_CONFIRMATION", "WAITBLOCK", "SENDBLOCK"];

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics text is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("tracing subscriber: {0}")]
    Subscriber(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Prometheus backed statistics sink.
///
/// Each sink owns its registry so several links can run in one process
/// without clashing on metric names.
pub struct PrometheusStats {
    registry: Registry,
    queue_len: IntGauge,
    enqueued: IntCounterVec,
    dequeued: IntCounterVec,
    dropped: IntCounterVec,
    merged: IntCounterVec,
    blocks: IntCounterVec,
    block_entries: Histogram,
    mgmt_dropped: IntCounter,
    sessions: IntGaugeVec,
    transitions: IntCounterVec,
    // last state reported per peer so the per-state gauge stays a head count
    last_state: std::sync::Mutex<std::collections::HashMap<MacAddress, &'static str>>,
}

impl PrometheusStats {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)?;

        let queue_len =
            IntGauge::new("data_queue_len", "Data entries queued across all categories")?;
        let enqueued = IntCounterVec::new(
            Opts::new("frames_enqueued_total", "Data frames admitted"),
            &["ac"],
        )?;
        let dequeued = IntCounterVec::new(
            Opts::new("frames_dequeued_total", "Data frames handed to the MAC"),
            &["ac"],
        )?;
        let dropped = IntCounterVec::new(
            Opts::new("frames_dropped_total", "Data frames rejected because the category was full"),
            &["ac"],
        )?;
        let merged = IntCounterVec::new(
            Opts::new("aggregate_merged_total", "Units absorbed into an A-MSDU"),
            &["ac"],
        )?;
        let blocks = IntCounterVec::new(
            Opts::new("blocks_built_total", "MPDU blocks assembled"),
            &["ac"],
        )?;
        let block_entries = Histogram::with_opts(
            HistogramOpts::new("block_entries", "Entries per assembled block")
                .buckets(vec![3.0, 8.0, 16.0, 32.0, 64.0, 100.0]),
        )?;
        let mgmt_dropped =
            IntCounter::new("mgmt_frames_dropped_total", "Unparseable management frames")?;
        let sessions = IntGaugeVec::new(
            Opts::new("sessions", "Block-ack sessions per state"),
            &["state"],
        )?;
        let transitions = IntCounterVec::new(
            Opts::new("session_transitions_total", "Block-ack session state changes"),
            &["state"],
        )?;

        registry.register(Box::new(queue_len.clone()))?;
        registry.register(Box::new(enqueued.clone()))?;
        registry.register(Box::new(dequeued.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(merged.clone()))?;
        registry.register(Box::new(blocks.clone()))?;
        registry.register(Box::new(block_entries.clone()))?;
        registry.register(Box::new(mgmt_dropped.clone()))?;
        registry.register(Box::new(sessions.clone()))?;
        registry.register(Box::new(transitions.clone()))?;

        for ac in AccessCategory::ALL {
            for vec in [&enqueued, &dequeued, &dropped, &merged, &blocks] {
                vec.with_label_values(&[ac.name()]);
            }
        }
        for state in SESSION_STATES {
            sessions.with_label_values(&[state]);
        }

        Ok(Self {
            registry,
            queue_len,
            enqueued,
            dequeued,
            dropped,
            merged,
            blocks,
            block_entries,
            mgmt_dropped,
            sessions,
            transitions,
            last_state: Default::default(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn dropped(&self, ac: AccessCategory) -> u64 {
        self.dropped.with_label_values(&[ac.name()]).get()
    }

    pub fn enqueued(&self, ac: AccessCategory) -> u64 {
        self.enqueued.with_label_values(&[ac.name()]).get()
    }

    pub fn blocks_built(&self) -> u64 {
        AccessCategory::ALL.iter().map(|ac| self.blocks.with_label_values(&[ac.name()]).get()).sum()
    }

    pub fn sessions_in(&self, state: &str) -> i64 {
        self.sessions.with_label_values(&[state]).get()
    }
}

impl StatsSink for PrometheusStats {
    fn data_queue_len(&self, len: usize) {
        self.queue_len.set(len as i64);
    }

    fn frame_enqueued(&self, ac: AccessCategory) {
        self.enqueued.with_label_values(&[ac.name()]).inc();
    }

    fn frame_dequeued(&self, ac: AccessCategory) {
        self.dequeued.with_label_values(&[ac.name()]).inc();
    }

    fn frame_dropped(&self, ac: AccessCategory) {
        self.dropped.with_label_values(&[ac.name()]).inc();
    }

    fn mgmt_frame_dropped(&self) {
        self.mgmt_dropped.inc();
    }

    fn aggregate_merged(&self, ac: AccessCategory) {
        self.merged.with_label_values(&[ac.name()]).inc();
    }

    fn block_built(&self, ac: AccessCategory, entries: usize) {
        self.blocks.with_label_values(&[ac.name()]).inc();
        self.block_entries.observe(entries as f64);
    }

    fn session_state(&self, peer: &MacAddress, state: &'static str) {
        let previous = match self.last_state.lock() {
            Ok(mut map) => map.insert(*peer, state),
            Err(poisoned) => poisoned.into_inner().insert(*peer, state),
        };
        if previous == Some(state) {
            return;
        }
        if let Some(prev) = previous {
            self.sessions.with_label_values(&[prev]).dec();
        }
        self.sessions.with_label_values(&[state]).inc();
        self.transitions.with_label_values(&[state]).inc();
        debug!(%peer, state, "session state exported");
    }
}

/// Install the global `tracing` subscriber.
///
/// Events go to stderr. `RUST_LOG` wins over `level` when set. Calling this
/// twice is an error.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
