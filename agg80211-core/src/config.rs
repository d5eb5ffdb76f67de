#![forbid(unsafe_code)]

//! agg80211 configuration handling. Parses a TOML file into a strongly-typed structure and supports
//! hot-reloading via the `notify` crate. Every section is optional; missing keys take the defaults
//! documented on each field.

use serde::Deserialize;
use std::{fs, path::Path, sync::Arc};
use tokio::sync::watch;
use notify::{RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher, Event, EventKind};
use tracing::{debug, warn};

use crate::{CoreError, MacAddress};

/// Upper bound on `block_ack.max_block`; a block-ack bitmap never covers more.
pub const MAX_BLOCK_LIMIT: usize = 1024;

/// Primary configuration structure shared by the engine, the CLI and the tests.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggConfig {
    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,

    /// Own MAC address. Used as transmitter address of generated management frames.
    pub address: Option<MacAddress>,

    pub aggregation: AggregationConfig,
    pub queue: QueueConfig,
    pub block_ack: BlockAckConfig,
}

/// A-MSDU aggregation settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    pub enabled: bool,
    /// Aggregate size ceiling in octets. A unit is merged only while the
    /// aggregate stays strictly below this length.
    pub max_aggregate_len: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { enabled: true, max_aggregate_len: 7000 }
    }
}

/// Transmit queue settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Per-category entry capacity. `0` disables the bound.
    pub frame_capacity: usize,
    /// Use one queue per access category. When off every data unit goes to best effort.
    pub edca: bool,
    /// Largest MSDU accepted from upper layers (no fragmentation support).
    pub max_msdu_len: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { frame_capacity: 0, edca: true, max_msdu_len: 2312 }
    }
}

/// Block-ack negotiation and MPDU-A construction settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlockAckConfig {
    pub enabled: bool,
    /// Minimum free leaf frames towards a peer before a block is built.
    pub min_block: usize,
    /// Maximum entries in one MPDU-A block.
    pub max_block: usize,
    /// Free leaf frames towards a peer that trigger an automatic ADDBA request.
    pub auto_threshold: usize,
    pub block_ack_timeout_ms: u64,
    pub addba_failure_timeout_ms: u64,
    pub reset_block_timeout_ms: u64,
    /// Reorder buffer size advertised in ADDBA requests.
    pub buffer_size: u16,
    /// Negotiate with every unicast peer, not only the allow list.
    pub allow_all: bool,
    pub allow_list: Vec<String>,
    /// Reset the sent-byte counter and restart the session timer whenever a
    /// block has been handed to the MAC.
    pub reset_after_send: bool,
}

impl Default for BlockAckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_block: 3,
            max_block: 100,
            auto_threshold: 3,
            block_ack_timeout_ms: 100,
            addba_failure_timeout_ms: 10,
            reset_block_timeout_ms: 100,
            buffer_size: 64,
            allow_all: false,
            allow_list: Vec::new(),
            reset_after_send: true,
        }
    }
}

impl BlockAckConfig {
    /// Parsed allow list. Fails on the first malformed entry.
    pub fn allowed_peers(&self) -> crate::CoreResult<Vec<MacAddress>> {
        self.allow_list.iter().map(|s| s.parse()).collect()
    }
}

impl Default for AggConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            address: None,
            aggregation: AggregationConfig::default(),
            queue: QueueConfig::default(),
            block_ack: BlockAckConfig::default(),
        }
    }
}

impl AggConfig {
    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::CoreResult<Self> {
        let data = fs::read_to_string(&path).map_err(CoreError::from)?;
        Self::from_toml_str(&data)
    }

    /// Load config alias version
    pub fn load<P: AsRef<Path>>(path: P) -> crate::CoreResult<Self> {
        Self::from_file(path)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(data: &str) -> crate::CoreResult<Self> {
        let cfg = toml::from_str::<AggConfig>(data).map_err(CoreError::ConfigParse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> crate::CoreResult<()> {
        let ba = &self.block_ack;
        if ba.min_block == 0 {
            return Err(CoreError::InvalidConfig("block_ack.min_block must be at least 1".into()));
        }
        if ba.min_block > ba.max_block {
            return Err(CoreError::InvalidConfig(format!(
                "block_ack.min_block ({}) exceeds block_ack.max_block ({})",
                ba.min_block, ba.max_block
            )));
        }
        if ba.max_block > MAX_BLOCK_LIMIT {
            return Err(CoreError::InvalidConfig(format!(
                "block_ack.max_block ({}) exceeds {MAX_BLOCK_LIMIT}",
                ba.max_block
            )));
        }
        if self.aggregation.max_aggregate_len == 0 {
            return Err(CoreError::InvalidConfig(
                "aggregation.max_aggregate_len must be non-zero".into(),
            ));
        }
        if ba.buffer_size > 0x3FF {
            return Err(CoreError::InvalidConfig(format!(
                "block_ack.buffer_size ({}) does not fit 10 bits",
                ba.buffer_size
            )));
        }
        ba.allowed_peers()?;
        Ok(())
    }

    /// Watch the configuration file for changes and receive updates through a watch channel.
    ///
    /// Returns the initial configuration and a [`watch::Receiver`] that yields a new [`AggConfig`]
    /// wrapped in [`Arc`] every time the file is modified on disk and still validates.
    pub fn watch_file<P: AsRef<Path>>(
        path: P,
    ) -> crate::CoreResult<(Arc<AggConfig>, watch::Receiver<Arc<AggConfig>>)> {
        let path_buf = path.as_ref().to_path_buf();
        let initial_cfg = Arc::new(Self::from_file(&path_buf)?);
        let path_in_closure = path_buf.clone();
        let (tx, rx) = watch::channel::<Arc<AggConfig>>(initial_cfg.clone());

        let on_event = move |res: NotifyResult<Event>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_)) {
                    match Self::from_file(&path_in_closure) {
                        Ok(updated) => {
                            debug!(path = %path_in_closure.display(), "configuration reloaded");
                            let _ = tx.send(Arc::new(updated));
                        }
                        Err(e) => warn!(
                            path = %path_in_closure.display(),
                            error = %e,
                            "ignoring invalid configuration update"
                        ),
                    }
                }
            }
        };
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(on_event)?;

        watcher.watch(&path_buf, RecursiveMode::NonRecursive)?;
        // The watcher must outlive every receiver; it lives for the rest of the process.
        std::mem::forget(watcher);

        Ok((initial_cfg, rx))
    }
}
