use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use ccsds_tc::aggregator::{
    AdapterError, AdapterRegistry, AggregatorConfig, Apid, EntityId, OutputAdapter, PduAggregator,
};
use ccsds_tc::frame::{Scid, Vcid};
use ccsds_tc::pdu::PduParser;
use tracing::{info, warn};

/// Appends every aggregate payload to a file.
struct FileAdapter {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAdapter {
    fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening output {path:?}"))?;
        Ok(FileAdapter {
            path,
            file: Mutex::new(file),
        })
    }
}

impl OutputAdapter for FileAdapter {
    fn send(&self, pdu: &[u8], vcid: Vcid, scid: Scid, apid: Apid) -> Result<(), AdapterError> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| AdapterError::Uplink(format!("{:?} lock poisoned", self.path)))?;
        file.write_all(pdu)
            .map_err(|e| AdapterError::Uplink(format!("writing {:?}: {e}", self.path)))?;
        info!(vcid, scid, apid, len = pdu.len(), "appended to {:?}", self.path);
        Ok(())
    }
}

pub fn aggregate(
    srcpath: &Path,
    config_path: Option<&Path>,
    vcid: Vcid,
    outdir: &Path,
) -> Result<()> {
    let config = match config_path {
        Some(path) => AggregatorConfig::from_path(path)
            .with_context(|| format!("loading aggregator config {path:?}"))?,
        None => AggregatorConfig::default(),
    };
    if !outdir.is_dir() {
        bail!("{outdir:?} is not a directory");
    }
    let dat = fs::read(srcpath).context("reading input")?;
    let zult = PduParser::new().parse(&dat);
    if let Some(err) = &zult.error {
        warn!(
            num_pdus = zult.pdus.len(),
            "input contains undecodable data; using pdus before it: {err}"
        );
    }

    let registry = Arc::new(AdapterRegistry::new());
    let mut counts: HashMap<EntityId, usize> = HashMap::new();
    for pdu in &zult.pdus {
        let entity = pdu.header.dest_entity;
        if registry.get(entity).is_none() {
            let path = outdir.join(format!("entity-{entity}.dat"));
            registry.put(entity, Arc::new(FileAdapter::create(path)?));
        }
        *counts.entry(entity).or_default() += 1;
    }

    let aggregator = PduAggregator::new(config, registry);
    aggregator.start_service();
    for pdu in zult.pdus {
        let entity = pdu.header.dest_entity;
        let ack = aggregator.aggregate_pdus(entity, pdu.data, vcid);
        if !ack.is_ok() {
            bail!("aggregation failed ({}): {}", ack.status.code(), ack.message);
        }
    }
    aggregator.stop_service();

    let mut entities: Vec<_> = counts.into_iter().collect();
    entities.sort_unstable();
    for (entity, num_pdus) in entities {
        info!(entity, num_pdus, "aggregated");
    }
    Ok(())
}
