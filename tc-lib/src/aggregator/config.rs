use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{Apid, EntityId};
use crate::frame::{Scid, TcFrameHeader, Vcid};
use crate::{Error, Result};

/// Per-entity aggregation and downlink mapping.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityConfig {
    /// Largest aggregate payload in bytes.
    pub max_payload_size: usize,
    #[builder(default)]
    #[serde(default)]
    pub scid: Scid,
    #[builder(default)]
    #[serde(default)]
    pub apid: Apid,
    /// Virtual channel to send on. If unset, the channel the PDUs arrived on is used.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub vcid: Option<Vcid>,
}

/// Aggregator configuration.
///
/// Loads from JSON such as:
/// ```json
/// {
///   "flush_interval_secs": 5,
///   "default_max_payload": 1017,
///   "entities": {
///     "5": { "max_payload_size": 100, "scid": 42, "apid": 1, "vcid": 2 }
///   }
/// }
/// ```
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Periodic flush interval.
    #[builder(default = AggregatorConfig::FLUSH_INTERVAL_SECS)]
    pub flush_interval_secs: u64,
    /// Maximum payload for entities without their own configuration.
    #[builder(default = AggregatorConfig::DEFAULT_MAX_PAYLOAD)]
    pub default_max_payload: usize,
    #[builder(default)]
    pub entities: HashMap<EntityId, EntityConfig>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AggregatorConfig {
    pub const FLUSH_INTERVAL_SECS: u64 = 5;
    /// Data field of a maximum length TC frame with a FECF.
    pub const DEFAULT_MAX_PAYLOAD: usize = TcFrameHeader::MAX_FRAME_LEN - TcFrameHeader::LEN - 2;

    /// Load from JSON.
    ///
    /// # Errors
    /// [Error::Json] if the JSON is invalid, [Error::Config] if it fails validation.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let config: AggregatorConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be opened, otherwise see [Self::from_reader].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// # Errors
    /// [Error::Config] describing every invalid value.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.flush_interval_secs == 0 {
            problems.push("flush_interval_secs must be > 0".to_string());
        }
        if self.default_max_payload == 0 {
            problems.push("default_max_payload must be > 0".to_string());
        }
        let mut ids: Vec<&EntityId> = self.entities.keys().collect();
        ids.sort_unstable();
        for id in ids {
            let entity = &self.entities[id];
            if entity.max_payload_size == 0 {
                problems.push(format!("entity {id}: max_payload_size must be > 0"));
            }
            if entity.scid > TcFrameHeader::SCID_MAX {
                problems.push(format!("entity {id}: scid {} out of range", entity.scid));
            }
            if entity.vcid.is_some_and(|v| v > TcFrameHeader::VCID_MAX) {
                problems.push(format!("entity {id}: vcid out of range"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Configuration for `entity`, falling back to the default payload size with
    /// zero scid and apid for unknown entities.
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> EntityConfig {
        self.entities
            .get(&entity)
            .copied()
            .unwrap_or_else(|| EntityConfig::builder().max_payload_size(self.default_max_payload).build())
    }

    #[must_use]
    pub fn max_payload_for(&self, entity: EntityId) -> usize {
        self.entity(entity).max_payload_size
    }
}
