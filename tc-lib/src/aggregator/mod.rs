//! Timer driven batching of CFDP PDUs per (entity, virtual channel).
//!
//! PDUs handed to a [PduAggregator] are buffered per `(entity, vcid)` pair until
//! either the periodic flush timer fires or adding a PDU would reach the entity's
//! maximum payload size. A flush concatenates each pair's buffered PDUs, in the
//! order they were received, and sends the result to the [OutputAdapter]
//! registered for the entity.
//!
//! # Example
//! ```
//! use std::sync::{Arc, Mutex};
//! use ccsds_tc::aggregator::{
//!     AdapterError, AdapterRegistry, AggregatorConfig, OutputAdapter, PduAggregator,
//! };
//! use ccsds_tc::frame::{Scid, Vcid};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<Vec<u8>>>);
//!
//! impl OutputAdapter for Collect {
//!     fn send(&self, pdu: &[u8], _: Vcid, _: Scid, _: u16) -> Result<(), AdapterError> {
//!         self.0.lock().unwrap().push(pdu.to_vec());
//!         Ok(())
//!     }
//! }
//!
//! let sink = Arc::new(Collect::default());
//! let registry = Arc::new(AdapterRegistry::new());
//! registry.put(5, sink.clone());
//!
//! let aggregator = PduAggregator::new(AggregatorConfig::default(), registry);
//! aggregator.start_service();
//! aggregator.aggregate_pdus(5, vec![1, 2], 2);
//! aggregator.aggregate_pdus(5, vec![3], 2);
//! aggregator.stop_service();
//!
//! assert_eq!(*sink.0.lock().unwrap(), vec![vec![1, 2, 3]]);
//! ```
mod adapter;
mod config;
mod service;
mod timer;

pub use adapter::{AdapterError, AdapterRegistry, Apid, OutputAdapter};
pub use config::{AggregatorConfig, EntityConfig};
pub use service::{AckStatus, AggregateAck, PduAggregator};

/// CFDP entity identifier.
pub type EntityId = u64;
