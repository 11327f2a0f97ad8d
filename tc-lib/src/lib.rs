//! CCSDS Telecommand uplink encoding and CFDP PDU aggregation.
//!
//! References:
//! * CCSDS TC Synchronization and Channel Coding 231.0-B-4
//!     - https://public.ccsds.org/Pubs/231x0b4e1.pdf
//! * CCSDS TC Space Data Link Protocol 232.0-B-4
//!     - https://public.ccsds.org/Pubs/232x0b4e1.pdf
//! * CCSDS File Delivery Protocol 727.0-B-5
//!     - https://public.ccsds.org/Pubs/727x0b5.pdf
mod error;

pub mod aggregator;
pub mod bch;
pub mod cltu;
pub mod frame;
pub mod pdu;
pub mod reverse;

pub use error::{Error, Result};
