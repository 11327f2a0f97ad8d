#![allow(dead_code)]
use std::sync::Mutex;

use ccsds_tc::aggregator::{AdapterError, Apid, EntityId, OutputAdapter};
use ccsds_tc::frame::{Scid, Vcid};
use ccsds_tc::pdu::{Pdu, PduHeader, PduType};

/// File data PDU from `src` to `dest` carrying `body`.
pub fn file_data_pdu(src: EntityId, dest: EntityId, seq: u64, body: &[u8]) -> Pdu {
    let hdr = PduHeader::builder()
        .pdu_type(PduType::FileData)
        .crc_flag(true)
        .entity_id_len(2)
        .sequence_number_len(4)
        .source_entity(src)
        .sequence_number(seq)
        .dest_entity(dest)
        .build();
    Pdu::new(hdr, body).expect("failed to build pdu")
}

#[derive(Debug, Default)]
pub struct RecordingAdapter {
    pub sent: Mutex<Vec<(Vec<u8>, Vcid, Scid, Apid)>>,
}

impl RecordingAdapter {
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(p, ..)| p.clone())
            .collect()
    }
}

impl OutputAdapter for RecordingAdapter {
    fn send(&self, pdu: &[u8], vcid: Vcid, scid: Scid, apid: Apid) -> Result<(), AdapterError> {
        self.sent
            .lock()
            .unwrap()
            .push((pdu.to_vec(), vcid, scid, apid));
        Ok(())
    }
}
