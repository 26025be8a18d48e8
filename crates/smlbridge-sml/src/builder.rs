//! SML file encoder.
//!
//! Produces transport-framed SML files with open, get-list and close
//! responses, enough to replay meter readings or build test fixtures.

use smlbridge_core::{MeasurementRecord, RecordValue};

use crate::crc::crc16;
use crate::message::{CLOSE_RESPONSE, GET_LIST_RESPONSE, OPEN_RESPONSE};
use crate::tlv::{encode, Element};
use crate::transport::encode_frame;

/// Builder for one SML file (one transport frame).
#[derive(Debug, Clone)]
pub struct SmlFileBuilder {
    server_id: Vec<u8>,
    bodies: Vec<(u64, Element)>,
}

impl SmlFileBuilder {
    /// Start a file for the given meter server id.
    pub fn new(server_id: impl Into<Vec<u8>>) -> Self {
        Self {
            server_id: server_id.into(),
            bodies: Vec::new(),
        }
    }

    /// Add an open response.
    pub fn open_response(mut self) -> Self {
        let body = Element::List(vec![
            Element::Absent,
            Element::Absent,
            Element::OctetString(b"smlbridge".to_vec()),
            Element::OctetString(self.server_id.clone()),
            Element::Absent,
            Element::Absent,
        ]);
        self.bodies.push((OPEN_RESPONSE, body));
        self
    }

    /// Add a get-list response carrying the given records.
    pub fn get_list_response(mut self, records: &[MeasurementRecord]) -> Self {
        let entries = records.iter().map(entry_element).collect();
        let body = Element::List(vec![
            Element::Absent,
            Element::OctetString(self.server_id.clone()),
            Element::Absent,
            Element::Absent,
            Element::List(entries),
            Element::Absent,
            Element::Absent,
        ]);
        self.bodies.push((GET_LIST_RESPONSE, body));
        self
    }

    /// Add a close response.
    pub fn close_response(mut self) -> Self {
        self.bodies
            .push((CLOSE_RESPONSE, Element::List(vec![Element::Absent])));
        self
    }

    /// Encoded messages without transport framing.
    pub fn build_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (transaction, (tag, body)) in self.bodies.iter().enumerate() {
            encode_message(transaction as u8, *tag, body, &mut out);
        }
        out
    }

    /// Complete transport frame.
    pub fn build(&self) -> Vec<u8> {
        encode_frame(&self.build_payload())
    }
}

fn encode_message(transaction: u8, tag: u64, body: &Element, out: &mut Vec<u8>) {
    let start = out.len();
    // list of 6 with the checksum and end marker appended by hand
    out.push(0x76);
    encode(&Element::OctetString(vec![transaction]), out);
    encode(&Element::Uint(0), out);
    encode(&Element::Uint(0), out);
    encode(
        &Element::List(vec![Element::Uint(tag), body.clone()]),
        out,
    );

    let crc = crc16(&out[start..]);
    // checksums are always sent as two-byte unsigned
    out.push(0x63);
    out.extend_from_slice(&crc.to_be_bytes());
    out.push(0x00);
}

fn entry_element(record: &MeasurementRecord) -> Element {
    let value = match &record.value {
        RecordValue::Bool(b) => Element::Bool(*b),
        RecordValue::Int(v) => Element::Int(*v),
        RecordValue::Uint(v) => Element::Uint(*v),
        RecordValue::Bytes(bytes) => Element::OctetString(bytes.clone()),
    };
    Element::List(vec![
        Element::OctetString(record.obis.as_bytes().to_vec()),
        record.status.map_or(Element::Absent, Element::Uint),
        Element::Absent,
        record
            .unit
            .map_or(Element::Absent, |u| Element::Uint(u64::from(u))),
        record
            .scaler
            .map_or(Element::Absent, |s| Element::Int(i64::from(s))),
        value,
        Element::Absent,
    ])
}
