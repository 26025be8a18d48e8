//! SML message interpretation.
//!
//! A frame payload is a sequence of messages:
//!
//! ```text
//! SML_Message   (list of 6)
//! ├─ transactionId   octet string
//! ├─ groupNo         unsigned
//! ├─ abortOnError    unsigned
//! ├─ messageBody     list of 2: [tag, body]
//! ├─ crc16           unsigned
//! └─ endOfSmlMsg     0x00
//! ```
//!
//! Only `GetListResponse` bodies carry readings; every other body is
//! skipped.

use smlbridge_core::{DecodeError, MeasurementRecord, ObisCode, RecordValue};

use crate::tlv::{Element, Parser};

pub const OPEN_RESPONSE: u64 = 0x0101;
pub const CLOSE_RESPONSE: u64 = 0x0201;
pub const GET_LIST_RESPONSE: u64 = 0x0701;

const MESSAGE_FIELDS: usize = 6;
const GET_LIST_RESPONSE_FIELDS: usize = 7;
const LIST_ENTRY_FIELDS: usize = 7;

/// Decode every record in one frame payload, in message and list order.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<MeasurementRecord>, DecodeError> {
    let mut parser = Parser::new(payload);
    let mut records = Vec::new();

    while !parser.is_empty() {
        let start = parser.position();
        match parser.parse()? {
            // stray end markers between messages
            Element::EndOfMessage => continue,
            Element::List(fields) => decode_message(start, &fields, &mut records)?,
            other => {
                return Err(DecodeError::malformed(
                    start,
                    format!("expected message list, found {other:?}"),
                ))
            }
        }
    }

    Ok(records)
}

fn decode_message(
    offset: usize,
    fields: &[Element],
    records: &mut Vec<MeasurementRecord>,
) -> Result<(), DecodeError> {
    if fields.len() != MESSAGE_FIELDS || fields[5] != Element::EndOfMessage {
        return Err(DecodeError::malformed(offset, "message is not a 6-field list"));
    }

    let body = fields[3]
        .as_list()
        .filter(|b| b.len() == 2)
        .ok_or_else(|| DecodeError::malformed(offset, "message body is not a [tag, body] list"))?;
    let tag = body[0]
        .as_uint()
        .ok_or_else(|| DecodeError::malformed(offset, "message body tag is not unsigned"))?;

    if tag != GET_LIST_RESPONSE {
        tracing::trace!("Skipping message body {:#06x}", tag);
        return Ok(());
    }

    let response = body[1]
        .as_list()
        .filter(|r| r.len() == GET_LIST_RESPONSE_FIELDS)
        .ok_or_else(|| DecodeError::malformed(offset, "GetListResponse is not a 7-field list"))?;
    let entries = response[4]
        .as_list()
        .ok_or_else(|| DecodeError::malformed(offset, "GetListResponse valList is not a list"))?;

    for entry in entries {
        if let Some(record) = decode_entry(offset, entry)? {
            records.push(record);
        }
    }
    Ok(())
}

fn decode_entry(offset: usize, entry: &Element) -> Result<Option<MeasurementRecord>, DecodeError> {
    let fields = entry
        .as_list()
        .filter(|f| f.len() == LIST_ENTRY_FIELDS)
        .ok_or_else(|| DecodeError::malformed(offset, "list entry is not a 7-field list"))?;

    let obis = match &fields[0] {
        Element::OctetString(bytes) => ObisCode::from(bytes.as_slice()),
        other => {
            return Err(DecodeError::malformed(
                offset,
                format!("list entry objName is {other:?}"),
            ))
        }
    };

    let value = match &fields[5] {
        Element::Bool(b) => RecordValue::Bool(*b),
        Element::Int(v) => RecordValue::Int(*v),
        Element::Uint(v) => RecordValue::Uint(*v),
        Element::OctetString(bytes) => RecordValue::Bytes(bytes.clone()),
        other => {
            tracing::debug!("Skipping {} with value {:?}", obis.object_name(), other);
            return Ok(None);
        }
    };

    let status = optional(&fields[1], offset, "status", |e| e.as_uint())?;
    let unit = optional(&fields[3], offset, "unit", |e| {
        e.as_uint().and_then(|u| u8::try_from(u).ok())
    })?;
    let scaler = optional(&fields[4], offset, "scaler", |e| match e {
        Element::Int(v) => i8::try_from(*v).ok(),
        _ => None,
    })?;

    Ok(Some(MeasurementRecord {
        obis,
        status,
        unit,
        scaler,
        value,
    }))
}

fn optional<T>(
    element: &Element,
    offset: usize,
    name: &str,
    convert: impl Fn(&Element) -> Option<T>,
) -> Result<Option<T>, DecodeError> {
    if element.is_absent() {
        return Ok(None);
    }
    convert(element)
        .map(Some)
        .ok_or_else(|| DecodeError::malformed(offset, format!("invalid list entry {name}: {element:?}")))
}
