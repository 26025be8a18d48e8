//! Tests for decoding complete SML files

use std::io::{BufReader, Write};

use smlbridge_core::{DecodeError, MeasurementRecord, ObisCode, RecordSource, RecordValue};
use smlbridge_sml::{SmlFileBuilder, SmlReader};

const SERVER_ID: &[u8] = &[0x0a, 0x01, 0x45, 0x4d, 0x48, 0x00, 0x00, 0x7a, 0xc7, 0x2b];

fn energy(value: u64) -> MeasurementRecord {
    MeasurementRecord::new(ObisCode::from([1, 0, 1, 8, 0, 255]), RecordValue::Uint(value))
        .with_status(0x0001_0182)
        .with_unit(30)
        .with_scaler(-1)
}

fn power(value: i64) -> MeasurementRecord {
    MeasurementRecord::new(ObisCode::from([1, 0, 16, 7, 0, 255]), RecordValue::Int(value))
        .with_unit(27)
        .with_scaler(0)
}

fn manufacturer() -> MeasurementRecord {
    MeasurementRecord::new(
        ObisCode::from([129, 129, 199, 130, 3, 255]),
        RecordValue::Bytes(b"EMH".to_vec()),
    )
}

fn meter_file(records: &[MeasurementRecord]) -> Vec<u8> {
    SmlFileBuilder::new(SERVER_ID)
        .open_response()
        .get_list_response(records)
        .close_response()
        .build()
}

fn read_all<S: RecordSource>(source: &mut S) -> (Vec<MeasurementRecord>, Option<DecodeError>) {
    let mut records = Vec::new();
    loop {
        match source.next_record() {
            Ok(Some(record)) => records.push(record),
            Ok(None) => return (records, None),
            Err(e) => return (records, Some(e)),
        }
    }
}

#[test]
fn test_decode_single_file() {
    let expected = vec![manufacturer(), energy(1_234_567), power(-421)];
    let bytes = meter_file(&expected);

    let mut reader = SmlReader::new(bytes.as_slice());
    let (records, err) = read_all(&mut reader);

    assert!(err.is_none());
    assert_eq!(records, expected);
    assert_eq!(reader.frames_read(), 1);
    assert_eq!(reader.offset(), bytes.len());

    assert!((records[1].as_f64().unwrap() - 123_456.7).abs() < 1e-6);
    assert_eq!(records[2].as_f64().unwrap(), -421.0);
    assert!(records[0].as_f64().is_err());
}

#[test]
fn test_decode_consecutive_files_in_order() {
    let mut bytes = meter_file(&[energy(10)]);
    bytes.extend(meter_file(&[energy(11), power(5)]));
    bytes.extend(meter_file(&[]));

    let mut reader = SmlReader::new(bytes.as_slice());
    let (records, err) = read_all(&mut reader);

    assert!(err.is_none());
    assert_eq!(records, vec![energy(10), energy(11), power(5)]);
    assert_eq!(reader.frames_read(), 3);
}

#[test]
fn test_corrupt_frame_yields_no_records() {
    let mut bytes = meter_file(&[energy(10)]);
    let mut corrupt = meter_file(&[energy(11), power(5)]);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x5a;
    bytes.extend(corrupt);
    bytes.extend(meter_file(&[energy(12)]));

    let mut reader = SmlReader::new(bytes.as_slice());
    let (records, err) = read_all(&mut reader);

    assert_eq!(records, vec![energy(10)]);
    assert!(matches!(err, Some(DecodeError::Checksum { .. })));
}

#[test]
fn test_truncated_file() {
    let bytes = meter_file(&[energy(10)]);
    let mut reader = SmlReader::new(&bytes[..bytes.len() - 8]);
    let (records, err) = read_all(&mut reader);

    assert!(records.is_empty());
    assert!(matches!(err, Some(DecodeError::Truncated(_))));
}

#[test]
fn test_structurally_invalid_payload() {
    // a valid frame whose payload is a bare unsigned instead of a message
    let bytes = smlbridge_sml::transport::encode_frame(&[0x62, 0x01]);
    let mut reader = SmlReader::new(bytes.as_slice());
    let (_, err) = read_all(&mut reader);
    assert!(matches!(err, Some(DecodeError::Malformed { .. })));
}

#[test]
fn test_decode_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&meter_file(&[energy(42)])).unwrap();
    file.flush().unwrap();

    let reader = BufReader::new(std::fs::File::open(file.path()).unwrap());
    let mut reader = SmlReader::new(reader);
    let (records, err) = read_all(&mut reader);

    assert!(err.is_none());
    assert_eq!(records, vec![energy(42)]);
}
