//! SML type-length-value elements.
//!
//! Each element starts with one or more TL bytes:
//!
//! ```text
//! bit 7     more TL bytes follow
//! bits 6-4  type: 000 octet string, 100 bool, 101 int, 110 uint, 111 list
//! bits 3-0  length nibble (continued by following TL bytes)
//! ```
//!
//! For scalars the length counts the TL bytes as well as the data; for
//! lists it is the number of child elements. `0x00` ends a message and
//! `0x01` marks an absent optional field.

use smlbridge_core::DecodeError;

const TYPE_OCTET_STRING: u8 = 0b000;
const TYPE_BOOL: u8 = 0b100;
const TYPE_INT: u8 = 0b101;
const TYPE_UINT: u8 = 0b110;
const TYPE_LIST: u8 = 0b111;

const MAX_DEPTH: usize = 16;
const MAX_TL_BYTES: usize = 4;

/// Decoded SML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    EndOfMessage,
    Absent,
    OctetString(Vec<u8>),
    Bool(bool),
    Int(i64),
    Uint(u64),
    List(Vec<Element>),
}

impl Element {
    pub fn as_list(&self) -> Option<&[Element]> {
        match self {
            Element::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Element::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Element::Absent)
    }
}

/// Element parser over one frame payload.
pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Parse the next element.
    pub fn parse(&mut self) -> Result<Element, DecodeError> {
        self.parse_at_depth(0)
    }

    fn parse_at_depth(&mut self, depth: usize) -> Result<Element, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::malformed(self.pos, "lists nested too deeply"));
        }

        let start = self.pos;
        let first = self.byte()?;
        match first {
            0x00 => return Ok(Element::EndOfMessage),
            0x01 => return Ok(Element::Absent),
            _ => {}
        }

        let ty = (first >> 4) & 0x07;
        let mut len = usize::from(first & 0x0f);
        let mut tl_bytes = 1;
        let mut more = first & 0x80 != 0;
        while more {
            let b = self.byte()?;
            if b & 0x70 != 0 {
                return Err(DecodeError::malformed(self.pos - 1, "invalid TL continuation byte"));
            }
            tl_bytes += 1;
            if tl_bytes > MAX_TL_BYTES {
                return Err(DecodeError::malformed(start, "TL field too long"));
            }
            len = (len << 4) | usize::from(b & 0x0f);
            more = b & 0x80 != 0;
        }

        if ty == TYPE_LIST {
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                items.push(self.parse_at_depth(depth + 1)?);
            }
            return Ok(Element::List(items));
        }

        let data_len = len
            .checked_sub(tl_bytes)
            .ok_or_else(|| DecodeError::malformed(start, format!("length {len} shorter than TL field")))?;
        let data = self.take(data_len)?;

        match ty {
            TYPE_OCTET_STRING => Ok(Element::OctetString(data.to_vec())),
            TYPE_BOOL => match data {
                [b] => Ok(Element::Bool(*b != 0)),
                _ => Err(DecodeError::malformed(start, "boolean must be one byte")),
            },
            TYPE_INT => {
                check_int_len(start, data)?;
                // sign-extend from the first data byte
                let init: i64 = if data[0] & 0x80 != 0 { -1 } else { 0 };
                Ok(Element::Int(
                    data.iter().fold(init, |acc, &b| (acc << 8) | i64::from(b)),
                ))
            }
            TYPE_UINT => {
                check_int_len(start, data)?;
                Ok(Element::Uint(
                    data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                ))
            }
            other => Err(DecodeError::malformed(start, format!("unknown type {other:#05b}"))),
        }
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| DecodeError::malformed(self.pos, "unexpected end of frame"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| DecodeError::malformed(self.pos, format!("{n} data bytes past end of frame")))?;
        let data = &self.buf[self.pos..end];
        self.pos = end;
        Ok(data)
    }
}

fn check_int_len(offset: usize, data: &[u8]) -> Result<(), DecodeError> {
    if data.is_empty() || data.len() > 8 {
        return Err(DecodeError::malformed(
            offset,
            format!("integer of {} bytes", data.len()),
        ));
    }
    Ok(())
}

/// Append the TL bytes for an element.
///
/// `len` is the data length for scalars and the item count for lists.
fn encode_tl(ty: u8, len: usize, out: &mut Vec<u8>) {
    let scalar = ty != TYPE_LIST;
    let mut n = 1;
    loop {
        let total = if scalar { len + n } else { len };
        if total < 1 << (4 * n) {
            for i in 0..n {
                let nibble = ((total >> (4 * (n - 1 - i))) & 0x0f) as u8;
                let more = if i + 1 < n { 0x80 } else { 0 };
                let ty_bits = if i == 0 { ty << 4 } else { 0 };
                out.push(more | ty_bits | nibble);
            }
            return;
        }
        n += 1;
    }
}

/// Append an encoded element.
pub fn encode(element: &Element, out: &mut Vec<u8>) {
    match element {
        Element::EndOfMessage => out.push(0x00),
        Element::Absent => out.push(0x01),
        Element::OctetString(bytes) => {
            encode_tl(TYPE_OCTET_STRING, bytes.len(), out);
            out.extend_from_slice(bytes);
        }
        Element::Bool(b) => {
            encode_tl(TYPE_BOOL, 1, out);
            out.push(u8::from(*b));
        }
        Element::Int(v) => {
            let width = int_width(*v);
            encode_tl(TYPE_INT, width, out);
            out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
        }
        Element::Uint(v) => {
            let width = uint_width(*v);
            encode_tl(TYPE_UINT, width, out);
            out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
        }
        Element::List(items) => {
            encode_tl(TYPE_LIST, items.len(), out);
            for item in items {
                encode(item, out);
            }
        }
    }
}

fn int_width(v: i64) -> usize {
    match v {
        -0x80..=0x7f => 1,
        -0x8000..=0x7fff => 2,
        -0x8000_0000..=0x7fff_ffff => 4,
        _ => 8,
    }
}

fn uint_width(v: u64) -> usize {
    match v {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xffff_ffff => 4,
        _ => 8,
    }
}
