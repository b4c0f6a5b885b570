//! Binary codec for the OSC 1.0 wire format.
//!
//! All multi-byte fields are big-endian and every field is 4-byte aligned.
//! [`parse`] and [`serialize`] are exact inverses for every constructible
//! [`Packet`]. The parser never panics on malformed input: every
//! out-of-bounds read is a checked, reported failure.

use crate::{Bundle, Message, Packet, TimeTag, Value};
use core::fmt;

/// The literal that opens every serialized bundle.
const BUNDLE_TAG: &str = "#bundle";

/// Errors reported by [`parse`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CodecError {
    /// The buffer ended in the middle of a field.
    Truncated,
    /// The type-tag string contained an unknown tag character.
    UnsupportedType(char),
    /// A message address was empty or did not start with `/`.
    InvalidAddress,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "packet truncated mid-field"),
            Self::UnsupportedType(c) => write!(f, "unsupported OSC type tag: {c:?}"),
            Self::InvalidAddress => write!(f, "OSC address must be non-empty and start with '/'"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Bounds-checked cursor over a packet buffer.
///
/// Bundle elements get their own reader over an isolated sub-slice, so a
/// malformed element can never read past its declared size or disturb
/// sibling parsing.
#[derive(Clone, Copy)]
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline(always)]
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline(always)]
    fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    #[inline(always)]
    fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Skips padding up to the next 4-byte boundary. Padding byte content is
    /// not checked, but the padding itself must be present.
    fn align(&mut self) -> Result<(), CodecError> {
        let pad = (4 - self.pos % 4) % 4;
        let end = self.pos + pad;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        self.pos = end;
        Ok(())
    }

    /// Reads a NUL-terminated, 4-byte-aligned OSC string.
    ///
    /// Invalid UTF-8 decodes lossily rather than failing; the parser must
    /// stay total over arbitrary datagram bytes.
    fn read_str(&mut self) -> Result<String, CodecError> {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Truncated)?;

        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        self.align()?;
        Ok(s)
    }

    /// Reads a length-prefixed, 4-byte-aligned OSC blob.
    fn read_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?.to_vec();
        self.align()?;
        Ok(bytes)
    }
}

/// Parses a raw buffer into an OSC [`Packet`].
pub fn parse(bytes: &[u8]) -> Result<Packet, CodecError> {
    parse_packet(&mut Reader::new(bytes))
}

fn parse_packet(reader: &mut Reader<'_>) -> Result<Packet, CodecError> {
    // Peek the leading string on a copy of the cursor; a failed peek must
    // not leave any partial consumption behind.
    let mut peek = *reader;
    let first = peek.read_str()?;

    if first == BUNDLE_TAG {
        parse_bundle(reader).map(Packet::Bundle)
    } else {
        parse_message(reader).map(Packet::Message)
    }
}

fn parse_bundle(reader: &mut Reader<'_>) -> Result<Bundle, CodecError> {
    reader.read_str()?; // consume "#bundle"
    let time_tag = TimeTag::from_raw(reader.read_u64()?);

    let mut elements = Vec::new();
    while reader.has_remaining() {
        let size = reader.read_u32()? as usize;
        // Isolate exactly `size` bytes so the element cannot read past its
        // declared frame.
        let mut element = Reader::new(reader.take(size)?);
        elements.push(parse_packet(&mut element)?);
    }

    Ok(Bundle::new(time_tag, elements))
}

fn parse_message(reader: &mut Reader<'_>) -> Result<Message, CodecError> {
    let address = reader.read_str()?;
    if !address.starts_with('/') {
        return Err(CodecError::InvalidAddress);
    }

    let mut args = Vec::new();
    if reader.has_remaining() {
        let mark = *reader;
        let tags = reader.read_str()?;

        if let Some(tags) = tags.strip_prefix(',') {
            for tag in tags.chars() {
                args.push(parse_value(reader, tag)?);
            }
        } else {
            // Not a type-tag string: restore the cursor, the message has no
            // arguments.
            *reader = mark;
        }
    }

    Message::new(address, args).map_err(|_| CodecError::InvalidAddress)
}

fn parse_value(reader: &mut Reader<'_>, tag: char) -> Result<Value, CodecError> {
    Ok(match tag {
        'i' => Value::Int(reader.read_u32()? as i32),
        'f' => Value::Float(f32::from_bits(reader.read_u32()?)),
        's' => Value::Str(reader.read_str()?),
        'b' => Value::Blob(reader.read_blob()?),
        'h' => Value::Long(reader.read_u64()? as i64),
        'd' => Value::Double(f64::from_bits(reader.read_u64()?)),
        't' => Value::Time(TimeTag::from_raw(reader.read_u64()?)),
        // Sent as a 32-bit code point; non-scalar payloads decode lossily.
        'c' => Value::Char(char::from_u32(reader.read_u32()?).unwrap_or('\u{FFFD}')),
        'T' => Value::Bool(true),
        'F' => Value::Bool(false),
        'N' => Value::Nil,
        other => return Err(CodecError::UnsupportedType(other)),
    })
}

/// Serializes an OSC [`Packet`] to its wire representation.
pub fn serialize(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    write_packet(&mut out, packet);
    out
}

fn write_packet(out: &mut Vec<u8>, packet: &Packet) {
    match packet {
        Packet::Message(msg) => write_message(out, msg),
        Packet::Bundle(bundle) => write_bundle(out, bundle),
    }
}

fn write_message(out: &mut Vec<u8>, msg: &Message) {
    write_str(out, msg.address());
    write_str(out, &msg.type_tags());

    for arg in msg.args() {
        match arg {
            Value::Int(v) => out.extend(v.to_be_bytes()),
            Value::Float(v) => out.extend(v.to_be_bytes()),
            Value::Str(v) => write_str(out, v),
            Value::Blob(v) => write_blob(out, v),
            Value::Long(v) => out.extend(v.to_be_bytes()),
            Value::Double(v) => out.extend(v.to_be_bytes()),
            Value::Time(v) => out.extend(v.raw().to_be_bytes()),
            Value::Char(v) => out.extend((*v as u32).to_be_bytes()),
            // Carried entirely by the type tag.
            Value::Bool(_) | Value::Nil => {}
        }
    }
}

fn write_bundle(out: &mut Vec<u8>, bundle: &Bundle) {
    write_str(out, BUNDLE_TAG);
    out.extend(bundle.time_tag.raw().to_be_bytes());

    for element in &bundle.elements {
        let bytes = serialize(element);
        // A single element can never exceed the u32 frame size in practice;
        // this is a construction contract, not a wire condition.
        let len = u32::try_from(bytes.len()).unwrap();
        out.extend(len.to_be_bytes());
        out.extend(bytes);
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend(s.as_bytes());
    out.push(0);
    let pad = (4 - (s.len() + 1) % 4) % 4;
    out.extend(core::iter::repeat_n(0u8, pad));
}

fn write_blob(out: &mut Vec<u8>, blob: &[u8]) {
    out.extend((blob.len() as u32).to_be_bytes());
    out.extend(blob);
    // Padding counts the data length only, not a terminator.
    let pad = (4 - blob.len() % 4) % 4;
    out.extend(core::iter::repeat_n(0u8, pad));
}
