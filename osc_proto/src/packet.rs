//! The OSC packet model: argument values, messages, and bundles.

use crate::TimeTag;
use core::fmt;
use serde::{Deserialize, Serialize};

/// A single OSC argument.
///
/// A closed variant set: every variant maps to exactly one standard OSC 1.0
/// type-tag character, and every tag character the codec accepts decodes to
/// exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// `i` — 32-bit big-endian signed integer.
    Int(i32),
    /// `f` — 32-bit big-endian IEEE 754 float.
    Float(f32),
    /// `s` — NUL-terminated, 4-byte-aligned UTF-8 string.
    Str(String),
    /// `b` — length-prefixed, 4-byte-aligned byte blob.
    Blob(Vec<u8>),
    /// `h` — 64-bit big-endian signed integer.
    Long(i64),
    /// `d` — 64-bit big-endian IEEE 754 float.
    Double(f64),
    /// `t` — 64-bit OSC time tag.
    Time(TimeTag),
    /// `c` — a single character, sent as a 32-bit integer code point.
    Char(char),
    /// `T` / `F` — boolean, carried entirely by the type tag (no payload).
    Bool(bool),
    /// `N` — nil, carried entirely by the type tag (no payload).
    Nil,
}

impl Value {
    /// Returns the OSC type-tag character for this value.
    ///
    /// Total over the variant set; the inverse direction is the codec's
    /// per-tag payload decoding.
    #[inline(always)]
    pub const fn type_tag(&self) -> char {
        match self {
            Value::Int(_) => 'i',
            Value::Float(_) => 'f',
            Value::Str(_) => 's',
            Value::Blob(_) => 'b',
            Value::Long(_) => 'h',
            Value::Double(_) => 'd',
            Value::Time(_) => 't',
            Value::Char(_) => 'c',
            Value::Bool(true) => 'T',
            Value::Bool(false) => 'F',
            Value::Nil => 'N',
        }
    }
}

/// Error returned when constructing a [`Message`] with an invalid address.
///
/// OSC addresses are non-empty and start with `/`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct AddressError;

impl fmt::Display for AddressError {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OSC address must be non-empty and start with '/'")
    }
}

impl std::error::Error for AddressError {}

/// Plain field view of a [`Message`], used at the serde boundary so that
/// deserialization goes through address validation.
#[derive(Serialize, Deserialize)]
struct MessageParts {
    address: String,
    args: Vec<Value>,
}

/// An OSC message: an address and an ordered argument list.
///
/// The address invariant (non-empty, leading `/`) is checked at construction,
/// never deferred to serialize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MessageParts", into = "MessageParts")]
pub struct Message {
    address: String,
    args: Vec<Value>,
}

impl Message {
    /// Creates a new message if `address` is a valid OSC address.
    pub fn new(address: impl Into<String>, args: Vec<Value>) -> Result<Self, AddressError> {
        let address = address.into();
        if address.starts_with('/') {
            Ok(Self { address, args })
        } else {
            Err(AddressError)
        }
    }

    #[inline(always)]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[inline(always)]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Returns the message's type-tag string: a leading `,` followed by one
    /// tag character per argument, in argument order.
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(Value::type_tag));
        tags
    }
}

impl TryFrom<MessageParts> for Message {
    type Error = AddressError;

    #[inline(always)]
    fn try_from(parts: MessageParts) -> Result<Self, Self::Error> {
        Message::new(parts.address, parts.args)
    }
}

impl From<Message> for MessageParts {
    #[inline(always)]
    fn from(msg: Message) -> Self {
        Self {
            address: msg.address,
            args: msg.args,
        }
    }
}

/// An OSC bundle: a time tag and an ordered list of nested packets.
///
/// Nesting depth is unbounded by the model (bounded in practice by input
/// size). Element order is preserved through the codec and the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub time_tag: TimeTag,
    pub elements: Vec<Packet>,
}

impl Default for Bundle {
    #[inline(always)]
    fn default() -> Self {
        Self {
            time_tag: TimeTag::IMMEDIATE,
            elements: Vec::new(),
        }
    }
}

impl Bundle {
    #[inline(always)]
    pub fn new(time_tag: TimeTag, elements: Vec<Packet>) -> Self {
        Self { time_tag, elements }
    }
}

/// The protocol's top-level transmissible unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl From<Message> for Packet {
    #[inline(always)]
    fn from(msg: Message) -> Self {
        Self::Message(msg)
    }
}

impl From<Bundle> for Packet {
    #[inline(always)]
    fn from(bundle: Bundle) -> Self {
        Self::Bundle(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_must_start_with_slash() {
        assert!(Message::new("/ok", vec![]).is_ok());
        assert_eq!(Message::new("nope", vec![]), Err(AddressError));
        assert_eq!(Message::new("", vec![]), Err(AddressError));
    }

    #[test]
    fn type_tag_string_follows_argument_order() {
        let msg = Message::new(
            "/all",
            vec![
                Value::Int(1),
                Value::Float(2.0),
                Value::Str("three".into()),
                Value::Blob(vec![4]),
                Value::Long(5),
                Value::Double(6.0),
                Value::Time(TimeTag::IMMEDIATE),
                Value::Char('c'),
                Value::Bool(true),
                Value::Bool(false),
                Value::Nil,
            ],
        )
        .unwrap();

        assert_eq!(msg.type_tags(), ",ifsbhdtcTFN");
    }

    #[test]
    fn serde_rejects_invalid_addresses() {
        let msg = Message::new("/x", vec![Value::Int(7)]).unwrap();
        let bytes = postcard::to_allocvec(&msg).unwrap();
        let back: Message = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, msg);

        let bad = MessageParts {
            address: "no-slash".into(),
            args: vec![],
        };
        let bytes = postcard::to_allocvec(&bad).unwrap();
        assert!(postcard::from_bytes::<Message>(&bytes).is_err());
    }

    #[test]
    fn default_bundle_is_empty_and_immediate() {
        let bundle = Bundle::default();
        assert!(bundle.time_tag.is_immediate());
        assert!(bundle.elements.is_empty());
    }
}
