//! Protocol messages and the message type registry

use crate::errors::CodecError;
use crate::ie::{Composite, Ie, LINE_SEPARATOR};
use bytes::{BufMut, BytesMut};
use dashmap::DashMap;
use std::time::Duration;

/// Fixed wire protocol version
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Value byte reporting a failed request
pub const REQUEST_FAILED: u8 = 0;
/// Value byte reporting an accepted request
pub const REQUEST_ACCEPTED: u8 = 1;

/// Composite type carrying the node identity in a register request
pub const NODE: u8 = 0xc0;

pub const TIME_TO_LIVE_1S: Duration = Duration::from_millis(1000);
pub const TIME_TO_LIVE_2S: Duration = Duration::from_millis(2000);
pub const TIME_TO_LIVE_4S: Duration = Duration::from_millis(4000);
pub const DEFAULT_TIME_TO_LIVE: Duration = TIME_TO_LIVE_4S;

/// A protocol message: a composite body plus the envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    version: u8,
    sequence_number: u16,
    time_to_live: Duration,
    body: Composite,
}

impl Message {
    /// Creates a Type-Value message (type byte below 128).
    pub fn tv(ty: u8, value: u8) -> Message {
        Message::from_composite(Composite::value(ty, value))
    }

    /// Creates a Type-Length-Value message with the given elements.
    pub fn tlv(ty: u8, ies: Vec<Ie>) -> Message {
        Message::from_composite(Composite::with_children(ty, ies))
    }

    /// Wraps a composite body with the default envelope.
    pub fn from_composite(body: Composite) -> Message {
        Message {
            version: PROTOCOL_VERSION,
            sequence_number: 0,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            body,
        }
    }

    /// Decodes a message from the framed header fields and value bytes.
    pub fn decode(version: u8, sequence_number: u16, ty: u8, value: &[u8]) -> Result<Message, CodecError> {
        Ok(Message {
            version,
            sequence_number,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            body: Composite::decode(ty, value)?,
        })
    }

    /// Encodes the full wire frame:
    /// `version | seq_hi | seq_lo | type | [len] | value...`
    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let mut value = BytesMut::new();
        self.body.encode_value(&mut value)?;

        let mut frame = BytesMut::with_capacity(5 + value.len());
        frame.put_u8(self.version);
        frame.put_u16(self.sequence_number);
        frame.put_u8(self.ty());
        if self.ty() < 128 {
            // Type-Value: exactly one value byte, no length
            frame.put_u8(value.first().copied().unwrap_or(0));
        } else {
            if value.len() > 255 {
                return Err(CodecError::PayloadTooLong(value.len()));
            }
            frame.put_u8(value.len() as u8);
            frame.put_slice(&value);
        }
        Ok(frame)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn ty(&self) -> u8 {
        self.body.type_byte()
    }

    pub fn value_byte(&self) -> u8 {
        self.body.value_byte()
    }

    pub fn body(&self) -> &Composite {
        &self.body
    }

    /// Nested composite element of the given type
    pub fn composite(&self, ty: u8) -> Option<&Composite> {
        self.body.composite(ty)
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn set_sequence_number(&mut self, sequence_number: u16) {
        self.sequence_number = sequence_number;
    }

    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    pub fn set_time_to_live(&mut self, time_to_live: Duration) {
        self.time_to_live = time_to_live;
    }

    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            "<message version=\"{}\" sequenceNumber=\"{}\" type=\"{}\"",
            self.version,
            self.sequence_number,
            self.ty()
        );
        if self.ty() < 128 {
            xml.push_str(&format!(" value=\"{}\"", self.value_byte()));
        }
        xml.push('>');
        xml.push_str(LINE_SEPARATOR);
        xml.push_str(&self.body.to_xml());
        xml.push_str("</message>");
        xml.push_str(LINE_SEPARATOR);
        xml
    }
}

/// Message group: requests expect a linked response, advices are
/// fire-and-forget, responses complete an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Advice,
    Request,
    Response,
}

/// Registry entry pairing a message type with its linked type.
#[derive(Debug, Clone, Copy)]
pub struct MessageType {
    pub ty: u8,
    pub linked_type: u8,
    pub group: Group,
}

impl MessageType {
    pub const fn new(ty: u8, linked_type: u8, group: Group) -> MessageType {
        MessageType { ty, linked_type, group }
    }

    pub fn is_advice(&self) -> bool {
        self.group == Group::Advice
    }

    pub fn is_request(&self) -> bool {
        self.group == Group::Request
    }

    pub fn is_response(&self) -> bool {
        self.group == Group::Response
    }
}

pub const VERSION_NOT_SUPPORTED_ADVICE: MessageType = MessageType::new(0x00, 0xff, Group::Advice);
pub const ECHO_REQUEST: MessageType = MessageType::new(0x01, 0x02, Group::Request);
pub const ECHO_RESPONSE: MessageType = MessageType::new(0x02, 0x01, Group::Response);
pub const REGISTER_REQUEST: MessageType = MessageType::new(0xc0, 0x20, Group::Request);
pub const REGISTER_RESPONSE: MessageType = MessageType::new(0x20, 0xc0, Group::Response);

/// Supported message types, keyed by type byte. Prepopulated with the
/// base protocol types; applications register their own on top.
pub struct TypeRegistry {
    map: DashMap<u8, MessageType>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        let registry = TypeRegistry { map: DashMap::new() };
        registry.put(VERSION_NOT_SUPPORTED_ADVICE);
        registry.put(ECHO_REQUEST);
        registry.put(ECHO_RESPONSE);
        registry.put(REGISTER_REQUEST);
        registry.put(REGISTER_RESPONSE);
        registry
    }

    /// Registers a message type, replacing any existing entry.
    pub fn put(&self, message_type: MessageType) {
        self.map.insert(message_type.ty, message_type);
    }

    pub fn get(&self, ty: u8) -> Option<MessageType> {
        self.map.get(&ty).map(|entry| *entry)
    }

    /// The linked type for the given type, 0 when unregistered.
    pub fn linked_type(&self, ty: u8) -> u8 {
        self.get(ty).map(|mt| mt.linked_type).unwrap_or(0)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}
