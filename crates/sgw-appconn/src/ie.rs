//! Information element codec
//!
//! Typed value nodes for the application protocol. A type byte below 128
//! uses the Type-Value representation (exactly one value byte, no length);
//! a type byte of 128 or above uses Type-Length-Value with a one-byte
//! length. Basic elements carry scalars; every other type byte is a
//! composite holding either a single value byte or an ordered map of
//! nested elements, at most one child per type.

use crate::errors::CodecError;
use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use std::collections::BTreeMap;

/* basic information element types */
pub const BYTE: u8 = 0x30;
pub const INTEGER: u8 = 0xd0;
pub const LONG: u8 = 0xd1;
pub const BYTE_ARRAY: u8 = 0xd2;
pub const DATE: u8 = 0xd3;
pub const TIMESTAMP: u8 = 0xd4;

/// Line separator for the XML rendering
pub const LINE_SEPARATOR: &str = "\r\n";

/// A typed information element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ie {
    Byte(u8),
    Integer(u16),
    Long(u32),
    Bytes(Vec<u8>),
    Date(IeDate),
    Timestamp(IeTimestamp),
    Composite(Composite),
}

impl Ie {
    /// Wire type byte of this element
    pub fn type_byte(&self) -> u8 {
        match self {
            Ie::Byte(_) => BYTE,
            Ie::Integer(_) => INTEGER,
            Ie::Long(_) => LONG,
            Ie::Bytes(_) => BYTE_ARRAY,
            Ie::Date(_) => DATE,
            Ie::Timestamp(_) => TIMESTAMP,
            Ie::Composite(c) => c.type_byte(),
        }
    }

    /// Builds a byte-array element from an ASCII string.
    pub fn string(s: &str) -> Ie {
        Ie::Bytes(s.as_bytes().to_vec())
    }

    /// Encodes the value portion (no type or length byte) into `buf`.
    pub fn encode_value(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Ie::Byte(b) => buf.put_u8(*b),
            Ie::Integer(i) => buf.put_u16(*i),
            Ie::Long(l) => buf.put_u32(*l),
            Ie::Bytes(b) => buf.put_slice(b),
            Ie::Date(d) => d.encode(buf),
            Ie::Timestamp(t) => t.encode(buf),
            Ie::Composite(c) => c.encode_value(buf)?,
        }
        Ok(())
    }

    /// Decodes a basic element, rejecting any type byte that is not one of
    /// the basic types.
    pub fn decode_basic(ty: u8, value: &[u8]) -> Result<Ie, CodecError> {
        match ty {
            BYTE => match value {
                [b] => Ok(Ie::Byte(*b)),
                _ => Err(CodecError::InvalidLength { ty, len: value.len() }),
            },
            INTEGER => match value {
                [hi, lo] => Ok(Ie::Integer(u16::from_be_bytes([*hi, *lo]))),
                _ => Err(CodecError::InvalidLength { ty, len: value.len() }),
            },
            LONG => match value.try_into() {
                Ok(bytes) => Ok(Ie::Long(u32::from_be_bytes(bytes))),
                Err(_) => Err(CodecError::InvalidLength { ty, len: value.len() }),
            },
            BYTE_ARRAY => Ok(Ie::Bytes(value.to_vec())),
            DATE => Ok(Ie::Date(IeDate::decode(value)?)),
            TIMESTAMP => Ok(Ie::Timestamp(IeTimestamp::decode(value)?)),
            other => Err(CodecError::UnknownBasicType(other)),
        }
    }

    /// Decodes an element of any type; non-basic types parse structurally
    /// as composites so that unknown types round-trip losslessly.
    pub fn decode(ty: u8, value: &[u8]) -> Result<Ie, CodecError> {
        match Ie::decode_basic(ty, value) {
            Ok(ie) => Ok(ie),
            Err(CodecError::UnknownBasicType(_)) => {
                Ok(Ie::Composite(Composite::decode(ty, value)?))
            }
            Err(e) => Err(e),
        }
    }

    /// XML rendering for protocol debug logs
    pub fn to_xml(&self) -> String {
        match self {
            Ie::Byte(b) => basic_xml("byte", &b.to_string()),
            Ie::Integer(i) => basic_xml("integer", &i.to_string()),
            Ie::Long(l) => basic_xml("long", &l.to_string()),
            Ie::Bytes(b) => basic_xml("byteArray", &String::from_utf8_lossy(b)),
            Ie::Date(d) => basic_xml("date", &d.to_string()),
            Ie::Timestamp(t) => basic_xml("timestamp", &t.to_string()),
            Ie::Composite(c) => c.to_xml(),
        }
    }
}

fn basic_xml(name: &str, value: &str) -> String {
    format!("<basicIE type=\"{}\" value=\"{}\"/>{}", name, value, LINE_SEPARATOR)
}

/// A composite information element: its own type byte plus either a single
/// value byte (Type-Value) or nested children ordered by type
/// (Type-Length-Value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    ty: u8,
    repr: Repr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Repr {
    Value(u8),
    Children(BTreeMap<u8, Ie>),
}

impl Composite {
    /// Creates a Type-Value composite (type byte below 128).
    pub fn value(ty: u8, value: u8) -> Composite {
        debug_assert!(ty < 128);
        Composite { ty, repr: Repr::Value(value) }
    }

    /// Creates an empty Type-Length-Value composite (type byte >= 128).
    pub fn container(ty: u8) -> Composite {
        debug_assert!(ty >= 128);
        Composite { ty, repr: Repr::Children(BTreeMap::new()) }
    }

    /// Creates a Type-Length-Value composite with the given children.
    pub fn with_children(ty: u8, children: Vec<Ie>) -> Composite {
        let mut composite = Composite::container(ty);
        for ie in children {
            composite.put(ie);
        }
        composite
    }

    pub fn type_byte(&self) -> u8 {
        self.ty
    }

    /// The single value byte of a Type-Value composite, 0 otherwise.
    pub fn value_byte(&self) -> u8 {
        match &self.repr {
            Repr::Value(v) => *v,
            Repr::Children(_) => 0,
        }
    }

    /// Inserts a child, replacing any existing child of the same type.
    pub fn put(&mut self, ie: Ie) {
        if let Repr::Children(map) = &mut self.repr {
            map.insert(ie.type_byte(), ie);
        }
    }

    pub fn contains(&self, ty: u8) -> bool {
        self.child(ty).is_some()
    }

    pub fn child(&self, ty: u8) -> Option<&Ie> {
        match &self.repr {
            Repr::Children(map) => map.get(&ty),
            Repr::Value(_) => None,
        }
    }

    /// Removes the child of the given type.
    pub fn remove(&mut self, ty: u8) {
        if let Repr::Children(map) = &mut self.repr {
            map.remove(&ty);
        }
    }

    /// Nested composite child of the given type
    pub fn composite(&self, ty: u8) -> Option<&Composite> {
        match self.child(ty) {
            Some(Ie::Composite(c)) => Some(c),
            _ => None,
        }
    }

    /// The byte child, 0 when absent.
    pub fn byte(&self) -> u8 {
        match self.child(BYTE) {
            Some(Ie::Byte(b)) => *b,
            _ => 0,
        }
    }

    /// The integer child, 0 when absent.
    pub fn integer(&self) -> u16 {
        match self.child(INTEGER) {
            Some(Ie::Integer(i)) => *i,
            _ => 0,
        }
    }

    /// The long child, 0 when absent.
    pub fn long(&self) -> u32 {
        match self.child(LONG) {
            Some(Ie::Long(l)) => *l,
            _ => 0,
        }
    }

    /// The byte-array child, empty when absent.
    pub fn byte_array(&self) -> &[u8] {
        match self.child(BYTE_ARRAY) {
            Some(Ie::Bytes(b)) => b,
            _ => &[],
        }
    }

    /// The byte-array child as a string, empty when absent.
    pub fn string(&self) -> String {
        String::from_utf8_lossy(self.byte_array()).into_owned()
    }

    pub fn date(&self) -> Option<IeDate> {
        match self.child(DATE) {
            Some(Ie::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<IeTimestamp> {
        match self.child(TIMESTAMP) {
            Some(Ie::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    /// Encodes the value portion: the value byte for Type-Value, the
    /// concatenated children for Type-Length-Value. Each TLV child value
    /// must fit the one-byte length.
    pub fn encode_value(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match &self.repr {
            Repr::Value(v) => buf.put_u8(*v),
            Repr::Children(map) => {
                for (ty, ie) in map {
                    buf.put_u8(*ty);
                    let mut value = BytesMut::new();
                    ie.encode_value(&mut value)?;
                    if *ty < 128 {
                        // Type-Value children carry exactly one value byte
                        buf.put_u8(value.first().copied().unwrap_or(0));
                    } else {
                        if value.len() > 255 {
                            return Err(CodecError::PayloadTooLong(value.len()));
                        }
                        buf.put_u8(value.len() as u8);
                        buf.put_slice(&value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes a composite of the given type from its value bytes.
    pub fn decode(ty: u8, value: &[u8]) -> Result<Composite, CodecError> {
        if ty < 128 {
            let v = *value.first().ok_or(CodecError::BufferTooShort)?;
            return Ok(Composite::value(ty, v));
        }
        let mut composite = Composite::container(ty);
        let mut index = 0;
        while index < value.len() {
            let child_ty = value[index];
            let (child_value, next) = if child_ty < 128 {
                if index + 2 > value.len() {
                    return Err(CodecError::BufferTooShort);
                }
                (&value[index + 1..index + 2], index + 2)
            } else {
                if index + 2 > value.len() {
                    return Err(CodecError::BufferTooShort);
                }
                let len = value[index + 1] as usize;
                if index + 2 + len > value.len() {
                    return Err(CodecError::BufferTooShort);
                }
                (&value[index + 2..index + 2 + len], index + 2 + len)
            };
            composite.put(Ie::decode(child_ty, child_value)?);
            index = next;
        }
        Ok(composite)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = format!("<compositeIE type=\"{}\"", self.ty);
        if let Repr::Value(v) = &self.repr {
            xml.push_str(&format!(" value=\"{}\"", v));
        }
        xml.push('>');
        xml.push_str(LINE_SEPARATOR);
        if let Repr::Children(map) = &self.repr {
            for ie in map.values() {
                xml.push('\t');
                xml.push_str(&ie.to_xml());
            }
        }
        xml.push_str("</compositeIE>");
        xml.push_str(LINE_SEPARATOR);
        xml
    }
}

/// Calendar date encoded as four packed-BCD bytes: two for the year, one
/// each for month and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeDate(pub NaiveDate);

impl IeDate {
    fn encode(&self, buf: &mut BytesMut) {
        let year = self.0.year();
        buf.put_u8(bcd_pair((year / 100) as u8));
        buf.put_u8(bcd_pair((year % 100) as u8));
        buf.put_u8(bcd_pair(self.0.month() as u8));
        buf.put_u8(bcd_pair(self.0.day() as u8));
    }

    fn decode(value: &[u8]) -> Result<IeDate, CodecError> {
        let [y1, y2, mon, day] = value else {
            return Err(CodecError::InvalidLength { ty: DATE, len: value.len() });
        };
        let year = from_bcd_pair(*y1)? as i32 * 100 + from_bcd_pair(*y2)? as i32;
        let date = NaiveDate::from_ymd_opt(year, from_bcd_pair(*mon)? as u32, from_bcd_pair(*day)? as u32)
            .ok_or(CodecError::InvalidBcd)?;
        Ok(IeDate(date))
    }
}

impl std::fmt::Display for IeDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.0.year(), self.0.month(), self.0.day())
    }
}

/// Timestamp encoded as eight packed-BCD bytes: date, hour, minute,
/// second, then the weekday stored shifted by one (0 means absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeTimestamp {
    pub datetime: NaiveDateTime,
    pub weekday: Option<Weekday>,
}

impl IeTimestamp {
    pub fn new(datetime: NaiveDateTime) -> IeTimestamp {
        IeTimestamp { datetime, weekday: Some(datetime.weekday()) }
    }

    fn encode(&self, buf: &mut BytesMut) {
        IeDate(self.datetime.date()).encode(buf);
        buf.put_u8(bcd_pair(self.datetime.hour() as u8));
        buf.put_u8(bcd_pair(self.datetime.minute() as u8));
        buf.put_u8(bcd_pair(self.datetime.second() as u8));
        // weekday + 1, so that 0 stays reserved for "absent"
        buf.put_u8(match self.weekday {
            Some(w) => w.num_days_from_sunday() as u8 + 1,
            None => 0,
        });
    }

    fn decode(value: &[u8]) -> Result<IeTimestamp, CodecError> {
        if value.len() != 8 {
            return Err(CodecError::InvalidLength { ty: TIMESTAMP, len: value.len() });
        }
        let date = IeDate::decode(&value[..4])?;
        let time = chrono::NaiveTime::from_hms_opt(
            from_bcd_pair(value[4])? as u32,
            from_bcd_pair(value[5])? as u32,
            from_bcd_pair(value[6])? as u32,
        )
        .ok_or(CodecError::InvalidBcd)?;
        let weekday = match value[7] {
            0 => None,
            b @ 1..=7 => Some(weekday_from_sunday(b - 1)),
            _ => return Err(CodecError::InvalidBcd),
        };
        Ok(IeTimestamp { datetime: date.0.and_time(time), weekday })
    }
}

impl std::fmt::Display for IeTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dt = &self.datetime;
        write!(
            f,
            "{}-{}-{} {}:{}:{}",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        )
    }
}

fn bcd_pair(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn from_bcd_pair(byte: u8) -> Result<u8, CodecError> {
    let hi = (byte >> 4) & 0x0f;
    let lo = byte & 0x0f;
    if hi > 9 || lo > 9 {
        return Err(CodecError::InvalidBcd);
    }
    Ok(hi * 10 + lo)
}

fn weekday_from_sunday(days: u8) -> Weekday {
    match days {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}
