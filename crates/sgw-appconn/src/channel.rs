//! Framed socket channel
//!
//! Byte-exact framed read/write over a connected stream socket. A frame
//! is `version | seq_hi | seq_lo | type` followed by one value byte
//! (type below 128) or a one-byte length plus that many value bytes.

use crate::errors::CodecError;
use crate::message::Message;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Fixed header length: version, two sequence bytes, type
const HEADER_LENGTH: usize = 4;

/// A parsed wire frame, not yet decoded into elements.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub version: u8,
    pub sequence_number: u16,
    pub ty: u8,
    pub payload: Bytes,
}

impl RawFrame {
    /// Decodes the frame payload into a message.
    pub fn into_message(self) -> Result<Message, CodecError> {
        Message::decode(self.version, self.sequence_number, self.ty, &self.payload)
    }
}

/// Read side of a framed connection
pub struct FrameReader {
    inner: OwnedReadHalf,
}

impl FrameReader {
    pub fn new(inner: OwnedReadHalf) -> FrameReader {
        FrameReader { inner }
    }

    /// Reads exactly one frame off the wire.
    pub async fn read_frame(&mut self) -> std::io::Result<RawFrame> {
        let mut header = [0u8; HEADER_LENGTH];
        self.inner.read_exact(&mut header).await?;

        let ty = header[3];
        let payload = if ty < 128 {
            // Type-Value: a single value byte follows the header
            let mut value = [0u8; 1];
            self.inner.read_exact(&mut value).await?;
            Bytes::copy_from_slice(&value)
        } else {
            let mut len = [0u8; 1];
            self.inner.read_exact(&mut len).await?;
            let mut value = vec![0u8; len[0] as usize];
            self.inner.read_exact(&mut value).await?;
            Bytes::from(value)
        };

        Ok(RawFrame {
            version: header[0],
            sequence_number: u16::from_be_bytes([header[1], header[2]]),
            ty,
            payload,
        })
    }
}

/// Write side of a framed connection
pub struct FrameWriter {
    inner: OwnedWriteHalf,
}

impl FrameWriter {
    pub fn new(inner: OwnedWriteHalf) -> FrameWriter {
        FrameWriter { inner }
    }

    /// Serializes and writes one message.
    pub async fn write_frame(&mut self, message: &Message) -> crate::Result<()> {
        let frame = message.encode()?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
