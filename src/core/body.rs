//! Body packing.
//!
//! Fields are appended in declaration order and must be read back in that same
//! order; there is no implicit reversal. Scalars are little-endian. Strings are
//! a `u32` byte length followed by UTF-8 bytes. Reading past the end of a body
//! yields a framing error instead of panicking.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{constants, ProtocolError, Result};

/// Sequential writer for message bodies
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64_le(value);
        self
    }

    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Append raw bytes without a length prefix; only valid as the last field
    pub fn put_raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Sequential reader mirroring [`BodyWriter`]
#[derive(Debug)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(body: Bytes) -> Self {
        Self { buf: body }
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Framing(format!(
                "{}: need {needed}, have {}",
                constants::ERR_BODY_UNDERRUN,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn get_string(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|_| ProtocolError::Framing(constants::ERR_INVALID_UTF8.to_string()))
    }

    /// Take everything that has not been read yet
    pub fn take_rest(&mut self) -> Bytes {
        self.buf.split_to(self.buf.len())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fail if unread bytes are left behind
    pub fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(ProtocolError::Framing(format!(
                "{} trailing bytes after last field",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
