//! Fixed-width integer codecs: big-endian encode/decode so that raw byte
//! comparison matches numeric order, which the range-scan walks rely on.

use crate::{codec::Codec, err_at, error::Result};

/// Codec for `u64` keys/values: 8 bytes, big-endian.
#[derive(Clone, Copy, Default)]
pub struct U64Codec;

impl Codec<u64> for U64Codec {
    fn size(&self, _value: &u64) -> usize {
        8
    }

    fn fixed_length(&self) -> Option<usize> {
        Some(8)
    }

    fn encode(&self, value: &u64, buf: &mut [u8], offset: usize) -> Result<()> {
        if buf.len() < offset + 8 {
            return err_at!(Fatal, msg: "u64 encode: buffer too small");
        }
        buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn decode(&self, buf: &[u8], offset: usize) -> Result<(u64, usize)> {
        if buf.len() < offset + 8 {
            return err_at!(Corruption, msg: "u64 decode: truncated buffer");
        }
        let mut scratch = [0u8; 8];
        scratch.copy_from_slice(&buf[offset..offset + 8]);
        Ok((u64::from_be_bytes(scratch), 8))
    }
}

/// Codec for `i64` keys/values: 8 bytes, big-endian.
#[derive(Clone, Copy, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn size(&self, _value: &i64) -> usize {
        8
    }

    fn fixed_length(&self) -> Option<usize> {
        Some(8)
    }

    fn encode(&self, value: &i64, buf: &mut [u8], offset: usize) -> Result<()> {
        if buf.len() < offset + 8 {
            return err_at!(Fatal, msg: "i64 encode: buffer too small");
        }
        buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn decode(&self, buf: &[u8], offset: usize) -> Result<(i64, usize)> {
        if buf.len() < offset + 8 {
            return err_at!(Corruption, msg: "i64 decode: truncated buffer");
        }
        let mut scratch = [0u8; 8];
        scratch.copy_from_slice(&buf[offset..offset + 8]);
        Ok((i64::from_be_bytes(scratch), 8))
    }
}

#[cfg(test)]
#[path = "fixed_test.rs"]
mod fixed_test;
