//! Variable-length binary blob codec: a length-prefixed `Vec<u8>` wrapper.

use std::convert::TryInto;

use crate::{codec::Codec, err_at, error::Result};

/// Codec for `Vec<u8>` keys/values: a 4-byte big-endian length prefix
/// followed by the raw bytes. Buckets lay entries out as raw bytes rather
/// than through a self-describing format, so the prefix is hand-rolled
/// here instead of going through a generic serializer.
#[derive(Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec<Vec<u8>> for BinaryCodec {
    fn size(&self, value: &Vec<u8>) -> usize {
        4 + value.len()
    }

    fn encode(&self, value: &Vec<u8>, buf: &mut [u8], offset: usize) -> Result<()> {
        let total = self.size(value);
        if buf.len() < offset + total {
            return err_at!(Fatal, msg: "binary encode: buffer too small");
        }
        let len: u32 = match value.len().try_into() {
            Ok(len) => len,
            Err(_) => return err_at!(KeyTooLarge, msg: "value exceeds u32::MAX bytes"),
        };
        buf[offset..offset + 4].copy_from_slice(&len.to_be_bytes());
        buf[offset + 4..offset + total].copy_from_slice(value);
        Ok(())
    }

    fn decode(&self, buf: &[u8], offset: usize) -> Result<(Vec<u8>, usize)> {
        if buf.len() < offset + 4 {
            return err_at!(Corruption, msg: "binary decode: truncated length prefix");
        }
        let mut scratch = [0u8; 4];
        scratch.copy_from_slice(&buf[offset..offset + 4]);
        let len = u32::from_be_bytes(scratch) as usize;
        if buf.len() < offset + 4 + len {
            return err_at!(Corruption, msg: "binary decode: truncated payload");
        }
        let val = buf[offset + 4..offset + 4 + len].to_vec();
        Ok((val, 4 + len))
    }
}

#[cfg(test)]
#[path = "bytes_test.rs"]
mod bytes_test;
