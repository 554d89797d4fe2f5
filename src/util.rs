//! Small helpers shared across the state store and metadata persistence.

use cbordata::{Cbor, FromCbor, IntoCbor};

use crate::{err_at, error::Result};

/// Serialize a [`cbordata::Cborize`]-derived value to its CBOR byte
/// encoding.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let cbor = err_at!(Index, val.into_cbor())?;
    let n = err_at!(Index, cbor.encode(&mut data))?;
    if n != data.len() {
        return err_at!(Fatal, msg: "cbor encoding length mismatch {} != {}", n, data.len());
    }
    Ok(data)
}

/// Deserialize a value previously written by [`into_cbor_bytes`],
/// returning the value and the number of bytes consumed.
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (cbor, n) = err_at!(Corruption, Cbor::decode(&mut data))?;
    let val = err_at!(Corruption, T::from_cbor(cbor))?;
    Ok((val, n))
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
