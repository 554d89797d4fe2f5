use cbordata::Cborize;

use super::*;

#[derive(Clone, Debug, PartialEq, Cborize)]
struct Sample {
    name: String,
    count: u64,
}

impl Sample {
    const ID: u32 = 0x5a5a_0001;
}

#[test]
fn test_cbor_roundtrip() {
    let sample = Sample { name: "idx".to_string(), count: 42 };
    let bytes = into_cbor_bytes(sample.clone()).unwrap();
    let (decoded, n): (Sample, usize) = from_cbor_bytes(&bytes).unwrap();
    assert_eq!(decoded, sample);
    assert_eq!(n, bytes.len());
}
