use super::*;

#[test]
fn test_binary_roundtrip() {
    let codec = BinaryCodec;
    let value = b"hello hash index".to_vec();
    let mut buf = vec![0u8; codec.size(&value) + 3];
    codec.encode(&value, &mut buf, 3).unwrap();
    let (got, n) = codec.decode(&buf, 3).unwrap();
    assert_eq!(got, value);
    assert_eq!(n, codec.size(&value));
}

#[test]
fn test_binary_empty() {
    let codec = BinaryCodec;
    let value: Vec<u8> = vec![];
    let mut buf = vec![0u8; codec.size(&value)];
    codec.encode(&value, &mut buf, 0).unwrap();
    let (got, n) = codec.decode(&buf, 0).unwrap();
    assert_eq!(got, value);
    assert_eq!(n, 4);
}

#[test]
fn test_binary_truncated_payload_is_corruption() {
    let codec = BinaryCodec;
    let mut buf = vec![0u8; 4];
    buf.copy_from_slice(&10u32.to_be_bytes());
    assert!(codec.decode(&buf, 0).is_err());
}
