//! Stock codecs for wiring, demos and tests.
//!
//! These are deliberately small transforms. Real wire formats (base64, hex,
//! varint, ...) live in their own crates and plug in through the same traits.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};

use super::adapter::{TypedDecoder, TypedEncoder};
use crate::domain::{DecodeError, EncodeError};

/// Reverses the byte order. Its own inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse;

impl TypedEncoder for Reverse {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn encode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        input.reverse();
        Ok(input)
    }
}

impl TypedDecoder for Reverse {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn decode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
        input.reverse();
        Ok(input)
    }
}

/// Adds a constant to every byte (wrapping).
#[derive(Debug, Clone, Copy)]
pub struct ByteOffset(pub u8);

impl TypedEncoder for ByteOffset {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn encode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        input.iter_mut().for_each(|b| *b = b.wrapping_add(self.0));
        Ok(input)
    }
}

impl TypedDecoder for ByteOffset {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn decode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
        input.iter_mut().for_each(|b| *b = b.wrapping_sub(self.0));
        Ok(input)
    }
}

/// Text <-> UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl TypedEncoder for Utf8 {
    type Input = String;
    type Output = Vec<u8>;

    fn encode(&self, input: String) -> Result<Vec<u8>, EncodeError> {
        Ok(input.into_bytes())
    }
}

impl TypedDecoder for Utf8 {
    type Input = Vec<u8>;
    type Output = String;

    fn decode(&self, input: Vec<u8>) -> Result<String, DecodeError> {
        String::from_utf8(input).map_err(|e| DecodeError::malformed(format!("invalid utf-8: {e}")))
    }
}

/// Record <-> compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonText;

impl TypedEncoder for JsonText {
    type Input = Map<String, Value>;
    type Output = String;

    fn encode(&self, input: Map<String, Value>) -> Result<String, EncodeError> {
        serde_json::to_string(&input)
            .map_err(|e| EncodeError::Internal(format!("json encode: {e}")))
    }
}

impl TypedDecoder for JsonText {
    type Input = String;
    type Output = Map<String, Value>;

    fn decode(&self, input: String) -> Result<Map<String, Value>, DecodeError> {
        match serde_json::from_str::<Value>(&input) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DecodeError::malformed("json text is not an object")),
            Err(e) => Err(DecodeError::malformed(format!("json decode: {e}"))),
        }
    }
}

/// Appends a frame counter byte on encode and checks it on decode.
///
/// Stateful: the encoder and decoder counters advance on every call, so one
/// instance must only see one stream. Register it with a factory.
#[derive(Debug, Default)]
pub struct Sequenced {
    next_out: Mutex<u8>,
    next_in: Mutex<u8>,
}

impl Sequenced {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TypedEncoder for Sequenced {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn encode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        let mut next = self.next_out.lock();
        input.push(*next);
        *next = next.wrapping_add(1);
        Ok(input)
    }
}

impl TypedDecoder for Sequenced {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn decode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
        let mut expected = self.next_in.lock();
        match input.pop() {
            None => Err(DecodeError::malformed("missing sequence byte")),
            Some(seq) if seq != *expected => Err(DecodeError::malformed(format!(
                "out of sequence frame: expected {}, got {seq}",
                *expected
            ))),
            Some(_) => {
                *expected = expected.wrapping_add(1);
                Ok(input)
            }
        }
    }
}

/// SHA-256 digest (32 bytes). Encode only and lossy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Digest;

impl TypedEncoder for Digest {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn encode(&self, input: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        Ok(Sha256::digest(&input).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rstest::rstest;
    use serde_json::json;

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.r#gen::<u8>()).collect()
    }

    #[rstest]
    #[case::empty(0)]
    #[case::one(1)]
    #[case::odd(17)]
    #[case::large(4096)]
    fn test_byte_codecs_round_trip(#[case] len: usize) {
        let input = random_bytes(len);

        let reversed = TypedEncoder::encode(&Reverse, input.clone()).unwrap();
        assert_eq!(TypedDecoder::decode(&Reverse, reversed).unwrap(), input);

        let offset = ByteOffset(1);
        let shifted = TypedEncoder::encode(&offset, input.clone()).unwrap();
        assert_eq!(TypedDecoder::decode(&offset, shifted).unwrap(), input);
    }

    #[test]
    fn test_byte_offset_wraps() {
        let out = TypedEncoder::encode(&ByteOffset(1), vec![0, 255]).unwrap();
        assert_eq!(out, vec![1, 0]);
    }

    #[test]
    fn test_utf8_rejects_invalid_bytes() {
        let err = TypedDecoder::decode(&Utf8, vec![0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput(_)));
    }

    #[test]
    fn test_json_text_round_trip() {
        let record = json!({"name": "weft", "n": 3});
        let map = record.as_object().cloned().unwrap();
        let text = TypedEncoder::encode(&JsonText, map.clone()).unwrap();
        assert_eq!(TypedDecoder::decode(&JsonText, text).unwrap(), map);
    }

    #[test]
    fn test_json_text_rejects_non_object() {
        let err = TypedDecoder::decode(&JsonText, "[1,2]".to_string()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput(_)));
    }

    #[test]
    fn test_sequenced_counts_frames() {
        let seq = Sequenced::new();
        assert_eq!(TypedEncoder::encode(&seq, vec![9]).unwrap(), vec![9, 0]);
        assert_eq!(TypedEncoder::encode(&seq, vec![9]).unwrap(), vec![9, 1]);

        assert_eq!(TypedDecoder::decode(&seq, vec![9, 0]).unwrap(), vec![9]);
        let err = TypedDecoder::decode(&seq, vec![9, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput(_)));
    }

    #[test]
    fn test_digest_is_sha256() {
        let a = TypedEncoder::encode(&Digest, b"a".to_vec()).unwrap();
        let b = TypedEncoder::encode(&Digest, b"b".to_vec()).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);

        let empty = TypedEncoder::encode(&Digest, Vec::new()).unwrap();
        assert_eq!(
            hex::encode(empty),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
