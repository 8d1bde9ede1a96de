//! Payload trait - Rust の型と `Shape` の対応付け

use crate::domain::{Envelope, Shape};

/// Payload は Envelope に出し入れできる型
///
/// | 型 | Shape |
/// |----|-------|
/// | `Vec<u8>` | `Bytes` |
/// | `String` | `Text` |
/// | `serde_json::Map<String, Value>` | `Record` |
pub trait Payload: Sized + Send + 'static {
    const SHAPE: Shape;

    /// shape が一致しなければ元の envelope をそのまま返す
    fn from_envelope(envelope: Envelope) -> Result<Self, Envelope>;

    fn into_envelope(self) -> Envelope;
}

impl Payload for Vec<u8> {
    const SHAPE: Shape = Shape::Bytes;

    fn from_envelope(envelope: Envelope) -> Result<Self, Envelope> {
        match envelope {
            Envelope::Bytes(b) => Ok(b),
            other => Err(other),
        }
    }

    fn into_envelope(self) -> Envelope {
        Envelope::Bytes(self)
    }
}

impl Payload for String {
    const SHAPE: Shape = Shape::Text;

    fn from_envelope(envelope: Envelope) -> Result<Self, Envelope> {
        match envelope {
            Envelope::Text(s) => Ok(s),
            other => Err(other),
        }
    }

    fn into_envelope(self) -> Envelope {
        Envelope::Text(self)
    }
}

impl Payload for serde_json::Map<String, serde_json::Value> {
    const SHAPE: Shape = Shape::Record;

    fn from_envelope(envelope: Envelope) -> Result<Self, Envelope> {
        match envelope {
            Envelope::Record(r) => Ok(r),
            other => Err(other),
        }
    }

    fn into_envelope(self) -> Envelope {
        Envelope::Record(self)
    }
}
