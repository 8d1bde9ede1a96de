//! Envelope - dispatch 層を流れる型付きの値
//!
//! 異なる codec の入出力を 1 つの型で運ぶために、payload と
//! その論理的な形（`Shape`）をセットで持ちます。
//!
//! Rust の enum では discriminant と payload が常に一致しますが、
//! 外部（JSON, CLI 引数など）から「形」を宣言して値を作る場合は
//! `Envelope::from_tagged` で検証し、不一致は `EnvelopeError` になります。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope の discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Raw bytes.
    Bytes,
    /// UTF-8 text.
    Text,
    /// Structured record (JSON object).
    Record,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Shape::Bytes => "bytes",
            Shape::Text => "text",
            Shape::Record => "record",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Shape {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytes" => Ok(Shape::Bytes),
            "text" => Ok(Shape::Text),
            "record" => Ok(Shape::Record),
            other => Err(EnvelopeError::UnknownShape(other.to_string())),
        }
    }
}

/// 型付きの値
///
/// JSON では `{"shape": "bytes", "payload": [1, 2, 3]}` の形になります。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    Bytes(Vec<u8>),
    Text(String),
    Record(serde_json::Map<String, serde_json::Value>),
}

/// EnvelopeError は外部宣言された shape と payload の不一致
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("declared shape {declared} does not match payload of JSON type {found}")]
    ShapeMismatch { declared: Shape, found: &'static str },

    #[error("byte payload element at index {index} is not in 0..=255")]
    InvalidByte { index: usize },

    #[error("unknown shape '{0}' (expected bytes, text or record)")]
    UnknownShape(String),
}

impl Envelope {
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Envelope::Bytes(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Envelope::Text(value.into())
    }

    pub fn record(value: serde_json::Map<String, serde_json::Value>) -> Self {
        Envelope::Record(value)
    }

    pub fn shape(&self) -> Shape {
        match self {
            Envelope::Bytes(_) => Shape::Bytes,
            Envelope::Text(_) => Shape::Text,
            Envelope::Record(_) => Shape::Record,
        }
    }

    /// 外部で宣言された shape と JSON payload から Envelope を組み立てる
    ///
    /// - `bytes`: 0..=255 の整数配列
    /// - `text`: 文字列
    /// - `record`: オブジェクト
    pub fn from_tagged(declared: Shape, payload: serde_json::Value) -> Result<Self, EnvelopeError> {
        use serde_json::Value;

        match (declared, payload) {
            (Shape::Text, Value::String(s)) => Ok(Envelope::Text(s)),
            (Shape::Record, Value::Object(map)) => Ok(Envelope::Record(map)),
            (Shape::Bytes, Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let byte = item
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or(EnvelopeError::InvalidByte { index })?;
                    out.push(byte);
                }
                Ok(Envelope::Bytes(out))
            }
            (declared, other) => Err(EnvelopeError::ShapeMismatch {
                declared,
                found: json_type_name(&other),
            }),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_envelope_is_tagged_enum() {
        let e = Envelope::bytes(vec![1, 2]);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["shape"], "bytes");
        assert_eq!(v["payload"], json!([1, 2]));
    }

    #[rstest]
    #[case::bytes(Shape::Bytes, json!([0, 255]), Envelope::bytes(vec![0, 255]))]
    #[case::text(Shape::Text, json!("hi"), Envelope::text("hi"))]
    fn test_from_tagged_accepts_matching_payload(
        #[case] shape: Shape,
        #[case] payload: serde_json::Value,
        #[case] expected: Envelope,
    ) {
        assert_eq!(Envelope::from_tagged(shape, payload).unwrap(), expected);
    }

    #[test]
    fn test_from_tagged_record() {
        let env = Envelope::from_tagged(Shape::Record, json!({"a": 1})).unwrap();
        assert_eq!(env.shape(), Shape::Record);
    }

    #[rstest]
    #[case::record_as_bytes(Shape::Bytes, json!({"a": 1}), "object")]
    #[case::text_as_record(Shape::Record, json!("x"), "string")]
    #[case::null_as_text(Shape::Text, json!(null), "null")]
    fn test_from_tagged_rejects_mismatch(
        #[case] shape: Shape,
        #[case] payload: serde_json::Value,
        #[case] found: &'static str,
    ) {
        let err = Envelope::from_tagged(shape, payload).unwrap_err();
        assert_eq!(err, EnvelopeError::ShapeMismatch { declared: shape, found });
    }

    #[test]
    fn test_from_tagged_rejects_out_of_range_byte() {
        let err = Envelope::from_tagged(Shape::Bytes, json!([1, 256])).unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidByte { index: 1 });
    }

    #[test]
    fn test_shape_parses_from_str() {
        assert_eq!("text".parse::<Shape>().unwrap(), Shape::Text);
        assert!(matches!("blob".parse::<Shape>(), Err(EnvelopeError::UnknownShape(_))));
    }
}
