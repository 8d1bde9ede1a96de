//! Typed codec と type erasure
//!
//! # 学習ポイント
//! - 関連型（`type Input: Payload`）で入出力の Shape を静的に決める
//! - `Typed<C>` で `TypedEncoder` → `dyn Encoder` に変換（TypedHandler と同じ型消去パターン）
//! - shape の検査は adapter が一箇所で行い、実装側は正しい型だけを受け取る

use super::contract::{Decoder, Encoder};
use super::payload::Payload;
use crate::domain::{DecodeError, EncodeError, Envelope};

/// TypedEncoder は型付きの encode
///
/// # 使用例
/// ```ignore
/// struct Reverse;
///
/// impl TypedEncoder for Reverse {
///     type Input = Vec<u8>;
///     type Output = Vec<u8>;
///
///     fn encode(&self, mut input: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
///         input.reverse();
///         Ok(input)
///     }
/// }
/// ```
pub trait TypedEncoder: Send + Sync + 'static {
    type Input: Payload;
    type Output: Payload;

    fn encode(&self, input: Self::Input) -> Result<Self::Output, EncodeError>;
}

/// TypedDecoder は型付きの decode
///
/// 双方向の codec では `Input` が encoder の `Output` に、
/// `Output` が encoder の `Input` に対応します。
pub trait TypedDecoder: Send + Sync + 'static {
    type Input: Payload;
    type Output: Payload;

    fn decode(&self, input: Self::Input) -> Result<Self::Output, DecodeError>;
}

/// Typed は typed codec を object-safe な Encoder / Decoder に変換する adapter
#[derive(Debug, Clone, Default)]
pub struct Typed<C>(pub C);

impl<C> Typed<C> {
    pub fn new(codec: C) -> Self {
        Self(codec)
    }

    pub fn inner(&self) -> &C {
        &self.0
    }
}

impl<C: TypedEncoder> Encoder for Typed<C> {
    fn encode(&self, input: Envelope) -> Result<Envelope, EncodeError> {
        let actual = input.shape();
        let value = <C as TypedEncoder>::Input::from_envelope(input).map_err(|_| {
            EncodeError::InputShapeMismatch {
                expected: <C as TypedEncoder>::Input::SHAPE,
                actual,
            }
        })?;
        self.0.encode(value).map(Payload::into_envelope)
    }
}

impl<C: TypedDecoder> Decoder for Typed<C> {
    fn decode(&self, input: Envelope) -> Result<Envelope, DecodeError> {
        let actual = input.shape();
        let value = <C as TypedDecoder>::Input::from_envelope(input).map_err(|_| {
            DecodeError::InputShapeMismatch {
                expected: <C as TypedDecoder>::Input::SHAPE,
                actual,
            }
        })?;
        self.0.decode(value).map(Payload::into_envelope)
    }
}
