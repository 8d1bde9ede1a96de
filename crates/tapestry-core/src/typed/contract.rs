//! Encoder / Decoder - codec の契約
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedEncoder` / `TypedDecoder` - Rust の型で入出力を表す
//! - **内部（Dyn）**: `Encoder` / `Decoder` - object-safe, `Envelope` で入出力
//!
//! レジストリとパイプラインは内部層（`Arc<dyn Encoder>`）だけを扱います。

use crate::domain::{DecodeError, EncodeError, Envelope};

/// Encoder は論理形式（decoded）から wire 形式（encoded）への変換
///
/// 既定では純粋関数であること。内部状態を持つ実装は
/// `CodecMetadata::stateful` を立てて登録してください。
pub trait Encoder: Send + Sync {
    fn encode(&self, input: Envelope) -> Result<Envelope, EncodeError>;
}

/// Decoder は Encoder の逆変換
///
/// lossless を宣言した codec は `decode(encode(x)) == x` を満たすこと。
pub trait Decoder: Send + Sync {
    fn decode(&self, input: Envelope) -> Result<Envelope, DecodeError>;
}
