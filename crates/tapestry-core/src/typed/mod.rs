//! Typed - codec の契約と型付き API
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedEncoder`, `TypedDecoder`, `Payload` - 型安全
//! - **内部（Dyn）**: `Encoder`, `Decoder` - object-safe, type erasure
//!
//! `Typed<C>` が表層から内部への橋渡しをします。

pub mod adapter;
pub mod contract;
pub mod payload;
pub mod registry;
pub mod stock;

pub use self::adapter::{Typed, TypedDecoder, TypedEncoder};
pub use self::contract::{Decoder, Encoder};
pub use self::payload::Payload;
pub use self::registry::{
    CodecFactory, CodecHandle, CodecListing, CodecRegistry, CodecSource, RegisterMode, Registration,
    RegistryError,
};
