//! tapestry-core
//!
//! Pluggable codec registry and dispatch layer.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（CodecId, Envelope, CodecMetadata, errors）
//! - **typed**: codec の契約（Encoder / Decoder）、型付き API、CodecRegistry
//! - **app**: パイプライン合成、Dispatcher、設定、起動時の構築

pub mod app;
pub mod domain;
pub mod typed;

pub use app::{Dispatcher, DispatcherBuilder, DispatchError};
pub use domain::{CodecId, Envelope, ErrorKind, Shape};
pub use typed::{CodecRegistry, Registration};
