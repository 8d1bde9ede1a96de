//! App - アプリケーション層
//!
//! registry と codec を組み合わせて、クライアント向けの操作を提供します。
//!
//! # 主要コンポーネント
//! - **Pipeline**: 複数の codec を合成するコンポジット codec
//! - **Dispatcher**: encode / decode の唯一の入口
//! - **Config**: JSON で宣言されたパイプライン
//! - **DispatcherBuilder**: 起動時の構築と検証

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod pipeline;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::config::{ConfigError, PipelineConfig, TapestryConfig};
pub use self::dispatch::{Capabilities, DispatchCause, DispatchError, Dispatcher, Operation};
pub use self::pipeline::{
    CompositeCodec, CompositionError, CompositionMode, PipelinePlan, PipelineSpec, compose,
};
