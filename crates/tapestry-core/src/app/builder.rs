//! DispatcherBuilder - 起動時の registry 構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - registry への書き込みは build まで。以降は `replace` 以外で変更しない

use std::sync::Arc;

use super::config::{ConfigError, PipelineConfig, TapestryConfig};
use super::dispatch::Dispatcher;
use crate::domain::{CodecId, CodecMetadata};
use crate::typed::stock::{ByteOffset, Digest, JsonText, Reverse, Sequenced, Utf8};
use crate::typed::{CodecHandle, CodecRegistry, Registration, RegistryError};

/// DispatcherBuilder は Dispatcher を構築
///
/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .with_stock_codecs()?
///     .register(Registration::typed(id, MyCodec, CodecMetadata::new()))?
///     .config(TapestryConfig::from_path("pipelines.json")?)
///     .expect_codecs(&["text-wire@v1"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - パイプラインは build() 時に登録順で合成・検証する
/// - expect_codecs() で指定した id が 1 つでも欠けていれば BuildError
pub struct DispatcherBuilder {
    registry: CodecRegistry,
    pipelines: Vec<PipelineConfig>,
    expected_codecs: Option<Vec<String>>,
}

/// BuildError は Dispatcher 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing codecs: {0:?}. These codecs were expected but not registered.")]
    MissingCodecs(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: CodecRegistry::new(),
            pipelines: Vec::new(),
            expected_codecs: None,
        }
    }

    /// codec を登録
    pub fn register(self, registration: Registration) -> Result<Self, RegistryError> {
        self.registry.register(registration)?;
        Ok(self)
    }

    /// 同梱の codec をまとめて登録
    ///
    /// | id | codec |
    /// |----|-------|
    /// | `reverse` | バイト列の反転 |
    /// | `offset` | 各バイトに +1 |
    /// | `utf8` | Text ↔ Bytes |
    /// | `json` | Record ↔ Text |
    /// | `seq` | フレーム番号の付与（stateful） |
    /// | `digest` | SHA-256（encode のみ, lossy） |
    pub fn with_stock_codecs(self) -> Result<Self, RegistryError> {
        let stock = [
            Registration::typed(
                stock_id("reverse"),
                Reverse,
                CodecMetadata::new().described("reverse byte order"),
            ),
            Registration::typed(
                stock_id("offset"),
                ByteOffset(1),
                CodecMetadata::new().described("add 1 to every byte"),
            ),
            Registration::typed(
                stock_id("utf8"),
                Utf8,
                CodecMetadata::new().described("text <-> utf-8 bytes"),
            ),
            Registration::typed(
                stock_id("json"),
                JsonText,
                CodecMetadata::new().described("record <-> json text"),
            ),
            Registration::stateful(
                stock_id("seq"),
                || CodecHandle::typed(Sequenced::new()),
                CodecMetadata::new().described("append frame counter"),
            ),
            Registration::encode_only(
                stock_id("digest"),
                Digest,
                CodecMetadata::new().described("sha-256 digest").lossy(),
            ),
        ];
        for registration in stock {
            self.registry.register(registration)?;
        }
        Ok(self)
    }

    /// パイプラインを追加（build 時に登録）
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// 設定ファイルのパイプラインを追加（build 時に登録）
    pub fn config(mut self, config: TapestryConfig) -> Self {
        self.pipelines.extend(config.pipelines);
        self
    }

    /// 期待される codec id のリストを設定
    pub fn expect_codecs(mut self, ids: &[&str]) -> Self {
        self.expected_codecs = Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    /// 構築
    ///
    /// # 検証
    /// - パイプラインを順に合成して登録（失敗すれば BuildError::Config）
    /// - expect_codecs() の id が全て登録されているかチェック
    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let dispatcher = Dispatcher::new(Arc::new(self.registry));
        dispatcher.apply_config(&TapestryConfig {
            pipelines: self.pipelines,
        })?;

        if let Some(expected) = &self.expected_codecs {
            let registered: Vec<String> = dispatcher
                .registry()
                .list()
                .iter()
                .map(|id| id.to_string())
                .collect();
            let missing: Vec<String> = expected
                .iter()
                .filter(|x| !registered.contains(x))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingCodecs(missing));
            }
        }
        Ok(dispatcher)
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// 同梱 codec の id は定数なので検証は失敗しない
fn stock_id(name: &'static str) -> CodecId {
    match CodecId::new(name) {
        Ok(id) => id,
        Err(e) => unreachable!("stock codec id '{name}' is invalid: {e}"),
    }
}
