//! Config - JSON で宣言したパイプラインを起動時に登録する
//!
//! ```json
//! {
//!   "pipelines": [
//!     { "id": "text-wire@v1", "stages": ["utf8", "reverse", "offset"] },
//!     { "id": "fingerprint", "stages": ["utf8", "digest"], "mode": "encode_only" }
//!   ]
//! }
//! ```
//!
//! 上から順に登録するので、後のパイプラインは前のパイプラインを段として使えます。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::dispatch::{DispatchError, Dispatcher};
use super::pipeline::{CompositionMode, PipelineSpec};
use crate::domain::CodecId;
use crate::typed::RegisterMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapestryConfig {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

/// One named composite codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: CodecId,

    pub stages: PipelineSpec,

    #[serde(default)]
    pub mode: CompositionMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Replace an existing registration with the same id.
    #[serde(default)]
    pub replace: bool,
}

impl PipelineConfig {
    /// 双方向・説明なし・重複は拒否、のパイプライン
    pub fn new(id: CodecId, stages: PipelineSpec) -> Self {
        Self {
            id,
            stages,
            mode: CompositionMode::Bidirectional,
            description: None,
            replace: false,
        }
    }

    pub fn encode_only(mut self) -> Self {
        self.mode = CompositionMode::EncodeOnly;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 同じ id の既存登録を置き換える
    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn register_mode(&self) -> RegisterMode {
        if self.replace {
            RegisterMode::Replace
        } else {
            RegisterMode::Reject
        }
    }
}

/// ConfigError は設定の読み込み・適用エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("pipeline #{index} ('{id}') rejected: {source}")]
    Pipeline {
        index: usize,
        id: CodecId,
        #[source]
        source: DispatchError,
    },
}

impl TapestryConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

impl Dispatcher {
    /// 設定のパイプラインを順に登録する。最初の失敗で止まる。
    ///
    /// 失敗より前に登録されたパイプラインは登録済みのまま残ります。
    pub fn apply_config(&self, config: &TapestryConfig) -> Result<Vec<CodecId>, ConfigError> {
        let mut registered = Vec::with_capacity(config.pipelines.len());
        for (index, pipeline) in config.pipelines.iter().enumerate() {
            self.register_pipeline(pipeline)
                .map_err(|source| ConfigError::Pipeline {
                    index,
                    id: pipeline.id.clone(),
                    source,
                })?;
            registered.push(pipeline.id.clone());
        }
        info!(count = registered.len(), "pipelines registered from config");
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodecMetadata, Envelope, ErrorKind};
    use crate::typed::stock::{Digest, Reverse, Utf8};
    use crate::typed::{CodecRegistry, Registration};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let registry = CodecRegistry::new();
        let id = |s: &str| CodecId::new(s).unwrap();
        for (name, reg) in [
            ("reverse", Registration::typed(id("reverse"), Reverse, CodecMetadata::new())),
            ("utf8", Registration::typed(id("utf8"), Utf8, CodecMetadata::new())),
            (
                "digest",
                Registration::encode_only(id("digest"), Digest, CodecMetadata::new().lossy()),
            ),
        ] {
            registry.register(reg).unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        Dispatcher::new(Arc::new(registry))
    }

    #[test]
    fn test_config_defaults() {
        let raw = r#"{ "pipelines": [ { "id": "p", "stages": ["utf8"] } ] }"#;
        let config = TapestryConfig::from_json_str(raw).unwrap();
        let p = &config.pipelines[0];
        assert_eq!(p.mode, CompositionMode::Bidirectional);
        assert!(!p.replace);
        assert!(p.description.is_none());

        let empty = TapestryConfig::from_json_str("{}").unwrap();
        assert!(empty.pipelines.is_empty());
    }

    #[test]
    fn test_config_rejects_invalid_ids() {
        let raw = r#"{ "pipelines": [ { "id": "", "stages": [] } ] }"#;
        let err = TapestryConfig::from_json_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_apply_registers_in_order() {
        let d = dispatcher();
        let config = TapestryConfig::from_json_str(
            r#"{
                "pipelines": [
                    {
                        "id": "text-wire@v1",
                        "stages": ["utf8", "reverse"],
                        "description": "text as reversed bytes"
                    },
                    { "id": "twice", "stages": ["text-wire@v1", "reverse"] },
                    { "id": "fingerprint", "stages": ["utf8", "digest"], "mode": "encode_only" }
                ]
            }"#,
        )
        .unwrap();

        let ids = d.apply_config(&config).unwrap();
        assert_eq!(ids.len(), 3);

        let twice = CodecId::new("twice").unwrap();
        let wire = d.encode(&twice, Envelope::text("abc")).unwrap();
        assert_eq!(wire, Envelope::bytes(b"abc".to_vec()));
        assert_eq!(d.decode(&twice, wire).unwrap(), Envelope::text("abc"));

        let caps = d.capabilities(&CodecId::new("fingerprint").unwrap()).unwrap();
        assert!(!caps.can_decode);
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let d = dispatcher();
        let config = TapestryConfig::from_json_str(
            r#"{
                "pipelines": [
                    { "id": "ok", "stages": ["utf8"] },
                    { "id": "bad", "stages": ["utf8", "missing"] },
                    { "id": "never", "stages": ["reverse"] }
                ]
            }"#,
        )
        .unwrap();

        let err = d.apply_config(&config).unwrap_err();
        match err {
            ConfigError::Pipeline { index, id, source } => {
                assert_eq!(index, 1);
                assert_eq!(id.as_str(), "bad");
                assert_eq!(source.kind(), ErrorKind::UnknownStage);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(d.registry().contains(&CodecId::new("ok").unwrap()));
        assert!(!d.registry().contains(&CodecId::new("never").unwrap()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TapestryConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
