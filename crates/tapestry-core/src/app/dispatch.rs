//! Dispatcher - クライアントが呼ぶ唯一の入口
//!
//! `encode(id, value)` / `decode(id, value)` を受け取り、
//! 1. Registry で id を解決
//! 2. コンポジットなら段ごとのインスタンスを組み立て
//! 3. 実行して、下位層のエラーを `DispatchError` に変換
//!
//! `DispatchError` は元のエラー分類と、dispatch した id から失敗した段までの
//! id の鎖（chain）を保持します。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{trace, warn};

use super::config::PipelineConfig;
use super::pipeline::{
    CompositeCodec, CompositionError, CompositionMode, PipelinePlan, PipelineSpec,
};
use crate::domain::{CodecId, DecodeError, EncodeError, Envelope, ErrorKind, StageFrame};
use crate::typed::{CodecRegistry, CodecSource, Registration, RegistryError};

/// Dispatcher が行った操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Encode,
    Decode,
    Register,
    Inspect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Encode => "encode",
            Operation::Decode => "decode",
            Operation::Register => "register",
            Operation::Inspect => "inspect",
        };
        f.write_str(s)
    }
}

/// DispatchCause は DispatchError の原因（下位層のエラーをそのまま保持）
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchCause {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("codec does not support {0}")]
    Unsupported(Operation),
}

impl DispatchCause {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchCause::Registry(e) => e.kind(),
            DispatchCause::Composition(e) => e.kind(),
            DispatchCause::Encode(e) => e.kind(),
            DispatchCause::Decode(e) => e.kind(),
            DispatchCause::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// DispatchError は Dispatcher のすべての失敗
///
/// - `chain`: dispatch した id から失敗した段までの id（外側から順）
/// - `stage_path`: 各コンポジット内での段の index（`chain[1..]` に対応）
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation} via {} failed: {cause}", join_chain(.chain))]
pub struct DispatchError {
    operation: Operation,
    chain: Vec<CodecId>,
    stage_path: Vec<usize>,
    cause: DispatchCause,
}

fn join_chain(chain: &[CodecId]) -> String {
    chain.iter().map(CodecId::as_str).collect::<Vec<_>>().join(" > ")
}

impl DispatchError {
    fn new(operation: Operation, id: &CodecId, cause: impl Into<DispatchCause>) -> Self {
        let cause = cause.into();
        let frames: Vec<StageFrame> = match &cause {
            DispatchCause::Encode(e) => e.stage_path(),
            DispatchCause::Decode(e) => e.stage_path(),
            DispatchCause::Composition(e) => e
                .stage()
                .map(|(index, id)| StageFrame { index, id: id.clone() })
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        let mut chain = Vec::with_capacity(frames.len() + 1);
        chain.push(id.clone());
        let mut stage_path = Vec::with_capacity(frames.len());
        for frame in frames {
            chain.push(frame.id);
            stage_path.push(frame.index);
        }

        Self {
            operation,
            chain,
            stage_path,
            cause,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// dispatch に渡された id
    pub fn codec_id(&self) -> &CodecId {
        &self.chain[0]
    }

    pub fn chain(&self) -> &[CodecId] {
        &self.chain
    }

    pub fn stage_path(&self) -> &[usize] {
        &self.stage_path
    }

    /// 失敗した段の id（chain の末尾）
    pub fn failing_id(&self) -> &CodecId {
        &self.chain[self.chain.len() - 1]
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn cause(&self) -> &DispatchCause {
        &self.cause
    }
}

/// 呼び出し側に公開する codec の性質
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub id: CodecId,
    pub registration_id: String,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub can_encode: bool,
    pub can_decode: bool,
    pub lossless: bool,
    pub stateful: bool,
    pub blocking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<CodecId>>,
}

impl Capabilities {
    fn of(registration: &Registration) -> Self {
        let metadata = registration.metadata();
        let stages = match registration.source() {
            CodecSource::Composite(plan) => Some(plan.stage_ids()),
            _ => None,
        };
        Self {
            id: registration.id().clone(),
            registration_id: registration.registration_id().to_string(),
            registered_at: registration.registered_at(),
            description: metadata.description.clone(),
            can_encode: registration.can_encode(),
            can_decode: registration.can_decode(),
            lossless: metadata.lossless,
            stateful: metadata.stateful,
            blocking: metadata.blocking,
            stages,
        }
    }
}

/// Dispatcher は registry を包むファサード
///
/// # 使用例
/// ```ignore
/// let dispatcher = Dispatcher::new(Arc::new(registry));
/// let wire = dispatcher.encode(&id, Envelope::text("hello"))?;
/// let back = dispatcher.decode(&id, wire)?;
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CodecRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CodecRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    pub fn encode(&self, id: &CodecId, value: Envelope) -> Result<Envelope, DispatchError> {
        self.run(Operation::Encode, id, || {
            let registration = self.registry.resolve(id)?;
            let encoder = registration
                .instantiate()
                .encoder
                .ok_or(DispatchCause::Unsupported(Operation::Encode))?;
            trace!(codec = %id, shape = %value.shape(), "dispatch encode");
            Ok(encoder.encode(value)?)
        })
    }

    pub fn decode(&self, id: &CodecId, value: Envelope) -> Result<Envelope, DispatchError> {
        self.run(Operation::Decode, id, || {
            let registration = self.registry.resolve(id)?;
            let decoder = registration
                .instantiate()
                .decoder
                .ok_or(DispatchCause::Unsupported(Operation::Decode))?;
            trace!(codec = %id, shape = %value.shape(), "dispatch decode");
            Ok(decoder.decode(value)?)
        })
    }

    /// lossless / stateful / 方向などの性質を問い合わせる
    pub fn capabilities(&self, id: &CodecId) -> Result<Capabilities, DispatchError> {
        self.run(Operation::Inspect, id, || {
            let registration = self.registry.resolve(id)?;
            Ok(Capabilities::of(&registration))
        })
    }

    /// 登録せずにその場でコンポジットを作る
    pub fn compose(
        &self,
        spec: &PipelineSpec,
        mode: CompositionMode,
    ) -> Result<CompositeCodec, CompositionError> {
        let plan = PipelinePlan::resolve(&self.registry, spec, mode)?;
        Ok(CompositeCodec::from_plan(None, Arc::new(plan)))
    }

    /// パイプラインを検証して、`pipeline.id` という名前のコンポジット codec として登録する
    pub fn register_pipeline(&self, pipeline: &PipelineConfig) -> Result<(), DispatchError> {
        self.run(Operation::Register, &pipeline.id, || {
            let plan = PipelinePlan::resolve(&self.registry, &pipeline.stages, pipeline.mode)?;
            let registration =
                Registration::composite(pipeline.id.clone(), plan, pipeline.description.clone());
            self.registry.insert(registration, pipeline.register_mode())?;
            Ok(())
        })
    }

    fn run<T>(
        &self,
        operation: Operation,
        id: &CodecId,
        body: impl FnOnce() -> Result<T, DispatchCause>,
    ) -> Result<T, DispatchError> {
        body().map_err(|cause| {
            let err = DispatchError::new(operation, id, cause);
            warn!(
                %operation,
                codec = %id,
                kind = ?err.kind(),
                failing = %err.failing_id(),
                error = %err.cause(),
                "dispatch failed"
            );
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodecMetadata, Shape};
    use crate::typed::CodecHandle;
    use crate::typed::stock::{ByteOffset, Digest, JsonText, Reverse, Sequenced, Utf8};
    use serde_json::json;

    fn id(s: &str) -> CodecId {
        CodecId::new(s).unwrap()
    }

    fn spec(ids: &[&str]) -> PipelineSpec {
        ids.iter().map(|s| id(s)).collect()
    }

    fn pipeline(name: &str, stages: &[&str]) -> PipelineConfig {
        PipelineConfig::new(id(name), spec(stages))
    }

    fn dispatcher() -> Dispatcher {
        let registry = CodecRegistry::new();
        registry
            .register(Registration::typed(id("reverse"), Reverse, CodecMetadata::new()))
            .unwrap();
        registry
            .register(Registration::typed(id("offset"), ByteOffset(1), CodecMetadata::new()))
            .unwrap();
        registry
            .register(Registration::typed(id("utf8"), Utf8, CodecMetadata::new()))
            .unwrap();
        registry
            .register(Registration::typed(id("json"), JsonText, CodecMetadata::new()))
            .unwrap();
        registry
            .register(Registration::encode_only(id("digest"), Digest, CodecMetadata::new().lossy()))
            .unwrap();
        registry
            .register(Registration::stateful(
                id("seq"),
                || CodecHandle::typed(Sequenced::new()),
                CodecMetadata::new(),
            ))
            .unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    #[test]
    fn test_leaf_round_trip() {
        let d = dispatcher();
        let wire = d.encode(&id("utf8"), Envelope::text("héllo")).unwrap();
        assert_eq!(wire.shape(), Shape::Bytes);
        assert_eq!(d.decode(&id("utf8"), wire).unwrap(), Envelope::text("héllo"));
    }

    #[test]
    fn test_composite_round_trip() {
        let d = dispatcher();
        d.register_pipeline(
            &pipeline("wire", &["json", "utf8", "reverse", "offset"])
                .described("record to obfuscated bytes"),
        )
        .unwrap();

        let record = Envelope::from_tagged(Shape::Record, json!({"a": [1, 2], "b": "x"})).unwrap();
        let wire = d.encode(&id("wire"), record.clone()).unwrap();
        assert_eq!(wire.shape(), Shape::Bytes);
        assert_eq!(d.decode(&id("wire"), wire).unwrap(), record);
    }

    #[test]
    fn test_not_found() {
        let err = dispatcher().encode(&id("missing"), Envelope::bytes(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.chain(), &[id("missing")]);
        assert_eq!(err.operation(), Operation::Encode);
    }

    #[test]
    fn test_shape_mismatch_on_leaf() {
        let d = dispatcher();
        let record = Envelope::from_tagged(Shape::Record, json!({"k": 1})).unwrap();
        let err = d.decode(&id("reverse"), record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputShapeMismatch);
        assert!(err.stage_path().is_empty());
    }

    #[test]
    fn test_malformed_input_is_distinct() {
        let err = dispatcher()
            .decode(&id("utf8"), Envelope::bytes(vec![0xc3]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_composite_failure_names_stage() {
        let d = dispatcher();
        d.register_pipeline(&pipeline("text-wire", &["utf8", "reverse"]))
            .unwrap();

        // reverse⁻¹ は通るが utf8⁻¹ で不正な UTF-8
        let err = d.decode(&id("text-wire"), Envelope::bytes(vec![0xff])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.chain(), &[id("text-wire"), id("utf8")]);
        assert_eq!(err.stage_path(), &[0]);
        assert_eq!(err.failing_id(), &id("utf8"));
    }

    #[test]
    fn test_nested_composite_chain() {
        let d = dispatcher();
        d.register_pipeline(&pipeline("inner", &["utf8", "reverse"]))
            .unwrap();
        d.register_pipeline(&pipeline("outer", &["json", "inner"]))
            .unwrap();

        let record = Envelope::from_tagged(Shape::Record, json!({"n": 1})).unwrap();
        let wire = d.encode(&id("outer"), record.clone()).unwrap();
        assert_eq!(d.decode(&id("outer"), wire).unwrap(), record);

        let err = d.decode(&id("outer"), Envelope::bytes(vec![0xff])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.chain(), &[id("outer"), id("inner"), id("utf8")]);
        assert_eq!(err.stage_path(), &[1, 0]);
    }

    #[test]
    fn test_one_directional_decode_is_unsupported() {
        let err = dispatcher().decode(&id("digest"), Envelope::bytes(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.cause(), &DispatchCause::Unsupported(Operation::Decode));
    }

    #[test]
    fn test_register_pipeline_rejects_non_invertible() {
        let d = dispatcher();
        let err = d
            .register_pipeline(&pipeline("hash", &["utf8", "digest"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonInvertibleStage);
        assert_eq!(err.chain(), &[id("hash"), id("digest")]);
        assert!(!d.registry().contains(&id("hash")));

        d.register_pipeline(&pipeline("hash", &["utf8", "digest"]).encode_only())
            .unwrap();
        let caps = d.capabilities(&id("hash")).unwrap();
        assert!(caps.can_encode);
        assert!(!caps.can_decode);
        assert!(!caps.lossless);
        assert_eq!(caps.stages, Some(vec![id("utf8"), id("digest")]));
    }

    #[test]
    fn test_register_pipeline_duplicate() {
        let d = dispatcher();
        let err = d
            .register_pipeline(&pipeline("reverse", &["offset"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateId);

        d.register_pipeline(&pipeline("reverse", &["offset"]).replacing())
            .unwrap();
        assert!(d.capabilities(&id("reverse")).unwrap().stages.is_some());
    }

    #[test]
    fn test_empty_pipeline() {
        let err = dispatcher()
            .register_pipeline(&pipeline("nothing", &[]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyPipeline);
        assert_eq!(err.chain(), &[id("nothing")]);
    }

    #[test]
    fn test_stateful_codec_fresh_per_dispatch() {
        let d = dispatcher();
        let first = d.encode(&id("seq"), Envelope::bytes(vec![5])).unwrap();
        let second = d.encode(&id("seq"), Envelope::bytes(vec![5])).unwrap();
        assert_eq!(first, Envelope::bytes(vec![5, 0]));
        assert_eq!(first, second);

        let caps = d.capabilities(&id("seq")).unwrap();
        assert!(caps.stateful);
    }

    #[test]
    fn test_error_display_contains_chain() {
        let d = dispatcher();
        d.register_pipeline(&pipeline("t", &["utf8", "reverse"]))
            .unwrap();
        let err = d.decode(&id("t"), Envelope::bytes(vec![0xff])).unwrap_err();
        assert!(err.to_string().starts_with("decode via t > utf8 failed"));
    }
}
