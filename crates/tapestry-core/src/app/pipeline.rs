//! Pipeline - 複数の codec を 1 つのコンポジット codec に合成する
//!
//! # 合成のルール
//! - encode は指定順に各段を適用する
//! - decode は逆順に各段の逆変換を適用する（`[A, B, C]` なら `C⁻¹, B⁻¹, A⁻¹`）
//! - 検証は合成時に行う（Fail-fast）。未登録の段や逆変換できない段は
//!   最初の使用時ではなく `compose` の時点でエラーになる
//! - 空のパイプラインは恒等変換として扱わず、EmptyPipeline で拒否する
//!
//! # 状態を持つ段
//! 段の codec は CompositeCodec ごとに `Registration::instantiate` で取得するため、
//! stateful な段は 2 つのコンポジットで共有されません。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::{
    CodecId, CodecMetadata, DecodeError, EncodeError, Envelope, ErrorKind, InstanceId,
};
use crate::typed::{CodecHandle, CodecRegistry, Decoder, Encoder, Registration};

/// パイプラインの段の並び
///
/// JSON では id の配列（`["utf8", "reverse", "offset"]`）になります。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSpec {
    stages: Vec<CodecId>,
}

impl PipelineSpec {
    pub fn new(stages: Vec<CodecId>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[CodecId] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<CodecId> for PipelineSpec {
    fn from_iter<I: IntoIterator<Item = CodecId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// コンポジットに decode を要求するかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// 全段が decoder を持つこと
    #[default]
    Bidirectional,
    /// encode のみ。decoder のない段も許す
    EncodeOnly,
}

/// CompositionError はパイプライン合成時のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("stage {index} ('{id}') is not registered")]
    UnknownStage { index: usize, id: CodecId },

    #[error("stage {index} ('{id}') has no decoder but the pipeline must be invertible")]
    NonInvertibleStage { index: usize, id: CodecId },

    #[error("stage {index} ('{id}') has no encoder")]
    NonEncodableStage { index: usize, id: CodecId },
}

impl CompositionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompositionError::EmptyPipeline => ErrorKind::EmptyPipeline,
            CompositionError::UnknownStage { .. } => ErrorKind::UnknownStage,
            CompositionError::NonInvertibleStage { .. } => ErrorKind::NonInvertibleStage,
            CompositionError::NonEncodableStage { .. } => ErrorKind::NonEncodableStage,
        }
    }

    /// 失敗した段の id（EmptyPipeline では None）
    pub fn stage(&self) -> Option<(usize, &CodecId)> {
        match self {
            CompositionError::EmptyPipeline => None,
            CompositionError::UnknownStage { index, id }
            | CompositionError::NonInvertibleStage { index, id }
            | CompositionError::NonEncodableStage { index, id } => Some((*index, id)),
        }
    }
}

/// PipelinePlan は検証済みのパイプライン
///
/// 合成時点の Registration を保持します。後からレジストリの段が
/// 差し替えられても、既存のプランは合成時の段を使い続けます。
#[derive(Debug)]
pub struct PipelinePlan {
    stages: Vec<Arc<Registration>>,
    mode: CompositionMode,
}

impl PipelinePlan {
    /// spec の全段を解決・検証する
    pub fn resolve(
        registry: &CodecRegistry,
        spec: &PipelineSpec,
        mode: CompositionMode,
    ) -> Result<Self, CompositionError> {
        if spec.is_empty() {
            return Err(CompositionError::EmptyPipeline);
        }

        let stages = spec
            .stages()
            .iter()
            .enumerate()
            .map(|(index, id)| {
                registry
                    .resolve(id)
                    .map_err(|_| CompositionError::UnknownStage { index, id: id.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (index, stage) in stages.iter().enumerate() {
            if !stage.can_encode() {
                return Err(CompositionError::NonEncodableStage {
                    index,
                    id: stage.id().clone(),
                });
            }
            if mode == CompositionMode::Bidirectional && !stage.can_decode() {
                return Err(CompositionError::NonInvertibleStage {
                    index,
                    id: stage.id().clone(),
                });
            }
        }

        debug!(stages = ?spec.stages(), ?mode, "pipeline composed");
        Ok(Self { stages, mode })
    }

    pub fn stage_ids(&self) -> Vec<CodecId> {
        self.stages.iter().map(|s| s.id().clone()).collect()
    }

    pub fn mode(&self) -> CompositionMode {
        self.mode
    }

    pub fn is_invertible(&self) -> bool {
        self.mode == CompositionMode::Bidirectional
    }

    /// 全段のメタデータを合成したもの
    pub fn metadata(&self) -> CodecMetadata {
        let mut metadata = CodecMetadata::combine(self.stages.iter().map(|s| s.metadata()));
        if !self.is_invertible() {
            metadata.lossless = false;
        }
        metadata
    }
}

struct Stage {
    id: CodecId,
    handle: CodecHandle,
}

/// CompositeCodec はパイプラインを 1 つの Encoder / Decoder として扱う
pub struct CompositeCodec {
    id: Option<CodecId>,
    instance: InstanceId,
    plan: Arc<PipelinePlan>,
    stages: Vec<Stage>,
}

impl CompositeCodec {
    /// 段ごとに新しい codec インスタンスを作って CompositeCodec を組み立てる
    pub fn from_plan(id: Option<CodecId>, plan: Arc<PipelinePlan>) -> Self {
        let stages = plan
            .stages
            .iter()
            .map(|reg| Stage {
                id: reg.id().clone(),
                handle: reg.instantiate(),
            })
            .collect();
        Self {
            id,
            instance: InstanceId::generate(),
            plan,
            stages,
        }
    }

    pub fn id(&self) -> Option<&CodecId> {
        self.id.as_ref()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn stage_ids(&self) -> Vec<CodecId> {
        self.stages.iter().map(|s| s.id.clone()).collect()
    }

    pub fn metadata(&self) -> CodecMetadata {
        self.plan.metadata()
    }

    pub fn supports_decode(&self) -> bool {
        self.plan.is_invertible()
    }
}

impl std::fmt::Debug for CompositeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCodec")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("stages", &self.stage_ids())
            .field("mode", &self.plan.mode())
            .finish()
    }
}

impl Encoder for CompositeCodec {
    fn encode(&self, input: Envelope) -> Result<Envelope, EncodeError> {
        let mut value = input;
        for (index, stage) in self.stages.iter().enumerate() {
            let encoder = stage.handle.encoder.as_ref().ok_or_else(|| {
                EncodeError::Internal("stage lost its encoder".to_string())
                    .in_stage(index, stage.id.clone())
            })?;
            trace!(instance = %self.instance, index, stage = %stage.id, "encode stage");
            value = encoder
                .encode(value)
                .map_err(|e| e.in_stage(index, stage.id.clone()))?;
        }
        Ok(value)
    }
}

impl Decoder for CompositeCodec {
    fn decode(&self, input: Envelope) -> Result<Envelope, DecodeError> {
        if !self.plan.is_invertible() {
            return Err(DecodeError::Internal(
                "composite was built encode-only".to_string(),
            ));
        }
        let mut value = input;
        for (index, stage) in self.stages.iter().enumerate().rev() {
            let decoder = stage.handle.decoder.as_ref().ok_or_else(|| {
                DecodeError::Internal("stage lost its decoder".to_string())
                    .in_stage(index, stage.id.clone())
            })?;
            trace!(instance = %self.instance, index, stage = %stage.id, "decode stage");
            value = decoder
                .decode(value)
                .map_err(|e| e.in_stage(index, stage.id.clone()))?;
        }
        Ok(value)
    }
}

/// spec を検証して CompositeCodec を作る
///
/// # Example
/// ```ignore
/// let spec: PipelineSpec = ["reverse", "offset"]
///     .into_iter()
///     .map(CodecId::new)
///     .collect::<Result<_, _>>()?;
/// let codec = compose(&registry, &spec, CompositionMode::Bidirectional)?;
/// let wire = codec.encode(Envelope::bytes(b"hi".to_vec()))?;
/// ```
pub fn compose(
    registry: &CodecRegistry,
    spec: &PipelineSpec,
    mode: CompositionMode,
) -> Result<CompositeCodec, CompositionError> {
    let plan = PipelinePlan::resolve(registry, spec, mode)?;
    Ok(CompositeCodec::from_plan(None, Arc::new(plan)))
}
