//! Errors - codec 失敗の分類
//!
//! 失敗原因ごとに別の variant を持たせ、呼び出し側が
//! 「codec の選び間違い（InputShapeMismatch）」と
//! 「データ破損（MalformedInput）」を区別できるようにします。
//!
//! コンポジット codec の中で起きた失敗は `Stage` variant で包まれ、
//! どの段（index と CodecId）で失敗したかを保持します。

use serde::Serialize;

use super::envelope::Shape;
use super::ids::CodecId;

/// ErrorKind はすべての層で共通のエラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InputShapeMismatch,
    MalformedInput,
    Internal,
    NotFound,
    DuplicateId,
    InvalidRegistration,
    UnknownStage,
    NonInvertibleStage,
    NonEncodableStage,
    EmptyPipeline,
    /// The codec exists but lacks the requested direction.
    Unsupported,
}

/// EncodeError は encode の失敗
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("input shape mismatch: expected {expected}, got {actual}")]
    InputShapeMismatch { expected: Shape, actual: Shape },

    #[error("value cannot be encoded: {0}")]
    MalformedInput(String),

    #[error("internal encoder fault: {0}")]
    Internal(String),

    #[error("stage {index} ({id}) failed to encode")]
    Stage {
        index: usize,
        id: CodecId,
        #[source]
        source: Box<EncodeError>,
    },
}

/// DecodeError は decode の失敗
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("input shape mismatch: expected {expected}, got {actual}")]
    InputShapeMismatch { expected: Shape, actual: Shape },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("internal decoder fault: {0}")]
    Internal(String),

    #[error("stage {index} ({id}) failed to decode")]
    Stage {
        index: usize,
        id: CodecId,
        #[source]
        source: Box<DecodeError>,
    },
}

/// 一段分のコンポジット位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFrame {
    pub index: usize,
    pub id: CodecId,
}

impl EncodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        EncodeError::MalformedInput(reason.into())
    }

    pub fn in_stage(self, index: usize, id: CodecId) -> Self {
        EncodeError::Stage {
            index,
            id,
            source: Box::new(self),
        }
    }

    /// 最内の（Stage ではない）エラーの分類
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::InputShapeMismatch { .. } => ErrorKind::InputShapeMismatch,
            EncodeError::MalformedInput(_) => ErrorKind::MalformedInput,
            EncodeError::Internal(_) => ErrorKind::Internal,
            EncodeError::Stage { source, .. } => source.kind(),
        }
    }

    /// Stage の入れ子を外側から順に返す
    pub fn stage_path(&self) -> Vec<StageFrame> {
        let mut frames = Vec::new();
        let mut current = self;
        while let EncodeError::Stage { index, id, source } = current {
            frames.push(StageFrame {
                index: *index,
                id: id.clone(),
            });
            current = &**source;
        }
        frames
    }

    pub fn leaf(&self) -> &EncodeError {
        match self {
            EncodeError::Stage { source, .. } => source.leaf(),
            other => other,
        }
    }
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::MalformedInput(reason.into())
    }

    pub fn in_stage(self, index: usize, id: CodecId) -> Self {
        DecodeError::Stage {
            index,
            id,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::InputShapeMismatch { .. } => ErrorKind::InputShapeMismatch,
            DecodeError::MalformedInput(_) => ErrorKind::MalformedInput,
            DecodeError::Internal(_) => ErrorKind::Internal,
            DecodeError::Stage { source, .. } => source.kind(),
        }
    }

    pub fn stage_path(&self) -> Vec<StageFrame> {
        let mut frames = Vec::new();
        let mut current = self;
        while let DecodeError::Stage { index, id, source } = current {
            frames.push(StageFrame {
                index: *index,
                id: id.clone(),
            });
            current = &**source;
        }
        frames
    }

    pub fn leaf(&self) -> &DecodeError {
        match self {
            DecodeError::Stage { source, .. } => source.leaf(),
            other => other,
        }
    }
}
