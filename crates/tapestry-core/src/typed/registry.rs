//! CodecRegistry - codec の登録と解決
//!
//! # 学習ポイント
//! - `Arc<dyn Encoder>` / `Arc<dyn Decoder>` で型消去された codec を管理
//! - copy-on-write snapshot（`ArcSwap`）で読み取りをロックフリーにする
//! - 書き込みは `Mutex` で直列化し、新しい snapshot を丸ごと差し替える
//!
//! # 並行性
//! - `resolve` / `list` はいつでも並行に呼べる
//! - `register` / `replace` は互いに直列化される
//! - 読み手は古い snapshot か新しい snapshot のどちらかを見る（途中状態は見えない）

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::adapter::{Typed, TypedDecoder, TypedEncoder};
use super::contract::{Decoder, Encoder};
use crate::app::pipeline::{CompositeCodec, PipelinePlan};
use crate::domain::{CodecId, CodecMetadata, ErrorKind, RegistrationId};

/// CodecHandle は 1 つの codec インスタンスの encode 側と decode 側
#[derive(Clone, Default)]
pub struct CodecHandle {
    pub encoder: Option<Arc<dyn Encoder>>,
    pub decoder: Option<Arc<dyn Decoder>>,
}

impl CodecHandle {
    pub fn new(encoder: Option<Arc<dyn Encoder>>, decoder: Option<Arc<dyn Decoder>>) -> Self {
        Self { encoder, decoder }
    }

    /// 双方向の typed codec（encode と decode で同じインスタンスを共有）
    pub fn typed<C: TypedEncoder + TypedDecoder>(codec: C) -> Self {
        let codec = Arc::new(Typed::new(codec));
        Self {
            encoder: Some(codec.clone()),
            decoder: Some(codec),
        }
    }

    pub fn encode_only<C: TypedEncoder>(codec: C) -> Self {
        Self {
            encoder: Some(Arc::new(Typed::new(codec))),
            decoder: None,
        }
    }

    pub fn decode_only<C: TypedDecoder>(codec: C) -> Self {
        Self {
            encoder: None,
            decoder: Some(Arc::new(Typed::new(codec))),
        }
    }
}

impl fmt::Debug for CodecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecHandle")
            .field("encoder", &self.encoder.is_some())
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

/// 状態を持つ codec を毎回新しく作る factory
pub type CodecFactory = Arc<dyn Fn() -> CodecHandle + Send + Sync>;

/// CodecSource は registration が codec インスタンスをどう提供するか
#[derive(Clone)]
pub enum CodecSource {
    /// 純粋な codec。1 インスタンスを全員で共有する。
    Shared(CodecHandle),
    /// 状態を持つ codec。利用者ごとに factory から作る。
    PerInstance(CodecFactory),
    /// 検証済みのパイプライン。
    Composite(Arc<PipelinePlan>),
}

impl fmt::Debug for CodecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSource::Shared(handle) => f.debug_tuple("Shared").field(handle).finish(),
            CodecSource::PerInstance(_) => f.write_str("PerInstance"),
            CodecSource::Composite(plan) => f
                .debug_tuple("Composite")
                .field(&plan.stage_ids())
                .finish(),
        }
    }
}

/// Registration は CodecId と codec 実装・メタデータの対応
///
/// 登録後は不変。差し替えは `CodecRegistry::replace` で新しい
/// Registration ごと入れ替えます（`registration_id` も変わる）。
#[derive(Debug, Clone)]
pub struct Registration {
    id: CodecId,
    registration_id: RegistrationId,
    registered_at: DateTime<Utc>,
    metadata: CodecMetadata,
    source: CodecSource,
    can_encode: bool,
    can_decode: bool,
}

impl Registration {
    /// encoder / decoder のどちらか（または両方）を持つ純粋な codec
    pub fn new(
        id: CodecId,
        encoder: Option<Arc<dyn Encoder>>,
        decoder: Option<Arc<dyn Decoder>>,
        metadata: CodecMetadata,
    ) -> Self {
        Self::from_source(id, CodecSource::Shared(CodecHandle::new(encoder, decoder)), metadata)
    }

    pub fn typed<C: TypedEncoder + TypedDecoder>(
        id: CodecId,
        codec: C,
        metadata: CodecMetadata,
    ) -> Self {
        Self::from_source(id, CodecSource::Shared(CodecHandle::typed(codec)), metadata)
    }

    pub fn encode_only<C: TypedEncoder>(id: CodecId, codec: C, metadata: CodecMetadata) -> Self {
        Self::from_source(id, CodecSource::Shared(CodecHandle::encode_only(codec)), metadata)
    }

    /// 状態を持つ codec。`metadata.stateful` は常に true になる。
    pub fn stateful<F>(id: CodecId, factory: F, metadata: CodecMetadata) -> Self
    where
        F: Fn() -> CodecHandle + Send + Sync + 'static,
    {
        Self::from_source(id, CodecSource::PerInstance(Arc::new(factory)), metadata.stateful())
    }

    pub(crate) fn composite(id: CodecId, plan: PipelinePlan, description: Option<String>) -> Self {
        let mut metadata = plan.metadata();
        metadata.description = description;
        Self::from_source(id, CodecSource::Composite(Arc::new(plan)), metadata)
    }

    fn from_source(id: CodecId, source: CodecSource, metadata: CodecMetadata) -> Self {
        let (can_encode, can_decode) = match &source {
            CodecSource::Shared(handle) => (handle.encoder.is_some(), handle.decoder.is_some()),
            CodecSource::PerInstance(factory) => {
                let probe = factory();
                (probe.encoder.is_some(), probe.decoder.is_some())
            }
            CodecSource::Composite(plan) => (true, plan.is_invertible()),
        };
        Self {
            id,
            registration_id: RegistrationId::generate(),
            registered_at: Utc::now(),
            metadata,
            source,
            can_encode,
            can_decode,
        }
    }

    pub fn id(&self) -> &CodecId {
        &self.id
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.registration_id
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn metadata(&self) -> &CodecMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &CodecSource {
        &self.source
    }

    pub fn can_encode(&self) -> bool {
        self.can_encode
    }

    pub fn can_decode(&self) -> bool {
        self.can_decode
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.source, CodecSource::Composite(_))
    }

    /// codec インスタンスを取得
    ///
    /// - Shared: 共有インスタンスの clone（Arc のみ）
    /// - PerInstance: factory から新しく作る
    /// - Composite: 段ごとに instantiate した新しい CompositeCodec
    pub fn instantiate(&self) -> CodecHandle {
        match &self.source {
            CodecSource::Shared(handle) => handle.clone(),
            CodecSource::PerInstance(factory) => factory(),
            CodecSource::Composite(plan) => {
                let composite =
                    Arc::new(CompositeCodec::from_plan(Some(self.id.clone()), plan.clone()));
                let decoder: Option<Arc<dyn Decoder>> = if plan.is_invertible() {
                    Some(composite.clone())
                } else {
                    None
                };
                let encoder: Arc<dyn Encoder> = composite;
                CodecHandle::new(Some(encoder), decoder)
            }
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if !self.can_encode && !self.can_decode {
            return Err(RegistryError::InvalidRegistration {
                id: self.id.clone(),
                reason: "neither encoder nor decoder provided",
            });
        }
        if self.metadata.stateful && matches!(self.source, CodecSource::Shared(_)) {
            return Err(RegistryError::InvalidRegistration {
                id: self.id.clone(),
                reason: "stateful codecs must be registered with a factory",
            });
        }
        Ok(())
    }
}

/// RegistryError は CodecRegistry の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("codec '{0}' is already registered")]
    DuplicateId(CodecId),

    #[error("codec '{0}' is not registered")]
    NotFound(CodecId),

    #[error("invalid registration for '{id}': {reason}")]
    InvalidRegistration { id: CodecId, reason: &'static str },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateId(_) => ErrorKind::DuplicateId,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::InvalidRegistration { .. } => ErrorKind::InvalidRegistration,
        }
    }
}

/// 同じ id が登録済みのときの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterMode {
    /// DuplicateId で失敗する
    Reject,
    /// 既存の登録を原子的に差し替える
    Replace,
}

#[derive(Debug, Default)]
struct Snapshot {
    revision: u64,
    entries: BTreeMap<CodecId, Arc<Registration>>,
}

/// CodecRegistry は CodecId から Registration を引く
///
/// # 使用例
/// ```ignore
/// let registry = CodecRegistry::new();
/// registry.register(Registration::typed(id, Reverse, CodecMetadata::new()))?;
///
/// let reg = registry.resolve(&id)?;
/// let handle = reg.instantiate();
/// ```
pub struct CodecRegistry {
    state: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// 新しい codec を登録する。同じ id があれば DuplicateId。
    pub fn register(&self, registration: Registration) -> Result<(), RegistryError> {
        self.insert(registration, RegisterMode::Reject).map(|_| ())
    }

    /// 登録または差し替え。差し替えた場合は以前の Registration を返す。
    pub fn replace(
        &self,
        registration: Registration,
    ) -> Result<Option<Arc<Registration>>, RegistryError> {
        self.insert(registration, RegisterMode::Replace)
    }

    pub fn insert(
        &self,
        registration: Registration,
        mode: RegisterMode,
    ) -> Result<Option<Arc<Registration>>, RegistryError> {
        registration.validate()?;

        let _guard = self.write_lock.lock();
        let current = self.state.load_full();
        let previous = current.entries.get(registration.id()).cloned();
        if previous.is_some() && mode == RegisterMode::Reject {
            return Err(RegistryError::DuplicateId(registration.id().clone()));
        }

        let id = registration.id().clone();
        let registration_id = registration.registration_id();
        let mut entries = current.entries.clone();
        entries.insert(id.clone(), Arc::new(registration));
        self.state.store(Arc::new(Snapshot {
            revision: current.revision + 1,
            entries,
        }));

        match &previous {
            Some(old) => debug!(
                codec = %id,
                registration = %registration_id,
                previous = %old.registration_id(),
                "codec replaced"
            ),
            None => debug!(codec = %id, registration = %registration_id, "codec registered"),
        }
        Ok(previous)
    }

    pub fn resolve(&self, id: &CodecId) -> Result<Arc<Registration>, RegistryError> {
        self.state
            .load()
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &CodecId) -> bool {
        self.state.load().entries.contains_key(id)
    }

    /// 登録済み id の一覧（呼び出し時点の snapshot に固定）
    pub fn list(&self) -> CodecListing {
        CodecListing {
            snapshot: self.state.load_full(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 書き込みのたびに 1 ずつ増える
    pub fn revision(&self) -> u64 {
        self.state.load().revision
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.state.load();
        f.debug_struct("CodecRegistry")
            .field("revision", &snapshot.revision)
            .field("codecs", &snapshot.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// CodecListing は snapshot に固定された id の列
///
/// `iter()` は何度でも呼べて、毎回同じ順序（id の昇順）で同じ列を返します。
/// 後から登録された codec は含まれません。
#[derive(Debug, Clone)]
pub struct CodecListing {
    snapshot: Arc<Snapshot>,
}

impl CodecListing {
    pub fn iter(&self) -> impl Iterator<Item = &CodecId> + '_ {
        self.snapshot.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.snapshot.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a CodecListing {
    type Item = &'a CodecId;
    type IntoIter = std::collections::btree_map::Keys<'a, CodecId, Arc<Registration>>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshot.entries.keys()
    }
}
