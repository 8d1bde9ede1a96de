//! Domain identifiers.
//!
//! # CodecId
//! レジストリ内で codec を一意に指す名前です。
//! - 空文字は不可
//! - 大文字小文字を区別する（`Hex` と `hex` は別物）
//! - 前後の空白・制御文字は不可
//! - 任意で `@v{major}` のバージョン接尾辞を持てる（例: `reverse@v2`）
//!
//! # Id<T>
//! 登録やコンポジットのインスタンスを追跡するための ULID ベースの ID です。
//! Phantom type パターンで `RegistrationId` と `InstanceId` を型で区別します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdError は CodecId の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("codec id must not be empty")]
    Empty,

    #[error("codec id '{0}' has leading or trailing whitespace")]
    Whitespace(String),

    #[error("codec id {0:?} contains control characters")]
    ControlCharacter(String),

    #[error("codec id '{0}' has a malformed version suffix (expected '@v<major>')")]
    BadVersion(String),
}

/// CodecId は registered codec の名前
///
/// # 使用例
/// ```ignore
/// let id = CodecId::new("reverse@v2")?;
/// assert_eq!(id.name(), "reverse");
/// assert_eq!(id.version(), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodecId {
    value: String,
    version: Option<u32>,
}

impl CodecId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.trim() != value {
            return Err(IdError::Whitespace(value));
        }
        if value.chars().any(char::is_control) {
            return Err(IdError::ControlCharacter(value));
        }
        let version = match value.split_once('@') {
            None => None,
            Some((name, suffix)) => {
                let major = suffix
                    .strip_prefix('v')
                    .filter(|digits| {
                        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                    })
                    .and_then(|digits| digits.parse::<u32>().ok());
                match major {
                    Some(major) if !name.is_empty() => Some(major),
                    _ => return Err(IdError::BadVersion(value)),
                }
            }
        };
        Ok(Self { value, version })
    }

    /// 名前部分（バージョン接尾辞を除く）
    pub fn name(&self) -> &str {
        match self.value.split_once('@') {
            Some((name, _)) => name,
            None => &self.value,
        }
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl TryFrom<String> for CodecId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CodecId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CodecId> for String {
    fn from(id: CodecId) -> Self {
        id.value
    }
}

impl std::str::FromStr for CodecId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.value)
    }
}

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "reg-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 新しい ID を生成
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Registration のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Registration {}

impl IdMarker for Registration {
    fn prefix() -> &'static str {
        "reg-"
    }
}

/// コンポジット codec インスタンスのマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instance {}

impl IdMarker for Instance {
    fn prefix() -> &'static str {
        "inst-"
    }
}

/// Identifier of one registration (changes on every replace).
pub type RegistrationId = Id<Registration>;

/// Identifier of one instantiated composite codec.
pub type InstanceId = Id<Instance>;
