//! Codec metadata: what a registration promises about its codec.

use serde::{Deserialize, Serialize};

/// Describes a codec's contract to callers and to the pipeline composer.
///
/// Defaults are the conservative ones: lossless, pure (stateless) and
/// non-blocking. A codec that breaks any of those must say so here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `decode(encode(x)) == x` for every `x` the codec accepts.
    #[serde(default = "default_true")]
    pub lossless: bool,

    /// The codec mutates internal state across calls.
    /// Stateful codecs get a fresh instance per composite and per dispatch.
    #[serde(default)]
    pub stateful: bool,

    /// The codec may block on I/O.
    #[serde(default)]
    pub blocking: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CodecMetadata {
    fn default() -> Self {
        Self {
            description: None,
            lossless: true,
            stateful: false,
            blocking: false,
        }
    }
}

impl CodecMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn lossy(mut self) -> Self {
        self.lossless = false;
        self
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Metadata of a chain: lossless only if every stage is,
    /// stateful/blocking if any stage is.
    pub fn combine<'a>(stages: impl IntoIterator<Item = &'a CodecMetadata>) -> Self {
        stages.into_iter().fold(Self::default(), |acc, m| Self {
            description: None,
            lossless: acc.lossless && m.lossless,
            stateful: acc.stateful || m.stateful,
            blocking: acc.blocking || m.blocking,
        })
    }
}
