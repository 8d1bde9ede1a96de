//! Domain model (ids, envelope, metadata, errors).

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod metadata;

pub use self::envelope::{Envelope, EnvelopeError, Shape};
pub use self::errors::{DecodeError, EncodeError, ErrorKind, StageFrame};
pub use self::ids::{CodecId, IdError, InstanceId, RegistrationId};
pub use self::metadata::CodecMetadata;
