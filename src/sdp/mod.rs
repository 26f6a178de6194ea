//! SDP parsing, serialization and the remote session description builder.

use thiserror::Error;

mod model;
pub use model::{Field, Fields, Record, SdpMedia, SdpSession, Value};

mod grammar;
pub use grammar::{parse, parse_params, write, write_params};

mod media_section;
pub(crate) use media_section::{AnswerMediaSectionOpts, MediaSection, OfferMediaSectionOpts};

mod remote;
pub(crate) use remote::{MediaSectionIdx, RemoteSdp};

pub(crate) mod utils;

/// SDP errors.
#[derive(Debug, Error, Eq, Clone, PartialEq)]
pub enum SdpError {
    /// The session description misses a field its line rule requires.
    #[error("sdp malformed: {0}")]
    Malformed(String),
}
