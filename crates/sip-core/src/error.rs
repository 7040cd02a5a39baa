use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the message codec and SDP negotiator.
///
/// `MalformedReject` is deliberately separate from the other variants: per
/// spec §4.1 the parser *returns* a malformed-message verdict as a value
/// rather than treating every syntax wrinkle as fatal, so callers can decide
/// whether to drop silently or respond 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid SIP method: {0}")]
    InvalidMethod(String),

    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("invalid SIP URI: {0}")]
    InvalidUri(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("malformed message: {0:?}")]
    Malformed(crate::message::MalformedReject),

    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("no compatible codec")]
    NoCompatibleCodec,
}

#[cfg(feature = "sdp")]
impl From<crate::sdp::SdpError> for Error {
    fn from(e: crate::sdp::SdpError) -> Self {
        match e {
            crate::sdp::SdpError::NoCompatibleCodec => Error::NoCompatibleCodec,
            crate::sdp::SdpError::Malformed(s) => Error::Sdp(s),
        }
    }
}
