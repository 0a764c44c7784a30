use core::fmt;

/// Failure while encoding a frame into a caller-owned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The output buffer ran out; `needed` is how many more octets the
    /// failing write wanted. Callers that can grow their buffer retry
    /// on this variant.
    BufferTooSmall { needed: usize },
    /// The value cannot be represented on the wire (bit-string with more
    /// than seven unused bits, length beyond a u32, priority outside
    /// 1..=16).
    ValueOutOfRange,
    /// A length field or MAC is inconsistent with its container.
    InvalidLength,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed } => {
                write!(f, "buffer too small ({needed} more octet(s) needed)")
            }
            Self::ValueOutOfRange => f.write_str("value not representable on the wire"),
            Self::InvalidLength => f.write_str("inconsistent length"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

/// Failure while decoding received octets.
///
/// The variants separate the three ways BACnet input goes wrong: the
/// datagram ends early ([`Truncated`](Self::Truncated)), the tag framing
/// itself is broken ([`MalformedTag`](Self::MalformedTag)), or a
/// well-formed tag appears where the service grammar does not allow it
/// ([`UnexpectedTag`](Self::UnexpectedTag)). Transports and the network
/// layer drop the failing frame; a server decoding the data of a
/// confirmed request maps the variant onto its Reject reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended before the structure did; `needed` is how many
    /// octets the failing read still wanted.
    Truncated { needed: usize },
    /// Broken tag framing: an unknown application tag number, a reserved
    /// length code, or tag octets cut short.
    MalformedTag,
    /// A valid tag that this production does not accept (wrong context
    /// number, missing opening/closing pair, datatype mismatch).
    UnexpectedTag,
    /// A length field is out of range for the datatype it describes.
    InvalidLength,
    /// The octets decode but the value is outside its domain.
    InvalidValue,
    /// A character string in a set this build does not transcode; the
    /// raw bytes are still available through the raw-string value path.
    UnknownCharacterSet(u8),
    /// Grammar-specific diagnosis with no better variant.
    Message(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed } => {
                write!(f, "input truncated ({needed} more octet(s) needed)")
            }
            Self::MalformedTag => f.write_str("malformed tag"),
            Self::UnexpectedTag => f.write_str("tag not allowed here"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::InvalidValue => f.write_str("invalid value"),
            Self::UnknownCharacterSet(set) => {
                write!(f, "character set {set} is not transcoded")
            }
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::{DecodeError, EncodeError};

    #[test]
    fn truncation_reports_shortfall() {
        let e = DecodeError::Truncated { needed: 3 };
        assert!(e.to_string().contains("3 more"));
        let e = EncodeError::BufferTooSmall { needed: 7 };
        assert!(e.to_string().contains("7 more"));
    }
}
