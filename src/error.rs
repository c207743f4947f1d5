use thiserror::Error;

/// Errors raised while decoding a JPEG 2000 codestream.
///
/// Every failure is fatal to the current decode. Variants fall into two
/// classes, told apart by [`J2kError::is_unsupported`]: streams that are valid
/// JPEG 2000 but use a feature outside the supported subset, and streams that
/// are malformed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum J2kError {
    // Malformed stream
    #[error("J2K: out of data")]
    UnexpectedEndOfData,
    #[error("J2K: missing {0}")]
    MissingMarker(&'static str),
    #[error("J2K: expected marker at offset {offset}, found {found:#06x}")]
    MarkerExpected { offset: usize, found: u16 },
    #[error("J2K: invalid {marker} segment length {length}")]
    InvalidSegmentLength { marker: &'static str, length: u32 },
    #[error("J2K: invalid Csiz {0}")]
    InvalidCsiz(u16),
    #[error("J2K: invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("J2K: invalid code-block size exponents {width_exp}x{height_exp}")]
    InvalidCodeBlockSize { width_exp: u8, height_exp: u8 },
    #[error("J2K: invalid Psot {0}")]
    InvalidPsot(u32),
    #[error("J2K: invalid start bitplane {0}")]
    InvalidStartBitplane(i32),
    #[error("J2K: unresolved zero bit-plane count")]
    UnresolvedZeroBitplanes,
    #[error("J2K: {passes} coding passes exceed the {available} available")]
    TooManyPasses { passes: u32, available: u32 },
    #[error("J2K: code-block length needs {0} bits")]
    InvalidLengthBits(u32),
    #[error("J2K: invalid segmentation symbol {0:#x}")]
    InvalidSegmentationSymbol(u8),
    #[error("J2K: invalid MQ context {context} (state {state})")]
    InvalidContext { context: usize, state: u8 },
    #[error("J2K: tag tree leaf {0} out of range")]
    InvalidTagTreeLeaf(usize),
    #[error("J2K: invalid bit count {0}")]
    InvalidBitCount(u32),
    #[error("J2K: size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    // Unsupported subset
    #[error("J2K: unsupported {field}: {value}")]
    Unsupported { field: &'static str, value: u32 },
    #[error("J2K: unsupported marker {0:#06x}")]
    UnsupportedMarker(u16),
    #[error("J2K: only single tile-part supported (TPsot={index}, TNsot={count})")]
    MultipleTileParts { index: u8, count: u8 },
    #[error("J2K: empty packets not supported")]
    EmptyPacket,
    #[error("J2K: codeblock not included")]
    CodeBlockNotIncluded,
}

impl J2kError {
    /// Returns `true` for well-formed streams that need a feature this
    /// decoder does not implement, `false` for malformed streams.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Unsupported { .. }
                | Self::UnsupportedMarker(_)
                | Self::MultipleTileParts { .. }
                | Self::EmptyPacket
                | Self::CodeBlockNotIncluded
        )
    }

    pub(crate) fn unsupported(field: &'static str, value: impl Into<u32>) -> Self {
        Self::Unsupported {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(J2kError::EmptyPacket.is_unsupported());
        assert!(J2kError::unsupported("layers", 2u16).is_unsupported());
        assert!(!J2kError::UnexpectedEndOfData.is_unsupported());
        assert!(!J2kError::InvalidCsiz(0).is_unsupported());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            J2kError::unsupported("numResolutions", 3u8).to_string(),
            "J2K: unsupported numResolutions: 3"
        );
        assert_eq!(J2kError::MissingMarker("SOD").to_string(), "J2K: missing SOD");
        let msg = J2kError::MultipleTileParts { index: 0, count: 2 }.to_string();
        assert!(msg.contains("only single tile-part supported"));
    }
}
