//! Constrained JPEG 2000 codestream decoder for PDF `/JPXDecode` streams.
//!
//! Only a narrow profile of Part 1 is accepted: a single tile and tile-part,
//! no wavelet decomposition, one quality layer and 8-bit samples. Anything
//! outside that profile is rejected with [`J2kError`] so callers can fall
//! back to another decoder.

pub mod codestream_reader;
pub mod error;
pub mod jpeg2000;
pub mod jpeg_marker_code;

pub use error::J2kError;
pub use jpeg2000::decoder::{J2kDecoder, decode, read_header};
pub use jpeg2000::image::{CodestreamHeader, DecodeOptions, DecodedImage};
