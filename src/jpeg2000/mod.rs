//! JPEG 2000 Implementation (Part 1, ISO/IEC 15444-1)
//!
//! The decoding pipeline is split into the following sub-modules:
//!
//! - `parser`: Main header markers (SIZ, COD, QCD) and tile-part extraction.
//! - `packet`: Packet header decoding for the single quality layer.
//! - `tag_tree`: Tag Trees (used in packet headers).
//! - `bit_io`: Bit reader with the packet header bit-stuffing rule.
//! - `mq_coder`: The MQ Arithmetic Decoder (Tier-1 Coding).
//! - `bit_plane_coder`: Context modeling and bit-plane decoding (Tier-1 Coding).
//! - `image`: Header parameters and the decoded raster.
//! - `decoder`: Orchestration from codestream bytes to samples.

pub mod bit_io;
pub mod bit_plane_coder;
pub mod decoder;
pub mod image;
pub mod mq_coder;
pub mod packet;
pub mod parser;
pub mod tag_tree;
