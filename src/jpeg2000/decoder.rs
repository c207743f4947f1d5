//! JPEG 2000 Decoder.
//!
//! This module provides the `J2kDecoder` which manages the high-level
//! decoding process: header parsing, tile-part extraction, packet headers,
//! and dispatching each code-block to the Tier-1 decoder.

use super::bit_io::PacketBitReader;
use super::bit_plane_coder::{BitPlaneDecoder, CONTEXT_COUNT};
use super::image::{CodestreamHeader, DecodeOptions, DecodedImage, SubbandOrientation};
use super::mq_coder::MqDecoder;
use super::packet::{PacketHeader, PacketMarkers, PrecinctState};
use super::parser::{J2kParser, extract_tile_part};
use crate::error::J2kError;
use log::{debug, trace};

/// Decodes `codestream` after checking its size against `options`.
pub fn decode(codestream: &[u8], options: DecodeOptions) -> Result<DecodedImage, J2kError> {
    J2kDecoder::new(codestream).decode(options)
}

/// Parses and validates the main header without decoding any data.
pub fn read_header(codestream: &[u8]) -> Result<CodestreamHeader, J2kError> {
    J2kDecoder::new(codestream).read_header()
}

/// Geometry of the code-block partition of one component.
#[derive(Debug, Clone, Copy)]
struct CodeBlockGrid {
    block_width: u32,
    block_height: u32,
    columns: u32,
    rows: u32,
}

impl CodeBlockGrid {
    fn new(header: &CodestreamHeader) -> Self {
        let block_width = header.codeblock_width();
        let block_height = header.codeblock_height();
        Self {
            block_width,
            block_height,
            columns: header.width.div_ceil(block_width),
            rows: header.height.div_ceil(block_height),
        }
    }

    /// Origin and size of code-block `index` clipped to the image.
    fn block_rect(&self, index: usize, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (index as u32 % self.columns) * self.block_width;
        let y0 = (index as u32 / self.columns) * self.block_height;
        (
            x0,
            y0,
            self.block_width.min(width - x0),
            self.block_height.min(height - y0),
        )
    }
}

/// High-level JPEG 2000 Decoder.
/// Orchestrates parsing, block decoding, and output reconstruction.
pub struct J2kDecoder<'a> {
    codestream: &'a [u8],
}

impl<'a> J2kDecoder<'a> {
    pub fn new(codestream: &'a [u8]) -> Self {
        Self { codestream }
    }

    pub fn read_header(&self) -> Result<CodestreamHeader, J2kError> {
        Ok(J2kParser::new(self.codestream).parse_main_header()?.header)
    }

    /// Decodes the single tile into an interleaved 8-bit raster.
    pub fn decode(&self, options: DecodeOptions) -> Result<DecodedImage, J2kError> {
        let main = J2kParser::new(self.codestream).parse_main_header()?;
        let header = main.header;

        if header.width != options.expected_width || header.height != options.expected_height {
            return Err(J2kError::SizeMismatch {
                expected_width: options.expected_width,
                expected_height: options.expected_height,
                width: header.width,
                height: header.height,
            });
        }

        let sot_offset = main
            .first_tile_part
            .ok_or(J2kError::MissingMarker("SOT"))?;
        let tile_part = extract_tile_part(self.codestream, sot_offset)?;
        debug!(
            "decoding tile {}: {} component packet(s) in {} bytes",
            tile_part.tile_index,
            header.components,
            tile_part.data.len()
        );

        let width = header.width as usize;
        let height = header.height as usize;
        let components = header.components as usize;
        let size = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(components))
            .ok_or(J2kError::InvalidImageSize {
                width: header.width,
                height: header.height,
            })?;
        let mut data = vec![0u8; size];

        let grid = CodeBlockGrid::new(&header);
        let markers = PacketMarkers {
            sop: header.cod.uses_sop(),
            eph: header.cod.uses_eph(),
        };
        let mut reader = PacketBitReader::with_bit_stuffing(tile_part.data);

        // Single layer, single resolution, no precincts: one packet per component.
        for component in 0..components {
            let mut precinct = PrecinctState::new(grid.columns as usize, grid.rows as usize);
            let packet = PacketHeader::read(&mut reader, &mut precinct, markers)?;

            let mut bodies = Vec::with_capacity(packet.codeblocks.len());
            for cb in &packet.codeblocks {
                bodies.push(reader.read_bytes(cb.data_len as usize)?);
            }
            debug!(
                "component {}: {} code-block(s), packet ends at byte {}",
                component,
                packet.codeblocks.len(),
                reader.position()
            );

            for (cb, body) in packet.codeblocks.iter().zip(bodies) {
                let (x0, y0, w, h) = grid.block_rect(cb.index, header.width, header.height);
                let start_bitplane = header.effective_bit_depth() - 1 - cb.zero_bitplanes as i32;
                if start_bitplane < 0 {
                    return Err(J2kError::InvalidStartBitplane(start_bitplane));
                }
                trace!(
                    "component {} code-block {} at ({}, {}) {}x{}: start bitplane {}, {} passes",
                    component, cb.index, x0, y0, w, h, start_bitplane, cb.num_passes
                );

                let mut mq = MqDecoder::new(body, CONTEXT_COUNT);
                let samples = BitPlaneDecoder::new(
                    w as usize,
                    h as usize,
                    SubbandOrientation::LL,
                    header.cod.codeblock_style,
                )
                .decode(&mut mq, cb.num_passes, start_bitplane)?;

                write_samples(
                    &mut data,
                    &samples,
                    (x0 as usize, y0 as usize, w as usize),
                    width,
                    components,
                    component,
                    header.level_shift(),
                );
            }
        }

        Ok(DecodedImage {
            width: header.width,
            height: header.height,
            components: header.components,
            bits_per_component: header.bit_depth,
            data,
        })
    }
}

/// Level shifts and clamps a code-block's samples into the interleaved raster.
fn write_samples(
    out: &mut [u8],
    samples: &[i32],
    (x0, y0, block_width): (usize, usize, usize),
    width: usize,
    components: usize,
    component: usize,
    level_shift: i32,
) {
    for (i, &sample) in samples.iter().enumerate() {
        let x = x0 + i % block_width;
        let y = y0 + i / block_width;
        let value = ((sample >> 1) + level_shift).clamp(0, 255);
        out[(y * width + x) * components + component] = value as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_samples_level_shift_and_clamp() {
        let mut out = vec![0u8; 2 * 2 * 3];
        write_samples(&mut out, &[0, -300, 600, 20], (0, 0, 2), 2, 3, 1, 128);
        assert_eq!(out, vec![0, 128, 0, 0, 0, 0, 0, 255, 0, 0, 138, 0]);

        let mut signed = vec![0u8; 2];
        write_samples(&mut signed, &[-4, 10], (0, 0, 2), 2, 1, 0, 0);
        assert_eq!(signed, vec![0, 5]);
    }

    #[test]
    fn test_code_block_grid_clips_edges() {
        let grid = CodeBlockGrid {
            block_width: 4,
            block_height: 4,
            columns: 2,
            rows: 2,
        };
        assert_eq!(grid.block_rect(0, 6, 5), (0, 0, 4, 4));
        assert_eq!(grid.block_rect(1, 6, 5), (4, 0, 2, 4));
        assert_eq!(grid.block_rect(3, 6, 5), (4, 4, 2, 1));
    }
}
