use super::bit_io::PacketBitReader;
use super::tag_tree::TagTree;
use crate::error::J2kError;
use crate::jpeg_marker_code::J2kMarkerCode;
use log::trace;

/// Initial number of bits for code-block lengths (B.10.7.1).
const LBLOCK_BASE: u32 = 3;

/// Upper bound asked of the zero bit-plane tag tree.
const ZERO_BITPLANE_THRESHOLD: u32 = 0xFF;

/// Tag trees of one precinct, built over its code-block grid.
pub struct PrecinctState {
    pub inclusion_tree: TagTree,
    pub zero_bp_tree: TagTree,
    grid_width: usize,
    grid_height: usize,
}

impl PrecinctState {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            inclusion_tree: TagTree::new(w, h),
            zero_bp_tree: TagTree::new(w, h),
            grid_width: w,
            grid_height: h,
        }
    }

    pub fn codeblock_count(&self) -> usize {
        self.grid_width * self.grid_height
    }
}

/// Per code-block information carried by a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockInfo {
    /// Raster index within the precinct grid.
    pub index: usize,
    pub zero_bitplanes: u32,
    pub num_passes: u32,
    pub data_len: u32,
}

/// Marker options from the COD coding style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMarkers {
    pub sop: bool,
    pub eph: bool,
}

pub struct PacketHeader {
    pub codeblocks: Vec<CodeBlockInfo>,
}

impl PacketHeader {
    /// Read the header of the single layer's packet for a precinct.
    ///
    /// On return the reader is byte aligned at the first code-block body.
    pub fn read(
        reader: &mut PacketBitReader,
        state: &mut PrecinctState,
        markers: PacketMarkers,
    ) -> Result<Self, J2kError> {
        if markers.sop {
            skip_sop(reader)?;
        }

        // Zero-length packets carry no code-block contributions.
        if reader.read_bit()? == 0 {
            return Err(J2kError::EmptyPacket);
        }

        let mut codeblocks = Vec::with_capacity(state.codeblock_count());
        for index in 0..state.codeblock_count() {
            let included = state.inclusion_tree.decode(reader, index, 0)?;
            if included != Some(0) {
                return Err(J2kError::CodeBlockNotIncluded);
            }

            let zero_bitplanes = state
                .zero_bp_tree
                .decode(reader, index, ZERO_BITPLANE_THRESHOLD)?
                .ok_or(J2kError::UnresolvedZeroBitplanes)?;

            let num_passes = read_num_passes(reader)?;

            let mut lblock = LBLOCK_BASE;
            while reader.read_bit()? == 1 {
                lblock += 1;
            }
            let length_bits = lblock + num_passes.ilog2();
            if length_bits > 32 {
                return Err(J2kError::InvalidLengthBits(length_bits));
            }
            let data_len = reader.read_bits(length_bits)?;

            trace!(
                "codeblock {}: zero bit-planes {}, {} passes, {} bytes",
                index, zero_bitplanes, num_passes, data_len
            );
            codeblocks.push(CodeBlockInfo {
                index,
                zero_bitplanes,
                num_passes,
                data_len,
            });
        }

        reader.align_to_byte();
        if markers.eph {
            if reader.peek_u16() != Some(u16::from(J2kMarkerCode::EndOfPacketHeader)) {
                return Err(J2kError::MissingMarker("EPH"));
            }
            reader.read_bytes(2)?;
        }

        Ok(Self { codeblocks })
    }
}

/// Number of coding passes (Table B.4).
pub fn read_num_passes(reader: &mut PacketBitReader) -> Result<u32, J2kError> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let bits = reader.read_bits(2)?;
    if bits != 3 {
        return Ok(3 + bits);
    }
    let bits = reader.read_bits(5)?;
    if bits != 31 {
        return Ok(6 + bits);
    }
    Ok(37 + reader.read_bits(7)?)
}

/// Consumes an SOP marker segment if one starts at the reader position.
fn skip_sop(reader: &mut PacketBitReader) -> Result<(), J2kError> {
    if reader.peek_u16() == Some(u16::from(J2kMarkerCode::StartOfPacket)) {
        let segment = reader.read_bytes(6)?;
        let lsop = u16::from_be_bytes([segment[2], segment[3]]);
        if lsop != 4 {
            return Err(J2kError::InvalidSegmentLength {
                marker: "SOP",
                length: lsop as u32,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Packs a string of '0'/'1' characters MSB first, zero padded.
    fn bits(s: &str) -> Vec<u8> {
        let digits: Vec<u8> = s.bytes().filter(|b| *b == b'0' || *b == b'1').collect();
        digits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, b)| acc | ((b - b'0') << (7 - i)))
            })
            .collect()
    }

    #[test]
    fn test_num_passes_ladder() {
        let cases = [
            ("0", 1),
            ("10", 2),
            ("1100", 3),
            ("1110", 5),
            ("1111 00000", 6),
            ("1111 11110", 36),
            ("1111 11111 0000000", 37),
            ("1111 11111 1111111", 164),
        ];
        for (pattern, expected) in cases {
            let data = bits(pattern);
            let mut reader = PacketBitReader::new(&data);
            assert_eq!(read_num_passes(&mut reader).unwrap(), expected, "{}", pattern);
        }
    }

    #[test]
    fn test_packet_single_codeblock() {
        // present, included, zbp=2 ("001"), 1 pass, lblock 3, length 5 in 3 bits
        let data = bits("1 1 001 0 0 101");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(1, 1);
        let header = PacketHeader::read(&mut reader, &mut state, PacketMarkers::default()).unwrap();
        assert_eq!(
            header.codeblocks,
            vec![CodeBlockInfo {
                index: 0,
                zero_bitplanes: 2,
                num_passes: 1,
                data_len: 5,
            }]
        );
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_lblock_grows_length_field() {
        // 3 passes: length bits = lblock(3 + 2) + floor(log2 3) = 6
        let data = bits("1 1 1 1100 110 000111");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(1, 1);
        let header = PacketHeader::read(&mut reader, &mut state, PacketMarkers::default()).unwrap();
        let cb = header.codeblocks[0];
        assert_eq!((cb.zero_bitplanes, cb.num_passes, cb.data_len), (0, 3, 7));
    }

    #[test]
    fn test_two_codeblocks_share_tree_bits() {
        // Root inclusion "1" then leaf "1"; second leaf "1".
        // zbp root "1" (0), leaf "1"; second leaf "01" (1).
        let data = bits("1  11 11 0 0 001  1 01 0 0 010");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(2, 1);
        let header = PacketHeader::read(&mut reader, &mut state, PacketMarkers::default()).unwrap();
        let summary: Vec<_> = header
            .codeblocks
            .iter()
            .map(|c| (c.index, c.zero_bitplanes, c.data_len))
            .collect();
        assert_eq!(summary, vec![(0, 0, 1), (1, 1, 2)]);
    }

    #[test]
    fn test_empty_and_excluded() {
        let data = bits("0");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(1, 1);
        assert_eq!(
            PacketHeader::read(&mut reader, &mut state, PacketMarkers::default()).err(),
            Some(J2kError::EmptyPacket)
        );

        // present, inclusion "0" (value > 0)
        let data = bits("10");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(1, 1);
        let err = PacketHeader::read(&mut reader, &mut state, PacketMarkers::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "J2K: codeblock not included");
    }

    #[test]
    fn test_sop_and_eph() {
        let mut data = vec![0xFF, 0x91, 0x00, 0x04, 0x00, 0x00];
        data.extend(bits("1 1 1 0 0 000"));
        data.extend_from_slice(&[0xFF, 0x92, 0xAB]);
        let mut reader = PacketBitReader::with_bit_stuffing(&data);
        let mut state = PrecinctState::new(1, 1);
        let markers = PacketMarkers { sop: true, eph: true };
        let header = PacketHeader::read(&mut reader, &mut state, markers).unwrap();
        assert_eq!(header.codeblocks[0].data_len, 0);
        assert_eq!(reader.read_bytes(1).unwrap(), &[0xAB]);

        // EPH required once signalled.
        let data = bits("1 1 1 0 0 000");
        let mut reader = PacketBitReader::new(&data);
        let mut state = PrecinctState::new(1, 1);
        assert_eq!(
            PacketHeader::read(&mut reader, &mut state, markers).err(),
            Some(J2kError::MissingMarker("EPH"))
        );
    }
}
