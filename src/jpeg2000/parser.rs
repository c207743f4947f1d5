//! JPEG 2000 Codestream Parser.
//!
//! Handles the parsing of the Main Header (SOC, SIZ, COD, QCD) and of the
//! single supported Tile-Part Header (SOT, SOD).

use super::image::{CodeBlockStyle, CodestreamHeader, J2kCod, J2kComponentInfo, J2kQcd};
use crate::codestream_reader::CodestreamReader;
use crate::error::J2kError;
use crate::jpeg_marker_code::J2kMarkerCode;
use log::debug;

/// Highest component count allowed by SIZ.
const MAX_COMPONENTS: u16 = 16384;

/// Marker codes 0xFF30..=0xFF3F carry no segment.
const RESERVED_DELIMITERS: std::ops::RangeInclusive<u16> = 0xFF30..=0xFF3F;

/// Image and tile size (SIZ) marker information.
#[derive(Debug, Clone, Default)]
struct J2kSiz {
    width: u32,
    height: u32,
    components: Vec<J2kComponentInfo>,
}

/// Result of scanning the main header.
#[derive(Debug, Clone)]
pub struct MainHeader {
    pub header: CodestreamHeader,
    /// Offset of the first SOT marker, `None` if EOC ended the header.
    pub first_tile_part: Option<usize>,
}

/// A parser that transforms raw J2K marker segments into structured metadata.
pub struct J2kParser<'a> {
    reader: CodestreamReader<'a>,
    siz: Option<J2kSiz>,
    cod: Option<J2kCod>,
    qcd: Option<J2kQcd>,
}

impl<'a> J2kParser<'a> {
    pub fn new(codestream: &'a [u8]) -> Self {
        Self {
            reader: CodestreamReader::new(codestream),
            siz: None,
            cod: None,
            qcd: None,
        }
    }

    pub fn parse_main_header(mut self) -> Result<MainHeader, J2kError> {
        self.reader.expect_marker(J2kMarkerCode::StartOfCodestream)?;

        let first_tile_part = loop {
            if self.reader.is_empty() {
                return Err(J2kError::MissingMarker("SOT"));
            }
            let offset = self.reader.position();
            let code = self.reader.read_marker_code()?;
            if RESERVED_DELIMITERS.contains(&code) {
                continue;
            }

            match J2kMarkerCode::try_from(code) {
                Ok(J2kMarkerCode::StartOfTile) => break Some(offset),
                Ok(J2kMarkerCode::EndOfCodestream) => break None,
                Ok(J2kMarkerCode::ImageAndTileSize) => {
                    let segment = self.reader.read_segment("SIZ")?;
                    self.parse_siz(segment)?;
                }
                Ok(J2kMarkerCode::CodingStyleDefault) => {
                    let segment = self.reader.read_segment("COD")?;
                    self.parse_cod(segment)?;
                }
                Ok(J2kMarkerCode::QuantizationDefault) => {
                    let segment = self.reader.read_segment("QCD")?;
                    self.parse_qcd(segment)?;
                }
                Ok(
                    J2kMarkerCode::StartOfCodestream
                    | J2kMarkerCode::StartOfData
                    | J2kMarkerCode::StartOfPacket
                    | J2kMarkerCode::EndOfPacketHeader,
                ) => {
                    return Err(J2kError::MarkerExpected {
                        offset,
                        found: code,
                    });
                }
                Ok(marker) if marker.is_unsupported_segment() => {
                    return Err(J2kError::UnsupportedMarker(code));
                }
                Ok(marker) => {
                    // COM, CAP, TLM, PLM, CRG
                    self.reader.read_segment(marker.name())?;
                }
                Err(_) => {
                    self.reader.read_segment("unknown")?;
                }
            }
        };

        let siz = self.siz.ok_or(J2kError::MissingMarker("SIZ"))?;
        let cod = self.cod.ok_or(J2kError::MissingMarker("COD"))?;
        let qcd = self.qcd.ok_or(J2kError::MissingMarker("QCD"))?;

        let first = siz.components[0];
        let header = CodestreamHeader {
            width: siz.width,
            height: siz.height,
            components: siz.components.len() as u32,
            bit_depth: first.depth,
            is_signed: first.is_signed,
            guard_bits: qcd.guard_bits,
            num_resolutions: cod.decomposition_levels.saturating_add(1),
            mct: cod.mct,
            component_info: siz.components,
            cod,
            qcd,
        };
        header.validate()?;

        debug!(
            "J2K header: {}x{}, {} component(s), {}-bit {}, guard bits {}, codeblock {}x{}, style {:#04x}",
            header.width,
            header.height,
            header.components,
            header.bit_depth,
            if header.is_signed { "signed" } else { "unsigned" },
            header.guard_bits,
            header.codeblock_width(),
            header.codeblock_height(),
            header.cod.codeblock_style.0
        );

        Ok(MainHeader {
            header,
            first_tile_part,
        })
    }

    fn parse_siz(&mut self, segment: &[u8]) -> Result<(), J2kError> {
        let mut reader = CodestreamReader::new(segment);
        let _caps = reader.read_u16()?; // Rsiz
        let xsiz = reader.read_u32()?;
        let ysiz = reader.read_u32()?;
        let x_origin = reader.read_u32()?;
        let y_origin = reader.read_u32()?;
        let tile_width = reader.read_u32()?;
        let tile_height = reader.read_u32()?;
        let tile_x_origin = reader.read_u32()?;
        let tile_y_origin = reader.read_u32()?;

        let csiz = reader.read_u16()?;
        if csiz == 0 || csiz > MAX_COMPONENTS {
            return Err(J2kError::InvalidCsiz(csiz));
        }
        if segment.len() != 36 + 3 * csiz as usize {
            return Err(J2kError::InvalidSegmentLength {
                marker: "SIZ",
                length: segment.len() as u32 + 2,
            });
        }

        if xsiz <= x_origin || ysiz <= y_origin || tile_width == 0 || tile_height == 0 {
            return Err(J2kError::InvalidImageSize {
                width: xsiz.saturating_sub(x_origin),
                height: ysiz.saturating_sub(y_origin),
            });
        }
        if x_origin != 0 || y_origin != 0 {
            return Err(J2kError::unsupported("image offset", x_origin.max(y_origin)));
        }
        if tile_x_origin != 0 || tile_y_origin != 0 {
            return Err(J2kError::unsupported(
                "tile offset",
                tile_x_origin.max(tile_y_origin),
            ));
        }
        let tiles = xsiz.div_ceil(tile_width) as u64 * ysiz.div_ceil(tile_height) as u64;
        if tiles != 1 {
            return Err(J2kError::unsupported(
                "tile count",
                tiles.min(u32::MAX as u64) as u32,
            ));
        }

        let mut components = Vec::with_capacity(csiz as usize);
        for _ in 0..csiz {
            let depth_byte = reader.read_u8()?;
            let info = J2kComponentInfo {
                depth: (depth_byte & 0x7F) + 1,
                is_signed: (depth_byte & 0x80) != 0,
                dx: reader.read_u8()?,
                dy: reader.read_u8()?,
            };
            if info.dx != 1 || info.dy != 1 {
                return Err(J2kError::unsupported("subsampling", info.dx.max(info.dy)));
            }
            components.push(info);
        }
        let first = components[0];
        if let Some(other) = components
            .iter()
            .find(|c| c.depth != first.depth || c.is_signed != first.is_signed)
        {
            return Err(J2kError::unsupported("mixed component depth", other.depth));
        }

        self.siz = Some(J2kSiz {
            width: xsiz - x_origin,
            height: ysiz - y_origin,
            components,
        });
        Ok(())
    }

    fn parse_cod(&mut self, segment: &[u8]) -> Result<(), J2kError> {
        if segment.len() < 10 {
            return Err(J2kError::InvalidSegmentLength {
                marker: "COD",
                length: segment.len() as u32 + 2,
            });
        }
        let mut reader = CodestreamReader::new(segment);
        let scod = reader.read_u8()?; // coding style flags
        let sprog = reader.read_u8()?; // progression order
        let nlayers = reader.read_u16()?; // number of layers
        let mct = reader.read_u8()?; // multi-component transform flag
        let decomposition_levels = reader.read_u8()?;
        let codeblock_width_exp = reader.read_u8()?; // log2(width) - 2
        let codeblock_height_exp = reader.read_u8()?;
        let codeblock_style = CodeBlockStyle(reader.read_u8()?);
        let transformation = reader.read_u8()?;

        if scod & J2kCod::PRECINCTS != 0 {
            return Err(J2kError::unsupported("precincts", scod));
        }
        if sprog != 0 {
            return Err(J2kError::unsupported("progression order", sprog));
        }
        if nlayers != 1 {
            return Err(J2kError::unsupported("layers", nlayers));
        }
        if codeblock_width_exp > 8
            || codeblock_height_exp > 8
            || codeblock_width_exp + codeblock_height_exp > 8
        {
            return Err(J2kError::InvalidCodeBlockSize {
                width_exp: codeblock_width_exp,
                height_exp: codeblock_height_exp,
            });
        }
        if codeblock_style.bypass() || codeblock_style.terminate_all() {
            return Err(J2kError::unsupported("code-block style", codeblock_style.0));
        }
        if transformation != J2kCod::REVERSIBLE_5_3 {
            return Err(J2kError::unsupported("transformation", transformation));
        }

        self.cod = Some(J2kCod {
            coding_style: scod,
            progression_order: sprog,
            number_of_layers: nlayers,
            mct,
            decomposition_levels,
            codeblock_width_exp,
            codeblock_height_exp,
            codeblock_style,
            transformation,
        });
        Ok(())
    }

    fn parse_qcd(&mut self, segment: &[u8]) -> Result<(), J2kError> {
        let mut reader = CodestreamReader::new(segment);
        let sqcd = reader
            .read_u8()
            .map_err(|_| J2kError::InvalidSegmentLength {
                marker: "QCD",
                length: 2,
            })?;
        let quant_style = sqcd & 0x1F;

        if quant_style != 0 {
            return Err(J2kError::unsupported("quantization style", quant_style));
        }
        // No quantization: one exponent byte per subband.
        let mut step_sizes = Vec::new();
        while !reader.is_empty() {
            step_sizes.push((reader.read_u8()? as u16) << 8);
        }

        self.qcd = Some(J2kQcd {
            quant_style: sqcd,
            guard_bits: sqcd >> 5,
            step_sizes,
        });
        Ok(())
    }
}

/// The packet data of a tile-part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePart<'a> {
    pub tile_index: u16,
    /// Bytes between SOD and the end of the tile-part.
    pub data: &'a [u8],
}

/// Reads the SOT segment at `sot_offset` and returns the packet bytes that
/// follow its SOD marker.
pub fn extract_tile_part(codestream: &[u8], sot_offset: usize) -> Result<TilePart<'_>, J2kError> {
    let mut reader = CodestreamReader::at(codestream, sot_offset);
    reader.expect_marker(J2kMarkerCode::StartOfTile)?;

    let lsot = reader.read_u16()?;
    if lsot != 10 {
        return Err(J2kError::InvalidSegmentLength {
            marker: "SOT",
            length: lsot as u32,
        });
    }
    let isot = reader.read_u16()?;
    let psot = reader.read_u32()?;
    let tpsot = reader.read_u8()?;
    let tnsot = reader.read_u8()?;

    if tpsot != 0 || tnsot != 1 {
        return Err(J2kError::MultipleTileParts {
            index: tpsot,
            count: tnsot,
        });
    }
    if isot != 0 {
        return Err(J2kError::unsupported("Isot", isot));
    }

    let end = if psot == 0 {
        if codestream.ends_with(&[0xFF, 0xD9]) {
            codestream.len() - 2
        } else {
            codestream.len()
        }
    } else {
        // SOT segment (12 bytes) and SOD marker are part of Psot.
        match sot_offset.checked_add(psot as usize) {
            Some(end) if psot >= 14 && end <= codestream.len() => end,
            _ => return Err(J2kError::InvalidPsot(psot)),
        }
    };

    reader.expect_marker(J2kMarkerCode::StartOfData)?;
    let start = reader.position();
    let data = codestream
        .get(start..end)
        .ok_or(J2kError::InvalidPsot(psot))?;

    debug!(
        "J2K tile-part {}: Psot={}, {} data bytes at offset {}",
        isot,
        psot,
        data.len(),
        start
    );

    Ok(TilePart {
        tile_index: isot,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siz(width: u32, height: u32, csiz: u16, ssiz: u8) -> Vec<u8> {
        let mut data = vec![0xFF, 0x51];
        data.extend_from_slice(&(38 + 3 * csiz).to_be_bytes()); // Lsiz
        data.extend_from_slice(&[0x00, 0x00]); // Rsiz
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[0; 8]); // image offset
        data.extend_from_slice(&width.to_be_bytes()); // tile size
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[0; 8]); // tile offset
        data.extend_from_slice(&csiz.to_be_bytes());
        for _ in 0..csiz {
            data.extend_from_slice(&[ssiz, 0x01, 0x01]);
        }
        data
    }

    fn cod(scod: u8, sprog: u8, layers: u16, mct: u8, levels: u8, style: u8) -> Vec<u8> {
        let mut data = vec![0xFF, 0x52, 0x00, 0x0C, scod, sprog];
        data.extend_from_slice(&layers.to_be_bytes());
        data.extend_from_slice(&[mct, levels, 0x04, 0x04, style, 0x01]);
        data
    }

    fn qcd(guard_bits: u8) -> Vec<u8> {
        vec![0xFF, 0x5C, 0x00, 0x04, guard_bits << 5, 0x40]
    }

    fn stream(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0xFF, 0x4F];
        for s in segments {
            data.extend_from_slice(s);
        }
        data.extend_from_slice(&[0xFF, 0x90]);
        data
    }

    fn parse(data: &[u8]) -> Result<MainHeader, J2kError> {
        J2kParser::new(data).parse_main_header()
    }

    #[test]
    fn test_parse_main_header() {
        let data = stream(&[siz(4, 4, 1, 0x07), cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        let main = parse(&data).unwrap();
        let h = &main.header;
        assert_eq!((h.width, h.height, h.components), (4, 4, 1));
        assert_eq!((h.bit_depth, h.is_signed), (8, false));
        assert_eq!(h.guard_bits, 2);
        assert_eq!((h.num_resolutions, h.mct), (1, 0));
        assert_eq!(h.qcd.step_sizes, vec![0x4000]);
        assert_eq!(h.codeblock_width(), 64);
        assert_eq!(main.first_tile_part, Some(data.len() - 2));
    }

    #[test]
    fn test_marker_order_and_skipped_segments() {
        let comment = vec![0xFF, 0x64, 0x00, 0x05, 0x00, 0x01, b'x'];
        let data = stream(&[qcd(1), comment, cod(0x06, 0, 1, 0, 0, 0), siz(3, 2, 3, 0x07)]);
        let h = parse(&data).unwrap().header;
        assert_eq!((h.width, h.height, h.components), (3, 2, 3));
        assert!(h.cod.uses_sop() && h.cod.uses_eph());
        assert_eq!(h.guard_bits, 1);
    }

    #[test]
    fn test_header_ends_at_eoc() {
        let mut data = stream(&[siz(4, 4, 1, 0x07), cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        let len = data.len();
        data[len - 1] = 0xD9;
        assert_eq!(parse(&data).unwrap().first_tile_part, None);
    }

    #[test]
    fn test_invalid_csiz() {
        let data = stream(&[siz(4, 4, 0, 0x07), cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().starts_with("J2K: invalid Csiz"));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_unsupported_values_named() {
        let cases = [
            (cod(0x01, 0, 1, 0, 0, 0), "precincts"),
            (cod(0, 1, 1, 0, 0, 0), "progression order: 1"),
            (cod(0, 0, 3, 0, 0, 0), "layers: 3"),
            (cod(0, 0, 1, 0, 2, 0), "numResolutions: 3"),
            (cod(0, 0, 1, 1, 0, 0), "mct: 1"),
            (cod(0, 0, 1, 0, 0, 0x01), "code-block style"),
        ];
        for (segment, field) in cases {
            let data = stream(&[siz(4, 4, 1, 0x07), segment, qcd(2)]);
            let err = parse(&data).unwrap_err();
            assert!(err.is_unsupported(), "{}", field);
            assert!(err.to_string().contains(field), "{} vs {}", err, field);
        }

        let data = stream(&[siz(4, 4, 1, 0x0B), cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        assert!(parse(&data).unwrap_err().to_string().contains("bitDepth: 12"));
        let data = stream(&[siz(4, 4, 2, 0x07), cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        assert!(parse(&data).unwrap_err().to_string().contains("components: 2"));
    }

    #[test]
    fn test_rejects_irreversible_and_scalar_quantization() {
        let mut irreversible = cod(0, 0, 1, 0, 0, 0);
        *irreversible.last_mut().unwrap() = 0x00;
        let data = stream(&[siz(4, 4, 1, 0x07), irreversible, qcd(2)]);
        let err = parse(&data).unwrap_err();
        assert_eq!(err, J2kError::unsupported("transformation", 0u8));
        assert!(err.is_unsupported());

        for style in [1u8, 2] {
            let expounded = vec![0xFF, 0x5C, 0x00, 0x05, (2 << 5) | style, 0x38, 0x02];
            let data = stream(&[siz(4, 4, 1, 0x07), cod(0, 0, 1, 0, 0, 0), expounded]);
            let err = parse(&data).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("J2K: unsupported quantization style: {}", style)
            );
        }
    }

    #[test]
    fn test_missing_segments() {
        let data = stream(&[siz(4, 4, 1, 0x07), qcd(2)]);
        assert_eq!(parse(&data).unwrap_err(), J2kError::MissingMarker("COD"));
        let data = stream(&[cod(0, 0, 1, 0, 0, 0), qcd(2)]);
        assert_eq!(parse(&data).unwrap_err(), J2kError::MissingMarker("SIZ"));
        assert_eq!(parse(&[0xFF, 0x51]).unwrap_err(), J2kError::MissingMarker("SOC"));
    }

    #[test]
    fn test_segment_length_validation() {
        let mut data = stream(&[siz(4, 4, 1, 0x07)]);
        data.truncate(10);
        assert!(matches!(
            parse(&data),
            Err(J2kError::InvalidSegmentLength { marker: "SIZ", .. })
        ));

        let data = [0xFF, 0x4F, 0xFF, 0x52, 0x00, 0x01];
        assert!(matches!(
            parse(&data),
            Err(J2kError::InvalidSegmentLength { length: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_markers() {
        let poc = vec![0xFF, 0x5F, 0x00, 0x02];
        let data = stream(&[siz(4, 4, 1, 0x07), poc]);
        assert_eq!(parse(&data).unwrap_err(), J2kError::UnsupportedMarker(0xFF5F));
    }

    fn tile_part(tpsot: u8, tnsot: u8, psot: u32, body: &[u8]) -> Vec<u8> {
        let mut data = vec![0xFF, 0x90, 0x00, 0x0A, 0x00, 0x00];
        data.extend_from_slice(&psot.to_be_bytes());
        data.extend_from_slice(&[tpsot, tnsot, 0xFF, 0x93]);
        data.extend_from_slice(body);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    #[test]
    fn test_extract_tile_part() {
        let data = tile_part(0, 1, 17, &[0xAA, 0xBB, 0xCC]);
        let part = extract_tile_part(&data, 0).unwrap();
        assert_eq!(part.data, &[0xAA, 0xBB, 0xCC]);
        assert_eq!(part.tile_index, 0);

        // Psot = 0 runs to EOC.
        let data = tile_part(0, 1, 0, &[0x01, 0x02]);
        assert_eq!(extract_tile_part(&data, 0).unwrap().data, &[0x01, 0x02]);
    }

    #[test]
    fn test_multi_tile_part_rejected() {
        let data = tile_part(0, 2, 15, &[0x00]);
        let err = extract_tile_part(&data, 0).unwrap_err();
        assert!(err.to_string().contains("only single tile-part supported"));
        assert!(err.is_unsupported());
        let data = tile_part(1, 1, 15, &[0x00]);
        assert!(matches!(
            extract_tile_part(&data, 0),
            Err(J2kError::MultipleTileParts { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_tile_part_errors() {
        let mut data = tile_part(0, 1, 15, &[0x00]);
        data[12] = 0xFF;
        data[13] = 0x64; // COM where SOD belongs
        assert!(
            extract_tile_part(&data, 0)
                .unwrap_err()
                .to_string()
                .contains("missing SOD")
        );

        let mut data = tile_part(0, 1, 15, &[0x00]);
        data[3] = 0x0B;
        assert!(matches!(
            extract_tile_part(&data, 0),
            Err(J2kError::InvalidSegmentLength { marker: "SOT", length: 11 })
        ));

        let data = tile_part(0, 1, 400, &[0x00]);
        assert_eq!(extract_tile_part(&data, 0), Err(J2kError::InvalidPsot(400)));
        let data = tile_part(0, 1, 12, &[0x00]);
        assert_eq!(extract_tile_part(&data, 0), Err(J2kError::InvalidPsot(12)));
    }
}
