use num_enum::{IntoPrimitive, TryFromPrimitive};

/// First byte of every codestream marker.
pub const J2K_MARKER_START_BYTE: u8 = 0xFF;

/// Marker codes defined in ISO/IEC 15444-1 Annex A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum J2kMarkerCode {
    /// SOC: Start of codestream. Must be the first marker.
    StartOfCodestream = 0xFF4F,
    /// CAP: Extended capabilities (Part 15 and later).
    Capability = 0xFF50,
    /// SIZ: Image and tile size.
    ImageAndTileSize = 0xFF51,
    /// COD: Coding style default.
    CodingStyleDefault = 0xFF52,
    /// COC: Coding style for a single component.
    CodingStyleComponent = 0xFF53,
    /// TLM: Tile-part lengths.
    TilePartLengths = 0xFF55,
    /// PLM: Packet lengths, main header.
    PacketLengthsMain = 0xFF57,
    /// PLT: Packet lengths, tile-part header.
    PacketLengthsTilePart = 0xFF58,
    /// QCD: Quantization default.
    QuantizationDefault = 0xFF5C,
    /// QCC: Quantization for a single component.
    QuantizationComponent = 0xFF5D,
    /// RGN: Region of interest.
    RegionOfInterest = 0xFF5E,
    /// POC: Progression order change.
    ProgressionOrderChange = 0xFF5F,
    /// PPM: Packed packet headers, main header.
    PackedPacketHeadersMain = 0xFF60,
    /// PPT: Packed packet headers, tile-part header.
    PackedPacketHeadersTilePart = 0xFF61,
    /// CRG: Component registration.
    ComponentRegistration = 0xFF63,
    /// COM: Comment.
    Comment = 0xFF64,
    /// SOT: Start of tile-part.
    StartOfTile = 0xFF90,
    /// SOP: Start of packet.
    StartOfPacket = 0xFF91,
    /// EPH: End of packet header.
    EndOfPacketHeader = 0xFF92,
    /// SOD: Start of data.
    StartOfData = 0xFF93,
    /// EOC: End of codestream.
    EndOfCodestream = 0xFFD9,
}

impl J2kMarkerCode {
    /// Three-letter mnemonic used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::StartOfCodestream => "SOC",
            Self::Capability => "CAP",
            Self::ImageAndTileSize => "SIZ",
            Self::CodingStyleDefault => "COD",
            Self::CodingStyleComponent => "COC",
            Self::TilePartLengths => "TLM",
            Self::PacketLengthsMain => "PLM",
            Self::PacketLengthsTilePart => "PLT",
            Self::QuantizationDefault => "QCD",
            Self::QuantizationComponent => "QCC",
            Self::RegionOfInterest => "RGN",
            Self::ProgressionOrderChange => "POC",
            Self::PackedPacketHeadersMain => "PPM",
            Self::PackedPacketHeadersTilePart => "PPT",
            Self::ComponentRegistration => "CRG",
            Self::Comment => "COM",
            Self::StartOfTile => "SOT",
            Self::StartOfPacket => "SOP",
            Self::EndOfPacketHeader => "EPH",
            Self::StartOfData => "SOD",
            Self::EndOfCodestream => "EOC",
        }
    }

    /// Marker segments that alter decoding in ways this decoder does not model.
    pub fn is_unsupported_segment(self) -> bool {
        matches!(
            self,
            Self::CodingStyleComponent
                | Self::QuantizationComponent
                | Self::RegionOfInterest
                | Self::ProgressionOrderChange
                | Self::PackedPacketHeadersMain
                | Self::PackedPacketHeadersTilePart
        )
    }
}
