use crate::error::J2kError;

/// Validated main-header parameters of a codestream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodestreamHeader {
    /// Image width in samples (`Xsiz - XOsiz`).
    pub width: u32,
    /// Image height in samples (`Ysiz - YOsiz`).
    pub height: u32,
    /// Number of components (1 or 3).
    pub components: u32,
    /// Bit depth shared by every component.
    pub bit_depth: u8,
    /// Whether component samples are signed.
    pub is_signed: bool,
    /// Guard bits from the QCD marker.
    pub guard_bits: u8,
    /// Number of resolution levels (decomposition levels + 1).
    pub num_resolutions: u8,
    /// Multiple component transform flag.
    pub mct: u8,
    /// Per-component information from SIZ.
    pub component_info: Vec<J2kComponentInfo>,
    /// Coding style default parameters.
    pub cod: J2kCod,
    /// Quantization default parameters.
    pub qcd: J2kQcd,
}

impl CodestreamHeader {
    /// Maximum number of magnitude bit-planes of a coefficient.
    pub fn effective_bit_depth(&self) -> i32 {
        self.bit_depth as i32 + self.guard_bits as i32 - 1
    }

    pub fn codeblock_width(&self) -> u32 {
        1 << (self.cod.codeblock_width_exp + 2)
    }

    pub fn codeblock_height(&self) -> u32 {
        1 << (self.cod.codeblock_height_exp + 2)
    }

    /// Additive offset applied to decoded coefficients.
    pub fn level_shift(&self) -> i32 {
        if self.is_signed {
            0
        } else {
            1 << (self.bit_depth - 1)
        }
    }

    /// Checks the restrictions of the supported subset.
    pub fn validate(&self) -> Result<(), J2kError> {
        if self.num_resolutions != 1 {
            return Err(J2kError::unsupported("numResolutions", self.num_resolutions));
        }
        if self.mct != 0 {
            return Err(J2kError::unsupported("mct", self.mct));
        }
        if self.bit_depth != 8 {
            return Err(J2kError::unsupported("bitDepth", self.bit_depth));
        }
        if self.components != 1 && self.components != 3 {
            return Err(J2kError::unsupported("components", self.components));
        }
        Ok(())
    }
}

/// Metadata for a single component from the SIZ marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct J2kComponentInfo {
    /// bit depth (e.g. 8, 12, 16)
    pub depth: u8,
    /// true if signed, false if unsigned
    pub is_signed: bool,
    /// Horizontal subsampling factor
    pub dx: u8,
    /// Vertical subsampling factor
    pub dy: u8,
}

/// Coding Style Default (COD) marker information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct J2kCod {
    pub coding_style: u8,
    pub progression_order: u8,
    pub number_of_layers: u16,
    pub mct: u8,
    pub decomposition_levels: u8,
    pub codeblock_width_exp: u8,
    pub codeblock_height_exp: u8,
    pub codeblock_style: CodeBlockStyle,
    pub transformation: u8,
}

impl J2kCod {
    pub const PRECINCTS: u8 = 0x01;
    pub const SOP_MARKERS: u8 = 0x02;
    pub const EPH_MARKERS: u8 = 0x04;
    /// `transformation` value of the 5-3 reversible wavelet.
    pub const REVERSIBLE_5_3: u8 = 1;

    pub fn uses_sop(&self) -> bool {
        self.coding_style & Self::SOP_MARKERS != 0
    }

    pub fn uses_eph(&self) -> bool {
        self.coding_style & Self::EPH_MARKERS != 0
    }
}

/// Quantization Default (QCD) marker information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct J2kQcd {
    pub quant_style: u8,
    pub guard_bits: u8,
    /// Raw step size entries, 8-bit values widened to 16 bits.
    pub step_sizes: Vec<u16>,
}

/// Code-block style flags (SPcod, Table A.19).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeBlockStyle(pub u8);

impl CodeBlockStyle {
    pub const BYPASS: u8 = 0x01;
    pub const RESET_CONTEXTS: u8 = 0x02;
    pub const TERMINATE_ALL: u8 = 0x04;
    pub const VERTICALLY_CAUSAL: u8 = 0x08;
    pub const SEGMENTATION_SYMBOLS: u8 = 0x20;

    pub fn bypass(self) -> bool {
        self.0 & Self::BYPASS != 0
    }

    pub fn reset_contexts(self) -> bool {
        self.0 & Self::RESET_CONTEXTS != 0
    }

    pub fn terminate_all(self) -> bool {
        self.0 & Self::TERMINATE_ALL != 0
    }

    pub fn vertically_causal(self) -> bool {
        self.0 & Self::VERTICALLY_CAUSAL != 0
    }

    pub fn segmentation_symbols(self) -> bool {
        self.0 & Self::SEGMENTATION_SYMBOLS != 0
    }
}

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL,
    /// High-Low (horizontal details)
    HL,
    /// Low-High (vertical details)
    LH,
    /// High-High (diagonal details)
    HH,
}

/// Caller-supplied expectations checked against the parsed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub expected_width: u32,
    pub expected_height: u32,
}

impl DecodeOptions {
    pub fn new(expected_width: u32, expected_height: u32) -> Self {
        Self {
            expected_width,
            expected_height,
        }
    }
}

/// Decoded raster, component-interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub bits_per_component: u8,
    /// `width * height * components` bytes.
    pub data: Vec<u8>,
}
