//! Bit-plane decoding of code-blocks (ISO/IEC 15444-1 Annex D).

use super::image::{CodeBlockStyle, SubbandOrientation};
use super::mq_coder::MqDecoder;
use crate::error::J2kError;

/// Context labels used by the coding passes.
pub const CONTEXT_COUNT: usize = 19;
const SC_BASE: usize = 9;
const MR_FIRST_NO_NEIGHBOURS: usize = 14;
const MR_FIRST_WITH_NEIGHBOURS: usize = 15;
const MR_SUBSEQUENT: usize = 16;
const RUN_LENGTH: usize = 17;
const UNIFORM: usize = 18;

const SEGMENTATION_SYMBOL: u8 = 0b1010;

/// Keeps doubled magnitudes within `i32`.
const MAX_BITPLANES: i32 = 29;

// Coefficient state bits
const SIG: u8 = 1 << 0;
/// Coded by significance propagation in the current bit-plane.
const VISITED: u8 = 1 << 1;
const REFINED: u8 = 1 << 2;
const SIGN: u8 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    SignificancePropagation,
    MagnitudeRefinement,
    Cleanup,
}

/// Tier-1 decoder for a single code-block.
///
/// Samples are returned in raster order at twice their magnitude, so the
/// coefficient is `value >> 1`. Blocks truncated above bit-plane 0 get the
/// midpoint of their remaining interval.
pub struct BitPlaneDecoder {
    width: usize,
    height: usize,
    orientation: SubbandOrientation,
    style: CodeBlockStyle,
    /// Padded by one sample on each side.
    state: Vec<u8>,
    stride: usize,
    magnitude: Vec<u32>,
    last_plane: Vec<u8>,
}

impl BitPlaneDecoder {
    pub fn new(
        width: usize,
        height: usize,
        orientation: SubbandOrientation,
        style: CodeBlockStyle,
    ) -> Self {
        let stride = width + 2;
        Self {
            width,
            height,
            orientation,
            style,
            state: vec![0; stride * (height + 2)],
            stride,
            magnitude: vec![0; width * height],
            last_plane: vec![0; width * height],
        }
    }

    /// Number of passes coded from `start_bitplane` down to bit-plane 0.
    pub fn max_passes(start_bitplane: i32) -> u32 {
        1 + 3 * start_bitplane.max(0) as u32
    }

    /// Runs `num_passes` coding passes starting with a cleanup pass on
    /// `start_bitplane`.
    pub fn decode(
        &mut self,
        mq: &mut MqDecoder,
        num_passes: u32,
        start_bitplane: i32,
    ) -> Result<Vec<i32>, J2kError> {
        if !(0..MAX_BITPLANES).contains(&start_bitplane) {
            return Err(J2kError::InvalidStartBitplane(start_bitplane));
        }
        let available = Self::max_passes(start_bitplane);
        if num_passes > available {
            return Err(J2kError::TooManyPasses {
                passes: num_passes,
                available,
            });
        }

        self.state.fill(0);
        self.magnitude.fill(0);
        self.last_plane.fill(0);
        init_contexts(mq)?;

        let mut plane = start_bitplane as u8;
        let mut pass = Pass::Cleanup;
        for _ in 0..num_passes {
            match pass {
                Pass::SignificancePropagation => {
                    self.significance_propagation(mq, plane);
                    pass = Pass::MagnitudeRefinement;
                }
                Pass::MagnitudeRefinement => {
                    self.magnitude_refinement(mq, plane);
                    pass = Pass::Cleanup;
                }
                Pass::Cleanup => {
                    self.cleanup(mq, plane);
                    if self.style.segmentation_symbols() {
                        let symbol =
                            (0..4).fold(0u8, |acc, _| (acc << 1) | mq.decode_bit(UNIFORM) as u8);
                        if symbol != SEGMENTATION_SYMBOL {
                            return Err(J2kError::InvalidSegmentationSymbol(symbol));
                        }
                    }
                    for s in &mut self.state {
                        *s &= !VISITED;
                    }
                    plane = plane.saturating_sub(1);
                    pass = Pass::SignificancePropagation;
                }
            }
            if self.style.reset_contexts() {
                init_contexts(mq)?;
            }
        }

        Ok(self.samples())
    }

    fn samples(&self) -> Vec<i32> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let i = y * self.width + x;
                let mag = self.magnitude[i];
                if mag == 0 {
                    out.push(0);
                    continue;
                }
                let plane = self.last_plane[i];
                let half = if plane > 0 { 1u32 << plane } else { 0 };
                let value = (2 * mag + half) as i32;
                let negative = self.state[self.index(x, y)] & SIGN != 0;
                out.push(if negative { -value } else { value });
            }
        }
        out
    }

    fn significance_propagation(&mut self, mq: &mut MqDecoder, plane: u8) {
        for y0 in (0..self.height).step_by(4) {
            for x in 0..self.width {
                for y in y0..(y0 + 4).min(self.height) {
                    let p = self.index(x, y);
                    if self.state[p] & SIG != 0 {
                        continue;
                    }
                    let (h, v, d) = self.neighbour_counts(p, y);
                    if h + v + d == 0 {
                        continue;
                    }
                    let cx = self.zero_coding_context(h, v, d);
                    self.state[p] |= VISITED;
                    if mq.decode_bit(cx) == 1 {
                        self.become_significant(mq, x, y, plane);
                    }
                }
            }
        }
    }

    fn magnitude_refinement(&mut self, mq: &mut MqDecoder, plane: u8) {
        for y0 in (0..self.height).step_by(4) {
            for x in 0..self.width {
                for y in y0..(y0 + 4).min(self.height) {
                    let p = self.index(x, y);
                    if self.state[p] & (SIG | VISITED) != SIG {
                        continue;
                    }
                    let cx = if self.state[p] & REFINED != 0 {
                        MR_SUBSEQUENT
                    } else {
                        let (h, v, d) = self.neighbour_counts(p, y);
                        if h + v + d > 0 {
                            MR_FIRST_WITH_NEIGHBOURS
                        } else {
                            MR_FIRST_NO_NEIGHBOURS
                        }
                    };
                    let i = y * self.width + x;
                    self.magnitude[i] |= mq.decode_bit(cx) << plane;
                    self.last_plane[i] = plane;
                    self.state[p] |= REFINED;
                }
            }
        }
    }

    fn cleanup(&mut self, mq: &mut MqDecoder, plane: u8) {
        for y0 in (0..self.height).step_by(4) {
            let stripe_end = (y0 + 4).min(self.height);
            for x in 0..self.width {
                let mut y = y0;
                if stripe_end - y0 == 4 && self.run_length_applies(x, y0) {
                    if mq.decode_bit(RUN_LENGTH) == 0 {
                        continue;
                    }
                    let run = (mq.decode_bit(UNIFORM) << 1) | mq.decode_bit(UNIFORM);
                    y = y0 + run as usize;
                    self.become_significant(mq, x, y, plane);
                    y += 1;
                }
                while y < stripe_end {
                    let p = self.index(x, y);
                    if self.state[p] & (SIG | VISITED) == 0 {
                        let (h, v, d) = self.neighbour_counts(p, y);
                        let cx = self.zero_coding_context(h, v, d);
                        if mq.decode_bit(cx) == 1 {
                            self.become_significant(mq, x, y, plane);
                        }
                    }
                    y += 1;
                }
            }
        }
    }

    /// A full stripe column with no significant neighbourhood is run-length coded.
    fn run_length_applies(&self, x: usize, y0: usize) -> bool {
        (y0..y0 + 4).all(|y| {
            let p = self.index(x, y);
            let (h, v, d) = self.neighbour_counts(p, y);
            self.state[p] & (SIG | VISITED) == 0 && h + v + d == 0
        })
    }

    fn become_significant(&mut self, mq: &mut MqDecoder, x: usize, y: usize, plane: u8) {
        let p = self.index(x, y);
        let (cx, xor) = self.sign_context(p, y);
        let negative = mq.decode_bit(cx) ^ xor;
        self.state[p] |= SIG;
        if negative == 1 {
            self.state[p] |= SIGN;
        }
        let i = y * self.width + x;
        self.magnitude[i] = 1 << plane;
        self.last_plane[i] = plane;
    }

    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.stride + x + 1
    }

    /// Samples below row `y` belong to the next stripe and are ignored in
    /// vertically causal mode.
    fn below_visible(&self, y: usize) -> bool {
        !(self.style.vertically_causal() && y % 4 == 3)
    }

    fn significant(&self, p: usize) -> u32 {
        (self.state[p] & SIG != 0) as u32
    }

    fn neighbour_counts(&self, p: usize, y: usize) -> (u32, u32, u32) {
        let up = p - self.stride;
        let h = self.significant(p - 1) + self.significant(p + 1);
        let mut v = self.significant(up);
        let mut d = self.significant(up - 1) + self.significant(up + 1);
        if self.below_visible(y) {
            let down = p + self.stride;
            v += self.significant(down);
            d += self.significant(down - 1) + self.significant(down + 1);
        }
        (h, v, d)
    }

    /// Table D.1
    fn zero_coding_context(&self, h: u32, v: u32, d: u32) -> usize {
        match self.orientation {
            SubbandOrientation::LL | SubbandOrientation::LH => zc_low_high(h, v, d),
            SubbandOrientation::HL => zc_low_high(v, h, d),
            SubbandOrientation::HH => zc_high_high(h + v, d),
        }
    }

    fn sign_contribution(&self, p: usize) -> i32 {
        match self.state[p] & (SIG | SIGN) {
            0 | SIGN => 0,
            SIG => 1,
            _ => -1,
        }
    }

    /// Table D.3: context label and the XOR bit applied to the decoded sign.
    fn sign_context(&self, p: usize, y: usize) -> (usize, u32) {
        let h = (self.sign_contribution(p - 1) + self.sign_contribution(p + 1)).clamp(-1, 1);
        let mut v = self.sign_contribution(p - self.stride);
        if self.below_visible(y) {
            v += self.sign_contribution(p + self.stride);
        }
        let v = v.clamp(-1, 1);
        let (offset, xor) = match (h, v) {
            (1, 1) => (4, 0),
            (1, 0) => (3, 0),
            (1, -1) => (2, 0),
            (0, 1) => (1, 0),
            (0, 0) => (0, 0),
            (0, -1) => (1, 1),
            (-1, 1) => (2, 1),
            (-1, 0) => (3, 1),
            _ => (4, 1),
        };
        (SC_BASE + offset, xor)
    }
}

/// Initial context states of Table D.7.
fn init_contexts(mq: &mut MqDecoder) -> Result<(), J2kError> {
    mq.reset_contexts(0, 0)?;
    mq.set_context(0, 4, 0)?;
    mq.set_context(RUN_LENGTH, 3, 0)?;
    mq.set_context(UNIFORM, 46, 0)?;
    Ok(())
}

fn zc_low_high(h: u32, v: u32, d: u32) -> usize {
    match (h, v, d) {
        (2, _, _) => 8,
        (1, 1.., _) => 7,
        (1, 0, 1..) => 6,
        (1, 0, 0) => 5,
        (0, 2, _) => 4,
        (0, 1, _) => 3,
        (0, 0, 2..) => 2,
        (0, 0, 1) => 1,
        _ => 0,
    }
}

fn zc_high_high(hv: u32, d: u32) -> usize {
    match (d, hv) {
        (3.., _) => 8,
        (2, 1..) => 7,
        (2, 0) => 6,
        (1, 2..) => 5,
        (1, 1) => 4,
        (1, 0) => 3,
        (0, 2..) => 2,
        (0, 1) => 1,
        _ => 0,
    }
}
