//! MQ Arithmetic Decoder (ISO/IEC 15444-1 Annex C)

use crate::error::J2kError;
use log::trace;

/// Number of states in the probability estimation machine.
pub const MQ_STATE_COUNT: usize = 47;

// Standard Table C-2
const QE: [u16; MQ_STATE_COUNT] = [
    0x5601, 0x3401, 0x1801, 0x0AC1, 0x0521, 0x0221, 0x5601, 0x5401, 0x4801, 0x3801, 0x3001,
    0x2401, 0x1C01, 0x1601, 0x5601, 0x5401, 0x5101, 0x4801, 0x3801, 0x3401, 0x3001, 0x2801,
    0x2401, 0x2201, 0x1C01, 0x1801, 0x1601, 0x1401, 0x1201, 0x1101, 0x0AC1, 0x09C1, 0x08A1,
    0x0521, 0x0441, 0x02A1, 0x0221, 0x0141, 0x0111, 0x0085, 0x0049, 0x0025, 0x0015, 0x0009,
    0x0005, 0x0001, 0x5601,
];

const NMPS: [u8; MQ_STATE_COUNT] = [
    1, 2, 3, 4, 5, 38, 7, 8, 9, 10, 11, 12, 13, 29, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 45, 46,
];

const NLPS: [u8; MQ_STATE_COUNT] = [
    1, 6, 9, 12, 29, 33, 6, 14, 14, 14, 17, 18, 20, 21, 14, 14, 15, 16, 17, 18, 19, 19, 20, 21,
    22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 46,
];

const SWITCH: [u8; MQ_STATE_COUNT] = [
    1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Snapshot of the decoder registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqRegisters {
    pub a: u32,
    pub c: u32,
    pub ct: u32,
    pub bp: usize,
}

/// MQ decoder over one codeblock's bytes.
///
/// The input is copied and padded with two 0xFF bytes so that
/// renormalization past the end reads a marker and feeds 1-bits,
/// never out of bounds.
pub struct MqDecoder {
    data: Vec<u8>,
    bp: usize,
    a: u32,
    c: u32,
    ct: u32,
    states: Vec<u8>,
    mps: Vec<u8>,
}

impl MqDecoder {
    /// INITDEC (C.3.5) over `data`, with `num_contexts` contexts reset to (0, 0).
    pub fn new(data: &[u8], num_contexts: usize) -> Self {
        let mut padded = Vec::with_capacity(data.len() + 2);
        padded.extend_from_slice(data);
        padded.extend_from_slice(&[0xFF, 0xFF]);

        let mut decoder = Self {
            c: (padded[0] as u32) << 16,
            data: padded,
            bp: 0,
            a: 0x8000,
            ct: 0,
            states: vec![0; num_contexts],
            mps: vec![0; num_contexts],
        };
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        trace!(
            "MQ init: {} bytes, {} contexts, c={:#010x}",
            data.len(),
            num_contexts,
            decoder.c
        );
        decoder
    }

    pub fn context_count(&self) -> usize {
        self.states.len()
    }

    /// Sets every context to the same state and MPS.
    pub fn reset_contexts(&mut self, state_index: u8, mps: u8) -> Result<(), J2kError> {
        if state_index as usize >= MQ_STATE_COUNT || mps > 1 {
            return Err(J2kError::InvalidContext {
                context: 0,
                state: state_index,
            });
        }
        self.states.fill(state_index);
        self.mps.fill(mps);
        Ok(())
    }

    pub fn set_context(&mut self, cx: usize, state_index: u8, mps: u8) -> Result<(), J2kError> {
        if cx >= self.states.len() || state_index as usize >= MQ_STATE_COUNT || mps > 1 {
            return Err(J2kError::InvalidContext {
                context: cx,
                state: state_index,
            });
        }
        self.states[cx] = state_index;
        self.mps[cx] = mps;
        Ok(())
    }

    /// Current `(state, mps)` of context `cx`.
    pub fn context(&self, cx: usize) -> Option<(u8, u8)> {
        Some((*self.states.get(cx)?, *self.mps.get(cx)?))
    }

    pub fn registers(&self) -> MqRegisters {
        MqRegisters {
            a: self.a,
            c: self.c,
            ct: self.ct,
            bp: self.bp,
        }
    }

    /// BYTEIN (C.3.4). `bp` points at the last byte fed into `c`.
    fn byte_in(&mut self) {
        let current = self.data.get(self.bp).copied().unwrap_or(0xFF);
        let next = self.data.get(self.bp + 1).copied().unwrap_or(0xFF);
        if current == 0xFF {
            if next > 0x8F {
                // Marker: feed 1-bits without advancing.
                self.c = self.c.wrapping_add(0xFF00);
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c = self.c.wrapping_add((next as u32) << 9);
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c = self.c.wrapping_add((next as u32) << 8);
            self.ct = 8;
        }
    }

    /// DECODE (C.3.2) one decision in context `cx`.
    ///
    /// `cx` must be below [`MqDecoder::context_count`].
    pub fn decode_bit(&mut self, cx: usize) -> u32 {
        let state = self.states[cx] as usize;
        let mps = self.mps[cx];
        let qe = QE[state] as u32;

        self.a -= qe;
        let d;
        if (self.c >> 16) < qe {
            // LPS_EXCHANGE
            if self.a < qe {
                d = mps;
                self.states[cx] = NMPS[state];
            } else {
                d = 1 - mps;
                if SWITCH[state] == 1 {
                    self.mps[cx] = 1 - mps;
                }
                self.states[cx] = NLPS[state];
            }
            self.a = qe;
            self.renormalize();
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 != 0 {
                return mps as u32;
            }
            // MPS_EXCHANGE
            if self.a < qe {
                d = 1 - mps;
                if SWITCH[state] == 1 {
                    self.mps[cx] = 1 - mps;
                }
                self.states[cx] = NLPS[state];
            } else {
                d = mps;
                self.states[cx] = NMPS[state];
            }
            self.renormalize();
        }
        d as u32
    }

    /// RENORMD (C.3.3)
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }
}
