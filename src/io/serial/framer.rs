// src/io/serial/framer.rs
//
// SLIP framing (RFC 1055) for the serial side of the bridge.
// Encoding is stateless; decoding is stateful across reads because the device
// delivers bytes in arbitrarily sized bursts.

// =============================================================================
// SLIP Constants (RFC 1055)
// =============================================================================

pub const SLIP_END: u8 = 0xC0;
pub const SLIP_ESC: u8 = 0xDB;
pub const SLIP_ESC_END: u8 = 0xDC;
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// Worst case encoded size: every byte escaped plus both delimiters
pub const fn max_encoded_len(payload_len: usize) -> usize {
    payload_len * 2 + 2
}

// =============================================================================
// Encoder
// =============================================================================

/// SLIP encode one frame.
pub fn slip_encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() + 2);
    slip_encode_into(data, &mut encoded);
    encoded
}

/// SLIP encode one frame, appending to `out`.
pub fn slip_encode_into(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len() + 2);
    out.push(SLIP_END); // Leading END flushes any line noise on the receiver

    for &byte in data {
        match byte {
            SLIP_END => {
                out.push(SLIP_ESC);
                out.push(SLIP_ESC_END);
            }
            SLIP_ESC => {
                out.push(SLIP_ESC);
                out.push(SLIP_ESC_ESC);
            }
            _ => {
                out.push(byte);
            }
        }
    }

    out.push(SLIP_END);
}

// =============================================================================
// Decoder
// =============================================================================

/// Stateful SLIP decoder for streaming data.
///
/// The accumulation buffer and escape flag survive between `feed` calls, so a
/// frame split across several reads is reassembled. Empty frames (redundant or
/// leading END bytes) are never emitted.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    buffer: Vec<u8>,
    in_escape: bool,
}

impl SlipDecoder {
    pub fn new() -> Self {
        SlipDecoder::default()
    }

    /// Feed raw bytes into the decoder.
    /// Returns any complete frames that were parsed, in arrival order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        for &byte in data {
            if self.in_escape {
                // Unknown escape codes pass through as the literal byte
                let unescaped = match byte {
                    SLIP_ESC_END => SLIP_END,
                    SLIP_ESC_ESC => SLIP_ESC,
                    other => other,
                };
                self.buffer.push(unescaped);
                self.in_escape = false;
                continue;
            }

            match byte {
                SLIP_ESC => {
                    self.in_escape = true;
                }
                SLIP_END => {
                    if !self.buffer.is_empty() {
                        frames.push(std::mem::take(&mut self.buffer));
                    }
                }
                _ => {
                    self.buffer.push(byte);
                }
            }
        }

        frames
    }

    /// Number of bytes held for the frame currently being assembled
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially assembled frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_escape = false;
    }
}
