use crate::error::{Error, Result};

/// MSB-first bit reader over entropy-coded scan data that has already had its byte stuffing
/// removed (see [`crate::scan::ScanBuffer`]).
pub struct BitReader<'a> {
    bytes: &'a [u8],
    cur: u8,
    left: u8, // 0-8 bits left in `cur`
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cur: 0,
            left: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<u8> {
        if self.left == 0 {
            let Some((&byte, rest)) = self.bytes.split_first() else {
                return Err(Error::format("scan data ended in the middle of an MCU"));
            };
            self.bytes = rest;
            self.cur = byte;
            self.left = 8;
        }

        self.left -= 1;
        Ok((self.cur >> self.left) & 1)
    }

    /// Reads `n` bits (0-16) as an unsigned integer, first bit most significant.
    pub fn read_bits(&mut self, n: u8) -> Result<u16> {
        debug_assert!(n <= 16);
        let mut value = 0u16;
        for _ in 0..n {
            value = value << 1 | u16::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Reads a `t`-bit magnitude and sign-extends it (the `RECEIVE` and `EXTEND` procedures).
    pub fn receive_extend(&mut self, t: u8) -> Result<i32> {
        let raw = self.read_bits(t)?;
        Ok(extend(raw, t))
    }

    /// Returns the number of bytes that have not been touched yet.
    pub fn bytes_left(&self) -> usize {
        self.bytes.len()
    }
}

/// Interprets the `t`-bit pattern `raw` as a signed value: patterns starting with a 1 bit are
/// positive, all others map to `raw - (2^t - 1)`.
pub fn extend(raw: u16, t: u8) -> i32 {
    if t == 0 {
        return 0;
    }
    let raw = i32::from(raw);
    if raw < 1 << (t - 1) {
        raw - (1 << t) + 1
    } else {
        raw
    }
}
