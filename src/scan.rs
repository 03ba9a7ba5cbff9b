//! Scan Data preprocessing.
//!
//! Before the entropy decoder reads the scan data bit by bit, this module copies it into a
//! contiguous buffer with the `0xFF 0x00` byte stuffing sequences replaced by `0xFF`, so the bit
//! reader never has to look at markers.
//!
//! Restart intervals are not supported, so an `RST` marker in the scan data is an error.

use crate::error::Result;

pub struct ScanBuffer {
    bytes: Vec<u8>,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn processed_scan_data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn process(&mut self, scan_data: &[u8]) -> Result<()> {
        self.bytes.clear();
        self.bytes.reserve(scan_data.len());

        let mut bytes = scan_data.iter().copied();
        loop {
            match bytes.next() {
                Some(0xff) => match bytes.next() {
                    Some(0x00) => {
                        // Byte stuffing sequence, push only `0xFF` to the output.
                        self.bytes.push(0xff);
                    }
                    Some(rst @ 0xD0..=0xD7) => {
                        bail!(
                            Format,
                            "RST{} marker found in scan data, but restart intervals are not enabled",
                            rst - 0xD0
                        );
                    }
                    Some(inv) => {
                        bail!(Format, "invalid marker 0x{:02x} found in scan data", inv);
                    }
                    // A lone `0xFF` at the end is a fill byte.
                    None => break,
                },
                Some(byte) => self.bytes.push(byte),
                None => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(scan_data: &[u8], output: &[u8]) {
        let mut buf = ScanBuffer::new();
        buf.process(scan_data).unwrap();

        assert_eq!(output, buf.processed_scan_data());
    }

    fn check_err(scan_data: &[u8]) -> String {
        let mut buf = ScanBuffer::new();
        buf.process(scan_data).unwrap_err().to_string()
    }

    #[test]
    fn process_scan_data() {
        check(&[0x12, 0x34, 0x56, 0x78], &[0x12, 0x34, 0x56, 0x78]);
        check(&[], &[]);

        let scan = &[0xFF, 0x00, 0x44, 0x55, 0xFF, 0x00, 0x34];
        check(scan, &[0xFF, 0x44, 0x55, 0xFF, 0x34]);

        check(&[0x11, 0xFF], &[0x11]);
    }

    #[test]
    fn reuse_buffer() {
        let mut buf = ScanBuffer::new();
        buf.process(&[1, 2, 3]).unwrap();
        buf.process(&[4]).unwrap();
        assert_eq!(buf.processed_scan_data(), &[4]);
    }

    #[test]
    fn rst_markers() {
        assert_eq!(
            check_err(&[0x11, 0xFF, 0xD3, 0x11]),
            "RST3 marker found in scan data, but restart intervals are not enabled"
        );
        assert_eq!(
            check_err(&[0x11, 0xFF, 0xC4]),
            "invalid marker 0xc4 found in scan data"
        );
    }
}
