use core::fmt;

use crate::{
    bits::BitReader,
    error::{Error, ErrorKind, Result},
};

/// Huffman table class, stored in the high nibble of a table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Dc = 0,
    Ac = 1,
}

/// A canonical Huffman table, holding its `(codeword, symbol)` pairs grouped by code length.
pub struct HuffmanTable {
    /// `lengths[i]` holds the codes that are `i + 1` bits long, in the order they were assigned.
    lengths: [Vec<Code>; 16],
}

#[derive(Clone, Copy)]
struct Code {
    /// Codeword, stored in the least significant bits.
    codeword: u16,
    /// Decoded value. Meaning depends on table class (AC/DC).
    symbol: u8,
}

impl HuffmanTable {
    pub fn build(num_codes_per_length: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        if symbols.len() > 256 {
            bail!(Format, "huffman table defines {} symbols", symbols.len());
        }

        let mut lengths: [Vec<Code>; 16] = Default::default();

        // The following is similar in function to the flowcharts in Annex C
        // (`Generate_size_table` and `Generate_code_table`)
        let mut next_code = 0u32;
        let mut symbol_iter = symbols.iter();
        for (index, &code_count) in num_codes_per_length.iter().enumerate() {
            let code_length = index + 1;

            for _ in 0..code_count {
                if next_code >= 1 << code_length {
                    bail!(
                        Format,
                        "huffman table overflows the {code_length}-bit code space"
                    );
                }
                let Some(&symbol) = symbol_iter.next() else {
                    return Err(Error::truncated());
                };
                lengths[index].push(Code {
                    codeword: next_code as u16,
                    symbol,
                });
                next_code += 1;
            }

            next_code <<= 1;
        }

        Ok(Self { lengths })
    }

    /// Decodes one symbol by reading the stream one bit at a time until the accumulated codeword
    /// matches a code of the current length.
    pub fn decode(&self, bits: &mut BitReader<'_>) -> Result<u8> {
        let mut codeword = 0u16;
        for codes in &self.lengths {
            codeword = codeword << 1 | u16::from(bits.read_bit()?);
            if let Some(code) = codes.iter().find(|code| code.codeword == codeword) {
                return Ok(code.symbol);
            }
        }

        Err(Error::new(
            ErrorKind::HuffmanLookup,
            format!("no huffman code matches {codeword:016b}"),
        ))
    }

    /// Iterates over all `(length, codeword, symbol)` triples, shortest codes first.
    fn codes(&self) -> impl Iterator<Item = (u8, u16, u8)> + '_ {
        self.lengths.iter().enumerate().flat_map(|(index, codes)| {
            codes
                .iter()
                .map(move |code| (index as u8 + 1, code.codeword, code.symbol))
        })
    }
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bits, code, value) in self.codes() {
            writeln!(
                f,
                "{bits} {:01$b} -> {2:02x}",
                code,
                usize::from(bits),
                value,
            )?;
        }
        Ok(())
    }
}

/// The Huffman tables installed by DHT segments, keyed by class and destination (0-3).
#[derive(Default)]
pub struct HuffmanTables {
    dc: [Option<HuffmanTable>; 4],
    ac: [Option<HuffmanTable>; 4],
}

impl HuffmanTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, class: Class, index: u8, table: HuffmanTable) {
        let slot = match class {
            Class::Dc => &mut self.dc,
            Class::Ac => &mut self.ac,
        };
        slot[usize::from(index)] = Some(table);
    }

    /// Looks up a table by its 1-byte id: class in the high nibble, destination in the low nibble.
    pub fn get(&self, id: u8) -> Result<&HuffmanTable> {
        let slot = match id >> 4 {
            0 => &self.dc,
            1 => &self.ac,
            _ => bail!(HuffmanLookup, "invalid huffman table id {id:02x}"),
        };
        slot.get(usize::from(id & 0xf))
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::HuffmanLookup,
                    format!("huffman table {id:02x} is not defined"),
                )
            })
    }
}

/// Table id of the DC table with the given destination.
pub fn dc_id(index: u8) -> u8 {
    (Class::Dc as u8) << 4 | index
}

/// Table id of the AC table with the given destination.
pub fn ac_id(index: u8) -> u8 {
    (Class::Ac as u8) << 4 | index
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Default Luminance DC table.
    pub(crate) const LUMA_DC_COUNTS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
    pub(crate) const LUMA_DC_VALUES: [u8; 12] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b,
    ];

    /// Returns the `(length, codeword)` assigned to `symbol`.
    pub(crate) fn encode(table: &HuffmanTable, symbol: u8) -> (u8, u16) {
        table
            .codes()
            .find(|&(_, _, value)| value == symbol)
            .map(|(length, code, _)| (length, code))
            .unwrap()
    }

    #[test]
    fn tablegen() {
        let tbl = HuffmanTable::build(&LUMA_DC_COUNTS, &LUMA_DC_VALUES).unwrap();
        expect_test::expect![[r#"
            2 00 -> 00
            3 010 -> 01
            3 011 -> 02
            3 100 -> 03
            3 101 -> 04
            3 110 -> 05
            4 1110 -> 06
            5 11110 -> 07
            6 111110 -> 08
            7 1111110 -> 09
            8 11111110 -> 0a
            9 111111110 -> 0b

        "#]]
        .assert_debug_eq(&tbl);
    }

    #[test]
    fn overflowing_table() {
        // Three 1-bit codes do not fit.
        let mut counts = [0; 16];
        counts[0] = 3;
        let err = HuffmanTable::build(&counts, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn missing_symbols() {
        let err = HuffmanTable::build(&LUMA_DC_COUNTS, &LUMA_DC_VALUES[..4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    fn random_table(rng: &mut fastrand::Rng) -> HuffmanTable {
        // Fill lengths from the shortest up while the code space allows it.
        let mut counts = [0u8; 16];
        let mut available = 1u32;
        let mut total = 0usize;
        for (index, count) in counts.iter_mut().enumerate() {
            available *= 2;
            // Leave one code free at the last length so no all-ones code is required.
            let max = if index == 15 { available - 1 } else { available / 2 };
            let n = rng.u32(0..=max.min(255 - total as u32).min(16));
            *count = n as u8;
            available -= n;
            total += n as usize;
        }
        if total == 0 {
            counts[3] = 1;
            total = 1;
        }
        let mut symbols = (0..=255u8).collect::<Vec<_>>();
        rng.shuffle(&mut symbols);
        symbols.truncate(total);
        HuffmanTable::build(&counts, &symbols).unwrap()
    }

    #[test]
    fn prefix_free() {
        let mut rng = fastrand::Rng::with_seed(0x4a50_4547);
        for _ in 0..200 {
            let table = random_table(&mut rng);
            let codes = table.codes().collect::<Vec<_>>();
            for &(len_a, code_a, _) in &codes {
                for &(len_b, code_b, _) in &codes {
                    if (len_a, code_a) == (len_b, code_b) || len_a > len_b {
                        continue;
                    }
                    assert_ne!(
                        code_b >> (len_b - len_a),
                        code_a,
                        "{code_a:0la$b} is a prefix of {code_b:0lb$b}",
                        la = usize::from(len_a),
                        lb = usize::from(len_b),
                    );
                }
            }
        }
    }

    #[test]
    fn decode_reencoded_symbols() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..50 {
            let table = random_table(&mut rng);
            let symbols = table.codes().map(|(_, _, s)| s).collect::<Vec<_>>();
            let message = (0..100)
                .map(|_| symbols[rng.usize(..symbols.len())])
                .collect::<Vec<_>>();

            let mut writer = crate::bits::tests::BitWriter::new();
            for &symbol in &message {
                let (length, code) = encode(&table, symbol);
                writer.write(u32::from(code), length);
            }
            let data = writer.finish();

            let mut reader = BitReader::new(&data);
            for &symbol in &message {
                assert_eq!(table.decode(&mut reader).unwrap(), symbol);
            }
        }
    }

    #[test]
    fn lookup_failure() {
        // Only the code `0` exists, so a run of ones never matches.
        let mut counts = [0; 16];
        counts[0] = 1;
        let table = HuffmanTable::build(&counts, &[0x42]).unwrap();

        let mut reader = BitReader::new(&[0x7F, 0xFF, 0xFF]);
        assert_eq!(table.decode(&mut reader).unwrap(), 0x42);
        let err = table.decode(&mut reader).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HuffmanLookup);
    }

    #[test]
    fn table_ids() {
        let mut tables = HuffmanTables::new();
        let table = HuffmanTable::build(&LUMA_DC_COUNTS, &LUMA_DC_VALUES).unwrap();
        tables.set(Class::Ac, 1, table);

        assert_eq!(ac_id(1), 0x11);
        assert_eq!(dc_id(1), 0x01);
        assert!(tables.get(0x11).is_ok());
        assert_eq!(
            tables.get(0x01).err().unwrap().kind(),
            ErrorKind::HuffmanLookup
        );
        assert_eq!(
            tables.get(0x21).err().unwrap().kind(),
            ErrorKind::HuffmanLookup
        );
    }
}
