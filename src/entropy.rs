//! Huffman decoding of DC and AC coefficients for a single data unit.

use crate::{
    bits::BitReader,
    error::Result,
    frame::Component,
    huffman::HuffmanTable,
};

/// Coefficients of one 8x8 data unit, in zigzag order.
pub type Coefficients = [i32; 64];

/// One decoded coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLength {
    /// Number of zero coefficients preceding this one (always 0 for DC).
    pub run: u8,
    /// Magnitude category, the number of extra bits read for `value`.
    pub size: u8,
    pub value: i32,
}

impl RunLength {
    /// Zero run length `0xF0`: 16 zero coefficients, nothing placed.
    const ZRL: (u8, u8) = (15, 0);
    /// End of block `0x00`: all remaining coefficients are zero.
    const EOB: (u8, u8) = (0, 0);
}

/// Decodes the DC difference of a data unit. `value` is the difference, not the absolute DC.
pub fn decode_dc(bits: &mut BitReader<'_>, table: &HuffmanTable) -> Result<RunLength> {
    let size = table.decode(bits)?;
    if size > 11 {
        bail!(Format, "invalid DC magnitude category {size}");
    }
    let value = bits.receive_extend(size)?;
    Ok(RunLength {
        run: 0,
        size,
        value,
    })
}

/// Decodes one run/size symbol and the coefficient that follows it.
pub fn decode_ac(bits: &mut BitReader<'_>, table: &HuffmanTable) -> Result<RunLength> {
    let rs = table.decode(bits)?;
    let run = rs >> 4;
    let size = rs & 0x0f;

    if size == 0 && (run, size) != RunLength::ZRL && (run, size) != RunLength::EOB {
        bail!(Format, "invalid AC run/size combination {rs:02x}");
    }
    if size > 10 {
        bail!(Format, "invalid AC magnitude category {size}");
    }

    let value = bits.receive_extend(size)?;
    Ok(RunLength { run, size, value })
}

/// Decodes a full data unit of `component` into `block`, updating the component's DC predictor.
///
/// `block` is overwritten entirely; coefficients that are not coded are set to zero.
pub fn decode_block(
    bits: &mut BitReader<'_>,
    component: &mut Component,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    block: &mut Coefficients,
) -> Result<()> {
    block.fill(0);

    let diff = decode_dc(bits, dc)?;
    component.dc_pred = component.dc_pred.wrapping_add(diff.value);
    block[0] = component.dc_pred;

    let mut k = 1;
    while k < 64 {
        let coef = decode_ac(bits, ac)?;
        match (coef.run, coef.size) {
            RunLength::EOB => break,
            RunLength::ZRL => {
                k += 16;
                if k > 64 {
                    bail!(
                        Format,
                        "zero run extends past the end of the block (index {k})"
                    );
                }
            }
            _ => {
                k += usize::from(coef.run);
                if k > 63 {
                    bail!(
                        Format,
                        "AC coefficient run extends past the end of the block (index {k})"
                    );
                }
                block[k] = coef.value;
                k += 1;
            }
        }
    }

    Ok(())
}
