//! MCU reconstruction: dequantization, inverse DCT, level shift, chroma upsampling and YCbCr to
//! RGB conversion.

use std::sync::OnceLock;

use crate::{
    entropy::Coefficients,
    frame::{Frame, QTable},
};

/// Maps a zigzag index to the natural (row-major) index of the coefficient.
#[rustfmt::skip]
pub const ZIGZAG: [u8; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// An 8x8 block of samples or dequantized coefficients, in natural order.
pub type Block = [f32; 64];

static BASIS: OnceLock<[f32; 64]> = OnceLock::new();

/// `basis[u * 8 + x] = C(u) / 2 * cos((2x + 1) * u * PI / 16)`, with `C(0) = 1/sqrt(2)` and
/// `C(u) = 1` otherwise.
fn basis() -> &'static [f32; 64] {
    BASIS.get_or_init(|| {
        let mut table = [0.0; 64];
        for u in 0..8 {
            let c = if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
            for x in 0..8 {
                let angle = (2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0;
                table[u * 8 + x] = (c / 2.0 * angle.cos()) as f32;
            }
        }
        table
    })
}

/// Multiplies every coefficient with its quantization table entry and reorders the result from
/// zigzag to natural order.
pub fn dequantize(coefficients: &Coefficients, qtable: &QTable) -> Block {
    let mut block = [0.0; 64];
    for (k, (&coef, &q)) in coefficients.iter().zip(&qtable.values).enumerate() {
        block[usize::from(ZIGZAG[k])] = coef as f32 * f32::from(q);
    }
    block
}

/// Separable inverse DCT, rows first, then columns.
pub fn idct(block: &mut Block) {
    let basis = basis();

    let mut rows = [0.0f32; 64];
    for v in 0..8 {
        for x in 0..8 {
            rows[v * 8 + x] = (0..8).map(|u| block[v * 8 + u] * basis[u * 8 + x]).sum();
        }
    }

    for y in 0..8 {
        for x in 0..8 {
            block[y * 8 + x] = (0..8).map(|v| rows[v * 8 + x] * basis[v * 8 + y]).sum();
        }
    }
}

pub fn level_shift(block: &mut Block) {
    for sample in block {
        *sample += 128.0;
    }
}

/// Converts one pixel. `y` is level-shifted luma, `cb` and `cr` are chroma offsets from neutral
/// (0 = no color).
pub fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    [
        normalize(y + 1.402 * cr),
        normalize(y - 0.344136 * cb - 0.714136 * cr),
        normalize(y + 1.772 * cb),
    ]
}

/// Clamps to `0..=255` and truncates.
fn normalize(x: f32) -> u8 {
    if x > 255.0 {
        255
    } else if x < 0.0 {
        0
    } else {
        x as u8
    }
}

/// Reconstructed samples of one MCU.
///
/// Every component owns exactly `hsample * vsample` blocks, in row-major order.
pub struct Mcu {
    planes: Vec<Vec<Block>>,
}

impl Mcu {
    pub fn new(frame: &Frame) -> Self {
        Self {
            planes: frame
                .components()
                .iter()
                .map(|c| vec![[0.0; 64]; c.data_units()])
                .collect(),
        }
    }

    /// Dequantizes, transforms and level-shifts a decoded data unit and stores it as block
    /// `index` of `component`.
    pub fn set_block(
        &mut self,
        component: usize,
        index: usize,
        coefficients: &Coefficients,
        qtable: &QTable,
    ) {
        let block = &mut self.planes[component][index];
        *block = dequantize(coefficients, qtable);
        idct(block);
        level_shift(block);
    }

    /// Returns the sample of `component` covering MCU pixel (`row`, `col`), mapping the pixel to
    /// the component's resolution by nearest neighbor.
    fn sample(&self, frame: &Frame, component: usize, row: usize, col: usize) -> f32 {
        let c = &frame.components()[component];
        let hsample = usize::from(c.hsample);
        let vsample = usize::from(c.vsample);

        let v = row * vsample / usize::from(frame.vmax);
        let h = col * hsample / usize::from(frame.hmax);

        self.planes[component][(v / 8) * hsample + h / 8][(v % 8) * 8 + h % 8]
    }

    /// Converts the MCU to RGB and writes it into `out`, a raster `stride` pixels wide, with its
    /// top left corner at (`x0`, `y0`).
    pub fn write_rgb(
        &self,
        frame: &Frame,
        out: &mut [[u8; 3]],
        stride: usize,
        x0: usize,
        y0: usize,
    ) {
        let color = frame.components().len() == 3;
        for row in 0..frame.mcu_height() {
            let line = &mut out[(y0 + row) * stride + x0..][..frame.mcu_width()];
            for (col, pixel) in line.iter_mut().enumerate() {
                let y = self.sample(frame, 0, row, col);
                *pixel = if color {
                    let cb = self.sample(frame, 1, row, col) - 128.0;
                    let cr = self.sample(frame, 2, row, col) - 128.0;
                    ycbcr_to_rgb(y, cb, cr)
                } else {
                    ycbcr_to_rgb(y, 0.0, 0.0)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Component;

    const FLAT: QTable = QTable { values: [1; 64] };

    fn component(id: u8, hsample: u8, vsample: u8) -> Component {
        Component {
            id,
            hsample,
            vsample,
            qtable: 0,
            dchuff: 0,
            achuff: 0,
            dc_pred: 0,
        }
    }

    #[test]
    fn zigzag_is_a_permutation() {
        let mut seen = [false; 64];
        for &n in &ZIGZAG {
            assert!(!seen[usize::from(n)]);
            seen[usize::from(n)] = true;
        }
        // Second zigzag entry is the first row, the third the first column.
        assert_eq!(ZIGZAG[1], 1);
        assert_eq!(ZIGZAG[2], 8);
    }

    #[test]
    fn dequantize_reorders() {
        let mut coefficients = [0; 64];
        coefficients[0] = 3;
        coefficients[2] = -2;
        coefficients[63] = 1;
        let mut qtable = FLAT;
        qtable.values[0] = 10;
        qtable.values[2] = 4;
        qtable.values[63] = 99;

        let block = dequantize(&coefficients, &qtable);
        assert_eq!(block[0], 30.0);
        assert_eq!(block[8], -8.0);
        assert_eq!(block[63], 99.0);
        assert_eq!(block.iter().filter(|&&s| s != 0.0).count(), 3);
    }

    #[test]
    fn dequantize_16_bit_table() {
        let mut coefficients = [0; 64];
        coefficients[0] = 2047 * 17;
        coefficients[1] = -1024;
        let qtable = QTable {
            values: [u16::MAX; 64],
        };

        let block = dequantize(&coefficients, &qtable);
        assert_eq!(block[0], 34799.0 * 65535.0);
        assert_eq!(block[1], -1024.0 * 65535.0);
    }

    #[test]
    fn idct_dc_only() {
        let mut coefficients = [0; 64];
        coefficients[0] = 8;
        let mut block = dequantize(&coefficients, &FLAT);
        idct(&mut block);
        for sample in block {
            assert!((sample - 1.0).abs() < 1e-5, "{sample}");
        }
    }

    #[test]
    fn idct_matches_direct_formula() {
        let mut rng = fastrand::Rng::with_seed(16);
        let mut block = [0.0f32; 64];
        for coef in &mut block {
            *coef = rng.i32(-64..64) as f32;
        }
        let input = block;
        idct(&mut block);

        let c = |u: usize| if u == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        for y in 0..8 {
            for x in 0..8 {
                let mut sum = 0.0;
                for v in 0..8 {
                    for u in 0..8 {
                        sum += c(u)
                            * c(v)
                            * f64::from(input[v * 8 + u])
                            * ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0).cos()
                            * ((2 * y + 1) as f64 * v as f64 * std::f64::consts::PI / 16.0).cos();
                    }
                }
                let expected = sum / 4.0;
                let actual = f64::from(block[y * 8 + x]);
                assert!((actual - expected).abs() < 1e-2, "{actual} vs {expected}");
            }
        }
    }

    #[test]
    fn color_conversion_bounds() {
        assert_eq!(ycbcr_to_rgb(0.0, 0.0, 0.0), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(255.0, 0.0, 0.0), [255, 255, 255]);
        assert_eq!(ycbcr_to_rgb(-40.0, 0.0, 0.0), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(300.0, 0.0, 0.0), [255, 255, 255]);
        // Pure red, as produced by a JFIF encoder: Y=76.245, Cb=-43.0, Cr=127.5.
        let [r, g, b] = ycbcr_to_rgb(76.245, -43.0, 127.5);
        assert!(r >= 254, "{r}");
        assert!(g <= 1, "{g}");
        assert!(b <= 1, "{b}");
        assert_eq!(normalize(12.9), 12);
    }

    #[test]
    fn grayscale_mcu() {
        let frame = Frame::new(8, 8, vec![component(1, 1, 1)]);
        let mut mcu = Mcu::new(&frame);

        let mut coefficients = [0; 64];
        coefficients[0] = 84; // 84 / 8 + 128 = 138.5
        mcu.set_block(0, 0, &coefficients, &FLAT);

        let mut out = vec![[0; 3]; 64];
        mcu.write_rgb(&frame, &mut out, 8, 0, 0);
        assert!(out.iter().all(|&p| p == [138, 138, 138]));
    }

    #[test]
    fn chroma_upsampling() {
        // 4:2:0: Y has 2x2 blocks, Cb/Cr one block each covering the whole 16x16 MCU.
        let frame = Frame::new(
            32,
            16,
            vec![component(1, 2, 2), component(2, 1, 1), component(3, 1, 1)],
        );
        assert_eq!((frame.mcu_width(), frame.mcu_height()), (16, 16));
        let mut mcu = Mcu::new(&frame);

        // Luma: a different flat level per block (after level shift: 128 + dc / 8).
        for (index, dc) in [4, 84, 164, 244].into_iter().enumerate() {
            let mut coefficients = [0; 64];
            coefficients[0] = dc;
            mcu.set_block(0, index, &coefficients, &FLAT);
        }
        // Chroma: neutral, except for one sample.
        mcu.set_block(1, 0, &[0; 64], &FLAT);
        mcu.planes[1][0][7 * 8 + 7] = 228.0;
        mcu.set_block(2, 0, &[0; 64], &FLAT);

        let stride = frame.padded_width();
        let mut out = vec![[0; 3]; stride * frame.padded_height()];
        mcu.write_rgb(&frame, &mut out, stride, 16, 0);

        let at = |x: usize, y: usize| out[y * stride + 16 + x];
        assert_eq!(at(0, 0), [128, 128, 128]);
        assert_eq!(at(8, 0), [138, 138, 138]);
        assert_eq!(at(0, 8), [148, 148, 148]);
        assert_eq!(at(9, 9), [158, 158, 158]);

        // Chroma sample (7, 7) covers MCU pixels 14..16 in both directions.
        for (x, y) in [(14, 14), (15, 14), (14, 15), (15, 15)] {
            let [r, g, b] = at(x, y);
            assert_eq!(r, 158);
            assert!(g < 158);
            assert_eq!(b, 255);
        }
        assert_eq!(at(13, 15), [158, 158, 158]);

        // The left MCU was not touched.
        assert_eq!(out[0], [0, 0, 0]);
    }
}
