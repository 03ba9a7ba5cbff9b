//! A baseline JPEG decoder.
//!
//! [`Decoder`] parses a JPEG stream segment by segment, entropy-decodes its single scan and
//! reconstructs the image as RGB pixels. Only sequential, Huffman-coded 8-bit images with one or
//! three components (grayscale or YCbCr) are supported.

#[macro_use]
mod error;
mod bits;
mod entropy;
mod file;
mod frame;
mod huffman;
mod mcu;
mod scan;

use std::{fmt, fs, path::Path};

use bits::BitReader;
use file::{JpegParser, SegmentKind, Sos};
use frame::{Frame, QTable};
use huffman::{Class, HuffmanTable, HuffmanTables};
use mcu::Mcu;
use scan::ScanBuffer;

pub use error::{Error, ErrorKind};

use crate::error::Result;

/// A fully decoded JPEG image.
///
/// Decoding happens eagerly when the decoder is constructed. If construction fails, no pixel data
/// is available at all.
pub struct Decoder {
    width: u16,
    height: u16,
    padded_width: usize,
    padded_height: usize,
    component_count: usize,
    pixels: Vec<[u8; 3]>,
}

impl Decoder {
    /// Reads and decodes the JPEG file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let jpeg = fs::read(path).map_err(|e| Error::new(ErrorKind::Open, e))?;
        log::debug!("read {} bytes from {}", jpeg.len(), path.display());
        if jpeg.is_empty() {
            bail!(Open, "{} is empty", path.display());
        }

        Self::new_impl(&jpeg)
    }

    /// Decodes an in-memory JPEG file.
    pub fn from_bytes(jpeg: &[u8]) -> Result<Self> {
        if jpeg.is_empty() {
            bail!(Open, "JPEG data is empty");
        }

        Self::new_impl(jpeg)
    }

    fn new_impl(jpeg: &[u8]) -> Result<Self> {
        let mut frame: Option<Frame> = None;
        let mut qtables = [None; 4];
        let mut huffman_tables = HuffmanTables::new();
        let mut restart_interval = 0;
        let mut scan_buffer = ScanBuffer::new();
        let mut pixels: Option<Vec<[u8; 3]>> = None;

        let mut parser = JpegParser::new(jpeg)?;
        while let Some(segment) = parser.next_segment()? {
            let (marker, offset) = (segment.marker(), segment.offset());
            let Some(kind) = segment.into_segment_kind() else {
                log::debug!("skipping ff {marker:02x} segment at offset {offset}");
                continue;
            };

            match kind {
                SegmentKind::Soi => log::debug!("ignoring repeated SOI marker"),
                SegmentKind::Sof(sof) => {
                    if frame.is_some() {
                        bail!(Unsupported, "encountered multiple SOF markers");
                    }

                    let f = Frame::from_sof(&sof)?;
                    log::debug!(
                        "{}x{} frame, {} component(s), MCU {}x{}",
                        f.width,
                        f.height,
                        f.components().len(),
                        f.mcu_width(),
                        f.mcu_height(),
                    );
                    frame = Some(f);
                }
                SegmentKind::Dqt(dqt) => {
                    for table in dqt.tables() {
                        if table.Tq() > 3 {
                            bail!(
                                Format,
                                "invalid quantization table destination Tq={} (0-3 are allowed)",
                                table.Tq()
                            );
                        }

                        log::debug!(
                            "installing quantization table {} ({}-bit)",
                            table.Tq(),
                            if table.Pq() == 0 { 8 } else { 16 },
                        );
                        qtables[usize::from(table.Tq())] = Some(QTable {
                            values: *table.Qk(),
                        });
                    }
                }
                SegmentKind::Dht(dht) => {
                    for table in dht.tables() {
                        let class = match table.Tc() {
                            0 => Class::Dc,
                            1 => Class::Ac,
                            err => bail!(Format, "invalid table class Tc={err} (only 0 and 1 are valid)"),
                        };
                        if table.Th() > 3 {
                            bail!(
                                Format,
                                "invalid huffman table destination Th={} (0-3 are allowed)",
                                table.Th()
                            );
                        }

                        let data = HuffmanTable::build(table.Li(), table.Vij())?;
                        log::debug!("installing {:?} huffman table {}", class, table.Th());
                        log::trace!("{:?}", data);
                        huffman_tables.set(class, table.Th(), data);
                    }
                }
                SegmentKind::Dri(dri) => {
                    if dri.Ri() != 0 {
                        log::warn!(
                            "image declares a restart interval of {} MCUs, which is not supported",
                            dri.Ri()
                        );
                    }
                    restart_interval = dri.Ri();
                }
                SegmentKind::Sos(sos) => {
                    let Some(frame) = frame.as_mut() else {
                        bail!(Format, "SOS not preceded by SOF header");
                    };
                    if pixels.is_some() {
                        bail!(Unsupported, "multiple scans per frame are not supported");
                    }
                    if restart_interval != 0 {
                        bail!(
                            Unsupported,
                            "restart intervals are not supported (Ri={restart_interval})"
                        );
                    }

                    pixels = Some(decode_scan(
                        frame,
                        &sos,
                        &qtables,
                        &huffman_tables,
                        &mut scan_buffer,
                    )?);
                }
                SegmentKind::App(app) => log::trace!("skipping APP{} segment", app.n()),
                SegmentKind::Com(com) => log::trace!("skipping {:?}", com),
            }
        }

        let (Some(frame), Some(pixels)) = (frame, pixels) else {
            bail!(Format, "reached EOI before any image data");
        };

        Ok(Self {
            width: frame.width,
            height: frame.height,
            padded_width: frame.padded_width(),
            padded_height: frame.padded_height(),
            component_count: frame.components().len(),
            pixels,
        })
    }

    /// Returns the width of the image in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width.into()
    }

    /// Returns the height of the image in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height.into()
    }

    /// Returns the width of [`Decoder::to_rgb`]'s raster: the image width rounded up to a whole
    /// number of MCUs.
    #[inline]
    pub fn padded_width(&self) -> u32 {
        // A whole number of MCUs covering at most 65535 pixels always fits.
        u32::try_from(self.padded_width).unwrap_or(u32::MAX)
    }

    /// Returns the height of [`Decoder::to_rgb`]'s raster: the image height rounded up to a whole
    /// number of MCUs.
    #[inline]
    pub fn padded_height(&self) -> u32 {
        u32::try_from(self.padded_height).unwrap_or(u32::MAX)
    }

    /// Returns the number of color components in the image (1 for grayscale, 3 for color).
    #[inline]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Returns the decoded pixels, row by row.
    ///
    /// The raster covers whole MCUs, so it is [`Decoder::padded_width`] pixels wide and
    /// [`Decoder::padded_height`] pixels high. Use [`Decoder::cropped_rgb`] to get a buffer with
    /// the exact image dimensions.
    #[inline]
    pub fn to_rgb(&self) -> &[[u8; 3]] {
        &self.pixels
    }

    /// Returns the same data as [`Decoder::to_rgb`], as interleaved RGB bytes.
    #[inline]
    pub fn to_rgb_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Returns a copy of the decoded pixels with the MCU padding removed.
    pub fn cropped_rgb(&self) -> Vec<[u8; 3]> {
        let width = usize::from(self.width);
        self.pixels
            .chunks_exact(self.padded_width)
            .take(self.height.into())
            .flat_map(|row| &row[..width])
            .copied()
            .collect()
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("component_count", &self.component_count)
            .finish_non_exhaustive()
    }
}

/// Decodes the entropy-coded data of `sos` and reconstructs the image.
fn decode_scan(
    frame: &mut Frame,
    sos: &Sos<'_>,
    qtables: &[Option<QTable>; 4],
    huffman_tables: &HuffmanTables,
    scan_buffer: &mut ScanBuffer,
) -> Result<Vec<[u8; 3]>> {
    if sos.Ss() != 0 || sos.Se() != 63 || sos.Ah() != 0 || sos.Al() != 0 {
        bail!(Unsupported, "non-baseline scan header");
    }

    // Frame component indices, in scan order.
    let mut order = Vec::with_capacity(sos.components().len());
    log::trace!("scan components:");
    for sc in sos.components() {
        log::trace!("{:?}", sc);

        let Some(index) = frame.index_of(sc.Csj()) else {
            bail!(Format, "scan references unknown component {}", sc.Csj());
        };
        if order.contains(&index) {
            bail!(Format, "component {} appears twice in scan", sc.Csj());
        }
        if sc.Tdj() > 3 || sc.Taj() > 3 {
            bail!(
                Format,
                "invalid huffman table selection {}/{} for component {}",
                sc.Tdj(),
                sc.Taj(),
                sc.Csj()
            );
        }

        let component = frame.component_mut(index);
        component.dchuff = sc.Tdj();
        component.achuff = sc.Taj();
        order.push(index);
    }
    if order.len() != frame.components().len() {
        bail!(
            Unsupported,
            "scan with {} of {} components not supported (multiple scans per frame are not supported)",
            order.len(),
            frame.components().len()
        );
    }

    let qtables = frame
        .components()
        .iter()
        .map(|c| {
            qtables[usize::from(c.qtable)].ok_or_else(|| {
                Error::format(format!("quantization table {} is not defined", c.qtable))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let mut tables = Vec::with_capacity(order.len());
    for &index in &order {
        let c = &frame.components()[index];
        tables.push((
            huffman_tables.get(huffman::dc_id(c.dchuff))?,
            huffman_tables.get(huffman::ac_id(c.achuff))?,
        ));
    }

    frame.reset_predictors();
    scan_buffer.process(sos.data())?;
    let mut bits = BitReader::new(scan_buffer.processed_scan_data());
    log::debug!(
        "decoding {}x{} MCUs from {} bytes of scan data at offset {}",
        frame.mcus_x(),
        frame.mcus_y(),
        sos.data().len(),
        sos.data_offset(),
    );

    let stride = frame.padded_width();
    let mut pixels = vec![[0; 3]; stride * frame.padded_height()];
    let mut mcu = Mcu::new(frame);
    let mut coefficients = [0; 64];
    for mcu_y in 0..frame.mcus_y() {
        for mcu_x in 0..frame.mcus_x() {
            for (&index, &(dc, ac)) in order.iter().zip(&tables) {
                let qtable = &qtables[index];
                for unit in 0..frame.components()[index].data_units() {
                    entropy::decode_block(
                        &mut bits,
                        frame.component_mut(index),
                        dc,
                        ac,
                        &mut coefficients,
                    )?;
                    mcu.set_block(index, unit, &coefficients, qtable);
                }
            }

            mcu.write_rgb(
                frame,
                &mut pixels,
                stride,
                mcu_x * frame.mcu_width(),
                mcu_y * frame.mcu_height(),
            );
        }
    }

    if bits.bytes_left() > 0 {
        log::warn!(
            "{} bytes of scan data left after decoding all MCUs",
            bits.bytes_left()
        );
    }

    Ok(pixels)
}
