//! JPEG/JFIF segment parser.

#![allow(non_snake_case, dead_code)]


use std::{fmt, mem};

use bytemuck::{AnyBitPattern, Pod, Zeroable};

use crate::error::{Error, Result};

pub struct JpegParser<'a> {
    reader: Reader<'a>,
}

impl<'a> JpegParser<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut reader = Reader { buf, position: 0 };
        if reader.read_u8()? != 0xFF || reader.read_u8()? != 0xD8 {
            bail!(Format, "JPEG image does not start with SOI marker");
        }
        Ok(Self { reader })
    }

    /// Reads the next [`Segment`] from the JPEG data.
    ///
    /// The leading `SOI` marker is consumed by [`JpegParser::new`]. Any further `SOI` is returned
    /// as a [`SegmentKind::Soi`] segment without payload.
    ///
    /// Returns `Ok(None)` when the EOI marker is encountered, signaling the end of the image.
    ///
    /// Unlike a lenient parser, this does not hunt for the next `0xFF` byte: anything other than a
    /// marker where a marker is expected is a format error.
    pub fn next_segment(&mut self) -> Result<Option<Segment<'a>>> {
        let segment_offset = self.reader.position;
        let prefix = self.reader.read_u8()?;
        if prefix != 0xFF {
            bail!(
                Format,
                "expected marker at offset {segment_offset}, found byte {prefix:02x}"
            );
        }

        let mut marker = self.reader.read_u8()?;
        while marker == 0xFF {
            // Any marker may be preceded by `0xFF` fill bytes.
            log::warn!("skipping fill byte at offset {}", self.reader.position - 1);
            marker = self.reader.read_u8()?;
        }

        match marker {
            0x00 => bail!(Format, "invalid ff 00 marker at offset {segment_offset}"),
            0xD9 => {
                // EOI marker
                if !self.reader.remaining().is_empty() {
                    log::warn!(
                        "ignoring {} trailing bytes after EOI",
                        self.reader.remaining().len()
                    );
                }

                return Ok(None);
            }
            0xD8 => {
                return Ok(Some(Segment {
                    marker,
                    raw_bytes: &[],
                    offset: segment_offset,
                    kind: Some(SegmentKind::Soi),
                }));
            }
            0xC0..=0xC3
            | 0xC4
            | 0xC5..=0xC7
            | 0xC9..=0xCB
            | 0xCD..=0xCF
            | 0xDA..=0xDF
            | 0xE0..=0xEF
            | 0xFE => {}
            _ => bail!(
                Format,
                "unrecognized marker ff {marker:02x} at offset {segment_offset}"
            ),
        }

        // Every remaining marker we accept is followed by the segment length.

        let length = usize::from(self.reader.read_length()?);
        let payload_start = self.reader.position;
        let expected_end = payload_start + length;
        let mut reader = Reader {
            buf: &self.reader.buf[..expected_end],
            position: self.reader.position,
        };
        let kind = match marker {
            0xDB => Some(SegmentKind::Dqt(self.read_dqt(&mut reader)?)),
            0xC4 => Some(SegmentKind::Dht(self.read_dht(&mut reader)?)),
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                Some(SegmentKind::Sof(self.read_sof(marker, &mut reader)?))
            }
            0xDA => Some(SegmentKind::Sos(self.read_sos(&mut reader)?)),
            0xDD => Some(SegmentKind::Dri(self.read_dri(&mut reader)?)),
            0xE0..=0xEF => Some(SegmentKind::App(self.read_app(marker, &mut reader))),
            0xFE => Some(SegmentKind::Com(self.read_com(&mut reader)?)),
            // DNL, DHP and EXP carry nothing a baseline decoder uses.
            _ => {
                reader.position = expected_end;
                None
            }
        };

        if marker != 0xDA {
            // The segment specified a bigger length than what we ended up reading. Skip the
            // remaining bytes and log a warning.
            if reader.position < expected_end {
                let remaining = expected_end - reader.position;
                log::warn!(
                    "ff {:02x} segment specified a length of {} bytes, but {} remain after decoding",
                    marker,
                    length,
                    remaining,
                );
            }
            self.reader.position = expected_end;
        }

        Ok(Some(Segment {
            marker,
            raw_bytes: &self.reader.buf[payload_start..expected_end],
            offset: segment_offset,
            kind,
        }))
    }

    /// Returns the remaining (unparsed) bytes of the input data.
    pub fn remaining(&self) -> &'a [u8] {
        self.reader.remaining()
    }

    fn read_dqt(&mut self, reader: &mut Reader<'a>) -> Result<Dqt> {
        let mut tables = Vec::new();

        while !reader.remaining().is_empty() {
            let PqTq = reader.read_u8()?;
            let mut Qk = [0; 64];
            match PqTq >> 4 {
                0 => {
                    for (dest, src) in Qk.iter_mut().zip(reader.read_slice(64)?) {
                        *dest = u16::from(*src);
                    }
                }
                1 => {
                    for dest in &mut Qk {
                        *dest = reader.read_u16()?;
                    }
                }
                Pq => bail!(Format, "invalid quantization table precision Pq={Pq}"),
            }
            tables.push(QuantizationTable { PqTq, Qk });
        }

        Ok(Dqt(tables))
    }

    fn read_dht(&mut self, reader: &mut Reader<'a>) -> Result<Dht<'a>> {
        let mut tables = Vec::new();

        while !reader.remaining().is_empty() {
            let header: &DhtHeader = reader.read_obj()?;
            let values = reader.read_slice(header.num_values())?;
            tables.push(HuffmanTable {
                header,
                Vij: values,
            });
        }

        Ok(Dht { tables })
    }

    fn read_sof(&mut self, sof: u8, reader: &mut Reader<'a>) -> Result<Sof<'a>> {
        let P = reader.read_u8()?;
        let Y = reader.read_u16()?;
        let X = reader.read_u16()?;
        let num_components = reader.read_u8()?;
        let components = reader.read_objs::<FrameComponent>(num_components.into())?;
        Ok(Sof {
            sof: SofMarker(sof),
            P,
            Y,
            X,
            components,
        })
    }

    fn read_sos(&mut self, reader: &mut Reader<'a>) -> Result<Sos<'a>> {
        let num_components = reader.read_u8()?;
        let components = reader.read_objs(num_components.into())?;
        let Ss = reader.read_u8()?;
        let Se = reader.read_u8()?;
        let AhAl = reader.read_u8()?;

        if reader.position < reader.buf.len() {
            log::warn!(
                "SOS header has {} unparsed bytes",
                reader.buf.len() - reader.position
            );
        }
        self.reader.position = reader.buf.len();

        // The scan itself can contain `RST` markers. They are included in the scan data, where
        // preprocessing rejects them.
        let data_start = self.reader.position;
        loop {
            while self.reader.peek_u8(0)? != 0xff {
                self.reader.position += 1;
            }

            let mut offset = 1;
            let mut byte = self.reader.peek_u8(offset)?;
            while byte == 0xff {
                offset += 1;
                byte = self.reader.peek_u8(offset)?;
            }

            match byte {
                0x00 | 0xD0..=0xD7 => {
                    self.reader.position += offset + 1;
                }
                // Leave the reader on the first `0xFF`; fill bytes are skipped by `next_segment`.
                _ => break,
            }
        }

        let data_end = self.reader.position;

        Ok(Sos {
            components,
            Ss,
            Se,
            AhAl,
            data_offset: data_start,
            data: &self.reader.buf[data_start..data_end],
        })
    }

    fn read_dri(&mut self, reader: &mut Reader<'a>) -> Result<Dri> {
        let Ri = reader.read_u16()?;
        Ok(Dri { Ri })
    }

    fn read_com(&mut self, reader: &mut Reader<'a>) -> Result<Com<'a>> {
        Ok(Com {
            com: reader.read_slice(reader.remaining().len())?,
        })
    }

    fn read_app(&mut self, marker: u8, reader: &mut Reader<'a>) -> App {
        // APP segments contain arbitrary data, none of which affects decoding.
        reader.position = reader.buf.len();

        App { n: marker - 0xE0 }
    }
}

#[derive(Debug)]
struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.position..]
    }

    fn peek_u8(&self, offset: usize) -> Result<u8> {
        match self.buf.get(self.position + offset) {
            Some(&byte) => Ok(byte),
            None => Err(Error::truncated()),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_u8(0)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = [self.read_u8()?, self.read_u8()?];
        Ok(u16::from_be_bytes(b))
    }

    fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining().len() < count {
            Err(Error::truncated())
        } else {
            let slice = &self.remaining()[..count];
            self.position += count;
            Ok(slice)
        }
    }

    fn read_obj<T: AnyBitPattern>(&mut self) -> Result<&'a T> {
        debug_assert_eq!(mem::align_of::<T>(), 1);

        let bytes = self.read_slice(mem::size_of::<T>())?;
        Ok(bytemuck::from_bytes(bytes))
    }

    fn read_objs<T: AnyBitPattern>(&mut self, count: usize) -> Result<&'a [T]> {
        debug_assert_eq!(mem::align_of::<T>(), 1);

        let bytes = self.read_slice(count * mem::size_of::<T>())?;
        Ok(bytemuck::cast_slice(bytes))
    }

    fn read_length(&mut self) -> Result<u16> {
        // Length parameter is the length of the segment parameters, including the length parameter,
        // but excluding the FF xx marker.

        let len = self.read_u16()?;
        if len < 2 {
            bail!(Format, "invalid segment length {len}");
        }
        if self.remaining().len() < (len - 2).into() {
            return Err(Error::truncated());
        }
        Ok(len - 2)
    }
}

/// A segment of a JPEG file, introduced by a `0xFF 0xXX` marker.
#[derive(Debug)]
pub struct Segment<'a> {
    marker: u8,
    raw_bytes: &'a [u8],
    offset: usize,
    kind: Option<SegmentKind<'a>>,
}

impl<'a> Segment<'a> {
    /// Returns the offset of the segment's `0xFF 0xXX` marker in the input buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the value of the marker byte indicating the type of the segment.
    #[inline]
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The raw bytes making up this segment, exluding the `0xFF 0xXX` marker and the segment length
    /// indication.
    ///
    /// For an SOS segment this does not include any of the entropy-coded data following it.
    #[inline]
    pub fn raw_bytes(&self) -> &[u8] {
        self.raw_bytes
    }

    /// Returns the parsed segment, or `None` for segments that are skipped (DNL, DHP, EXP).
    #[inline]
    pub fn into_segment_kind(self) -> Option<SegmentKind<'a>> {
        self.kind
    }

    #[inline]
    pub fn as_segment_kind(&self) -> Option<&SegmentKind<'a>> {
        self.kind.as_ref()
    }
}

/// An application-specific segment (`APPn`).
#[derive(Debug)]
pub struct App {
    n: u8,
}

impl App {
    /// Returns the type of APP marker (the `n` in `APPn`), in range `0..=15`.
    #[inline]
    pub fn n(&self) -> u8 {
        self.n
    }
}

pub struct Com<'a> {
    com: &'a [u8],
}

impl<'a> fmt::Debug for Com<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Com(\"{}\")", self.com.escape_ascii())
    }
}

/// Enumeration of segment kinds understood by this parser.
#[derive(Debug)]
pub enum SegmentKind<'a> {
    Soi,
    Dqt(Dqt),
    Dht(Dht<'a>),
    Dri(Dri),
    Sof(Sof<'a>),
    Sos(Sos<'a>),
    App(App),
    Com(Com<'a>),
}

#[derive(Clone, Copy)]
pub struct QuantizationTable {
    PqTq: u8,
    Qk: [u16; 64],
}

impl QuantizationTable {
    /// Returns the quantization table element precision.
    ///
    /// - 0: 8-bit `Qk` values
    /// - 1: 16-bit `Qk` values
    #[inline]
    pub fn Pq(&self) -> u8 {
        self.PqTq >> 4
    }

    /// Returns the destination identifier (0-3).
    #[inline]
    pub fn Tq(&self) -> u8 {
        self.PqTq & 0xf
    }

    /// Returns the quantization table elements, in zigzag order.
    #[inline]
    pub fn Qk(&self) -> &[u16; 64] {
        &self.Qk
    }
}

impl fmt::Debug for QuantizationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationTable")
            .field("Pq", &self.Pq())
            .field("Tq", &self.Tq())
            .field("Qk", &self.Qk)
            .finish()
    }
}

/// **D**efine **Q**uantization **T**ables – sets one or more [`QuantizationTable`]s.
#[derive(Debug)]
pub struct Dqt(Vec<QuantizationTable>);

impl Dqt {
    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &QuantizationTable> {
        self.0.iter()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct DhtHeader {
    TcTh: u8,
    Li: [u8; 16],
}

impl DhtHeader {
    fn num_values(&self) -> usize {
        self.Li.iter().map(|&l| usize::from(l)).sum()
    }
}

pub struct HuffmanTable<'a> {
    header: &'a DhtHeader,
    Vij: &'a [u8],
}

impl<'a> HuffmanTable<'a> {
    /// Returns the table class (0 = DC, 1 = AC).
    #[inline]
    pub fn Tc(&self) -> u8 {
        self.header.TcTh >> 4
    }

    /// Returns the table destination identifier (0-3).
    #[inline]
    pub fn Th(&self) -> u8 {
        self.header.TcTh & 0xf
    }

    /// Returns an array containing the number of codes of each length.
    #[inline]
    pub fn Li(&self) -> &[u8; 16] {
        &self.header.Li
    }

    /// Returns the values associated with each huffman code.
    #[inline]
    pub fn Vij(&self) -> &[u8] {
        self.Vij
    }
}

impl<'a> fmt::Debug for HuffmanTable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("Tc", &self.Tc())
            .field("Th", &self.Th())
            .field("Li", &self.Li())
            .field("Vij", &self.Vij)
            .finish()
    }
}

/// **DHT** Define Huffman Tables – defines one or more [`HuffmanTable`]s.
#[derive(Debug)]
pub struct Dht<'a> {
    tables: Vec<HuffmanTable<'a>>,
}

impl<'a> Dht<'a> {
    pub fn tables(&self) -> impl Iterator<Item = &HuffmanTable<'a>> {
        self.tables.iter()
    }
}

/// **D**efine **R**estart **I**nterval.
///
/// Sets the number of MCUs contained in each restart interval ([`Dri::Ri`]). A value of 0
/// disables restart intervals.
#[derive(Debug, Clone, Copy)]
pub struct Dri {
    Ri: u16,
}

impl Dri {
    /// Returns the number of MCUs contained in each restart interval.
    #[inline]
    pub fn Ri(&self) -> u16 {
        self.Ri
    }
}

/// **SOF** Start Of Frame
#[derive(Debug)]
pub struct Sof<'a> {
    /// The SOF marker.
    sof: SofMarker,
    /// Sample precision in bits.
    P: u8,
    Y: u16,
    X: u16,
    components: &'a [FrameComponent],
}

impl<'a> Sof<'a> {
    #[inline]
    pub fn sof(&self) -> SofMarker {
        self.sof
    }

    /// Returns the sample precision in bits.
    #[inline]
    pub fn P(&self) -> u8 {
        self.P
    }

    /// Returns the number of lines in the image (the height of the frame).
    #[inline]
    pub fn Y(&self) -> u16 {
        self.Y
    }

    /// Returns the number of samples per line (the width of the frame).
    #[inline]
    pub fn X(&self) -> u16 {
        self.X
    }

    #[inline]
    pub fn components(&self) -> &'a [FrameComponent] {
        self.components
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SofMarker(u8);

impl fmt::Debug for SofMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SOF0 => f.write_str("SOF0"),
            Self::SOF1 => f.write_str("SOF1"),
            Self::SOF2 => f.write_str("SOF2"),
            Self::SOF3 => f.write_str("SOF3"),
            _ => f
                .debug_tuple("SofMarker")
                .field(&format_args!("{:02x}", self.0))
                .finish(),
        }
    }
}

impl SofMarker {
    /// Baseline DCT.
    pub const SOF0: Self = Self(0xC0);
    /// Extended Sequential DCT.
    pub const SOF1: Self = Self(0xC1);
    /// Progressive DCT.
    pub const SOF2: Self = Self(0xC2);
    /// Lossless sequential.
    pub const SOF3: Self = Self(0xC3);
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct FrameComponent {
    Ci: u8,
    HiVi: u8,
    Tqi: u8,
}

impl FrameComponent {
    /// Returns this component's component identifier.
    ///
    /// The scan header ([`Sos`]) refers to components using their identifier.
    #[inline]
    pub fn Ci(&self) -> u8 {
        self.Ci
    }

    /// Returns the horizontal sampling factor for this component.
    #[inline]
    pub fn Hi(&self) -> u8 {
        self.HiVi >> 4
    }

    /// Returns the vertical sampling factor for this component.
    #[inline]
    pub fn Vi(&self) -> u8 {
        self.HiVi & 0xf
    }

    /// Returns the index of the quantization table to use for this component.
    #[inline]
    pub fn Tqi(&self) -> u8 {
        self.Tqi
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("Ci", &self.Ci)
            .field("Hi", &self.Hi())
            .field("Vi", &self.Vi())
            .field("Tqi", &self.Tqi)
            .finish()
    }
}

/// **SOS** Start Of Scan – a scan header, followed by entropy-coded scan data.
pub struct Sos<'a> {
    components: &'a [ScanComponent],
    Ss: u8,
    Se: u8,
    AhAl: u8,
    data_offset: usize,
    data: &'a [u8],
}

impl<'a> Sos<'a> {
    #[inline]
    pub fn components(&self) -> &'a [ScanComponent] {
        self.components
    }

    #[inline]
    pub fn Ss(&self) -> u8 {
        self.Ss
    }

    #[inline]
    pub fn Se(&self) -> u8 {
        self.Se
    }

    #[inline]
    pub fn Ah(&self) -> u8 {
        self.AhAl >> 4
    }

    #[inline]
    pub fn Al(&self) -> u8 {
        self.AhAl & 0xf
    }

    /// Returns the offset of the scan data in the original JPEG stream.
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Returns the entropy-coded data in this scan, still byte-stuffed and including any
    /// contained `RST` markers.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> fmt::Debug for Sos<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sos")
            .field("components", &self.components)
            .field("Ss", &self.Ss)
            .field("Se", &self.Se)
            .field("Ah", &self.Ah())
            .field("Al", &self.Al())
            .field("data", &self.data)
            .finish()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct ScanComponent {
    Csj: u8,
    TdjTaj: u8,
}

impl ScanComponent {
    /// Returns the scan component selector.
    #[inline]
    pub fn Csj(&self) -> u8 {
        self.Csj
    }

    /// Returns the DC entropy coding table destination selector.
    #[inline]
    pub fn Tdj(&self) -> u8 {
        self.TdjTaj >> 4
    }

    /// Returns the AC entropy coding table destination selector.
    #[inline]
    pub fn Taj(&self) -> u8 {
        self.TdjTaj & 0xf
    }
}

impl fmt::Debug for ScanComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanComponent")
            .field("Csj", &self.Csj)
            .field("Tdj", &self.Tdj())
            .field("Taj", &self.Taj())
            .finish()
    }
}
