//! Frame-level state: image dimensions, color components and quantization tables.

use crate::{
    error::Result,
    file::{Sof, SofMarker},
};

/// Maximum number of data units a baseline MCU may contain.
const MAX_DATA_UNITS_PER_MCU: usize = 10;

/// A quantization table, stored in zigzag order (the order it is transmitted in and the order
/// coefficients are decoded in).
#[derive(Clone, Copy)]
pub struct QTable {
    pub values: [u16; 64],
}

#[derive(Debug)]
pub struct Component {
    /// Component identifier, as referenced by scan headers.
    pub id: u8,
    pub hsample: u8,
    pub vsample: u8,
    pub qtable: u8,
    /// 0-3, selecting a DC table. Assigned by the scan header.
    pub dchuff: u8,
    /// 0-3, selecting an AC table. Assigned by the scan header.
    pub achuff: u8,
    /// DC value of the previously decoded data unit of this component.
    pub dc_pred: i32,
}

impl Component {
    /// Number of data units (8x8 blocks) this component contributes to every MCU.
    #[inline]
    pub fn data_units(&self) -> usize {
        usize::from(self.hsample) * usize::from(self.vsample)
    }
}

#[derive(Debug)]
pub struct Frame {
    pub width: u16,
    pub height: u16,
    pub hmax: u8,
    pub vmax: u8,
    components: Vec<Component>,
}

impl Frame {
    pub fn from_sof(sof: &Sof<'_>) -> Result<Self> {
        if sof.sof() != SofMarker::SOF0 {
            bail!(Unsupported, "not a baseline JPEG (SOF={:?})", sof.sof());
        }
        if sof.P() != 8 {
            bail!(
                Unsupported,
                "sample precision of {} bits is not supported",
                sof.P()
            );
        }
        if sof.Y() == 0 {
            bail!(Unsupported, "frames with height defined by DNL are not supported");
        }
        if sof.X() == 0 {
            bail!(Format, "frame has a width of 0");
        }
        match sof.components().len() {
            1 | 3 => {}
            0 => bail!(Format, "frame has no components"),
            n => bail!(
                Unsupported,
                "frame with {n} components not supported (only 1 or 3 components are supported)"
            ),
        }

        log::trace!("frame components:");
        let mut components = Vec::with_capacity(sof.components().len());
        for c in sof.components() {
            log::trace!("{:?}", c);

            if !(1..=4).contains(&c.Hi()) || !(1..=4).contains(&c.Vi()) {
                bail!(
                    Format,
                    "invalid sampling factors {}x{} for component {}",
                    c.Hi(),
                    c.Vi(),
                    c.Ci()
                );
            }
            if c.Tqi() > 3 {
                bail!(
                    Format,
                    "invalid quantization table selection {} for component {} (only tables 0-3 are valid)",
                    c.Tqi(),
                    c.Ci()
                );
            }
            if components.iter().any(|other: &Component| other.id == c.Ci()) {
                bail!(Format, "duplicate component identifier {}", c.Ci());
            }

            components.push(Component {
                id: c.Ci(),
                hsample: c.Hi(),
                vsample: c.Vi(),
                qtable: c.Tqi(),
                dchuff: 0,
                achuff: 0,
                dc_pred: 0,
            });
        }

        if let [only] = &mut components[..] {
            // A single-component scan is never interleaved: each MCU is one data unit, whatever
            // the declared sampling factors.
            if (only.hsample, only.vsample) != (1, 1) {
                log::debug!(
                    "treating {}x{} sampling of single component as 1x1",
                    only.hsample,
                    only.vsample
                );
            }
            only.hsample = 1;
            only.vsample = 1;
        }

        let data_units = components.iter().map(Component::data_units).sum::<usize>();
        if data_units > MAX_DATA_UNITS_PER_MCU {
            bail!(
                Format,
                "MCU would contain {data_units} data units (at most {MAX_DATA_UNITS_PER_MCU} are allowed)"
            );
        }

        Ok(Self::new(sof.X(), sof.Y(), components))
    }

    pub(crate) fn new(width: u16, height: u16, components: Vec<Component>) -> Self {
        let hmax = components.iter().map(|c| c.hsample).max().unwrap_or(1);
        let vmax = components.iter().map(|c| c.vsample).max().unwrap_or(1);

        Self {
            width,
            height,
            hmax,
            vmax,
            components,
        }
    }

    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[inline]
    pub fn component_mut(&mut self, index: usize) -> &mut Component {
        &mut self.components[index]
    }

    /// Returns the index of the component with identifier `id`.
    pub fn index_of(&self, id: u8) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }

    pub fn reset_predictors(&mut self) {
        for c in &mut self.components {
            c.dc_pred = 0;
        }
    }

    /// Width of an MCU in pixels.
    #[inline]
    pub fn mcu_width(&self) -> usize {
        8 * usize::from(self.hmax)
    }

    /// Height of an MCU in pixels.
    #[inline]
    pub fn mcu_height(&self) -> usize {
        8 * usize::from(self.vmax)
    }

    /// Number of MCUs per row.
    #[inline]
    pub fn mcus_x(&self) -> usize {
        usize::from(self.width).div_ceil(self.mcu_width())
    }

    /// Number of MCU rows.
    #[inline]
    pub fn mcus_y(&self) -> usize {
        usize::from(self.height).div_ceil(self.mcu_height())
    }

    /// Image width rounded up to a whole number of MCUs.
    #[inline]
    pub fn padded_width(&self) -> usize {
        self.mcus_x() * self.mcu_width()
    }

    /// Image height rounded up to a whole number of MCUs.
    #[inline]
    pub fn padded_height(&self) -> usize {
        self.mcus_y() * self.mcu_height()
    }
}
