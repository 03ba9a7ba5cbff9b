//! Creates baseline JPEG test images from PNG files.

use std::{env, fs::File};

use anyhow::{bail, ensure};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

const USAGE: &str = "usage: enc <infile.png> <outfile.jpg> [444|422|420|gray] [quality]";

fn main() -> anyhow::Result<()> {
    let args = env::args().skip(1).collect::<Vec<_>>();

    let [infile, outfile, rest @ ..] = &*args else {
        bail!(USAGE)
    };
    let (mode, quality) = match rest {
        [] => ("420", 100),
        [mode] => (mode.as_str(), 100),
        [mode, quality] => (mode.as_str(), quality.parse::<u8>()?),
        _ => bail!(USAGE),
    };
    let (sampling, gray) = match mode {
        "444" => (SamplingFactor::R_4_4_4, false),
        "422" => (SamplingFactor::R_4_2_2, false),
        "420" => (SamplingFactor::R_4_2_0, false),
        "gray" => (SamplingFactor::R_4_4_4, true),
        _ => bail!(USAGE),
    };

    let infile = File::open(infile)?;
    let png = png::Decoder::new(infile);
    let mut reader = png.read_info()?;

    ensure!(reader.info().color_type == png::ColorType::Rgb);
    ensure!(reader.info().bit_depth == png::BitDepth::Eight);

    let width = u16::try_from(reader.info().width)?;
    let height = u16::try_from(reader.info().height)?;
    let mut buf = vec![0; usize::from(width) * usize::from(height) * 3];
    reader.next_frame(&mut buf)?;

    let (buf, color_type) = if gray {
        let luma = buf
            .chunks_exact(3)
            .map(|p| ((299 * u32::from(p[0]) + 587 * u32::from(p[1]) + 114 * u32::from(p[2])) / 1000) as u8)
            .collect();
        (luma, ColorType::Luma)
    } else {
        (buf, ColorType::Rgb)
    };

    let outfile = File::create(outfile)?;
    let mut enc = Encoder::new(outfile, quality);
    enc.set_sampling_factor(sampling);
    enc.encode(&buf, width, height, color_type)?;

    Ok(())
}
