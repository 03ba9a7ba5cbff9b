use std::{env, fs::File, io::BufWriter, process, time::Instant};

use jpegdec::Decoder;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module(env!("CARGO_PKG_NAME"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let [infile, outfile] = &*args else {
        eprintln!("usage: topng <infile.jpg> <outfile.png>");
        process::exit(1);
    };

    let start = Instant::now();
    let image = Decoder::open(infile)?;
    log::info!(
        "decoded {}x{} image with {} component(s) in {:?}",
        image.width(),
        image.height(),
        image.component_count(),
        start.elapsed(),
    );

    let rgb = image.cropped_rgb();

    let outfile = BufWriter::new(File::create(outfile)?);
    let mut png = png::Encoder::new(outfile, image.width(), image.height());
    png.set_color(png::ColorType::Rgb);
    png.set_depth(png::BitDepth::Eight);
    let mut writer = png.write_header()?;
    writer.write_image_data(bytemuck::cast_slice(&rgb))?;
    writer.finish()?;

    Ok(())
}
