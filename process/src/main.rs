#[macro_use]
extern crate tracing;

use image::{GenericImageView, Pixel, RgbImage};
use itertools::Itertools;
use repaint_core::{Color, Raster};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(argh::FromArgs)]
/// turn an image file into a raster used by repaint
struct Args {
    #[argh(positional)]
    /// path to the image file
    path: PathBuf,

    #[argh(option)]
    /// path to output file
    output: PathBuf,

    #[argh(option, default = "200")]
    /// largest width and height the board accepts
    max_size: u32,

    #[argh(switch)]
    /// paint fully transparent pixels white instead of black
    transparent_white: bool,
}

/// Sample every pixel in `x * height + y` order.
fn rasterize(image: &RgbImage) -> anyhow::Result<Raster> {
    let (width, height) = image.dimensions();
    let pixels = (0..width)
        .cartesian_product(0..height)
        .map(|(x, y)| {
            let [r, g, b] = image.get_pixel(x, y).0;
            Color::from_rgb(r, g, b).0
        })
        .collect();

    Ok(Raster::new(width, height, pixels)?)
}

fn flatten(image: image::DynamicImage, transparent_white: bool) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        if transparent_white && pixel.0[3] == 0 {
            image::Rgb([0xff; 3])
        } else {
            pixel.to_rgb()
        }
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let image = image::open(&args.path)?;
    let (width, height) = image.dimensions();
    info!(width, height, "decoded {}", args.path.display());
    if width > args.max_size || height > args.max_size {
        warn!(
            max = args.max_size,
            "image is larger than the board accepts, it will be rejected"
        );
    }

    let raster = rasterize(&flatten(image, args.transparent_white))?;
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&raster)?;

    let file = File::create(&args.output)?;
    let mut file = BufWriter::new(file);
    file.write_all(&bytes)?;
    file.flush()?;

    info!(bytes = bytes.len(), "wrote {}", args.output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{flatten, rasterize};
    use image::{DynamicImage, Rgba, RgbaImage};
    use repaint_core::Color;

    #[test]
    fn rasterizes_column_major() {
        let mut image = RgbaImage::new(2, 3);
        image.put_pixel(1, 0, Rgba([0x11, 0x22, 0x33, 0xff]));
        image.put_pixel(0, 2, Rgba([0xaa, 0xbb, 0xcc, 0xff]));

        let raster = rasterize(&flatten(DynamicImage::ImageRgba8(image), false)).unwrap();
        assert_eq!((raster.width(), raster.height()), (2, 3));
        assert_eq!(raster.color(3), Color(0x112233));
        assert_eq!(raster.color(2), Color(0xaabbcc));
    }

    #[test]
    fn transparent_pixels_can_become_white() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(1, 1));
        assert_eq!(rasterize(&flatten(image.clone(), false)).unwrap().color(0), Color(0));
        assert_eq!(
            rasterize(&flatten(image, true)).unwrap().color(0),
            Color::WHITE
        );
    }
}
