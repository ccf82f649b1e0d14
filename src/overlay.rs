//! Cosmetic diagnosis overlay: the input image tinted red for PNEUMONIA or
//! green for NORMAL, re-encoded as PNG and base64 for inline JSON transport.

use base64::engine::general_purpose;
use base64::Engine as _;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;

use crate::pipeline::Diagnosis;

/// Tint opacity over the original image.
const ALPHA: f32 = 0.25;

pub fn tint_color(diagnosis: Diagnosis) -> [u8; 3] {
    match diagnosis {
        Diagnosis::Pneumonia => [255, 0, 0],
        Diagnosis::Normal => [0, 255, 0],
    }
}

fn blend_channel(base: u8, tint: u8) -> u8 {
    (f32::from(base) * (1.0 - ALPHA) + f32::from(tint) * ALPHA).round() as u8
}

/// Blend the diagnosis color over the image and return it as a
/// base64-encoded PNG.
pub fn overlay_png_b64(
    img: &DynamicImage,
    diagnosis: Diagnosis,
) -> Result<String, image::ImageError> {
    let tint = tint_color(diagnosis);
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for (channel, &t) in pixel.0.iter_mut().zip(tint.iter()) {
            *channel = blend_channel(*channel, t);
        }
    }

    let mut png = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(png))
}
