use image::{ImageBuffer, Luma};
use qrcode::render::svg;
use qrcode::QrCode;

// Pixels per QR module in PNG output
const MODULE_SIZE: u32 = 10;
// Quiet zone width in modules (QR standard minimum)
const QUIET_ZONE_MODULES: u32 = 4;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Renders a check-in payload as an SVG document
pub fn generate_qr_svg(payload: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(payload.as_bytes())?;

    let svg = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .build();

    Ok(svg)
}

/// Renders a check-in payload as PNG bytes
pub fn generate_qr_png(payload: &str) -> Result<Vec<u8>, QrGenerationError> {
    let code = QrCode::new(payload.as_bytes())?;

    let width = code.width() as u32;
    let img_size = (width + 2 * QUIET_ZONE_MODULES) * MODULE_SIZE;

    let mut img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(img_size, img_size, Luma([255u8]));

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let module_x = x / MODULE_SIZE;
        let module_y = y / MODULE_SIZE;
        if module_x < QUIET_ZONE_MODULES
            || module_y < QUIET_ZONE_MODULES
            || module_x >= width + QUIET_ZONE_MODULES
            || module_y >= width + QUIET_ZONE_MODULES
        {
            continue;
        }

        let color = code[(
            (module_x - QUIET_ZONE_MODULES) as usize,
            (module_y - QUIET_ZONE_MODULES) as usize,
        )];
        if color == qrcode::types::Color::Dark {
            *pixel = Luma([0u8]);
        }
    }

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "trailtag://checkin?program=7&location=North+Gate&t=1760000000";

    #[test]
    fn test_qr_svg_generation() {
        let svg = generate_qr_svg(PAYLOAD).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_generation() {
        let png = generate_qr_png(PAYLOAD).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), decoded.height());
        assert_eq!(decoded.width() % MODULE_SIZE, 0);
    }
}
