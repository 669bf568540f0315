use anyhow::Result;
use qrcode::QrCode;
use qrcode::render::svg;

/// Render `data` as a standalone SVG QR code, at least 256px square.
pub fn render_svg(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_document() {
        let svg = render_svg("http://localhost:3000/checkin?token=abc").unwrap();
        assert!(svg.contains("<svg"));
    }
}
