// File: hookline-core/src/platforms/qr.rs

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;

use crate::Error;

/// Encode a QR payload as an `image/svg+xml` data URL for the dashboard.
pub fn render_data_url(payload: &str) -> Result<String, Error> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| Error::Parse(format!("QR encode failed: {}", e)))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(264, 264)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", BASE64.encode(image)))
}

/// Compact block rendering for terminal logs.
pub fn render_terminal(payload: &str) -> Option<String> {
    let code = QrCode::new(payload.as_bytes()).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build(),
    )
}
