// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! QR challenge rendering as an SVG data URL.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use rapidex_core::RapidexError;

/// Pixels per module in the rendered image.
const MODULE_PX: u32 = 8;

/// Render raw QR content as `data:image/svg+xml;base64,...`.
pub fn render_data_url(content: &str) -> Result<String, RapidexError> {
    let svg = render_svg(content)?;
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(svg.as_bytes())
    ))
}

/// Render raw QR content as a standalone SVG document with the standard
/// four-module quiet zone.
pub fn render_svg(content: &str) -> Result<String, RapidexError> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::M)
        .map_err(|e| RapidexError::Internal(format!("QR generation failed: {e}")))?;

    Ok(code
        .render::<svg::Color<'_>>()
        .quiet_zone(true)
        .module_dimensions(MODULE_PX, MODULE_PX)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}
