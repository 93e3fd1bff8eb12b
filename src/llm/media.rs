use std::io::Cursor;

use image::ImageFormat;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

/// Image types the Gemini vision endpoints accept as inline data.
pub fn is_supported_image(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

/// Picks the declared type when usable, else the sniffed one.
pub fn resolve_image_mime_type(declared: Option<&str>, data: &[u8]) -> Option<String> {
    let mut candidates = Vec::new();
    if let Some(declared) = declared {
        if !declared.trim().is_empty() {
            candidates.push(declared.to_string());
        }
    }
    if let Some(detected) = detect_mime_type(data) {
        candidates.push(detected);
    }

    candidates
        .into_iter()
        .map(|candidate| normalize_image_mime_type(&candidate))
        .find(|candidate| is_supported_image(candidate))
}

/// Returns PNG bytes, re-encoding when the source is another format.
pub fn ensure_png(data: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    if detect_mime_type(data).as_deref() == Some("image/png") {
        return Ok(data.to_vec());
    }
    let decoded = image::load_from_memory(data)?;
    let mut output = Cursor::new(Vec::new());
    decoded.write_to(&mut output, ImageFormat::Png)?;
    Ok(output.into_inner())
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let pixel = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 180, 40]));
    let mut output = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixel)
        .write_to(&mut output, ImageFormat::Png)
        .unwrap();
    output.into_inner()
}
