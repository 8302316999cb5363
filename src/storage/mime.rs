use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type for a file name, chosen by extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/x-icon",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("avif") => "image/avif",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png() {
        assert_eq!(content_type_for("a.png"), "image/png");
    }

    #[test]
    fn test_jpeg_variants() {
        assert_eq!(content_type_for("photo.jpg"), "image/jpeg");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("PHOTO.JPG"), "image/jpeg");
    }

    #[test]
    fn test_unknown_falls_back_to_octet_stream() {
        assert_eq!(content_type_for("data.xyz"), OCTET_STREAM);
        assert_eq!(content_type_for("no_extension"), OCTET_STREAM);
        assert_eq!(content_type_for(".png"), OCTET_STREAM);
    }
}
