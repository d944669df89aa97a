//! Filename, media kind and size helpers shared by adapters and delivery

use std::fmt;

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "ico", "raw", "cr2", "nef",
    "arw", "dng", "orf", "rw2", "pef", "srw", "heic", "heif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "m4v", "3gp", "ogv", "mpg", "mpeg", "ts",
    "vob", "asf", "rm", "rmvb", "f4v", "swf", "mts", "m2ts",
];

/// Delivery form of a downloaded item, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn from_filename(filename: &str) -> Self {
        let Some(ext) = extension(filename) else {
            return MediaKind::Unknown;
        };
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Photo
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Unknown
        }
    }

    /// Extension used when a filename has to be synthesized.
    pub fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Unknown => "bin",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        })
    }
}

/// Lowercased extension of the last path segment, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let segment = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether the URL's path ends in a known photo or video extension.
pub fn has_media_extension(url: &url::Url) -> bool {
    MediaKind::from_filename(url.path()) != MediaKind::Unknown
}

/// Last path segment of `direct_url` with the query stripped.
///
/// Falls back to `media_<n>.<ext>` when the URL has no usable segment, where
/// `<ext>` comes from `kind`.
pub fn filename_from_url(direct_url: &str, index: usize, kind: MediaKind) -> String {
    let without_query = direct_url
        .split(['?', '#'])
        .next()
        .unwrap_or(direct_url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, p)| p).unwrap_or(""))
        .unwrap_or(without_query);

    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() && segment.contains('.') => sanitize(segment),
        Some(segment) if !segment.is_empty() => {
            format!("{}.{}", sanitize(segment), kind.default_extension())
        }
        _ => format!("media_{}.{}", index + 1, kind.default_extension()),
    }
}

/// Extract a filename from a `Content-Disposition` header value.
///
/// `filename` wins over `filename*`; for `filename*` the `charset''` prefix is
/// dropped. Path components are stripped.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim().to_ascii_lowercase().as_str() {
            "filename" if !value.is_empty() => plain = Some(value.to_string()),
            "filename*" => {
                if let Some((_, name)) = value.split_once("''") {
                    let name = name.trim_matches(|c| c == '"' || c == '\'');
                    if !name.is_empty() {
                        extended = Some(name.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    plain
        .or(extended)
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty())
}

/// File extension for a `Content-Type`, ignoring parameters.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match mime.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "video/avi" | "video/x-msvideo" => "avi",
        "video/quicktime" => "mov",
        "video/x-ms-wmv" => "wmv",
        "video/x-flv" => "flv",
        "video/3gpp" => "3gp",
        "video/3gpp2" => "3g2",
        "video/x-matroska" => "mkv",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => return None,
    };
    Some(ext)
}

/// Human-readable size in binary units, e.g. `1.5 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}iB", bytes as f64 / div as f64)
}

/// ` (1.5 MiB)` for known sizes, empty for unknown (0).
pub fn size_suffix(bytes: u64) -> String {
    if bytes == 0 {
        String::new()
    } else {
        format!(" ({})", format_size(bytes))
    }
}

fn sanitize(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}
