//! User-facing status texts

use media_adapter::size_suffix;

pub const QUEUED: &str = "⌛ queued...";
pub const GETTING_INFO: &str = "🔎 getting info...";

/// Full status message body: `"{n}. {url}\nState: {state}"` with 1-based `n`.
pub fn status_text(index: usize, url: &str, state: &str) -> String {
    format!("{}. {url}\nState: {state}", index + 1)
}

pub fn downloading(current: usize, total: usize, size: u64) -> String {
    format!("⬇️ downloading media {current}/{total}...{}", size_suffix(size))
}

pub fn sending(total_size: u64) -> String {
    format!("📲 sending media{}", size_suffix(total_size))
}

pub fn success(count: usize, total_size: u64) -> String {
    if count > 1 {
        format!("✅ got {count} medias successfully{}", size_suffix(total_size))
    } else {
        format!("✅ get media successfully{}", size_suffix(total_size))
    }
}

pub fn delivery_failed(error: &str) -> String {
    format!("❌ failed to send media: {error}")
}

/// Reply for an item too large to deliver inline. `position` is 1-based.
pub fn oversized_notice(
    index: usize,
    url: &str,
    position: usize,
    size: u64,
    direct_url: &str,
) -> String {
    format!(
        "{}. {url}\nFile ({position}) too large to send directly ({:.2} MB). Direct URL: {direct_url}",
        index + 1,
        size as f64 / 1024.0 / 1024.0
    )
}

pub fn quota_rejection(error: &str) -> String {
    format!("You are not allowed to download media: {error}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_layout() {
        assert_eq!(
            status_text(0, "https://x/p", QUEUED),
            "1. https://x/p\nState: ⌛ queued..."
        );
    }

    #[test]
    fn progress_states() {
        assert_eq!(downloading(1, 3, 0), "⬇️ downloading media 1/3...");
        assert_eq!(downloading(2, 3, 2048), "⬇️ downloading media 2/3... (2.0 KiB)");
        assert_eq!(sending(0), "📲 sending media");
        assert_eq!(success(1, 1024), "✅ get media successfully (1.0 KiB)");
        assert_eq!(success(3, 0), "✅ got 3 medias successfully");
    }

    #[test]
    fn oversized_formats_megabytes() {
        assert_eq!(
            oversized_notice(1, "https://x/p", 2, 75 * 1024 * 1024, "https://cdn/v.mp4"),
            "2. https://x/p\nFile (2) too large to send directly (75.00 MB). \
             Direct URL: https://cdn/v.mp4"
        );
    }

    #[test]
    fn rejection_and_failure() {
        assert_eq!(
            quota_rejection("subscription has expired"),
            "You are not allowed to download media: subscription has expired"
        );
        assert_eq!(delivery_failed("disk full"), "❌ failed to send media: disk full");
    }
}
