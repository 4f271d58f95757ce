//! YouTube links attached to products in place of an uploaded image.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::YOUTUBE_THUMBNAIL_BASE_URL;

const VIDEO_ID_LEN: usize = 11;

static SHORTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/shorts/([^/?]+)").expect("static regex is valid")
});

static WATCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*")
        .expect("static regex is valid")
});

/// Extract the video id from a YouTube URL.
///
/// Shorts links accept any id; every other form requires the 11-character id.
pub fn extract_youtube_id(url: &str) -> Option<String> {
    if url.contains("/shorts/") {
        return SHORTS_PATTERN
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
    }

    let captures = WATCH_PATTERN.captures(url)?;
    let id = captures.get(2)?.as_str();
    if id.len() == VIDEO_ID_LEN {
        Some(id.to_string())
    } else {
        None
    }
}

pub fn youtube_thumbnail_url(video_id: &str) -> String {
    format!("{}/{}/mqdefault.jpg", YOUTUBE_THUMBNAIL_BASE_URL, video_id)
}
