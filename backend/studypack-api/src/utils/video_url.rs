use lazy_static::lazy_static;
use regex::Regex;

/// Accepted YouTube URL prefixes for imports.
pub const SUPPORTED_PREFIXES: [&str; 3] = [
    "https://youtu.be",
    "https://www.youtube.com",
    "https://youtube.com",
];

lazy_static! {
    static ref WATCH_OR_SHORT_RE: Regex =
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([a-zA-Z0-9_-]{11})")
            .expect("watch url pattern");
    static ref EMBED_RE: Regex =
        Regex::new(r"youtube\.com/embed/([a-zA-Z0-9_-]{11})").expect("embed url pattern");
    static ref BARE_ID_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("bare id pattern");
}

pub fn is_supported_video_url(url: &str) -> bool {
    SUPPORTED_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// 11-character video id from watch, short, embed URLs or a bare id.
pub fn extract_video_id(url: &str) -> Option<String> {
    let url = url.trim();
    if let Some(caps) = WATCH_OR_SHORT_RE.captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = EMBED_RE.captures(url) {
        return Some(caps[1].to_string());
    }
    if BARE_ID_RE.is_match(url) {
        return Some(url.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_prefixes_only() {
        assert!(is_supported_video_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_supported_video_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(is_supported_video_url("https://youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_supported_video_url("http://youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_supported_video_url("https://vimeo.com/12345"));
        assert!(!is_supported_video_url(""));
    }

    #[test]
    fn extracts_ids_from_common_shapes() {
        let expected = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            expected
        );
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), expected);
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            expected
        );
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), expected);
    }

    #[test]
    fn rejects_urls_without_an_id() {
        assert_eq!(extract_video_id("https://www.youtube.com/"), None);
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
        assert_eq!(extract_video_id("not a video"), None);
    }
}
