//! Media URL classification shared by every extraction strategy

use crate::extractor::models::{url_path_lower, MediaKind};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static HLS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>\\]+\.m3u8[^\s"'<>\\]*"#).expect("valid HLS regex")
});

static PLAYER_CONFIG_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:file|src|source|url)["']?[\s:=]+["']([^"']+\.(?:mp4|webm|m3u8))["']"#)
        .expect("valid player config regex")
});

/// Element facts needed to pick and classify a media URL.
///
/// Built from a parsed document by the static extractor and from a DOM query
/// by the browser controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaCandidate {
    pub tag: String,
    pub src: Option<String>,
    /// First nested `source`/`iframe` element, if any
    pub nested_tag: Option<String>,
    pub nested_src: Option<String>,
    /// `class` or `id` names a player or embed
    pub player_like: bool,
}

impl MediaCandidate {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_nested(mut self, tag: impl Into<String>, src: impl Into<String>) -> Self {
        self.nested_tag = Some(tag.into().to_ascii_lowercase());
        self.nested_src = Some(src.into());
        self
    }

    pub fn with_class_or_id(mut self, value: &str) -> Self {
        self.player_like = self.player_like || names_player(value);
        self
    }

    fn is_embed_element(&self) -> bool {
        let embed = |t: &str| matches!(t, "iframe" | "embed" | "object");
        embed(&self.tag) || self.nested_tag.as_deref().is_some_and(embed) || self.player_like
    }

}

/// `class`/`id` values such as `jw-player` or `video-embed`.
pub fn names_player(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.contains("player") || lower.contains("embed")
}

/// Kind implied by the URL suffix alone.
pub fn classify_url(url: &str) -> Option<MediaKind> {
    let path = url_path_lower(url);
    if path.ends_with(".m3u8") {
        Some(MediaKind::HlsStream)
    } else if path.ends_with(".mp4") || path.ends_with(".webm") {
        Some(MediaKind::DirectVideo)
    } else {
        None
    }
}

/// Resolve `raw` against `base`, refusing sources a cast device cannot open.
pub fn resolve_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if ["blob:", "data:", "javascript:", "about:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Pick the candidate's media URL and classify it.
///
/// Suffix wins; otherwise only an iframe or player-class element counts, as
/// an embedded player. A bare `video` URL such as `/stream` is not playable.
pub fn classify_candidate(candidate: &MediaCandidate, base: Option<&Url>) -> Option<(String, MediaKind)> {
    let url = [candidate.src.as_deref(), candidate.nested_src.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|raw| resolve_url(raw, base))?;

    let kind = match classify_url(&url) {
        Some(kind) => kind,
        None if candidate.is_embed_element() => MediaKind::EmbeddedPlayer,
        None => return None,
    };
    Some((url, kind))
}

/// Look for stream URLs in script bodies or serialized markup.
pub fn scan_text(text: &str, base: Option<&Url>) -> Option<(String, MediaKind)> {
    let text = text.replace("\\/", "/");

    if let Some(m) = HLS_URL.find(&text) {
        return Some((m.as_str().to_string(), MediaKind::HlsStream));
    }

    PLAYER_CONFIG_URL
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| resolve_url(m.as_str(), base))
        .find_map(|url| classify_url(&url).map(|kind| (url, kind)))
}

/// Choose among URLs seen on the wire: manifests before plain files.
pub fn pick_network_media(urls: &[String]) -> Option<(String, MediaKind)> {
    let classified: Vec<(String, MediaKind)> = urls
        .iter()
        .filter_map(|u| classify_url(u).map(|kind| (u.clone(), kind)))
        .collect();

    classified
        .iter()
        .find(|(_, kind)| *kind == MediaKind::HlsStream)
        .or_else(|| classified.first())
        .cloned()
}

/// Whether a network response looks like media, by URL or MIME type.
pub fn is_media_response(url: &str, mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    let path = url_path_lower(url);
    mime.starts_with("video/")
        || mime.contains("mpegurl")
        || [".m3u8", ".mp4", ".webm", ".mpd"]
            .iter()
            .any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://site.test/videos/page.html").unwrap()
    }

    #[test]
    fn test_classify_url_by_suffix() {
        assert_eq!(classify_url("https://cdn.test/live/index.m3u8?token=1"), Some(MediaKind::HlsStream));
        assert_eq!(classify_url("https://cdn.test/a.MP4"), Some(MediaKind::DirectVideo));
        assert_eq!(classify_url("https://cdn.test/a.webm#t=3"), Some(MediaKind::DirectVideo));
        assert_eq!(classify_url("https://cdn.test/embed/42"), None);
    }

    #[test]
    fn test_relative_src_resolves_against_page() {
        let c = MediaCandidate::new("VIDEO").with_src("../media/clip.mp4");
        assert_eq!(
            classify_candidate(&c, Some(&base())),
            Some(("https://site.test/media/clip.mp4".to_string(), MediaKind::DirectVideo))
        );
    }

    #[test]
    fn test_nested_source_used_when_src_missing_or_blob() {
        let c = MediaCandidate::new("video")
            .with_src("blob:https://site.test/123")
            .with_nested("source", "https://cdn.test/hls/master.m3u8");
        let (url, kind) = classify_candidate(&c, Some(&base())).unwrap();
        assert_eq!(url, "https://cdn.test/hls/master.m3u8");
        assert_eq!(kind, MediaKind::HlsStream);
    }

    #[test]
    fn test_iframe_and_player_class_are_embedded() {
        let iframe = MediaCandidate::new("iframe").with_src("//player.test/embed/9");
        assert_eq!(
            classify_candidate(&iframe, Some(&base())).map(|(_, k)| k),
            Some(MediaKind::EmbeddedPlayer)
        );

        let div = MediaCandidate::new("div")
            .with_class_or_id("jw-Player wrapper")
            .with_nested("iframe", "https://host.test/v/1");
        assert_eq!(classify_candidate(&div, None).map(|(_, k)| k), Some(MediaKind::EmbeddedPlayer));
    }

    #[test]
    fn test_video_without_known_suffix_is_skipped() {
        let c = MediaCandidate::new("video").with_src("https://cdn.test/stream");
        assert_eq!(classify_candidate(&c, None), None);

        let nested = MediaCandidate::new("video").with_nested("source", "/live/feed?id=3");
        assert_eq!(classify_candidate(&nested, Some(&base())), None);
    }

    #[test]
    fn test_element_without_source_is_skipped() {
        assert_eq!(classify_candidate(&MediaCandidate::new("div").with_class_or_id("player"), None), None);
        let link = MediaCandidate::new("img").with_src("https://site.test/poster.jpg");
        assert_eq!(classify_candidate(&link, None), None);
    }

    #[test]
    fn test_scan_text_finds_hls_and_config_urls() {
        let script = r#"var cfg = {"hls": "https:\/\/cdn.test\/live\/index.m3u8?x=1"};"#;
        assert_eq!(
            scan_text(script, None),
            Some(("https://cdn.test/live/index.m3u8?x=1".to_string(), MediaKind::HlsStream))
        );

        let jw = r#"jwplayer("p").setup({ file: "/media/movie.mp4", image: "/p.jpg" });"#;
        assert_eq!(
            scan_text(jw, Some(&base())),
            Some(("https://site.test/media/movie.mp4".to_string(), MediaKind::DirectVideo))
        );

        assert_eq!(scan_text("console.log('nothing here')", None), None);
    }

    #[test]
    fn test_network_pick_prefers_manifest() {
        let seen = vec![
            "https://cdn.test/seg-001.ts".to_string(),
            "https://cdn.test/fallback.mp4".to_string(),
            "https://cdn.test/master.m3u8".to_string(),
        ];
        assert_eq!(pick_network_media(&seen).unwrap().0, "https://cdn.test/master.m3u8");
        assert_eq!(pick_network_media(&seen[..2]).unwrap().1, MediaKind::DirectVideo);
        assert!(pick_network_media(&[]).is_none());
    }

    #[test]
    fn test_media_response_filter() {
        assert!(is_media_response("https://cdn.test/x", "video/mp4"));
        assert!(is_media_response("https://cdn.test/x", "application/vnd.apple.mpegurl"));
        assert!(is_media_response("https://cdn.test/a.mpd", "application/octet-stream"));
        assert!(!is_media_response("https://cdn.test/app.js", "application/javascript"));
    }
}
