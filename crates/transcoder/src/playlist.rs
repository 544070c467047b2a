//! Synthesized VOD playlist.
//!
//! The manifest advertises every eventual segment up front, computed from the
//! probed duration alone, so clients treat the stream as VOD and request
//! segments sequentially while ffmpeg produces them in the background.

use std::fmt::Write;

use crate::IDENTIFIER_LEN;

/// Build the VOD manifest for a probed duration. Line endings are CRLF and
/// segment lengths carry four decimal digits.
pub fn vod_manifest(duration_secs: f64, identifier: &str, segment_secs: u32) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\r\n");
    out.push_str("#EXT-X-VERSION:3\r\n");
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\r\n");
    let _ = write!(out, "#EXT-X-TARGETDURATION: {segment_secs}\r\n");
    out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\r\n");

    let segment = f64::from(segment_secs);
    let mut remaining = duration_secs;
    let mut index = 0u64;
    while remaining > 0.0 {
        let len = remaining.min(segment);
        let _ = write!(out, "#EXTINF:{len:.4}, nodesc\r\n");
        let _ = write!(out, "/segment.ts?file={}\r\n", segment_file_name(identifier, index));
        remaining -= segment;
        index += 1;
    }

    out.push_str("#EXT-X-ENDLIST\r\n");
    out
}

/// Segment filename as it appears on disk and in manifest URIs.
pub fn segment_file_name(identifier: &str, index: u64) -> String {
    format!("{identifier}{index}.ts")
}

/// Parse a `<identifier><index>.ts` name back into its parts. The identifier
/// is the fixed-length prefix; everything between it and the extension must
/// be a decimal segment index. Anything else (traversal attempts included)
/// is rejected.
pub fn parse_segment_name(filename: &str) -> Option<(String, u64)> {
    let stem = filename.strip_suffix(".ts")?;
    if !stem.is_ascii() || stem.len() <= IDENTIFIER_LEN {
        return None;
    }
    let (identifier, index) = stem.split_at(IDENTIFIER_LEN);
    if !identifier.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let index = index.parse().ok()?;
    Some((identifier.to_string(), index))
}
