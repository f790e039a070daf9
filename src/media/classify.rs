use std::path::Path;

/// Container extensions treated as video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Decide whether a file is audio or video from its extension.
///
/// Unknown or missing extensions are treated as audio.
pub fn classify(path: &Path) -> MediaKind {
    let is_video = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);

    if is_video {
        MediaKind::Video
    } else {
        MediaKind::Audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extensions() {
        for name in ["a.mp4", "b.avi", "c.MOV", "d.mkv", "e.flv", "f.wmv"] {
            assert_eq!(classify(Path::new(name)), MediaKind::Video, "{name}");
        }
    }

    #[test]
    fn test_audio_and_unknown_default_to_audio() {
        assert_eq!(classify(Path::new("voice.wav")), MediaKind::Audio);
        assert_eq!(classify(Path::new("voice.mp3")), MediaKind::Audio);
        assert_eq!(classify(Path::new("clip.webm")), MediaKind::Audio);
        assert_eq!(classify(Path::new("no_extension")), MediaKind::Audio);
        assert_eq!(classify(Path::new("/tmp/dir.mp4/file")), MediaKind::Audio);
    }
}
