//! Model requests for media messages: MIME types and part ordering per content kind.

use crate::channels::RemoteFile;
use crate::llm::Part;

pub const IMAGE_PROMPT: &str = "Using the following image, respond to the user's instruction.";
pub const VIDEO_PROMPT: &str = "Using the following video, respond to the user's instruction.";
pub const AUDIO_PROMPT: &str = "Responde al audio del usuario";

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
const DEFAULT_VIDEO_MIME: &str = "video/mp4";
const DEFAULT_AUDIO_MIME: &str = "audio/ogg";

/// MIME type for an image from its file extension.
pub fn image_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("jpg") | Some("jpeg") | Some("jpe") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// `video/<extension>`; Telegram serves videos and video notes as mp4 when unsure.
pub fn video_mime_type(extension: Option<&str>) -> String {
    match extension {
        Some("mov") => "video/quicktime".to_string(),
        Some(ext) => format!("video/{}", ext),
        None => DEFAULT_VIDEO_MIME.to_string(),
    }
}

/// The platform-reported MIME type, or OGG (Telegram voice notes are OGG/Opus).
pub fn audio_mime_type(platform: Option<&str>) -> String {
    platform
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_AUDIO_MIME)
        .to_string()
}

fn instruction(caption: Option<&str>) -> Option<Part> {
    caption.map(|c| Part::text(format!("Instruction: {}", c)))
}

/// Prompt, image, then the user's instruction.
pub fn image_request(file: RemoteFile, caption: Option<&str>) -> Vec<Part> {
    let mime = image_mime_type(file.extension().as_deref());
    let mut parts = vec![Part::text(IMAGE_PROMPT), Part::blob(mime, file.data)];
    parts.extend(instruction(caption));
    parts
}

/// Prompt, the user's instruction, then the video.
pub fn video_request(file: RemoteFile, caption: Option<&str>) -> Vec<Part> {
    let mime = video_mime_type(file.extension().as_deref());
    let mut parts = vec![Part::text(VIDEO_PROMPT)];
    parts.extend(instruction(caption));
    parts.push(Part::blob(mime, file.data));
    parts
}

/// Prompt, then the audio.
pub fn audio_request(file: RemoteFile, platform_mime: Option<&str>) -> Vec<Part> {
    vec![
        Part::text(AUDIO_PROMPT),
        Part::blob(audio_mime_type(platform_mime), file.data),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> RemoteFile {
        RemoteFile {
            file_path: path.to_string(),
            data: vec![1, 2],
        }
    }

    #[test]
    fn image_parts_order_and_mime() {
        let parts = image_request(file("photos/file_0.png"), Some("What is this?"));
        assert_eq!(
            parts,
            vec![
                Part::text(IMAGE_PROMPT),
                Part::blob("image/png", vec![1, 2]),
                Part::text("Instruction: What is this?"),
            ]
        );
    }

    #[test]
    fn image_without_caption_or_extension() {
        let parts = image_request(file("photos/file_0"), None);
        assert_eq!(
            parts,
            vec![Part::text(IMAGE_PROMPT), Part::blob("image/jpeg", vec![1, 2])]
        );
    }

    #[test]
    fn video_instruction_precedes_payload() {
        let parts = video_request(file("videos/file_3.MP4"), Some("resume"));
        assert_eq!(
            parts,
            vec![
                Part::text(VIDEO_PROMPT),
                Part::text("Instruction: resume"),
                Part::blob("video/mp4", vec![1, 2]),
            ]
        );
    }

    #[test]
    fn audio_uses_platform_mime() {
        let parts = audio_request(file("voice/file_9.oga"), Some("audio/mpeg"));
        assert_eq!(parts[1], Part::blob("audio/mpeg", vec![1, 2]));
        assert_eq!(audio_mime_type(None), "audio/ogg");
        assert_eq!(audio_mime_type(Some(" ")), "audio/ogg");
    }

    #[test]
    fn mime_tables() {
        assert_eq!(image_mime_type(Some("jpg")), "image/jpeg");
        assert_eq!(image_mime_type(Some("webp")), "image/webp");
        assert_eq!(image_mime_type(Some("xyz")), "image/jpeg");
        assert_eq!(video_mime_type(Some("mov")), "video/quicktime");
        assert_eq!(video_mime_type(Some("webm")), "video/webm");
        assert_eq!(video_mime_type(None), "video/mp4");
    }
}
