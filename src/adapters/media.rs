//! Audio and video transcoding through ffmpeg.
//!
//! Codec and container choice is made here, per target extension; callers
//! only ever name an extension.

use super::process::run_tool;
use super::{Adapter, ConvertOptions};
use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::formats::{Domain, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const NAME: &str = "media";

const INSTALL_HINT: &str = "Install FFmpeg:\n  \
    macOS:  brew install ffmpeg\n  \
    Ubuntu: sudo apt-get install ffmpeg\n  \
    Or set FILECONV_FFMPEG to the ffmpeg binary.";

const VIDEO_TARGETS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm", "gif"];

/// Container and codec arguments for one target extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub container: &'static str,
    pub args: &'static [&'static str],
}

const H264_AAC: &[&str] = &[
    "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p", "-c:a", "aac",
    "-b:a", "128k",
];

/// Encoding used to produce `extension`, or `None` if ffmpeg isn't used for it.
pub fn encoding_for(extension: &str) -> Option<Encoding> {
    fn enc(container: &'static str, args: &'static [&'static str]) -> Option<Encoding> {
        Some(Encoding { container, args })
    }
    match extension {
        // audio
        "mp3" => enc("mp3", &["-vn", "-c:a", "libmp3lame", "-q:a", "2"]),
        "wav" => enc("wav", &["-vn", "-c:a", "pcm_s16le"]),
        "ogg" => enc("ogg", &["-vn", "-c:a", "libvorbis", "-q:a", "5"]),
        "flac" => enc("flac", &["-vn", "-c:a", "flac"]),
        "aac" => enc("adts", &["-vn", "-c:a", "aac", "-b:a", "192k"]),
        "m4a" => enc("ipod", &["-vn", "-c:a", "aac", "-b:a", "192k"]),
        "opus" => enc("opus", &["-vn", "-c:a", "libopus", "-b:a", "128k"]),
        // video
        "mp4" => enc("mp4", H264_AAC),
        "mov" => enc("mov", H264_AAC),
        "mkv" => enc("matroska", H264_AAC),
        "avi" => enc(
            "avi",
            &["-c:v", "mpeg4", "-q:v", "5", "-c:a", "libmp3lame", "-q:a", "4"],
        ),
        "webm" => enc(
            "webm",
            &[
                "-c:v", "libvpx-vp9", "-crf", "32", "-b:v", "0", "-deadline", "good", "-c:a",
                "libopus", "-b:a", "96k",
            ],
        ),
        "gif" => enc(
            "gif",
            &["-an", "-vf", "fps=10,scale=480:-1:flags=lanczos", "-loop", "0"],
        ),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct MediaAdapter {
    ffmpeg: PathBuf,
}

impl MediaAdapter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
        }
    }

    /// The ffmpeg invocation for one conversion.
    pub fn command(&self, input: &Path, output: &Path, encoding: Encoding) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-nostdin", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(encoding.args)
            .args(["-f", encoding.container])
            .arg(output);
        cmd
    }
}

#[async_trait]
impl Adapter for MediaAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        let is_audio = AUDIO_EXTENSIONS.contains(&from);
        let is_video = VIDEO_EXTENSIONS.contains(&from);
        match domain {
            Domain::Audio => (is_audio || is_video) && AUDIO_EXTENSIONS.contains(&to),
            Domain::Video => (is_video || from == "gif") && VIDEO_TARGETS.contains(&to),
            _ => false,
        }
    }

    fn accepts_input(&self, extension: &str) -> bool {
        AUDIO_EXTENSIONS.contains(&extension)
            || VIDEO_EXTENSIONS.contains(&extension)
            || extension == "gif"
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let encoding =
            encoding_for(&options.target_extension).ok_or_else(|| AdapterError::Unsupported {
                adapter: NAME,
                from: options.source_extension.clone(),
                to: options.target_extension.clone(),
            })?;
        let cmd = self.command(input, output, encoding);
        run_tool(NAME, &self.ffmpeg, INSTALL_HINT, cmd, &options.cancel).await
    }
}
