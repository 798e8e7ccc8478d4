// media.rs: background fetch/decode of the requested media
//
// Runs on its own thread and hands the result to the session; the render
// loop never waits for it. Failures become a placeholder with an error
// caption plus a transient notice.

use crate::mesh::MediaFormat;
use crate::photosphere;
use crate::session::{LoadedMedia, MediaPlayer, MediaSession};
use image::io::Reader as ImageReader;
use log::{debug, error, info};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unknown file type: {0}")]
    UnknownType(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no video decoder is available for {0}")]
    PlaybackUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v", "3gp"];

/// Guess the media kind from the locator's extension.
pub fn classify(locator: &str) -> Result<MediaKind, MediaError> {
    let ext = Path::new(locator)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| MediaError::UnknownType(locator.to_string()))?;

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Video)
    } else {
        Err(MediaError::UnknownType(locator.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    pub locator: String,
    pub format: MediaFormat,
}

/// Opens a player for a video locator. Video decoding lives outside this crate.
pub type PlayerFactory =
    Arc<dyn Fn(&Path) -> Result<Box<dyn MediaPlayer>, MediaError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    Loaded(String),
    Failed(String),
}

/// User-visible, short-lived status message from the loader of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub session: u64,
    pub kind: NoticeKind,
}

/// Blocking load; always yields something the session can display.
pub fn load(request: &MediaRequest, players: Option<&PlayerFactory>) -> Result<LoadedMedia, MediaError> {
    let path = PathBuf::from(&request.locator);
    debug!("loading {} as {:?}", request.locator, request.format);
    match classify(&request.locator)? {
        MediaKind::Image => {
            let bytes = std::fs::read(&path).map_err(|source| MediaError::Io {
                path: path.clone(),
                source,
            })?;
            let photosphere = photosphere::extract_from_jpeg(&bytes);
            let mut reader = ImageReader::new(Cursor::new(&bytes))
                .with_guessed_format()
                .map_err(|source| MediaError::Io { path: path.clone(), source })?;
            reader.no_limits();
            let image = reader.decode()?.to_rgba8();
            info!(
                "{}",
                crate::i18n::tr_with(
                    "log.image_loaded_size",
                    &[("w", image.width().to_string()), ("h", image.height().to_string())]
                )
            );
            Ok(LoadedMedia::Image { image, photosphere })
        }
        MediaKind::Video => match players {
            Some(open) => Ok(LoadedMedia::Video(open(&path)?)),
            None => Err(MediaError::PlaybackUnavailable(request.locator.clone())),
        },
    }
}

/// Load on a background thread and deliver to `session`. A session destroyed
/// in the meantime discards the result itself.
pub fn spawn_load(
    request: MediaRequest,
    session: Arc<MediaSession>,
    players: Option<PlayerFactory>,
    notices: Sender<Notice>,
) {
    let spawned = thread::Builder::new()
        .name("media-loader".into())
        .spawn(move || {
            info!(
                "{}",
                crate::i18n::tr_with("log.loading_media_bg", &[("path", request.locator.clone())])
            );
            let notify = |kind| {
                let _ = notices.send(Notice {
                    session: session.id(),
                    kind,
                });
            };
            let media = match load(&request, players.as_ref()) {
                Ok(media) => {
                    notify(NoticeKind::Loaded(request.locator.clone()));
                    media
                }
                Err(e) => {
                    error!("{}", e);
                    notify(NoticeKind::Failed(e.to_string()));
                    LoadedMedia::Placeholder {
                        caption: Some(crate::i18n::tr("error.load_failed")),
                    }
                }
            };
            session.on_media_loaded(media);
        });

    if let Err(e) = spawned {
        error!("cannot start media loader: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify("pano.JPG").unwrap(), MediaKind::Image);
        assert_eq!(classify("/tmp/a/b.webp").unwrap(), MediaKind::Image);
        assert_eq!(classify("clip.mp4").unwrap(), MediaKind::Video);
        assert!(matches!(classify("notes.txt"), Err(MediaError::UnknownType(_))));
        assert!(matches!(classify("no_extension"), Err(MediaError::UnknownType(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let request = MediaRequest {
            locator: "/definitely/not/here.jpg".into(),
            format: MediaFormat::Monoscopic,
        };
        assert!(matches!(load(&request, None), Err(MediaError::Io { .. })));
    }

    #[test]
    fn video_without_decoder_is_reported() {
        let request = MediaRequest {
            locator: "clip.mp4".into(),
            format: MediaFormat::StereoLeftRight,
        };
        assert!(matches!(load(&request, None), Err(MediaError::PlaybackUnavailable(_))));
    }

    #[test]
    fn decodes_a_png_from_disk() {
        let dir = std::env::temp_dir().join(format!("pano360-media-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tiny.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let request = MediaRequest {
            locator: path.to_string_lossy().into_owned(),
            format: MediaFormat::Monoscopic,
        };
        match load(&request, None).unwrap() {
            LoadedMedia::Image { image, photosphere } => {
                assert_eq!(image.dimensions(), (4, 2));
                assert!(photosphere.is_none());
            }
            _ => panic!("expected an image"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
