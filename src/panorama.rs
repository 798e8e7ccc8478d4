// panorama.rs: viewer UI state shared by the event loop and the overlay

use crate::mesh::MediaFormat;
use crate::scene::DisplayMode;
use std::time::{Duration, Instant};

const NOTICE_DURATION: Duration = Duration::from_secs(4);

pub struct PanoramaViewer {
    pub display_mode: DisplayMode,
    pub format: MediaFormat,
    pub show_ui: bool,
    pub is_fullscreen: bool,
    pub is_loading: bool,
    notice: Option<(String, Instant)>,
}

impl PanoramaViewer {
    pub fn new(display_mode: DisplayMode, format: MediaFormat) -> Self {
        Self {
            display_mode,
            format,
            show_ui: true,
            is_fullscreen: false,
            is_loading: false,
            notice: None,
        }
    }

    pub fn toggle_display_mode(&mut self) {
        self.display_mode = match self.display_mode {
            DisplayMode::Flat => DisplayMode::Headset,
            DisplayMode::Headset => DisplayMode::Flat,
        };
    }

    pub fn show_notice(&mut self, text: String) {
        self.notice = Some((text, Instant::now()));
    }

    /// Current notice, dropped once it has been visible long enough.
    pub fn notice(&mut self) -> Option<&str> {
        if matches!(&self.notice, Some((_, since)) if since.elapsed() > NOTICE_DURATION) {
            self.notice = None;
        }
        self.notice.as_ref().map(|(text, _)| text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mode_toggles() {
        let mut viewer = PanoramaViewer::new(DisplayMode::Flat, MediaFormat::Monoscopic);
        viewer.toggle_display_mode();
        assert_eq!(viewer.display_mode, DisplayMode::Headset);
        viewer.toggle_display_mode();
        assert_eq!(viewer.display_mode, DisplayMode::Flat);
    }

    #[test]
    fn fresh_notice_is_visible() {
        let mut viewer = PanoramaViewer::new(DisplayMode::Flat, MediaFormat::Monoscopic);
        assert_eq!(viewer.notice(), None);
        viewer.show_notice("hello".into());
        assert_eq!(viewer.notice(), Some("hello"));
    }
}
