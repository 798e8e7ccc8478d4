// session.rs: one media session: its mesh, readiness gate and display surface
//
// Two producers finish independently and on different threads: the render
// side reports that the scene can host a display, and the loader delivers the
// decoded media. Each records its result under the session mutex and runs
// `display_when_ready`, which sets the display up exactly once regardless of
// arrival order. Media delivered after `destroy` is released, never shown.

use crate::mesh::{MediaFormat, MeshError, SphereMesh, SphereParams};
use crate::photosphere::{self, PhotoSphereData};
use crate::placeholder;
use crate::surface::SurfaceHandle;
use ab_glyph::FontArc;
use image::RgbaImage;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Render side: turns a surface request into something the draw loop shows.
pub trait SceneHost: Send + Sync {
    fn create_display(&self, width: u32, height: u32, mesh: Arc<SphereMesh>) -> SurfaceHandle;
}

/// A decoder that renders frames into a display surface.
pub trait MediaPlayer: Send {
    fn video_size(&self) -> (u32, u32);
    fn set_surface(&mut self, surface: SurfaceHandle);
    fn set_looping(&mut self, looping: bool);
    fn start(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn release(self: Box<Self>);
}

pub enum LoadedMedia {
    Image {
        image: RgbaImage,
        photosphere: Option<PhotoSphereData>,
    },
    Video(Box<dyn MediaPlayer>),
    /// Nothing to show; the grid is drawn with an optional caption.
    Placeholder { caption: Option<String> },
}

impl LoadedMedia {
    fn release(self) {
        if let LoadedMedia::Video(player) = self {
            player.release();
        }
    }
}

#[derive(Clone)]
pub struct SessionSettings {
    pub sphere: SphereParams,
    pub format: MediaFormat,
    pub max_canvas_width: u32,
    pub placeholder_height: u32,
    pub caption_font: Option<FontArc>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sphere: SphereParams::default(),
            format: MediaFormat::Monoscopic,
            max_canvas_width: photosphere::MAX_CANVAS_WIDTH,
            placeholder_height: 2048,
            caption_font: None,
        }
    }
}

#[derive(Default)]
struct Readiness {
    scene: Option<Arc<dyn SceneHost>>,
    media: Option<LoadedMedia>,
    player: Option<Box<dyn MediaPlayer>>,
    playing: bool,
    destroyed: bool,
    display: Option<SurfaceHandle>,
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct MediaSession {
    id: u64,
    settings: SessionSettings,
    mesh: Arc<SphereMesh>,
    placeholder_mesh: Arc<SphereMesh>,
    state: Mutex<Readiness>,
}

impl MediaSession {
    pub fn new(settings: SessionSettings) -> Result<Self, MeshError> {
        let mesh = Arc::new(SphereMesh::uv_sphere(&settings.sphere, settings.format)?);
        let placeholder_mesh = if settings.format == MediaFormat::Monoscopic {
            mesh.clone()
        } else {
            Arc::new(SphereMesh::uv_sphere(&settings.sphere, MediaFormat::Monoscopic)?)
        };
        Ok(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            settings,
            mesh,
            placeholder_mesh,
            state: Mutex::new(Readiness::default()),
        })
    }

    /// Unique per session; tags what its loader reports.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, Readiness> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The render scene is ready to host a display.
    pub fn on_scene_ready(&self, host: Arc<dyn SceneHost>) {
        let mut state = self.lock();
        debug!("scene ready");
        state.scene = Some(host);
        self.display_when_ready(&mut state);
    }

    /// The loader finished; `media` is whatever it produced.
    pub fn on_media_loaded(&self, media: LoadedMedia) {
        let mut state = self.lock();
        if state.display.is_some() && !state.destroyed {
            warn!("media delivered to a session that is already displaying; releasing it");
            media.release();
            return;
        }
        debug!("media ready");
        if let Some(previous) = state.media.replace(media) {
            debug!("replacing undisplayed media");
            previous.release();
        }
        self.display_when_ready(&mut state);
    }

    pub fn is_attached(&self) -> bool {
        self.lock().display.is_some()
    }

    #[cfg(test)]
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    #[cfg(test)]
    pub fn has_player(&self) -> bool {
        self.lock().player.is_some()
    }

    fn display_when_ready(&self, state: &mut Readiness) {
        if state.destroyed {
            // the session was torn down before the media arrived
            if let Some(media) = state.media.take() {
                info!("releasing media that arrived after teardown");
                media.release();
            }
            return;
        }

        if state.display.is_some() {
            return;
        }

        let Some(scene) = state.scene.clone() else {
            return;
        };
        let Some(media) = state.media.take() else {
            return;
        };

        match media {
            LoadedMedia::Video(mut player) => {
                let (width, height) = player.video_size();
                let surface = scene.create_display(width, height, self.mesh.clone());
                player.set_surface(surface.clone());
                player.set_looping(true);
                player.start();
                info!("video display attached at {}x{}", width, height);
                state.player = Some(player);
                state.playing = true;
                state.display = Some(surface);
            }
            LoadedMedia::Image { image, photosphere } if image.width() > 0 && image.height() > 0 => {
                let placement = photosphere::place(
                    image.width(),
                    image.height(),
                    photosphere.as_ref(),
                    self.settings.max_canvas_width,
                );
                let (width, height) = placement.canvas_size();
                let surface = scene.create_display(width, height, self.mesh.clone());
                let mut canvas = RgbaImage::new(width, height);
                photosphere::draw_placed(&mut canvas, &image, &placement);
                surface.post(canvas);
                // source pixels are no longer needed
                drop(image);
                info!("image display attached at {}x{}", width, height);
                state.display = Some(surface);
            }
            LoadedMedia::Image { .. } => {
                warn!("decoded image is empty");
                let caption = crate::i18n::tr("error.load_failed");
                state.display = Some(self.show_placeholder(&*scene, Some(&caption)));
            }
            LoadedMedia::Placeholder { caption } => {
                state.display = Some(self.show_placeholder(&*scene, caption.as_deref()));
            }
        }
    }

    fn show_placeholder(&self, scene: &dyn SceneHost, caption: Option<&str>) -> SurfaceHandle {
        let height = self.settings.placeholder_height.max(2);
        let width = 2 * height;
        let surface = scene.create_display(width, height, self.placeholder_mesh.clone());
        let grid = placeholder::render_grid(
            width,
            height,
            self.settings.sphere.rows,
            self.settings.sphere.columns,
            caption,
            self.settings.caption_font.as_ref(),
        );
        surface.post(grid);
        info!("placeholder display attached at {}x{}", width, height);
        surface
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        if let Some(player) = state.player.as_mut() {
            player.pause();
            state.playing = false;
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        if let Some(player) = state.player.as_mut() {
            player.start();
            state.playing = true;
        }
    }

    /// Primary-click action. Returns the new playing state, if there is a player.
    pub fn toggle_playback(&self) -> Option<bool> {
        let playing = {
            let state = self.lock();
            state.player.as_ref()?;
            state.playing
        };
        if playing {
            self.pause();
        } else {
            self.resume();
        }
        Some(!playing)
    }

    /// Tear down: stop and release the player and refuse anything that arrives later.
    pub fn destroy(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(mut player) = state.player.take() {
            player.stop();
            player.release();
        }
        if let Some(media) = state.media.take() {
            media.release();
        }
        state.playing = false;
        state.scene = None;
        info!("media session destroyed");
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingHost {
        created: Mutex<Vec<(u32, u32, MediaFormat)>>,
    }

    impl RecordingHost {
        fn count(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    impl SceneHost for RecordingHost {
        fn create_display(&self, width: u32, height: u32, mesh: Arc<SphereMesh>) -> SurfaceHandle {
            self.created.lock().unwrap().push((width, height, mesh.format));
            SurfaceHandle::new(width, height)
        }
    }

    #[derive(Default)]
    struct PlayerLog {
        started: AtomicUsize,
        paused: AtomicUsize,
        stopped: AtomicUsize,
        released: AtomicUsize,
        surfaces: AtomicUsize,
    }

    struct FakePlayer {
        log: Arc<PlayerLog>,
        looping: bool,
    }

    impl FakePlayer {
        fn boxed(log: &Arc<PlayerLog>) -> Box<dyn MediaPlayer> {
            Box::new(FakePlayer { log: log.clone(), looping: false })
        }
    }

    impl MediaPlayer for FakePlayer {
        fn video_size(&self) -> (u32, u32) {
            (64, 32)
        }
        fn set_surface(&mut self, _surface: SurfaceHandle) {
            self.log.surfaces.fetch_add(1, Ordering::SeqCst);
        }
        fn set_looping(&mut self, looping: bool) {
            self.looping = looping;
        }
        fn start(&mut self) {
            assert!(self.looping, "playback must loop");
            self.log.started.fetch_add(1, Ordering::SeqCst);
        }
        fn pause(&mut self) {
            self.log.paused.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&mut self) {
            self.log.stopped.fetch_add(1, Ordering::SeqCst);
        }
        fn release(self: Box<Self>) {
            self.log.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            sphere: SphereParams { rows: 4, columns: 4, ..SphereParams::default() },
            placeholder_height: 16,
            max_canvas_width: 64,
            ..SessionSettings::default()
        }
    }

    fn image(width: u32, height: u32) -> LoadedMedia {
        LoadedMedia::Image {
            image: RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255])),
            photosphere: None,
        }
    }

    #[test]
    fn scene_alone_does_nothing() {
        let session = MediaSession::new(settings()).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        assert!(!session.is_attached());
        assert_eq!(host.count(), 0);
    }

    #[test]
    fn media_alone_does_nothing() {
        let session = MediaSession::new(settings()).unwrap();
        session.on_media_loaded(image(32, 16));
        assert!(!session.is_attached());
    }

    #[test]
    fn both_signals_attach_once_in_either_order() {
        for scene_first in [true, false] {
            let session = MediaSession::new(settings()).unwrap();
            let host = Arc::new(RecordingHost::default());
            if scene_first {
                session.on_scene_ready(host.clone());
                session.on_media_loaded(image(32, 16));
            } else {
                session.on_media_loaded(image(32, 16));
                session.on_scene_ready(host.clone());
            }
            assert!(session.is_attached());
            assert_eq!(host.count(), 1);
            assert_eq!(host.created.lock().unwrap()[0].0, 32);

            // repeated signals never re-create the display
            session.on_scene_ready(host.clone());
            session.on_scene_ready(host.clone());
            assert_eq!(host.count(), 1);
        }
    }

    #[test]
    fn non_panoramic_image_gets_a_placed_canvas() {
        let session = MediaSession::new(settings()).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        session.on_media_loaded(image(40, 10));
        // synthesized 40x20 panorama scaled to the 64 px canvas cap
        assert_eq!(host.created.lock().unwrap()[0], (64, 32, MediaFormat::Monoscopic));
    }

    #[test]
    fn video_is_attached_looped_and_started() {
        let log = Arc::new(PlayerLog::default());
        let session = MediaSession::new(settings()).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_media_loaded(LoadedMedia::Video(FakePlayer::boxed(&log)));
        session.on_scene_ready(host.clone());

        assert_eq!(host.created.lock().unwrap()[0].0, 64);
        assert_eq!(log.surfaces.load(Ordering::SeqCst), 1);
        assert_eq!(log.started.load(Ordering::SeqCst), 1);
        assert!(session.has_player());

        assert_eq!(session.toggle_playback(), Some(false));
        assert_eq!(log.paused.load(Ordering::SeqCst), 1);
        assert_eq!(session.toggle_playback(), Some(true));
        assert_eq!(log.started.load(Ordering::SeqCst), 2);

        session.destroy();
        assert_eq!(log.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn media_after_teardown_is_released_not_started() {
        let log = Arc::new(PlayerLog::default());
        let session = MediaSession::new(settings()).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        session.destroy();
        session.on_media_loaded(LoadedMedia::Video(FakePlayer::boxed(&log)));

        assert!(session.is_destroyed());
        assert!(!session.is_attached());
        assert_eq!(host.count(), 0);
        assert_eq!(log.started.load(Ordering::SeqCst), 0);
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_delivery_before_the_scene_releases_the_first() {
        let log = Arc::new(PlayerLog::default());
        let session = MediaSession::new(settings()).unwrap();
        session.on_media_loaded(LoadedMedia::Video(FakePlayer::boxed(&log)));
        session.on_media_loaded(LoadedMedia::Placeholder { caption: None });
        assert_eq!(log.released.load(Ordering::SeqCst), 1);

        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        assert_eq!(host.created.lock().unwrap()[0], (32, 16, MediaFormat::Monoscopic));
        assert_eq!(log.started.load(Ordering::SeqCst), 0);
        assert!(!session.has_player());
    }

    #[test]
    fn media_after_attachment_is_released_not_started() {
        let log = Arc::new(PlayerLog::default());
        let session = MediaSession::new(settings()).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        session.on_media_loaded(image(32, 16));
        assert!(session.is_attached());

        session.on_media_loaded(LoadedMedia::Video(FakePlayer::boxed(&log)));
        assert_eq!(log.started.load(Ordering::SeqCst), 0);
        assert_eq!(log.surfaces.load(Ordering::SeqCst), 0);
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
        assert_eq!(host.count(), 1);
        assert!(!session.has_player());
    }

    #[test]
    fn sessions_have_distinct_ids() {
        let a = MediaSession::new(settings()).unwrap();
        let b = MediaSession::new(settings()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn failure_shows_mono_placeholder() {
        let mut stereo = settings();
        stereo.format = MediaFormat::StereoTopBottom;
        let session = MediaSession::new(stereo).unwrap();
        let host = Arc::new(RecordingHost::default());
        session.on_scene_ready(host.clone());
        session.on_media_loaded(LoadedMedia::Placeholder { caption: Some("boom".into()) });
        assert_eq!(host.created.lock().unwrap()[0], (32, 16, MediaFormat::Monoscopic));
    }

    #[test]
    fn pause_without_player_is_harmless() {
        let session = MediaSession::new(settings()).unwrap();
        session.pause();
        session.resume();
        assert_eq!(session.toggle_playback(), None);
    }

    #[test]
    fn dropping_the_session_releases_the_player() {
        let log = Arc::new(PlayerLog::default());
        {
            let session = MediaSession::new(settings()).unwrap();
            session.on_media_loaded(LoadedMedia::Video(FakePlayer::boxed(&log)));
        }
        assert_eq!(log.released.load(Ordering::SeqCst), 1);
        assert_eq!(log.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_signals_converge_to_one_display() {
        for _ in 0..50 {
            let session = Arc::new(MediaSession::new(settings()).unwrap());
            let host = Arc::new(RecordingHost::default());
            let scene = {
                let session = session.clone();
                let host = host.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        session.on_scene_ready(host.clone());
                    }
                })
            };
            let media = {
                let session = session.clone();
                std::thread::spawn(move || session.on_media_loaded(image(32, 16)))
            };
            scene.join().unwrap();
            media.join().unwrap();
            assert!(session.is_attached());
            assert_eq!(host.count(), 1);
        }
    }
}
