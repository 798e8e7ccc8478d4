// main.rs: window, event loop, overlay menus and status bar

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod controller;
mod fonts;
mod i18n;
mod media;
mod mesh;
mod orientation;
mod panorama;
mod photosphere;
mod placeholder;
mod renderer;
mod scene;
mod sensors;
mod session;
mod surface;
mod touch;

use anyhow::Context;
use config::ViewerConfig;
use controller::ControllerEdges;
use media::{MediaRequest, Notice, NoticeKind};
use mesh::MeshError;
use orientation::OrientationCompositor;
use panorama::PanoramaViewer;
use renderer::{DisplaySlot, Renderer};
use scene::{DisplayMode, Projection, SceneRenderer};
use sensors::{OrientationListener, VirtualGyro};
use session::{LoadedMedia, MediaSession, SessionSettings};
use touch::{PointerEvent, SharedRoll, TouchOffset, TouchTracker};

use glam::Vec3;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

/// Virtual gyro speed while a rotation key is held.
const KEY_RATE_DEG_PER_SEC: f32 = 60.0;

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "gif", "webp", "mp4", "webm", "mkv", "mov", "m4v", "3gp",
];

const LANGUAGES: [(&str, &str); 2] = [("en", "English"), ("zh-Hans", "简体中文")];

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,pano360=info")).init();

    let config = ViewerConfig::resolve().context("cannot resolve viewer configuration")?;
    i18n::init(config.lang());
    let mut current_lang = i18n::current_lang();

    let sphere = config.sphere_params();
    sphere.validate().context("invalid sphere settings")?;
    let format = config.media_format();
    log::info!("media format {:?} ({}), sphere {:?}", format, format.code(), sphere);

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .context("cannot create window")?,
    );

    let slot = DisplaySlot::new();
    let mut renderer = pollster::block_on(Renderer::new(window.clone(), slot.clone()))?;

    let compositor = Arc::new(OrientationCompositor::new());
    let roll = Arc::new(SharedRoll::default());
    let mut tracker = TouchTracker::with_speed(compositor.clone(), roll.clone(), config.px_per_degree);
    let mut gyro = VirtualGyro::spawn(OrientationListener::new(compositor.clone(), roll));
    let scene = SceneRenderer::new(
        compositor.clone(),
        Projection {
            fov_y_degrees: config.field_of_view_degrees,
            z_near: config.z_near,
            z_far: config.z_far,
        },
    );

    let initial_mode = if config.headset_mode {
        DisplayMode::Headset
    } else {
        DisplayMode::Flat
    };
    let mut viewer = PanoramaViewer::new(initial_mode, format);

    let settings = SessionSettings {
        sphere,
        format,
        max_canvas_width: config.max_canvas_width,
        placeholder_height: config.placeholder_height,
        caption_font: fonts::ui_font().map(|f| f.font.clone()),
    };

    let (notice_tx, notice_rx) = channel::<Notice>();
    viewer.is_loading = config.media.is_some();
    let mut session = open_session(&settings, &slot, config.media.clone(), &notice_tx)?;

    // input state
    let mut cursor = PhysicalPosition::new(0.0f64, 0.0f64);
    let mut mouse_pressed = false;
    let mut held_keys: HashSet<VirtualKeyCode> = HashSet::new();
    let mut edges = ControllerEdges::default();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        while let Ok(notice) = notice_rx.try_recv() {
            if let Some(text) = notice_text(session.id(), notice) {
                viewer.is_loading = false;
                viewer.show_notice(text);
            }
        }

        let mut requests = UiRequests::default();

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                    }

                    WindowEvent::KeyboardInput { input, .. } => {
                        let Some(key) = input.virtual_keycode else {
                            return;
                        };
                        if input.state == ElementState::Released {
                            held_keys.remove(&key);
                        } else if held_keys.insert(key) {
                            match key {
                                VirtualKeyCode::O => requests.open = pick_media(),
                                VirtualKeyCode::F11 => requests.toggle_fullscreen = true,
                                VirtualKeyCode::Escape if viewer.is_fullscreen => {
                                    requests.toggle_fullscreen = true
                                }
                                VirtualKeyCode::H => requests.toggle_headset = true,
                                VirtualKeyCode::R => requests.reset_view = true,
                                _ => {}
                            }
                        }
                        gyro.rates().set(key_rates(&held_keys));
                    }

                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => {
                        mouse_pressed = state == ElementState::Pressed;
                        let event = match state {
                            ElementState::Pressed => PointerEvent::Pressed {
                                x: cursor.x as f32,
                                y: cursor.y as f32,
                            },
                            ElementState::Released => PointerEvent::Released,
                        };
                        feed_pointer(&mut tracker, &viewer, event);
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        if mouse_pressed {
                            feed_pointer(
                                &mut tracker,
                                &viewer,
                                PointerEvent::Moved {
                                    x: position.x as f32,
                                    y: position.y as f32,
                                },
                            );
                        }
                    }

                    WindowEvent::Touch(touch) => {
                        let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                        let event = match touch.phase {
                            TouchPhase::Started => PointerEvent::Pressed { x, y },
                            TouchPhase::Moved => PointerEvent::Moved { x, y },
                            TouchPhase::Ended => PointerEvent::Released,
                            TouchPhase::Cancelled => PointerEvent::Cancelled,
                        };
                        feed_pointer(&mut tracker, &viewer, event);
                    }

                    WindowEvent::DroppedFile(path) => {
                        requests.open = Some(path);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                let actions = edges.update(
                    held_keys.contains(&VirtualKeyCode::Space),
                    held_keys.contains(&VirtualKeyCode::M),
                );
                if actions.primary_click {
                    if let Some(playing) = session.toggle_playback() {
                        log::info!("playback {}", if playing { "resumed" } else { "paused" });
                    }
                }
                if actions.menu_toggle {
                    viewer.show_ui = !viewer.show_ui;
                }

                let passes = scene.frame_passes(
                    viewer.display_mode,
                    renderer.size.width,
                    renderer.size.height,
                );
                let status = Status {
                    touch: tracker.offset(),
                    roll_degrees: compositor.device_roll().to_degrees(),
                    fov_degrees: config.field_of_view_degrees,
                };

                let render_result = renderer.render_with_ui(&window, &passes, |ctx| {
                    draw_ui(ctx, &mut viewer, &mut requests, &status, &mut current_lang);
                });

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            Event::LoopDestroyed => {
                session.destroy();
                gyro.stop();
            }

            _ => {}
        }

        if requests.reset_view {
            tracker.reset();
            gyro.rates().request_reset();
        }
        if requests.toggle_headset {
            viewer.toggle_display_mode();
            log::info!("display mode {:?}", viewer.display_mode);
        }
        if requests.toggle_fullscreen {
            viewer.is_fullscreen = !viewer.is_fullscreen;
            apply_fullscreen(&window, viewer.is_fullscreen);
        }
        if requests.language_changed {
            window.set_title(&i18n::tr("app.title"));
        }
        if requests.exit {
            *control_flow = ControlFlow::Exit;
        }
        if let Some(path) = requests.open {
            session.destroy();
            slot.clear();
            viewer.is_loading = true;
            let locator = path.to_string_lossy().into_owned();
            match open_session(&settings, &slot, Some(locator), &notice_tx) {
                Ok(next) => session = next,
                Err(e) => {
                    viewer.is_loading = false;
                    log::error!("{}", e);
                }
            }
        }
    });
}

/// New session bound to the already-ready scene; media arrives from a loader thread.
fn open_session(
    settings: &SessionSettings,
    slot: &DisplaySlot,
    locator: Option<String>,
    notices: &Sender<Notice>,
) -> Result<Arc<MediaSession>, MeshError> {
    let session = Arc::new(MediaSession::new(settings.clone())?);
    session.on_scene_ready(Arc::new(slot.clone()));
    match locator {
        Some(locator) => media::spawn_load(
            MediaRequest {
                locator,
                format: settings.format,
            },
            session.clone(),
            None,
            notices.clone(),
        ),
        None => session.on_media_loaded(LoadedMedia::Placeholder { caption: None }),
    }
    Ok(session)
}

/// Text for a loader notice, or `None` when it comes from a replaced session.
fn notice_text(current_session: u64, notice: Notice) -> Option<String> {
    if notice.session != current_session {
        log::debug!("dropping notice from session {}", notice.session);
        return None;
    }
    Some(match notice.kind {
        NoticeKind::Loaded(path) => i18n::tr_with("notice.loaded", &[("path", path)]),
        NoticeKind::Failed(err) => i18n::tr_with("notice.failed", &[("err", err)]),
    })
}

/// Drags steer the flat view only; the headset follows the device alone.
fn feed_pointer(tracker: &mut TouchTracker, viewer: &PanoramaViewer, event: PointerEvent) {
    if viewer.display_mode == DisplayMode::Flat {
        tracker.on_event(event);
    }
}

fn key_rates(held: &HashSet<VirtualKeyCode>) -> Vec3 {
    let axis = |neg: VirtualKeyCode, pos: VirtualKeyCode| {
        (held.contains(&pos) as i32 - held.contains(&neg) as i32) as f32
    };
    Vec3::new(
        axis(VirtualKeyCode::Down, VirtualKeyCode::Up),
        axis(VirtualKeyCode::Right, VirtualKeyCode::Left),
        axis(VirtualKeyCode::E, VirtualKeyCode::Q),
    ) * KEY_RATE_DEG_PER_SEC.to_radians()
}

fn pick_media() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&i18n::tr("file.filter.media"), MEDIA_EXTENSIONS)
        .pick_file()
}

fn apply_fullscreen(window: &Window, fullscreen: bool) {
    if fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

#[derive(Default)]
struct UiRequests {
    open: Option<PathBuf>,
    reset_view: bool,
    toggle_headset: bool,
    toggle_fullscreen: bool,
    language_changed: bool,
    exit: bool,
}

struct Status {
    touch: TouchOffset,
    roll_degrees: f32,
    fov_degrees: f32,
}

fn draw_ui(
    ctx: &egui::Context,
    viewer: &mut PanoramaViewer,
    requests: &mut UiRequests,
    status: &Status,
    current_lang: &mut String,
) {
    let notice = viewer.notice().map(str::to_owned);

    if !viewer.show_ui {
        // notices still show with the overlay hidden
        if let Some(text) = notice {
            egui::Area::new("notice")
                .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -24.0))
                .show(ctx, |ui| {
                    ui.label(egui::RichText::new(text).color(egui::Color32::YELLOW));
                });
        }
        return;
    }

    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(i18n::tr("menu.file"), |ui| {
                if ui.button(i18n::tr("menu.open_media")).clicked() {
                    ui.close_menu();
                    requests.open = pick_media();
                }
                if ui.button(i18n::tr("menu.exit")).clicked() {
                    requests.exit = true;
                }
            });

            ui.menu_button(i18n::tr("menu.view"), |ui| {
                if ui.button(i18n::tr("view.reset")).clicked() {
                    requests.reset_view = true;
                    ui.close_menu();
                }

                let headset_label = match viewer.display_mode {
                    DisplayMode::Flat => i18n::tr("view.headset.enter"),
                    DisplayMode::Headset => i18n::tr("view.headset.exit"),
                };
                if ui.button(headset_label).clicked() {
                    requests.toggle_headset = true;
                    ui.close_menu();
                }

                let fullscreen_label = if viewer.is_fullscreen {
                    i18n::tr("view.fullscreen.exit")
                } else {
                    i18n::tr("view.fullscreen.enter")
                };
                if ui.button(fullscreen_label).clicked() {
                    requests.toggle_fullscreen = true;
                    ui.close_menu();
                }
            });

            ui.menu_button(i18n::tr("menu.language"), |ui| {
                for (code, name) in LANGUAGES {
                    if ui.radio_value(current_lang, code.to_string(), name).clicked() {
                        i18n::init(current_lang.clone());
                        requests.language_changed = true;
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if viewer.is_loading {
                ui.label(
                    egui::RichText::new(i18n::tr("status.loading")).color(egui::Color32::YELLOW),
                );
                ui.label("|");
            }

            ui.label(format!("{} {:?}", i18n::tr("status.format_prefix"), viewer.format));
            ui.label("|");
            ui.label(format!("{} {:?}", i18n::tr("status.mode_prefix"), viewer.display_mode));
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", status.fov_degrees));
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", status.touch.yaw_degrees));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", status.touch.pitch_degrees));
            ui.label("|");
            ui.label(format!("Roll: {:.1}°", status.roll_degrees));

            if let Some(text) = &notice {
                ui.label("|");
                ui.label(egui::RichText::new(text).color(egui::Color32::YELLOW));
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let held: HashSet<_> = [VirtualKeyCode::Left, VirtualKeyCode::Right].into_iter().collect();
        assert_eq!(key_rates(&held), Vec3::ZERO);
    }

    #[test]
    fn up_key_pitches_the_device() {
        let held: HashSet<_> = [VirtualKeyCode::Up].into_iter().collect();
        let rates = key_rates(&held);
        assert!(rates.x > 0.0);
        assert_eq!(rates.y, 0.0);
        assert_eq!(rates.z, 0.0);
    }

    #[test]
    fn notices_from_replaced_sessions_are_dropped() {
        let notice = |session| Notice {
            session,
            kind: NoticeKind::Failed("gone".into()),
        };
        assert!(notice_text(7, notice(7)).is_some());
        assert!(notice_text(8, notice(7)).is_none());
    }

    #[test]
    fn session_without_media_attaches_the_placeholder() {
        let slot = DisplaySlot::new();
        let (tx, _rx) = channel();
        let settings = SessionSettings {
            placeholder_height: 32,
            ..SessionSettings::default()
        };
        let session = open_session(&settings, &slot, None, &tx).unwrap();
        assert!(session.is_attached());
        assert!(slot.is_bound());
    }
}
