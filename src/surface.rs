// surface.rs: CPU-side display surface the media is drawn into
//
// Producers (image placement, a video player) lock the canvas, draw, and post;
// the render thread uploads the frame to the GPU when the generation changes.

use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard};

struct Frame {
    pixels: RgbaImage,
    generation: u64,
}

#[derive(Clone)]
pub struct SurfaceHandle {
    frame: Arc<Mutex<Frame>>,
    width: u32,
    height: u32,
}

impl SurfaceHandle {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Arc::new(Mutex::new(Frame {
                pixels: RgbaImage::new(width, height),
                generation: 0,
            })),
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn lock(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the canvas, draw, and post the result as a new frame.
    #[cfg(test)]
    pub fn draw<R>(&self, f: impl FnOnce(&mut RgbaImage) -> R) -> R {
        let mut frame = self.lock();
        let result = f(&mut frame.pixels);
        frame.generation += 1;
        result
    }

    /// Replace the whole frame; a size mismatch is scaled to fit.
    pub fn post(&self, pixels: RgbaImage) {
        let pixels = if pixels.dimensions() == (self.width, self.height) {
            pixels
        } else {
            image::imageops::resize(
                &pixels,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            )
        };
        let mut frame = self.lock();
        frame.pixels = pixels;
        frame.generation += 1;
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Run `f` on the latest frame if it is newer than `seen`.
    pub fn read_if_newer<R>(&self, seen: u64, f: impl FnOnce(&RgbaImage) -> R) -> Option<(u64, R)> {
        let frame = self.lock();
        (frame.generation > seen).then(|| (frame.generation, f(&frame.pixels)))
    }
}
