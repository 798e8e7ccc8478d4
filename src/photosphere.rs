// photosphere.rs: placing a (possibly cropped) panorama onto a 2:1 canvas
//
// GPano XMP tags describe a stored image as a sub-rectangle of a larger
// virtual equirectangular panorama. Images without tags that are not 2:1
// get synthesized tags that centre them inside a correctly proportioned canvas.

use image::{imageops::FilterType, GenericImage, Rgba, RgbaImage};
use log::{debug, warn};

/// Upper bound for the canvas width, keeps texture memory bounded.
pub const MAX_CANVAS_WIDTH: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotoSphereData {
    pub full_pano_width: u32,
    pub full_pano_height: u32,
    pub crop_left: u32,
    pub crop_top: u32,
    pub crop_width: u32,
    pub crop_height: u32,
}

impl PhotoSphereData {
    /// The crop must sit inside a non-empty panorama.
    pub fn is_valid(&self) -> bool {
        self.full_pano_width > 0
            && self.full_pano_height > 0
            && self.crop_width > 0
            && self.crop_height > 0
            && self.crop_left as u64 + self.crop_width as u64 <= self.full_pano_width as u64
            && self.crop_top as u64 + self.crop_height as u64 <= self.full_pano_height as u64
    }

    /// Treat an image with no tags as a centred crop of a 2:1 panorama.
    pub fn synthesize(image_width: u32, image_height: u32) -> Self {
        if image_width as u64 > image_height as u64 * 2 {
            let full_pano_height = image_width / 2;
            Self {
                full_pano_width: image_width,
                full_pano_height,
                crop_left: 0,
                crop_top: (full_pano_height / 2).saturating_sub(image_height / 2),
                crop_width: image_width,
                crop_height: image_height,
            }
        } else {
            let full_pano_width = image_height * 2;
            Self {
                full_pano_width,
                full_pano_height: image_height,
                crop_left: (full_pano_width / 2).saturating_sub(image_width / 2),
                crop_top: 0,
                crop_width: image_width,
                crop_height: image_height,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Already a 2:1 panorama: draw as is at its own size.
    FullPanorama { width: u32, height: u32 },
    /// Draw the image into `dest` on a canvas of `canvas_width x canvas_height`.
    Cropped {
        canvas_width: u32,
        canvas_height: u32,
        dest: PixelRect,
        source: PhotoSphereData,
    },
}

impl Placement {
    pub fn canvas_size(&self) -> (u32, u32) {
        match *self {
            Placement::FullPanorama { width, height } => (width, height),
            Placement::Cropped {
                canvas_width,
                canvas_height,
                ..
            } => (canvas_width, canvas_height),
        }
    }
}

/// Decide where an `image_width x image_height` image lands on the canvas.
pub fn place(
    image_width: u32,
    image_height: u32,
    metadata: Option<&PhotoSphereData>,
    max_canvas_width: u32,
) -> Placement {
    let metadata = match metadata {
        Some(data) if data.is_valid() => Some(*data),
        Some(data) => {
            warn!("ignoring inconsistent photosphere metadata {:?}", data);
            None
        }
        None => None,
    };

    let data = match metadata {
        Some(data) => data,
        None if image_height as u64 * 2 == image_width as u64 => {
            return Placement::FullPanorama {
                width: image_width,
                height: image_height,
            };
        }
        None => {
            let data = PhotoSphereData::synthesize(image_width, image_height);
            debug!(
                "synthesized photosphere {}x{} for {}x{} image",
                data.full_pano_width, data.full_pano_height, image_width, image_height
            );
            data
        }
    };

    let scale = data.full_pano_width as f32 / max_canvas_width.max(1) as f32;
    let scaled = |v: u32| (v as f32 / scale) as u32;

    Placement::Cropped {
        canvas_width: scaled(data.full_pano_width),
        canvas_height: scaled(data.full_pano_height),
        dest: PixelRect {
            left: scaled(data.crop_left),
            top: scaled(data.crop_top),
            right: scaled(data.crop_left + data.crop_width),
            bottom: scaled(data.crop_top + data.crop_height),
        },
        source: data,
    }
}

/// Draw `image` onto a canvas of `canvas` size according to `placement`.
/// Areas outside the crop stay black.
pub fn draw_placed(canvas: &mut RgbaImage, image: &RgbaImage, placement: &Placement) {
    match placement {
        Placement::FullPanorama { .. } => {
            if canvas.dimensions() == image.dimensions() {
                canvas.copy_from_slice(image.as_raw());
            } else {
                let (w, h) = canvas.dimensions();
                let resized = image::imageops::resize(image, w, h, FilterType::Triangle);
                canvas.copy_from_slice(resized.as_raw());
            }
        }
        Placement::Cropped { dest, .. } => {
            for pixel in canvas.pixels_mut() {
                *pixel = Rgba([0, 0, 0, 255]);
            }
            let (w, h) = (dest.width(), dest.height());
            if w == 0 || h == 0 {
                return;
            }
            let fitted;
            let src = if image.dimensions() == (w, h) {
                image
            } else {
                fitted = image::imageops::resize(image, w, h, FilterType::Triangle);
                &fitted
            };
            // dest is derived from validated metadata, so it fits the canvas
            if let Err(e) = canvas.copy_from(src, dest.left, dest.top) {
                warn!("photosphere crop did not fit the canvas: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// XMP extraction from JPEG APP1 segments

const XMP_NAMESPACE: &str = "ns.adobe.com/xap";

/// Walk the JPEG segment list and parse GPano tags out of the XMP packet, if any.
pub fn extract_from_jpeg(bytes: &[u8]) -> Option<PhotoSphereData> {
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    loop {
        // skip to the next marker prefix, then past any fill bytes
        while *bytes.get(pos)? != 0xFF {
            pos += 1;
        }
        while *bytes.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *bytes.get(pos)?;
        pos += 1;

        if marker == 0xD9 || marker == 0xDA || marker < 0xC0 {
            return None;
        }
        if (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let hi = *bytes.get(pos)? as usize;
        let lo = *bytes.get(pos + 1)? as usize;
        pos += 2;
        let length = ((hi << 8) | lo).checked_sub(2)?;
        if length == 0 {
            continue;
        }
        let payload = bytes.get(pos..pos + length)?;

        if marker == 0xE1 && payload.starts_with(b"http") {
            if let Some(nul) = payload.iter().position(|&b| b == 0) {
                let namespace = String::from_utf8_lossy(&payload[..nul]);
                if namespace.contains(XMP_NAMESPACE) {
                    let xmp = String::from_utf8_lossy(&payload[nul + 1..]);
                    return Some(parse_xmp(&xmp));
                }
            }
        }

        pos += length;
    }
}

/// Read GPano attributes; missing or unparsable values read as 0.
pub fn parse_xmp(xmp: &str) -> PhotoSphereData {
    PhotoSphereData {
        full_pano_width: int_attribute(xmp, "GPano:FullPanoWidthPixels"),
        full_pano_height: int_attribute(xmp, "GPano:FullPanoHeightPixels"),
        crop_left: int_attribute(xmp, "GPano:CroppedAreaLeftPixels"),
        crop_top: int_attribute(xmp, "GPano:CroppedAreaTopPixels"),
        crop_width: int_attribute(xmp, "GPano:CroppedAreaImageWidthPixels"),
        crop_height: int_attribute(xmp, "GPano:CroppedAreaImageHeightPixels"),
    }
}

fn attribute<'a>(xmp: &'a str, name: &str) -> Option<&'a str> {
    let start = xmp.find(name)?;
    let rest = &xmp[start..];
    let open = rest.find('"')?;
    let value = &rest[open + 1..];
    let close = value.find('"')?;
    Some(&value[..close])
}

fn int_attribute(xmp: &str, name: &str) -> u32 {
    attribute(xmp, name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
