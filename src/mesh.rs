// mesh.rs: UV sphere geometry with per-eye texture coordinates

use thiserror::Error;

/// How the left/right eye images are packed into one source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    #[default]
    Monoscopic,
    StereoLeftRight,
    StereoTopBottom,
}

impl MediaFormat {
    /// Integer selector used by launchers. Anything unknown falls back to mono.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MediaFormat::StereoLeftRight,
            2 => MediaFormat::StereoTopBottom,
            _ => MediaFormat::Monoscopic,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            MediaFormat::Monoscopic => 0,
            MediaFormat::StereoLeftRight => 1,
            MediaFormat::StereoTopBottom => 2,
        }
    }

    /// Accepts the integer codes as well as the names `mono`, `left-right`, `top-bottom`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "mono" | "monoscopic" => MediaFormat::Monoscopic,
            "left-right" | "lr" | "sbs" => MediaFormat::StereoLeftRight,
            "top-bottom" | "tb" | "ou" => MediaFormat::StereoTopBottom,
            other => other
                .parse::<i32>()
                .map(MediaFormat::from_code)
                .unwrap_or_default(),
        }
    }
}

/// Which eye is currently being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Monocular,
    LeftEye,
    RightEye,
}

#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    #[error("sphere needs at least one row and one column (got {rows}x{columns})")]
    EmptyGrid { rows: usize, columns: usize },
    #[error("vertical extent must be in (0, 180] degrees, got {0}")]
    VerticalExtent(f32),
    #[error("horizontal extent must be in (0, 360] degrees, got {0}")]
    HorizontalExtent(f32),
    #[error("sphere radius must be positive, got {0}")]
    Radius(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereParams {
    pub radius: f32,
    pub rows: usize,
    pub columns: usize,
    pub vertical_degrees: f32,
    pub horizontal_degrees: f32,
}

impl Default for SphereParams {
    // 360 x 180 sphere with 32x32 quads; 50 m keeps stereo artifacts invisible.
    fn default() -> Self {
        Self {
            radius: 50.0,
            rows: 32,
            columns: 32,
            vertical_degrees: 180.0,
            horizontal_degrees: 360.0,
        }
    }
}

impl SphereParams {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(MeshError::EmptyGrid {
                rows: self.rows,
                columns: self.columns,
            });
        }
        if !(self.vertical_degrees > 0.0 && self.vertical_degrees <= 180.0) {
            return Err(MeshError::VerticalExtent(self.vertical_degrees));
        }
        if !(self.horizontal_degrees > 0.0 && self.horizontal_degrees <= 360.0) {
            return Err(MeshError::HorizontalExtent(self.horizontal_degrees));
        }
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(MeshError::Radius(self.radius));
        }
        Ok(())
    }
}

/// Immutable sphere geometry. A new media item builds a new mesh.
#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    /// `[left/mono, right]` texture coordinate sets, parallel to `positions`.
    tex_coords: [Vec<[f32; 2]>; 2],
    pub indices: Vec<u32>,
    pub format: MediaFormat,
}

impl SphereMesh {
    pub fn uv_sphere(params: &SphereParams, format: MediaFormat) -> Result<Self, MeshError> {
        params.validate()?;

        let rows = params.rows;
        let columns = params.columns;
        let vertex_count = (rows + 1) * (columns + 1);
        let mut positions = Vec::with_capacity(vertex_count);
        let mut left = Vec::with_capacity(vertex_count);
        let mut right = Vec::with_capacity(vertex_count);

        let v_deg = params.vertical_degrees;
        let h_deg = params.horizontal_degrees;

        for row in 0..=rows {
            // +V/2 at the top row down to -V/2
            let lat_deg = v_deg / 2.0 - v_deg * (row as f32) / (rows as f32);
            let lat = lat_deg.to_radians();
            let (sin_lat, cos_lat) = lat.sin_cos();

            for col in 0..=columns {
                let lon_deg = h_deg * (col as f32) / (columns as f32);
                let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();

                positions.push([
                    params.radius * sin_lon * cos_lat,
                    params.radius * sin_lat,
                    params.radius * cos_lon * cos_lat,
                ]);

                let u = (lon_deg / h_deg).clamp(0.0, 1.0);
                let v = (1.0 - (lat_deg + v_deg / 2.0) / v_deg).clamp(0.0, 1.0);

                match format {
                    MediaFormat::Monoscopic => {
                        left.push([u, v]);
                        right.push([u, v]);
                    }
                    // the closing column of each eye lands on the shared seam u = 0.5
                    MediaFormat::StereoLeftRight => {
                        left.push([u * 0.5, v]);
                        right.push([0.5 + u * 0.5, v]);
                    }
                    MediaFormat::StereoTopBottom => {
                        left.push([u, v * 0.5]);
                        right.push([u, 0.5 + v * 0.5]);
                    }
                }
            }
        }

        let mut indices = Vec::with_capacity(6 * rows * columns);
        let stride = (columns + 1) as u32;
        for row in 0..rows {
            for col in 0..columns {
                let a = row as u32 * stride + col as u32;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
            }
        }

        Ok(Self {
            positions,
            tex_coords: [left, right],
            indices,
            format,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Coordinate set to bind for the eye being drawn.
    pub fn tex_coords(&self, eye: Eye) -> &[[f32; 2]] {
        match eye {
            Eye::Monocular | Eye::LeftEye => &self.tex_coords[0],
            Eye::RightEye => &self.tex_coords[1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(rows: usize, columns: usize, v: f32, h: f32) -> SphereParams {
        SphereParams {
            radius: 10.0,
            rows,
            columns,
            vertical_degrees: v,
            horizontal_degrees: h,
        }
    }

    #[test]
    fn counts_follow_grid_size() {
        for (rows, columns) in [(1, 1), (4, 7), (32, 32), (3, 64)] {
            let mesh =
                SphereMesh::uv_sphere(&params(rows, columns, 180.0, 360.0), MediaFormat::Monoscopic)
                    .unwrap();
            assert_eq!(mesh.vertex_count(), (rows + 1) * (columns + 1));
            assert_eq!(mesh.indices.len(), 6 * rows * columns);
            assert_eq!(mesh.tex_coords(Eye::Monocular).len(), mesh.vertex_count());
            let max = *mesh.indices.iter().max().unwrap() as usize;
            assert!(max < mesh.vertex_count());
        }
    }

    #[test]
    fn tex_coords_stay_in_unit_square() {
        for format in [
            MediaFormat::Monoscopic,
            MediaFormat::StereoLeftRight,
            MediaFormat::StereoTopBottom,
        ] {
            let mesh = SphereMesh::uv_sphere(&params(9, 13, 120.0, 200.0), format).unwrap();
            for eye in [Eye::LeftEye, Eye::RightEye] {
                for [u, v] in mesh.tex_coords(eye) {
                    assert!((0.0..=1.0).contains(u), "u={u}");
                    assert!((0.0..=1.0).contains(v), "v={v}");
                }
            }
        }
    }

    #[test]
    fn mono_covers_full_range() {
        let mesh = SphereMesh::uv_sphere(&params(8, 8, 180.0, 360.0), MediaFormat::Monoscopic)
            .unwrap();
        let coords = mesh.tex_coords(Eye::Monocular);
        assert_eq!(coords.first(), Some(&[0.0, 0.0]));
        assert_eq!(coords.last(), Some(&[1.0, 1.0]));
    }

    #[test]
    fn left_right_eyes_meet_only_at_the_seam() {
        let mesh = SphereMesh::uv_sphere(&SphereParams::default(), MediaFormat::StereoLeftRight)
            .unwrap();
        let left_max = mesh
            .tex_coords(Eye::LeftEye)
            .iter()
            .map(|c| c[0])
            .fold(f32::MIN, f32::max);
        let right_min = mesh
            .tex_coords(Eye::RightEye)
            .iter()
            .map(|c| c[0])
            .fold(f32::MAX, f32::min);
        // only the seam column is shared, at exactly u = 0.5
        assert_eq!(left_max, 0.5);
        assert_eq!(right_min, 0.5);
        let on_seam = |eye| mesh.tex_coords(eye).iter().filter(|c| c[0] == 0.5).count();
        let rows = SphereParams::default().rows;
        assert_eq!(on_seam(Eye::LeftEye), rows + 1);
        assert_eq!(on_seam(Eye::RightEye), rows + 1);
    }

    #[test]
    fn top_bottom_splits_v() {
        let mesh = SphereMesh::uv_sphere(&SphereParams::default(), MediaFormat::StereoTopBottom)
            .unwrap();
        assert!(mesh.tex_coords(Eye::LeftEye).iter().all(|c| c[1] <= 0.5));
        assert!(mesh.tex_coords(Eye::RightEye).iter().all(|c| c[1] >= 0.5));
    }

    #[test]
    fn top_row_sits_on_the_north_pole() {
        let mesh = SphereMesh::uv_sphere(&params(2, 4, 180.0, 360.0), MediaFormat::Monoscopic)
            .unwrap();
        let [_, y, _] = mesh.positions[0];
        assert!((y - 10.0).abs() < 1e-4);
        let [x, y, z] = mesh.positions[5];
        // row 1, col 0 -> equator, lon 0 -> +Z
        assert!(x.abs() < 1e-4 && y.abs() < 1e-4 && (z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            SphereMesh::uv_sphere(&params(0, 4, 180.0, 360.0), MediaFormat::Monoscopic).unwrap_err(),
            MeshError::EmptyGrid { rows: 0, columns: 4 }
        );
        assert!(SphereMesh::uv_sphere(&params(4, 0, 180.0, 360.0), MediaFormat::Monoscopic).is_err());
        assert!(SphereMesh::uv_sphere(&params(4, 4, 0.0, 360.0), MediaFormat::Monoscopic).is_err());
        assert!(SphereMesh::uv_sphere(&params(4, 4, 181.0, 360.0), MediaFormat::Monoscopic).is_err());
        assert!(SphereMesh::uv_sphere(&params(4, 4, 180.0, 360.5), MediaFormat::Monoscopic).is_err());
        assert!(SphereMesh::uv_sphere(&params(4, 4, 180.0, -1.0), MediaFormat::Monoscopic).is_err());
    }

    #[test]
    fn unknown_format_codes_default_to_mono() {
        assert_eq!(MediaFormat::from_code(1), MediaFormat::StereoLeftRight);
        assert_eq!(MediaFormat::from_code(2), MediaFormat::StereoTopBottom);
        assert_eq!(MediaFormat::from_code(7), MediaFormat::Monoscopic);
        assert_eq!(MediaFormat::from_code(-1), MediaFormat::Monoscopic);
        assert_eq!(MediaFormat::StereoTopBottom.code(), 2);
        assert_eq!(MediaFormat::parse_lenient("top-bottom"), MediaFormat::StereoTopBottom);
        assert_eq!(MediaFormat::parse_lenient("1"), MediaFormat::StereoLeftRight);
        assert_eq!(MediaFormat::parse_lenient("garbage"), MediaFormat::Monoscopic);
    }
}
