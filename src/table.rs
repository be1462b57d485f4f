//! Lookup tables and their filtered sampling.

use glam::{Vec2, Vec4};
use ndarray::{Array, Array2, Array3, ArrayView1, Axis, Dimension, Ix2, Ix3};

use crate::{
    config::LutResolution,
    lut::{saturate, LutCoord},
};

/// One table cell. Tables with fewer channels leave the rest at zero.
pub type Texel = [f32; 4];

/// An N-dimensional table of [`Texel`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<D: Dimension> {
    data: Array<Texel, D>,
}

/// A 2D table, indexed (height, light zenith).
pub type Table2 = Table<Ix2>;

/// A 3D table, indexed (height, view zenith, light zenith).
pub type Table3 = Table<Ix3>;

impl<D: Dimension> Table<D> {
    /// Wrap existing cells.
    pub fn from_array(data: Array<Texel, D>) -> Self {
        Self { data }
    }

    /// The cells of the table.
    pub fn data(&self) -> &Array<Texel, D> {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array<Texel, D> {
        &mut self.data
    }

    /// Number of cells along each axis.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Whether no cell holds NaN or infinity.
    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|x| x.is_finite())
    }

    /// Copy the first `channels` channels of every cell into an array with an
    /// extra trailing channel axis.
    pub fn to_channels(&self, channels: usize) -> Array<f32, D::Larger> {
        let channels = channels.min(4);
        let ndim = self.data.ndim();
        let mut dim = self.data.view().insert_axis(Axis(ndim)).raw_dim();
        dim[ndim] = channels;

        let mut output = Array::<f32, _>::zeros(dim);
        for (mut lane, texel) in output.lanes_mut(Axis(ndim)).into_iter().zip(&self.data) {
            lane.assign(&ArrayView1::from(&texel[..channels]));
        }
        output
    }
}

/// Texel pair and blend weight for linear filtering along one axis, with the
/// coordinate clamped to the texel centers at both ends.
fn linear_taps(coord: f32, size: usize) -> (usize, usize, f32) {
    let last = size.saturating_sub(1);
    let x = (saturate(coord) * size as f32 - 0.5).clamp(0.0, last as f32);
    let i0 = (x.floor() as usize).min(last);
    let i1 = (i0 + 1).min(last);
    (i0, i1, x - i0 as f32)
}

fn lerp(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a + (b - a) * t
}

impl Table2 {
    /// Zero-filled table.
    pub fn new(height: usize, light: usize) -> Self {
        Self::from_array(Array2::from_elem((height, light), [0.0; 4]))
    }

    /// Cell value.
    pub fn get(&self, (height, light): (usize, usize)) -> Vec4 {
        Vec4::from_array(self.data[(height, light)])
    }

    /// Bilinear sample at a coordinate in `[0, 1]²`. Coordinates outside of
    /// that range are clamped.
    pub fn sample(&self, coord: Vec2) -> Vec4 {
        let (h0, h1, fh) = linear_taps(coord.x, self.data.shape()[0]);
        let (l0, l1, fl) = linear_taps(coord.y, self.data.shape()[1]);

        lerp(
            lerp(self.get((h0, l0)), self.get((h0, l1)), fl),
            lerp(self.get((h1, l0)), self.get((h1, l1)), fl),
            fh,
        )
    }
}

impl Table3 {
    /// Zero-filled table.
    pub fn new(resolution: LutResolution) -> Self {
        Self::from_array(Array3::from_elem(resolution.shape(), [0.0; 4]))
    }

    /// Cell value.
    pub fn get(&self, cell: (usize, usize, usize)) -> Vec4 {
        Vec4::from_array(self.data[cell])
    }

    /// Trilinear sample at a coordinate in `[0, 1]³`. Coordinates outside of
    /// that range are clamped.
    pub fn sample(&self, coord: LutCoord) -> Vec4 {
        let shape = self.data.shape();
        let (u0, u1, fu) = linear_taps(coord.height, shape[0]);
        let (v0, v1, fv) = linear_taps(coord.view, shape[1]);
        let (w0, w1, fw) = linear_taps(coord.light, shape[2]);

        let plane = |u| {
            lerp(
                lerp(self.get((u, v0, w0)), self.get((u, v0, w1)), fw),
                lerp(self.get((u, v1, w0)), self.get((u, v1, w1)), fw),
                fv,
            )
        };
        lerp(plane(u0), plane(u1), fu)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn ramp() -> Table2 {
        let mut table = Table2::new(4, 2);
        for ((h, l), texel) in table.data_mut().indexed_iter_mut() {
            *texel = [h as f32, l as f32, 1.0, 0.0];
        }
        table
    }

    #[test]
    fn samples_texel_centers_exactly() {
        let table = ramp();
        let value = table.sample(Vec2::new(2.5 / 4.0, 0.5 / 2.0));
        assert_eq!(value, Vec4::new(2.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn interpolates_between_texels() {
        let table = ramp();
        let value = table.sample(Vec2::new(0.5, 0.5));
        assert_abs_diff_eq!(value.x, 1.5);
        assert_abs_diff_eq!(value.y, 0.5);
        assert_abs_diff_eq!(value.z, 1.0);
    }

    #[test]
    fn clamps_instead_of_wrapping() {
        let table = ramp();
        assert_eq!(table.sample(Vec2::new(-3.0, -1.0)).x, 0.0);
        assert_eq!(table.sample(Vec2::new(7.0, 2.0)).x, 3.0);
        assert_eq!(table.sample(Vec2::new(1.0, 1.0)).y, 1.0);
        assert!(table.sample(Vec2::new(f32::NAN, 0.5)).is_finite());
    }

    #[test]
    fn trilinear_sampling() {
        let resolution = LutResolution {
            height: 2,
            view: 4,
            light: 2,
        };
        let mut table = Table3::new(resolution);
        for ((u, v, w), texel) in table.data_mut().indexed_iter_mut() {
            *texel = [u as f32, v as f32, w as f32, 1.0];
        }

        let value = table.sample(LutCoord {
            height: 0.5,
            view: 0.5,
            light: 0.75,
        });
        assert_abs_diff_eq!(value.x, 0.5);
        assert_abs_diff_eq!(value.y, 1.5);
        assert_abs_diff_eq!(value.z, 1.0);
        assert_abs_diff_eq!(value.w, 1.0);
    }

    #[test]
    fn channel_export() {
        let table = ramp();
        let channels = table.to_channels(2);
        assert_eq!(channels.shape(), &[4, 2, 2]);
        assert_eq!(channels[[3, 1, 0]], 3.0);
        assert_eq!(channels[[3, 1, 1]], 1.0);
        assert!(table.is_finite());
    }
}
