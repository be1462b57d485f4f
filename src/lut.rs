//! Mapping between physical state and table coordinates.
//!
//! A scattering table cell is addressed by the height above the ground, the
//! cosine of the view zenith angle and the cosine of the light zenith angle.
//! Each axis has its own warp that puts resolution where the scattered light
//! changes fastest:
//!
//! - height: square root of the normalized height, dense near the ground
//! - view zenith: split at the horizon, with a fourth root on each side, dense
//!   near the horizon
//! - light zenith: Bruneton's arctangent warp, dense when the sun is low
//!
//! The parametrization follows Yusov, "Outdoor Light Scattering Sample
//! Update" (2013) and Bruneton & Neyret, "Precomputed Atmospheric Scattering"
//! (2008).
//!
//! Every function clamps its inputs into a safe domain first, so nothing here
//! returns NaN for out-of-range inputs.

use glam::Vec2;

use crate::config::{AtmosphereParams, LutResolution, PlanarResolution};

/// Lowest representable cosine of the light zenith angle (sun slightly below
/// the horizon).
pub const MIN_COS_LIGHT_ZENITH: f32 = -0.1975;

/// Offset from the horizon used when converting back to a view direction, so
/// a ray is never ambiguous about hitting the ground.
const HORIZON_EPSILON: f32 = 1e-4;

const LIGHT_WARP_SCALE: f32 = 1.1;
const LIGHT_WARP_OFFSET: f32 = 0.26;

/// `tan(1.26 * 1.1)`
fn light_warp_k() -> f32 {
    f32::tan((1.0 + LIGHT_WARP_OFFSET) * LIGHT_WARP_SCALE)
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub(crate) fn saturate(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Clamp a cosine into `[-1, 1]`, mapping NaN to 0.
pub(crate) fn clamp_cos(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(-1.0, 1.0)
    }
}

/// Squeeze a `[0, 1]` value so that 0 and 1 land on the first and last texel
/// centers.
fn to_texel_centers(u: f32, resolution: usize) -> f32 {
    let resolution = resolution as f32;
    (u * (resolution - 1.0) + 0.5) / resolution
}

/// Inverse of [`to_texel_centers`].
fn from_texel_centers(u: f32, resolution: usize) -> f32 {
    let resolution = resolution as f32;
    saturate((u * resolution - 0.5) / (resolution - 1.0))
}

/// Cosine of the zenith angle of the horizon as seen from `height`.
pub fn cos_horizon(height: f32, planet_radius: f32) -> f32 {
    // Heights can come in slightly negative from numeric noise
    let height = height.max(0.0);
    -f32::sqrt(height * (2.0 * planet_radius + height)) / (planet_radius + height)
}

/// Map the cosine of the view zenith angle to a texture coordinate.
///
/// Directions above the horizon map to `[0.5 + ε, 1 - ε]` and directions at
/// or below it to `[ε, 0.5 - ε]`, where `ε = 0.5 / resolution`. The half
/// texel gap keeps linear filtering from blending across the horizon.
pub fn to_view_zenith_coord(
    cos_view_zenith: f32,
    height: f32,
    planet_radius: f32,
    resolution: usize,
) -> f32 {
    let cos_view_zenith = clamp_cos(cos_view_zenith);
    let cos_horizon = cos_horizon(height, planet_radius);
    let res = resolution as f32;

    let (t, offset) = if cos_view_zenith > cos_horizon {
        (
            saturate((cos_view_zenith - cos_horizon) / (1.0 - cos_horizon)),
            0.5,
        )
    } else {
        (
            saturate((cos_horizon - cos_view_zenith) / (cos_horizon + 1.0)),
            0.0,
        )
    };

    offset + 0.5 / res + t.sqrt().sqrt() * (res / 2.0 - 1.0) / res
}

/// Inverse of [`to_view_zenith_coord`].
///
/// The result is always strictly on the side of the horizon that the
/// coordinate's half of the texture belongs to.
pub fn from_view_zenith_coord(
    coord: f32,
    height: f32,
    planet_radius: f32,
    resolution: usize,
) -> f32 {
    let cos_horizon = cos_horizon(height, planet_radius);
    let res = resolution as f32;
    let scale = res / (res / 2.0 - 1.0);

    if coord > 0.5 {
        let t = saturate((coord - (0.5 + 0.5 / res)) * scale).powi(4);
        // Must not hit the ground
        (cos_horizon + t * (1.0 - cos_horizon)).max(cos_horizon + HORIZON_EPSILON)
    } else {
        let t = saturate((coord - 0.5 / res) * scale).powi(4);
        // Must hit the ground
        (cos_horizon - t * (1.0 + cos_horizon)).min(cos_horizon - HORIZON_EPSILON)
    }
}

/// Map the cosine of the light zenith angle to `[0, 1]` (Bruneton's formula).
pub fn to_light_zenith_coord(cos_light_zenith: f32) -> f32 {
    let cos_light_zenith = clamp_cos(cos_light_zenith).max(MIN_COS_LIGHT_ZENITH);
    0.5 * (f32::atan(cos_light_zenith * light_warp_k()) / LIGHT_WARP_SCALE
        + (1.0 - LIGHT_WARP_OFFSET))
}

/// Inverse of [`to_light_zenith_coord`].
pub fn from_light_zenith_coord(coord: f32) -> f32 {
    let coord = saturate(coord);
    let cos = f32::tan((2.0 * coord - 1.0 + LIGHT_WARP_OFFSET) * LIGHT_WARP_SCALE) / light_warp_k();
    clamp_cos(cos)
}

/// Map a height above the ground to `[0, 1]`.
pub fn to_height_coord(height: f32, atmosphere: &AtmosphereParams) -> f32 {
    let margin = atmosphere.height_margin;
    let top = atmosphere.atmosphere_height;
    let height = clamp_height(height, atmosphere);
    saturate((height - margin) / (top - 2.0 * margin)).sqrt()
}

/// Inverse of [`to_height_coord`].
pub fn from_height_coord(coord: f32, atmosphere: &AtmosphereParams) -> f32 {
    let margin = atmosphere.height_margin;
    let top = atmosphere.atmosphere_height;
    let coord = saturate(coord);
    coord * coord * (top - 2.0 * margin) + margin
}

/// Clamp a height to `[margin, top - margin]`.
pub fn clamp_height(height: f32, atmosphere: &AtmosphereParams) -> f32 {
    let margin = atmosphere.height_margin;
    let top = atmosphere.atmosphere_height;
    if height.is_nan() {
        margin
    } else {
        height.clamp(margin, top - margin)
    }
}

/// Physical state of a sample: where it is and where it looks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldState {
    /// Height above the ground in km
    pub height: f32,
    /// Cosine of the angle between the local zenith and the view direction
    pub cos_view_zenith: f32,
    /// Cosine of the angle between the local zenith and the light direction
    pub cos_light_zenith: f32,
}

/// Normalized texture coordinate of a scattering table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LutCoord {
    /// Height axis (U)
    pub height: f32,
    /// View zenith axis (V)
    pub view: f32,
    /// Light zenith axis (W)
    pub light: f32,
}

/// The full 3-axis mapping for one table resolution.
#[derive(Debug, Clone, Copy)]
pub struct Parametrization<'a> {
    atmosphere: &'a AtmosphereParams,
    resolution: LutResolution,
}

impl<'a> Parametrization<'a> {
    /// Mapping for tables of the given resolution.
    pub fn new(atmosphere: &'a AtmosphereParams, resolution: LutResolution) -> Self {
        Self {
            atmosphere,
            resolution,
        }
    }

    /// Table resolution of this mapping.
    pub fn resolution(&self) -> LutResolution {
        self.resolution
    }

    /// Physical state to texture coordinate.
    pub fn world_to_lut(&self, state: WorldState) -> LutCoord {
        let height = clamp_height(state.height, self.atmosphere);

        LutCoord {
            height: to_texel_centers(
                to_height_coord(height, self.atmosphere),
                self.resolution.height,
            ),
            view: to_view_zenith_coord(
                state.cos_view_zenith,
                height,
                self.atmosphere.planet_radius,
                self.resolution.view,
            ),
            light: to_texel_centers(
                to_light_zenith_coord(state.cos_light_zenith),
                self.resolution.light,
            ),
        }
    }

    /// Texture coordinate to physical state.
    pub fn lut_to_world(&self, coord: LutCoord) -> WorldState {
        let height = from_height_coord(
            from_texel_centers(coord.height, self.resolution.height),
            self.atmosphere,
        );

        WorldState {
            height,
            cos_view_zenith: from_view_zenith_coord(
                coord.view,
                height,
                self.atmosphere.planet_radius,
                self.resolution.view,
            ),
            cos_light_zenith: from_light_zenith_coord(from_texel_centers(
                coord.light,
                self.resolution.light,
            )),
        }
    }

    /// Texture coordinate of the center of a cell.
    pub fn cell_center(&self, (height, view, light): (usize, usize, usize)) -> LutCoord {
        let center = |index: usize, resolution: usize| (index as f32 + 0.5) / resolution as f32;
        LutCoord {
            height: center(height, self.resolution.height),
            view: center(view, self.resolution.view),
            light: center(light, self.resolution.light),
        }
    }

    /// Physical state at the center of a cell.
    pub fn cell_state(&self, cell: (usize, usize, usize)) -> WorldState {
        self.lut_to_world(self.cell_center(cell))
    }
}

/// Sunlight table coordinate (height, light zenith) of a state.
pub fn to_sunlight_coord(
    height: f32,
    cos_light_zenith: f32,
    atmosphere: &AtmosphereParams,
    resolution: PlanarResolution,
) -> Vec2 {
    Vec2::new(
        to_texel_centers(to_height_coord(height, atmosphere), resolution.height),
        to_texel_centers(to_light_zenith_coord(cos_light_zenith), resolution.light),
    )
}

/// Inverse of [`to_sunlight_coord`], returning (height, cos light zenith).
pub fn from_sunlight_coord(
    coord: Vec2,
    atmosphere: &AtmosphereParams,
    resolution: PlanarResolution,
) -> (f32, f32) {
    (
        from_height_coord(from_texel_centers(coord.x, resolution.height), atmosphere),
        from_light_zenith_coord(from_texel_centers(coord.y, resolution.light)),
    )
}

/// Optical depth table coordinate. Both axes are linear: height over the
/// atmosphere height, and the light zenith cosine remapped to `[0, 1]`.
pub fn to_optical_depth_coord(
    height: f32,
    cos_light_zenith: f32,
    atmosphere: &AtmosphereParams,
) -> Vec2 {
    Vec2::new(
        saturate(height / atmosphere.atmosphere_height),
        clamp_cos(cos_light_zenith) * 0.5 + 0.5,
    )
}

/// Inverse of [`to_optical_depth_coord`], returning (height, cos light zenith).
pub fn from_optical_depth_coord(coord: Vec2, atmosphere: &AtmosphereParams) -> (f32, f32) {
    (
        saturate(coord.x) * atmosphere.atmosphere_height,
        saturate(coord.y) * 2.0 - 1.0,
    )
}
