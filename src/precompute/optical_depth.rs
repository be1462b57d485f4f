//! Optical depth to the top of the atmosphere.

use glam::{Vec2, Vec3};

use crate::{
    backend::{BlendMode, ComputeBackend},
    config::AtmosphereParams,
    geometry::{intersect_double_sphere, light_direction, zenith_position},
    lut::from_optical_depth_coord,
    table::Table2,
};

use super::PassContext;

/// Optical depth of a ray that hits the ground. Large enough that the
/// transmittance computed from it is exactly zero.
pub const OCCLUDED_OPTICAL_DEPTH: f32 = 1e20;

/// Density-weighted path length from `start` to `end`, sampled at `steps + 1`
/// evenly spaced points.
pub(crate) fn naive_optical_depth(
    atmosphere: &AtmosphereParams,
    start: Vec3,
    end: Vec3,
    steps: usize,
) -> Vec2 {
    let dr = (end - start) / steps as f32;
    let ds = dr.length();

    (0..=steps)
        .map(|i| {
            let position = start + dr * i as f32;
            let height = (position.length() - atmosphere.planet_radius).abs();
            atmosphere.density(height) * ds
        })
        .sum()
}

/// (Rayleigh, Mie) optical depth from `origin` along `direction` to the top
/// of the atmosphere.
///
/// `origin` is relative to the planet center and inside the atmosphere, and
/// `direction` is a unit vector. Rays that hit the ground get
/// [`OCCLUDED_OPTICAL_DEPTH`].
pub fn optical_depth_along_ray(
    atmosphere: &AtmosphereParams,
    origin: Vec3,
    direction: Vec3,
    steps: usize,
) -> Vec2 {
    let hit = intersect_double_sphere(
        origin,
        direction,
        [atmosphere.planet_radius, atmosphere.top_radius()],
    );

    if hit.inner.is_some_and(|ground| ground.near > 0.0) {
        return Vec2::splat(OCCLUDED_OPTICAL_DEPTH);
    }

    let length = hit.outer.map_or(0.0, |top| top.far.max(0.0));
    naive_optical_depth(atmosphere, origin, origin + direction * length, steps)
}

/// Fill the optical depth table. Cell (i, j) holds the optical depth towards
/// the light from the height and light zenith cosine at its center, in the
/// first two channels.
pub(crate) fn compute<B: ComputeBackend>(ctx: &PassContext<'_>, backend: &B) -> Table2 {
    let atmosphere = ctx.atmosphere;
    let resolution = ctx.config.optical_depth_resolution;
    let steps = ctx.config.integration_steps;

    let mut table = Table2::new(resolution.height, resolution.light);
    backend.dispatch([&mut table], BlendMode::Overwrite, |(i, j)| {
        let center = Vec2::new(
            (i as f32 + 0.5) / resolution.height as f32,
            (j as f32 + 0.5) / resolution.light as f32,
        );
        let (height, cos_light_zenith) = from_optical_depth_coord(center, atmosphere);

        let origin = zenith_position(height, atmosphere.planet_radius);
        let depth = optical_depth_along_ray(
            atmosphere,
            origin,
            light_direction(cos_light_zenith),
            steps,
        );
        [[depth.x, depth.y, 0.0, 0.0]]
    });
    table
}
