//! Single scattering.

use glam::Vec2;

use crate::{
    backend::{BlendMode, ComputeBackend},
    geometry::{light_direction, ray_end, view_direction, zenith_position},
    lut::to_optical_depth_coord,
    table::{Table2, Table3},
};

use super::{march_view_ray, texel, InscatterTables, PassContext};

/// Compute single scattered Rayleigh and Mie inscatter, and the transmittance
/// along the view ray, for every cell.
///
/// Sunlight reaching each sample along the view ray is attenuated by the
/// optical depth to the top of the atmosphere, read from `optical_depth`.
pub(crate) fn compute<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    optical_depth: &Table2,
    backend: &B,
) -> (InscatterTables, Table3) {
    let atmosphere = ctx.atmosphere;
    let resolution = ctx.param.resolution();
    let steps = ctx.config.integration_steps;

    let mut inscatter = InscatterTables::new(resolution);
    let mut transmittance = Table3::new(resolution);

    backend.dispatch(
        [
            &mut inscatter.rayleigh,
            &mut inscatter.mie,
            &mut transmittance,
        ],
        BlendMode::Overwrite,
        |cell| {
            let state = ctx.param.cell_state(cell);
            let start = zenith_position(state.height, atmosphere.planet_radius);
            let view = view_direction(state.cos_view_zenith);
            let light = light_direction(state.cos_light_zenith);
            let end = ray_end(
                start,
                view,
                atmosphere.planet_radius,
                atmosphere.top_radius(),
            );

            let march = march_view_ray(atmosphere, start, end, steps, |position, height| {
                let cos_light_zenith = position.normalize().dot(light);
                let depth = optical_depth.sample(to_optical_depth_coord(
                    height,
                    cos_light_zenith,
                    atmosphere,
                ));
                let sunlight = atmosphere.transmittance(Vec2::new(depth.x, depth.y));
                (sunlight, sunlight)
            });

            [
                texel(march.rayleigh),
                texel(march.mie),
                texel(march.transmittance),
            ]
        },
    );

    (inscatter, transmittance)
}
