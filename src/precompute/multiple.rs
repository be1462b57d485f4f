//! Multiple scattering: gather, integrate and accumulate one order at a time.

use std::f32::consts::PI;

use glam::Vec3;
use smallvec::SmallVec;

use crate::{
    backend::{BlendMode, ComputeBackend},
    config::GatherSteps,
    geometry::{light_direction, ray_end, view_direction, zenith_position},
    lut::WorldState,
    phase::{cornette_shanks_phase, rayleigh_phase},
    table::Table3,
};

use super::{march_view_ray, texel, InscatterTables, PassContext};

/// Mie asymmetry used while computing orders above 1. The asymmetry is a
/// runtime parameter, so nothing that depends on it can be baked in; higher
/// orders are close to isotropic anyway.
pub(crate) const PRECOMPUTE_MIE_ASYMMETRY: f32 = 0.0;

fn mie_phase(mu: f32) -> f32 {
    cornette_shanks_phase(mu, PRECOMPUTE_MIE_ASYMMETRY)
}

/// A direction on the unit sphere and the solid angle it stands for.
type SphereSample = (Vec3, f32);

/// Midpoint-rule sample directions over the whole sphere.
fn sphere_samples(steps: GatherSteps) -> SmallVec<[SphereSample; 128]> {
    let d_theta = PI / steps.zenith as f32;
    let d_phi = 2.0 * PI / steps.azimuth as f32;

    let mut samples = SmallVec::with_capacity(steps.zenith * steps.azimuth);
    for i in 0..steps.zenith {
        let theta = (i as f32 + 0.5) * d_theta;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let solid_angle = sin_theta * d_theta * d_phi;

        for j in 0..steps.azimuth {
            let phi = (j as f32 + 0.5) * d_phi;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let direction = Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi);
            samples.push((direction, solid_angle));
        }
    }
    samples
}

/// Gather the light of the previous order arriving at every cell and scatter
/// it into the cell's view direction.
///
/// For each cell, radiance arriving from every sampled direction `ω` is read
/// from `previous` at the cell's height, looking along `ω`, and weighted by
/// the phase of the angle between `ω` and the light. It's scattered towards
/// the viewer with the phase of the angle between `ω` and the view. The
/// result is divided by the phase of the view/light angle of the cell, so
/// the sampler can apply phase functions to every order in the same way.
pub(crate) fn gather<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    previous: &InscatterTables,
    backend: &B,
) -> InscatterTables {
    let resolution = ctx.param.resolution();
    let directions = sphere_samples(ctx.config.gather_steps);

    let mut gathered = InscatterTables::new(resolution);
    backend.dispatch(
        [&mut gathered.rayleigh, &mut gathered.mie],
        BlendMode::Overwrite,
        |cell| {
            let state = ctx.param.cell_state(cell);
            let view = view_direction(state.cos_view_zenith);
            let light = light_direction(state.cos_light_zenith);

            let mut rayleigh = Vec3::ZERO;
            let mut mie = Vec3::ZERO;
            for &(direction, solid_angle) in &directions {
                let coord = ctx.param.world_to_lut(WorldState {
                    height: state.height,
                    cos_view_zenith: direction.y,
                    cos_light_zenith: state.cos_light_zenith,
                });

                let mu_light = direction.dot(light);
                let incoming = previous.rayleigh.sample(coord).truncate() * rayleigh_phase(mu_light)
                    + previous.mie.sample(coord).truncate() * mie_phase(mu_light);

                let mu_view = direction.dot(view);
                rayleigh += incoming * rayleigh_phase(mu_view) * solid_angle;
                mie += incoming * mie_phase(mu_view) * solid_angle;
            }

            let nu = view.dot(light);
            [
                texel(rayleigh / rayleigh_phase(nu)),
                texel(mie / mie_phase(nu)),
            ]
        },
    );
    gathered
}

/// Integrate gathered light along the view ray of every cell, producing the
/// inscatter of the next order.
pub(crate) fn integrate<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    gathered: &InscatterTables,
    backend: &B,
) -> InscatterTables {
    let atmosphere = ctx.atmosphere;
    let resolution = ctx.param.resolution();
    let steps = ctx.config.integration_steps;

    let mut inscatter = InscatterTables::new(resolution);
    backend.dispatch(
        [&mut inscatter.rayleigh, &mut inscatter.mie],
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
                let up = position.normalize();
                let coord = ctx.param.world_to_lut(WorldState {
                    height,
                    cos_view_zenith: up.dot(view),
                    cos_light_zenith: up.dot(light),
                });
                (
                    gathered.rayleigh.sample(coord).truncate(),
                    gathered.mie.sample(coord).truncate(),
                )
            });

            [texel(march.rayleigh), texel(march.mie)]
        },
    );
    inscatter
}

/// Add one order to the running sum of orders 2 and above.
pub(crate) fn accumulate<B: ComputeBackend>(
    order: &InscatterTables,
    accumulated: &mut InscatterTables,
    backend: &B,
) {
    let rayleigh: &Table3 = &order.rayleigh;
    let mie: &Table3 = &order.mie;
    backend.dispatch(
        [&mut accumulated.rayleigh, &mut accumulated.mie],
        BlendMode::Additive,
        |cell| [rayleigh.data()[cell], mie.data()[cell]],
    );
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sphere_samples_cover_the_sphere() {
        let samples = sphere_samples(GatherSteps::default());
        assert_eq!(samples.len(), 128);
        assert!(!samples.spilled());

        let total: f32 = samples.iter().map(|(_, solid_angle)| solid_angle).sum();
        assert_relative_eq!(total, 4.0 * PI, max_relative = 0.02);

        let mean = samples
            .iter()
            .fold(Vec3::ZERO, |sum, (direction, _)| sum + *direction);
        assert!(mean.length() < 1e-3);
    }

    #[test]
    fn gathered_phase_integral() {
        // Scattering isotropic light with the Rayleigh phase conserves energy
        let samples = sphere_samples(GatherSteps {
            zenith: 32,
            azimuth: 64,
        });
        let total: f32 = samples
            .iter()
            .map(|(direction, solid_angle)| rayleigh_phase(direction.y) * solid_angle)
            .sum();
        assert_relative_eq!(total, 1.0, max_relative = 2e-3);
    }
}
