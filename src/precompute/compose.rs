//! Final tables assembled from the scattering orders.

use glam::{Vec2, Vec3, Vec4};

use crate::{
    backend::{BlendMode, ComputeBackend},
    config::PlanarResolution,
    lut::{from_sunlight_coord, to_optical_depth_coord},
    phase::pack_inscatter,
    table::{Table2, Table3, Texel},
};

use super::{texel, InscatterTables, PassContext};

fn rgb(texel: &Texel) -> Vec3 {
    Vec4::from_array(*texel).truncate()
}

/// Sum of single scattering and all higher orders, Rayleigh and Mie kept
/// apart.
pub(crate) fn total<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    single: &InscatterTables,
    accumulated: &InscatterTables,
    backend: &B,
) -> InscatterTables {
    let mut total = InscatterTables::new(ctx.param.resolution());
    backend.dispatch(
        [&mut total.rayleigh, &mut total.mie],
        BlendMode::Overwrite,
        |cell| {
            [
                texel(rgb(&single.rayleigh.data()[cell]) + rgb(&accumulated.rayleigh.data()[cell])),
                texel(rgb(&single.mie.data()[cell]) + rgb(&accumulated.mie.data()[cell])),
            ]
        },
    );
    total
}

/// Sum of all orders in one table: Rayleigh in RGB, red Mie in alpha.
pub(crate) fn packed<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    single: &InscatterTables,
    accumulated: &InscatterTables,
    backend: &B,
) -> Table3 {
    let mut packed = Table3::new(ctx.param.resolution());
    backend.dispatch([&mut packed], BlendMode::Overwrite, |cell| {
        let rayleigh = rgb(&single.rayleigh.data()[cell]) + rgb(&accumulated.rayleigh.data()[cell]);
        let mie = rgb(&single.mie.data()[cell]) + rgb(&accumulated.mie.data()[cell]);
        let value = pack_inscatter(rayleigh, mie);
        if value.is_finite() {
            [value.to_array()]
        } else {
            [[0.0; 4]]
        }
    });
    packed
}

/// Transmittance to the sun from every (height, light zenith) cell, read from
/// the optical depth table.
pub(crate) fn sunlight<B: ComputeBackend>(
    ctx: &PassContext<'_>,
    resolution: PlanarResolution,
    optical_depth: &Table2,
    backend: &B,
) -> Table2 {
    let atmosphere = ctx.atmosphere;

    let mut sunlight = Table2::new(resolution.height, resolution.light);
    backend.dispatch([&mut sunlight], BlendMode::Overwrite, |(i, j)| {
        let center = Vec2::new(
            (i as f32 + 0.5) / resolution.height as f32,
            (j as f32 + 0.5) / resolution.light as f32,
        );
        let (height, cos_light_zenith) = from_sunlight_coord(center, atmosphere, resolution);
        let depth = optical_depth.sample(to_optical_depth_coord(
            height,
            cos_light_zenith,
            atmosphere,
        ));
        [texel(atmosphere.transmittance(Vec2::new(depth.x, depth.y)))]
    });
    sunlight
}
