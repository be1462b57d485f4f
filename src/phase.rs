//! Phase functions and the packed inscatter encoding.
//!
//! `mu` is always the cosine of the angle between the view and the light
//! direction.

use std::f32::consts::PI;

use glam::{Vec3, Vec4};

use crate::config::{MiePhaseModel, RuntimeParams};

/// Smallest denominator allowed when unpacking Mie inscatter.
pub const MIN_PACK_DENOMINATOR: f32 = 1e-9;

/// Rayleigh phase function.
pub fn rayleigh_phase(mu: f32) -> f32 {
    3.0 / (16.0 * PI) * (1.0 + mu * mu)
}

/// Henyey-Greenstein phase function for asymmetry `g`.
pub fn henyey_greenstein_phase(mu: f32, g: f32) -> f32 {
    let g2 = g * g;
    (1.0 - g2) / (4.0 * PI * (1.0 + g2 - 2.0 * g * mu).abs().powf(1.5))
}

/// Cornette-Shanks phase function for asymmetry `g`.
///
/// Like Henyey-Greenstein, but with the `1 + mu²` lobe of Rayleigh scattering,
/// which makes it a better fit for small particles.
pub fn cornette_shanks_phase(mu: f32, g: f32) -> f32 {
    let g2 = g * g;
    1.5 / (4.0 * PI) * (1.0 - g2) / (2.0 + g2) * (1.0 + mu * mu)
        * (1.0 + g2 - 2.0 * g * mu).abs().powf(-1.5)
}

/// Mie phase function selected by the runtime parameters.
pub fn mie_phase(mu: f32, params: &RuntimeParams) -> f32 {
    match params.mie_phase {
        MiePhaseModel::CornetteShanks => cornette_shanks_phase(mu, params.mie_asymmetry),
        MiePhaseModel::HenyeyGreenstein => henyey_greenstein_phase(mu, params.mie_asymmetry),
    }
}

/// Pack Rayleigh and Mie inscatter into one value: RGB holds Rayleigh, A
/// holds the red Mie channel.
pub fn pack_inscatter(rayleigh: Vec3, mie: Vec3) -> Vec4 {
    rayleigh.extend(mie.x)
}

/// Reconstruct Mie inscatter from a packed value.
///
/// Mie is assumed to vary across channels like Rayleigh inscatter divided by
/// the Rayleigh scattering coefficient, which only holds approximately. The
/// error grows when the red Rayleigh channel is near zero while Mie is not.
pub fn unpack_mie_inscatter(packed: Vec4, rayleigh_scattering: Vec3) -> Vec3 {
    packed.truncate() * packed.w / packed.x.max(MIN_PACK_DENOMINATOR)
        * (rayleigh_scattering.x / rayleigh_scattering)
}
