//! Precomputation and runtime configuration.
//!
//! Lengths are in km. Scattering coefficients are stored in 10⁻⁶ m⁻¹, which
//! is how they are usually quoted, and converted to km⁻¹ on use.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::PrecomputeError;

/// Conversion from 10⁻⁶ m⁻¹ to km⁻¹
const COEFFICIENT_TO_PER_KM: f32 = 1e-3;

/// Planets with a built-in parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Planet {
    /// Earth with a clear, lightly hazy atmosphere
    #[default]
    Earth,
}

/// Physical description of the atmosphere and the planet it wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereParams {
    /// Rayleigh scattering coefficient per RGB channel, in 10⁻⁶ m⁻¹
    pub rayleigh_scattering: Vec3,
    /// Rayleigh density scale height in km
    pub rayleigh_scale_height: f32,
    /// Mie scattering coefficient per RGB channel, in 10⁻⁶ m⁻¹
    pub mie_scattering: Vec3,
    /// Mie density scale height in km
    pub mie_scale_height: f32,
    /// Ratio of Mie extinction to Mie scattering
    pub mie_absorption: f32,
    /// Planet radius in km
    pub planet_radius: f32,
    /// Height of the top of the atmosphere above the ground in km
    pub atmosphere_height: f32,
    /// Distance kept from the ground and the top of the atmosphere when
    /// addressing tables, in km
    pub height_margin: f32,
}

impl Default for AtmosphereParams {
    fn default() -> Self {
        Self::preset(Planet::Earth)
    }
}

impl AtmosphereParams {
    /// Parameter set for a known planet.
    pub fn preset(planet: Planet) -> Self {
        match planet {
            Planet::Earth => Self {
                rayleigh_scattering: rayleigh_scattering_coefficients() * 1e6,
                rayleigh_scale_height: 7.997,
                mie_scattering: Vec3::splat(20.0),
                mie_scale_height: 1.2,
                mie_absorption: 1.11,
                planet_radius: 6360.0,
                atmosphere_height: 260.0,
                height_margin: 0.004,
            },
        }
    }

    /// Radius of the top of the atmosphere in km.
    pub fn top_radius(&self) -> f32 {
        self.planet_radius + self.atmosphere_height
    }

    /// Rayleigh scattering coefficient in km⁻¹. Rayleigh scattering doesn't
    /// absorb, so this is also its extinction.
    pub fn rayleigh_beta(&self) -> Vec3 {
        self.rayleigh_scattering * COEFFICIENT_TO_PER_KM
    }

    /// Mie scattering coefficient in km⁻¹.
    pub fn mie_beta(&self) -> Vec3 {
        self.mie_scattering * COEFFICIENT_TO_PER_KM
    }

    /// Mie extinction coefficient in km⁻¹.
    pub fn mie_extinction(&self) -> Vec3 {
        self.mie_beta() * self.mie_absorption
    }

    /// Relative (Rayleigh, Mie) density at a height above the ground.
    pub fn density(&self, height: f32) -> Vec2 {
        let height = height.max(0.0);
        Vec2::new(
            f32::exp(-height / self.rayleigh_scale_height),
            f32::exp(-height / self.mie_scale_height),
        )
    }

    /// Transmittance through a (Rayleigh, Mie) density-weighted path length.
    pub fn transmittance(&self, optical_depth: Vec2) -> Vec3 {
        let tau = self.rayleigh_beta() * optical_depth.x + self.mie_extinction() * optical_depth.y;
        (-tau).exp()
    }

    /// Check that every value is physically meaningful.
    pub fn validate(&self) -> Result<(), PrecomputeError> {
        let positive = |x: f32| x.is_finite() && x > 0.0;

        if !positive(self.planet_radius) {
            return Err(PrecomputeError::InvalidGeometry(
                "planet radius must be positive",
            ));
        }
        if !positive(self.atmosphere_height) {
            return Err(PrecomputeError::InvalidGeometry(
                "atmosphere height must be positive",
            ));
        }
        if !(self.height_margin.is_finite()
            && self.height_margin >= 0.0
            && 2.0 * self.height_margin < self.atmosphere_height)
        {
            return Err(PrecomputeError::InvalidGeometry(
                "height margin must be non-negative and less than half the atmosphere height",
            ));
        }
        if !positive(self.rayleigh_scale_height) {
            return Err(PrecomputeError::InvalidScaleHeight {
                medium: "Rayleigh",
                value: self.rayleigh_scale_height,
            });
        }
        if !positive(self.mie_scale_height) {
            return Err(PrecomputeError::InvalidScaleHeight {
                medium: "Mie",
                value: self.mie_scale_height,
            });
        }
        if !positive(self.mie_absorption) {
            return Err(PrecomputeError::InvalidMieAbsorption(self.mie_absorption));
        }

        let non_negative = |v: Vec3| v.is_finite() && v.min_element() >= 0.0;
        // The red Rayleigh channel is the reference for packing Mie
        if !non_negative(self.rayleigh_scattering) || self.rayleigh_scattering.x <= 0.0 {
            return Err(PrecomputeError::InvalidScatteringCoefficient("Rayleigh"));
        }
        if !non_negative(self.mie_scattering) {
            return Err(PrecomputeError::InvalidScatteringCoefficient("Mie"));
        }

        Ok(())
    }
}

/// Compute the Rayleigh scattering coefficients of air.
///
/// Returns the total scattering coefficient in m⁻¹ for red (680 nm), green
/// (550 nm) and blue (440 nm) light at sea level. The molecular constants are
/// the ones from "A Practical Analytic Model for Daylight" by Preetham et al.
/// (1999), p. 23:
///
/// - `n`: refractive index of air in the visible spectrum
/// - `N`: number of molecules per unit volume
/// - `p_n`: depolarization factor, correcting for the anisotropy of air
///   molecules
pub fn rayleigh_scattering_coefficients() -> Vec3 {
    const WAVELENGTHS: [f64; 3] = [680e-9, 550e-9, 440e-9];
    const N_AIR: f64 = 1.0003;
    const MOLECULES: f64 = 2.545e25;
    const P_N: f64 = 0.035;

    let n2 = N_AIR * N_AIR - 1.0;
    let k = 8.0 * std::f64::consts::PI.powi(3) * n2 * n2 / (3.0 * MOLECULES) * (6.0 + 3.0 * P_N)
        / (6.0 - 7.0 * P_N);

    let [r, g, b] = WAVELENGTHS.map(|lambda| (k / lambda.powi(4)) as f32);
    Vec3::new(r, g, b)
}

/// Resolution of the 3D scattering tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LutResolution {
    /// Number of height texels (U)
    pub height: usize,
    /// Number of view-zenith texels (V), split evenly at the horizon
    pub view: usize,
    /// Number of light-zenith texels (W)
    pub light: usize,
}

impl Default for LutResolution {
    fn default() -> Self {
        Self {
            height: 12,
            view: 96,
            light: 24,
        }
    }
}

impl LutResolution {
    /// Shape of a table with this resolution, ordered (height, view, light).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.view, self.light)
    }
}

/// Resolution of a 2D (height, light-zenith) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarResolution {
    /// Number of height texels
    pub height: usize,
    /// Number of light-zenith texels
    pub light: usize,
}

impl Default for PlanarResolution {
    fn default() -> Self {
        Self {
            height: 512,
            light: 512,
        }
    }
}

/// Number of directions sampled over the sphere by the gather pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatherSteps {
    /// Steps in zenith angle, over `[0, π]`
    pub zenith: usize,
    /// Steps in azimuth, over `[0, 2π)`
    pub azimuth: usize,
}

impl Default for GatherSteps {
    fn default() -> Self {
        Self {
            zenith: 8,
            azimuth: 16,
        }
    }
}

/// Everything a precomputation run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecomputeConfig {
    /// Physical parameters of the atmosphere
    pub atmosphere: AtmosphereParams,
    /// Resolution of the scattering tables
    pub resolution: LutResolution,
    /// Resolution of the optical depth table
    pub optical_depth_resolution: PlanarResolution,
    /// Number of steps along every integrated ray
    pub integration_steps: usize,
    /// Sphere sampling used to gather in-scattered light
    pub gather_steps: GatherSteps,
    /// Highest scattering order; 1 means single scattering only
    pub max_scattering_order: u32,
    /// Worker threads, or `None` to pick automatically
    pub num_threads: Option<usize>,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            atmosphere: AtmosphereParams::default(),
            resolution: LutResolution::default(),
            optical_depth_resolution: PlanarResolution::default(),
            integration_steps: 512,
            gather_steps: GatherSteps::default(),
            max_scattering_order: 6,
            num_threads: None,
        }
    }
}

impl PrecomputeConfig {
    /// Parse a RON document and validate it. Missing fields take their
    /// default value.
    pub fn from_ron(text: &str) -> Result<Self, PrecomputeError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the whole configuration. Nothing is computed for a
    /// configuration that fails this.
    pub fn validate(&self) -> Result<(), PrecomputeError> {
        self.atmosphere.validate()?;

        let check = |axis: &'static str, value: usize, minimum: usize| {
            if value < minimum {
                Err(PrecomputeError::InvalidResolution {
                    axis,
                    value,
                    minimum,
                })
            } else {
                Ok(())
            }
        };
        check("height", self.resolution.height, 2)?;
        // At least two texels on each side of the horizon
        check("view zenith", self.resolution.view, 4)?;
        check("light zenith", self.resolution.light, 2)?;
        check("optical depth height", self.optical_depth_resolution.height, 2)?;
        check("optical depth light zenith", self.optical_depth_resolution.light, 2)?;

        if self.integration_steps == 0 {
            return Err(PrecomputeError::InvalidStepCount("integration"));
        }
        if self.gather_steps.zenith == 0 || self.gather_steps.azimuth == 0 {
            return Err(PrecomputeError::InvalidStepCount("gather"));
        }
        if self.max_scattering_order == 0 {
            return Err(PrecomputeError::InvalidScatteringOrder(
                self.max_scattering_order,
            ));
        }

        Ok(())
    }
}

/// Which function models the angular distribution of Mie scattering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MiePhaseModel {
    /// Cornette-Shanks approximation
    #[default]
    CornetteShanks,
    /// Henyey-Greenstein approximation
    HenyeyGreenstein,
}

/// Parameters only applied when sampling the tables, never baked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeParams {
    /// Mie asymmetry factor `g`, in `[0, 1)`
    pub mie_asymmetry: f32,
    /// Mie phase function
    pub mie_phase: MiePhaseModel,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            mie_asymmetry: 0.76,
            mie_phase: MiePhaseModel::CornetteShanks,
        }
    }
}

impl RuntimeParams {
    /// Check the asymmetry factor.
    pub fn validate(&self) -> Result<(), PrecomputeError> {
        if (0.0..1.0).contains(&self.mie_asymmetry) {
            Ok(())
        } else {
            Err(PrecomputeError::InvalidMieAsymmetry(self.mie_asymmetry))
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn earth_rayleigh_coefficients() {
        let beta = rayleigh_scattering_coefficients() * 1e6;
        assert_relative_eq!(beta.x, 5.8, max_relative = 0.01);
        assert_relative_eq!(beta.y, 13.6, max_relative = 0.01);
        assert_relative_eq!(beta.z, 33.1, max_relative = 0.01);
    }

    #[test]
    fn default_is_valid() {
        PrecomputeConfig::default().validate().unwrap();
        RuntimeParams::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = PrecomputeConfig::default();
        config.resolution.view = 2;
        assert!(matches!(
            config.validate(),
            Err(PrecomputeError::InvalidResolution { minimum: 4, .. })
        ));

        let mut config = PrecomputeConfig::default();
        config.resolution.height = 0;
        assert!(config.validate().is_err());

        let mut config = PrecomputeConfig::default();
        config.atmosphere.mie_scale_height = 0.0;
        assert!(matches!(
            config.validate(),
            Err(PrecomputeError::InvalidScaleHeight { medium: "Mie", .. })
        ));

        let mut config = PrecomputeConfig::default();
        config.atmosphere.mie_absorption = -1.0;
        assert!(config.validate().is_err());

        let mut config = PrecomputeConfig::default();
        config.max_scattering_order = 0;
        assert!(matches!(
            config.validate(),
            Err(PrecomputeError::InvalidScatteringOrder(0))
        ));

        let mut config = PrecomputeConfig::default();
        config.atmosphere.rayleigh_scattering = Vec3::new(0.0, 1.0, 1.0);
        assert!(config.validate().is_err());

        let runtime = RuntimeParams {
            mie_asymmetry: 1.0,
            ..Default::default()
        };
        assert!(runtime.validate().is_err());
    }

    #[test]
    fn partial_ron_document() {
        let config = PrecomputeConfig::from_ron(
            "(max_scattering_order: 3, resolution: (height: 4, view: 16, light: 8))",
        )
        .unwrap();
        assert_eq!(config.max_scattering_order, 3);
        assert_eq!(config.resolution.shape(), (4, 16, 8));
        assert_eq!(config.integration_steps, 512);
        assert_eq!(config.atmosphere, AtmosphereParams::default());
    }

    #[test]
    fn ron_document_is_validated() {
        let result = PrecomputeConfig::from_ron("(integration_steps: 0)");
        assert!(matches!(
            result,
            Err(PrecomputeError::InvalidStepCount("integration"))
        ));

        let result = PrecomputeConfig::from_ron("(integration_steps: ");
        assert!(matches!(result, Err(PrecomputeError::Parse(_))));
    }

    #[test]
    fn density_falls_off_with_height() {
        let atmosphere = AtmosphereParams::default();
        let ground = atmosphere.density(0.0);
        assert_relative_eq!(ground.x, 1.0);
        assert_relative_eq!(ground.y, 1.0);

        let high = atmosphere.density(atmosphere.rayleigh_scale_height);
        assert_relative_eq!(high.x, std::f32::consts::E.recip(), max_relative = 1e-6);
        assert!(high.y < high.x);
    }
}
