//! Runtime access to the tables: what a renderer does every frame, on the CPU.
//!
//! World positions put the planet center at `(0, -planet_radius, 0)`, so the
//! origin is on the ground and +Y points up there.

use std::sync::{Arc, PoisonError, RwLock};

use glam::Vec3;
use log::info;

use crate::{
    config::{PrecomputeConfig, RuntimeParams},
    error::PrecomputeError,
    lut::{to_sunlight_coord, WorldState},
    phase::{mie_phase, rayleigh_phase, unpack_mie_inscatter},
    precompute::{precompute_parallel, PrecomputedTables},
};

/// Which inscatter tables a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lookup {
    /// One packed table, with Mie reconstructed from its red channel
    #[default]
    Packed,
    /// Separate Rayleigh and Mie tables
    Separated,
}

/// Inscattered light before the phase functions are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inscatter {
    /// Rayleigh part
    pub rayleigh: Vec3,
    /// Mie part
    pub mie: Vec3,
}

/// Reads one set of tables with fixed runtime parameters.
#[derive(Debug, Clone, Copy)]
pub struct Sampler<'a> {
    tables: &'a PrecomputedTables,
    runtime: RuntimeParams,
}

impl<'a> Sampler<'a> {
    /// Validates the runtime parameters.
    pub fn new(
        tables: &'a PrecomputedTables,
        runtime: RuntimeParams,
    ) -> Result<Self, PrecomputeError> {
        runtime.validate()?;
        Ok(Self { tables, runtime })
    }

    /// Center of the planet in world space.
    pub fn planet_center(&self) -> Vec3 {
        Vec3::new(0.0, -self.tables.atmosphere().planet_radius, 0.0)
    }

    /// Height and zenith angles at a world position. Directions don't need
    /// to be normalized.
    pub fn world_state(&self, position: Vec3, view: Vec3, light: Vec3) -> WorldState {
        let offset = position - self.planet_center();
        let up = offset.normalize_or_zero();

        WorldState {
            height: offset.length() - self.tables.atmosphere().planet_radius,
            cos_view_zenith: up.dot(view.normalize_or_zero()),
            cos_light_zenith: up.dot(light.normalize_or_zero()),
        }
    }

    /// Light scattered towards `position` along `view`, without phase.
    pub fn inscatter(&self, position: Vec3, view: Vec3, light: Vec3, lookup: Lookup) -> Inscatter {
        let coord = self
            .tables
            .parametrization()
            .world_to_lut(self.world_state(position, view, light));

        match lookup {
            Lookup::Packed => {
                let packed = self.tables.packed().sample(coord);
                Inscatter {
                    rayleigh: packed.truncate(),
                    mie: unpack_mie_inscatter(packed, self.tables.atmosphere().rayleigh_scattering),
                }
            }
            Lookup::Separated => Inscatter {
                rayleigh: self.tables.total().rayleigh.sample(coord).truncate(),
                mie: self.tables.total().mie.sample(coord).truncate(),
            },
        }
    }

    /// Light scattered towards `position` along `view`, per unit of sunlight.
    pub fn radiance(&self, position: Vec3, view: Vec3, light: Vec3, lookup: Lookup) -> Vec3 {
        let inscatter = self.inscatter(position, view, light, lookup);
        let mu = view.normalize_or_zero().dot(light.normalize_or_zero());
        inscatter.rayleigh * rayleigh_phase(mu) + inscatter.mie * mie_phase(mu, &self.runtime)
    }

    /// Fraction of sunlight reaching `position` from direction `light`.
    pub fn sunlight(&self, position: Vec3, light: Vec3) -> Vec3 {
        let state = self.world_state(position, Vec3::Y, light);
        let coord = to_sunlight_coord(
            state.height,
            state.cos_light_zenith,
            self.tables.atmosphere(),
            self.tables.sunlight_resolution(),
        );
        self.tables.sunlight().sample(coord).truncate()
    }
}

/// The current set of tables, replaced as a whole when regenerated.
///
/// Readers take a snapshot and keep using it for as long as they like; a
/// regeneration never modifies tables that have been handed out.
#[derive(Debug)]
pub struct Atmosphere {
    current: RwLock<Arc<PrecomputedTables>>,
}

impl Atmosphere {
    /// Compute the first set of tables.
    pub fn new(config: &PrecomputeConfig) -> Result<Self, PrecomputeError> {
        let tables = precompute_parallel(config)?;
        Ok(Self {
            current: RwLock::new(Arc::new(tables)),
        })
    }

    /// The current tables.
    pub fn snapshot(&self) -> Arc<PrecomputedTables> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Compute a new set of tables and make it current.
    ///
    /// On error, the current tables stay in place.
    pub fn regenerate(
        &self,
        config: &PrecomputeConfig,
    ) -> Result<Arc<PrecomputedTables>, PrecomputeError> {
        let tables = Arc::new(precompute_parallel(config)?);

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::clone(&tables);
        info!("Swapped in new scattering tables");
        Ok(tables)
    }
}
