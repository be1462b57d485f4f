//! Precomputed atmospheric scattering
//!
//! Builds the lookup tables a renderer needs to draw skies and aerial
//! perspective: optical depth, single and multiple Rayleigh/Mie scattering,
//! and sunlight transmittance. The tables are filled by a chain of
//! data-parallel passes ([`precompute`]) and read back with the same
//! parametrization a renderer uses ([`Sampler`]).
//!
//! ```no_run
//! use precomputed_sky::{precompute_parallel, Lookup, PrecomputeConfig, RuntimeParams, Sampler};
//! use glam::Vec3;
//!
//! let tables = precompute_parallel(&PrecomputeConfig::default())?;
//! let sampler = Sampler::new(&tables, RuntimeParams::default())?;
//! let sky = sampler.radiance(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 0.5, 0.8), Lookup::Packed);
//! # Ok::<(), precomputed_sky::PrecomputeError>(())
//! ```
//!
//! With the `python` feature this crate is also a Python extension module.

pub mod backend;
pub mod config;
mod error;
pub mod geometry;
pub mod lut;
pub mod phase;
pub mod precompute;
mod sampler;
pub mod table;

#[cfg(feature = "python")]
mod python;

pub use backend::{BlendMode, ComputeBackend, RayonBackend, SerialBackend};
pub use config::{
    AtmosphereParams, LutResolution, MiePhaseModel, Planet, PrecomputeConfig, RuntimeParams,
};
pub use error::PrecomputeError;
pub use precompute::{
    precompute, precompute_parallel, Channel, InscatterTables, PrecomputedTables, TableId,
    TableRef,
};
pub use sampler::{Atmosphere, Inscatter, Lookup, Sampler};
