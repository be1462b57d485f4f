//! The precomputation pipeline.
//!
//! Passes run strictly in order, each one reading only tables that earlier
//! passes have completely written:
//!
//! 1. optical depth (2D)
//! 2. single scattering, with the view-ray transmittance
//! 3. for every order from 2 up to the maximum: gather, integrate, accumulate
//! 4. total (separated and packed) inscatter, and the sunlight table
//!
//! Inscatter tables never contain the phase function; it is applied when
//! sampling. Orders above 1 are stored divided by the phase of the view/light
//! angle of their cell, so that the same rule holds for every order.

mod compose;
mod multiple;
mod optical_depth;
mod single;

#[cfg(test)]
mod tests;

pub use optical_depth::{optical_depth_along_ray, OCCLUDED_OPTICAL_DEPTH};

use std::time::Instant;

use glam::{Vec2, Vec3};
use log::{debug, info};

use crate::{
    backend::{ComputeBackend, RayonBackend},
    config::{AtmosphereParams, LutResolution, PlanarResolution, PrecomputeConfig},
    error::PrecomputeError,
    lut::Parametrization,
    table::{Table2, Table3, Texel},
};

/// Rayleigh and Mie inscatter of one scattering order (or a sum of orders).
#[derive(Debug, Clone, PartialEq)]
pub struct InscatterTables {
    /// Rayleigh inscatter, RGB
    pub rayleigh: Table3,
    /// Mie inscatter, RGB
    pub mie: Table3,
}

impl InscatterTables {
    /// Zero-filled tables.
    pub fn new(resolution: LutResolution) -> Self {
        Self {
            rayleigh: Table3::new(resolution),
            mie: Table3::new(resolution),
        }
    }

    /// One of the two tables.
    pub fn channel(&self, channel: Channel) -> &Table3 {
        match channel {
            Channel::Rayleigh => &self.rayleigh,
            Channel::Mie => &self.mie,
        }
    }
}

/// The scattering medium a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Air molecules
    Rayleigh,
    /// Aerosols
    Mie,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Rayleigh => write!(f, "rayleigh"),
            Channel::Mie => write!(f, "mie"),
        }
    }
}

/// Stable name of a precomputed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableId {
    /// (Rayleigh, Mie) density-weighted path length to the top of the atmosphere
    OpticalDepth,
    /// Transmittance along the view ray of every scattering cell
    Transmittance,
    /// Transmittance to the sun
    Sunlight,
    /// Inscatter of exactly one order; order 1 is single scattering
    Scattering {
        /// Scattering order, starting at 1
        order: u32,
        /// Medium
        channel: Channel,
    },
    /// Light gathered for the highest order
    Gather(Channel),
    /// Sum of orders 2 and above
    Accumulated(Channel),
    /// Sum of all orders
    Total(Channel),
    /// Sum of all orders, Rayleigh RGB with Mie red in alpha
    Packed,
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableId::OpticalDepth => write!(f, "optical-depth"),
            TableId::Transmittance => write!(f, "transmittance"),
            TableId::Sunlight => write!(f, "sunlight"),
            TableId::Scattering { order, channel } => write!(f, "scattering/{order}/{channel}"),
            TableId::Gather(channel) => write!(f, "gather/{channel}"),
            TableId::Accumulated(channel) => write!(f, "accumulated/{channel}"),
            TableId::Total(channel) => write!(f, "total/{channel}"),
            TableId::Packed => write!(f, "packed"),
        }
    }
}

impl TableId {
    /// Number of meaningful channels in the table's texels.
    pub fn channels(&self) -> usize {
        match self {
            TableId::OpticalDepth => 2,
            TableId::Packed => 4,
            _ => 3,
        }
    }
}

/// Borrowed table of either dimensionality.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    /// A (height, light zenith) table
    Planar(&'a Table2),
    /// A (height, view zenith, light zenith) table
    Volume(&'a Table3),
}

/// Everything one precomputation run produces.
#[derive(Debug, Clone)]
pub struct PrecomputedTables {
    config: PrecomputeConfig,
    optical_depth: Table2,
    transmittance: Table3,
    single: InscatterTables,
    /// Orders 2, 3, ... in sequence
    orders: Vec<InscatterTables>,
    gather: Option<InscatterTables>,
    accumulated: InscatterTables,
    total: InscatterTables,
    packed: Table3,
    sunlight: Table2,
}

impl PrecomputedTables {
    /// Configuration the tables were computed with.
    pub fn config(&self) -> &PrecomputeConfig {
        &self.config
    }

    /// Atmosphere the tables were computed for.
    pub fn atmosphere(&self) -> &AtmosphereParams {
        &self.config.atmosphere
    }

    /// Parametrization used to address the scattering tables.
    pub fn parametrization(&self) -> Parametrization<'_> {
        Parametrization::new(&self.config.atmosphere, self.config.resolution)
    }

    /// Resolution of the sunlight table.
    pub fn sunlight_resolution(&self) -> PlanarResolution {
        sunlight_resolution(&self.config)
    }

    /// Optical depth table.
    pub fn optical_depth(&self) -> &Table2 {
        &self.optical_depth
    }

    /// View-ray transmittance table.
    pub fn transmittance(&self) -> &Table3 {
        &self.transmittance
    }

    /// Sunlight transmittance table.
    pub fn sunlight(&self) -> &Table2 {
        &self.sunlight
    }

    /// Inscatter of exactly one scattering order, if it was computed.
    pub fn scattering(&self, order: u32) -> Option<&InscatterTables> {
        match order {
            0 => None,
            1 => Some(&self.single),
            _ => self.orders.get(order as usize - 2),
        }
    }

    /// Sum of orders 2 and above (zero with single scattering only).
    pub fn accumulated(&self) -> &InscatterTables {
        &self.accumulated
    }

    /// Sum of all orders, Rayleigh and Mie separated.
    pub fn total(&self) -> &InscatterTables {
        &self.total
    }

    /// Sum of all orders, packed into one table.
    pub fn packed(&self) -> &Table3 {
        &self.packed
    }

    /// Look up a table by name.
    pub fn get(&self, id: TableId) -> Option<TableRef<'_>> {
        let table = match id {
            TableId::OpticalDepth => return Some(TableRef::Planar(&self.optical_depth)),
            TableId::Sunlight => return Some(TableRef::Planar(&self.sunlight)),
            TableId::Transmittance => &self.transmittance,
            TableId::Scattering { order, channel } => self.scattering(order)?.channel(channel),
            TableId::Gather(channel) => self.gather.as_ref()?.channel(channel),
            TableId::Accumulated(channel) => self.accumulated.channel(channel),
            TableId::Total(channel) => self.total.channel(channel),
            TableId::Packed => &self.packed,
        };
        Some(TableRef::Volume(table))
    }

    /// Names of all tables of this run.
    pub fn ids(&self) -> Vec<TableId> {
        let channels = [Channel::Rayleigh, Channel::Mie];
        let mut ids = vec![
            TableId::OpticalDepth,
            TableId::Transmittance,
            TableId::Sunlight,
        ];
        for order in 1..=self.orders.len() as u32 + 1 {
            ids.extend(channels.map(|channel| TableId::Scattering { order, channel }));
        }
        if self.gather.is_some() {
            ids.extend(channels.map(TableId::Gather));
        }
        ids.extend(channels.map(TableId::Accumulated));
        ids.extend(channels.map(TableId::Total));
        ids.push(TableId::Packed);
        ids
    }
}

/// The sunlight table shares the height and light axes of the scattering
/// tables.
fn sunlight_resolution(config: &PrecomputeConfig) -> PlanarResolution {
    PlanarResolution {
        height: config.resolution.height,
        light: config.resolution.light,
    }
}

/// What every pass needs to know.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassContext<'a> {
    pub(crate) config: &'a PrecomputeConfig,
    pub(crate) atmosphere: &'a AtmosphereParams,
    pub(crate) param: Parametrization<'a>,
}

impl<'a> PassContext<'a> {
    fn new(config: &'a PrecomputeConfig) -> Self {
        Self {
            config,
            atmosphere: &config.atmosphere,
            param: Parametrization::new(&config.atmosphere, config.resolution),
        }
    }
}

/// Result of marching one view ray.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RayMarch {
    pub(crate) rayleigh: Vec3,
    pub(crate) mie: Vec3,
    pub(crate) transmittance: Vec3,
}

/// March from `start` to `end` in `steps` equal steps, accumulating
/// in-scattered light.
///
/// At every sample, `source(position, height)` gives the (Rayleigh, Mie) light
/// arriving at the sample to be scattered towards `start`. It's weighted by
/// the local density and the transmittance back to `start`. Positions are
/// relative to the planet center.
pub(crate) fn march_view_ray(
    atmosphere: &AtmosphereParams,
    start: Vec3,
    end: Vec3,
    steps: usize,
    mut source: impl FnMut(Vec3, f32) -> (Vec3, Vec3),
) -> RayMarch {
    let dr = (end - start) / steps as f32;
    let ds = dr.length();

    let mut optical_depth = Vec2::ZERO;
    let mut rayleigh = Vec3::ZERO;
    let mut mie = Vec3::ZERO;

    // Integrand: exp(-h(x)/H) * t(x -> start) * source(x)
    for i in 0..=steps {
        let position = start + dr * i as f32;
        let height = (position.length() - atmosphere.planet_radius).max(0.0);
        let density = atmosphere.density(height);
        let transmittance = atmosphere.transmittance(optical_depth);

        let (source_rayleigh, source_mie) = source(position, height);
        rayleigh += density.x * transmittance * source_rayleigh * ds;
        mie += density.y * transmittance * source_mie * ds;
        optical_depth += density * ds;
    }

    RayMarch {
        rayleigh: rayleigh * atmosphere.rayleigh_beta(),
        mie: mie * atmosphere.mie_beta(),
        transmittance: atmosphere.transmittance(optical_depth),
    }
}

/// Store an RGB value in a texel. Non-finite values become zero.
pub(crate) fn texel(value: Vec3) -> Texel {
    let value = if value.is_finite() { value } else { Vec3::ZERO };
    value.extend(0.0).to_array()
}

/// Run `pass`, logging how long it took.
fn timed<T>(name: &str, pass: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = pass();
    info!("{name} pass took {:.2?}", start.elapsed());
    result
}

/// Run the whole pipeline on a new rayon thread pool with
/// `config.num_threads` workers.
pub fn precompute_parallel(
    config: &PrecomputeConfig,
) -> Result<PrecomputedTables, PrecomputeError> {
    config.validate()?;
    let backend = RayonBackend::new(config.num_threads)?;
    debug!("Using {} worker threads", backend.num_threads());
    precompute(config, &backend)
}

/// Run the whole pipeline.
///
/// The configuration is validated first; nothing is computed if it's
/// invalid.
pub fn precompute<B: ComputeBackend>(
    config: &PrecomputeConfig,
    backend: &B,
) -> Result<PrecomputedTables, PrecomputeError> {
    config.validate()?;

    let start = Instant::now();
    let ctx = PassContext::new(config);
    let resolution = config.resolution;
    info!(
        "Precomputing scattering tables of {}x{}x{} cells up to order {}",
        resolution.height, resolution.view, resolution.light, config.max_scattering_order
    );

    let optical_depth = timed("optical depth", || optical_depth::compute(&ctx, backend));
    let (single, transmittance) = timed("single scattering", || {
        single::compute(&ctx, &optical_depth, backend)
    });

    let mut orders: Vec<InscatterTables> = Vec::new();
    let mut gather = None;
    let mut accumulated = InscatterTables::new(resolution);
    for order in 2..=config.max_scattering_order {
        debug!("Computing scattering order {order}");
        let previous = orders.last().unwrap_or(&single);

        let gathered = timed("gather", || multiple::gather(&ctx, previous, backend));
        let scattered = timed("integrate", || multiple::integrate(&ctx, &gathered, backend));
        timed("accumulate", || {
            multiple::accumulate(&scattered, &mut accumulated, backend)
        });

        orders.push(scattered);
        gather = Some(gathered);
    }

    let total = timed("total", || compose::total(&ctx, &single, &accumulated, backend));
    let packed = timed("pack", || compose::packed(&ctx, &single, &accumulated, backend));
    let sunlight = timed("sunlight", || {
        compose::sunlight(&ctx, sunlight_resolution(config), &optical_depth, backend)
    });

    info!("Precomputation finished in {:.2?}", start.elapsed());

    Ok(PrecomputedTables {
        config: config.clone(),
        optical_depth,
        transmittance,
        single,
        orders,
        gather,
        accumulated,
        total,
        packed,
        sunlight,
    })
}
