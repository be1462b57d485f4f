use approx::{assert_abs_diff_eq, assert_relative_eq};
use glam::{Vec2, Vec3, Vec4};

use super::*;
use crate::{
    backend::{RayonBackend, SerialBackend},
    config::GatherSteps,
    geometry::{light_direction, zenith_position},
    lut::from_optical_depth_coord,
    phase::unpack_mie_inscatter,
};

/// Earth, at a resolution small enough for tests.
fn small_config(max_scattering_order: u32) -> PrecomputeConfig {
    PrecomputeConfig {
        resolution: LutResolution {
            height: 4,
            view: 16,
            light: 8,
        },
        optical_depth_resolution: PlanarResolution {
            height: 32,
            light: 32,
        },
        integration_steps: 32,
        gather_steps: GatherSteps {
            zenith: 4,
            azimuth: 8,
        },
        max_scattering_order,
        num_threads: Some(2),
        ..Default::default()
    }
}

fn all_non_negative(table: &Table3) -> bool {
    table.data().iter().flatten().all(|&x| x >= 0.0)
}

#[test]
fn optical_depth_decreases_with_height() {
    let atmosphere = AtmosphereParams::default();

    let mut previous = Vec2::splat(f32::INFINITY);
    for height in [0.0, 0.5, 1.0, 5.0, 20.0, 100.0, 250.0] {
        let origin = zenith_position(height, atmosphere.planet_radius);
        let depth = optical_depth_along_ray(&atmosphere, origin, Vec3::Y, 256);
        assert!(depth.x < previous.x, "{height}: {depth} >= {previous}");
        assert!(depth.y < previous.y, "{height}: {depth} >= {previous}");
        previous = depth;
    }

    // Straight up from the ground, the Rayleigh optical depth is about one
    // scale height
    let depth = optical_depth_along_ray(
        &atmosphere,
        zenith_position(0.0, atmosphere.planet_radius),
        Vec3::Y,
        4096,
    );
    assert_relative_eq!(depth.x, atmosphere.rayleigh_scale_height, max_relative = 0.01);
}

#[test]
fn optical_depth_towards_the_ground_is_occluded() {
    let atmosphere = AtmosphereParams::default();
    let origin = zenith_position(10.0, atmosphere.planet_radius);
    let depth = optical_depth_along_ray(&atmosphere, origin, -Vec3::Y, 64);
    assert_eq!(depth, Vec2::splat(OCCLUDED_OPTICAL_DEPTH));
    assert_eq!(atmosphere.transmittance(depth), Vec3::ZERO);
}

#[test]
fn optical_depth_table_holds_ray_integrals() {
    let config = small_config(1);
    let tables = precompute(&config, &SerialBackend).unwrap();
    let atmosphere = &config.atmosphere;
    let table = tables.optical_depth();
    assert_eq!(table.shape(), &[32, 32]);

    for (i, j) in [(0, 31), (5, 20), (31, 16), (10, 2)] {
        let center = Vec2::new((i as f32 + 0.5) / 32.0, (j as f32 + 0.5) / 32.0);
        let (height, cos) = from_optical_depth_coord(center, atmosphere);
        let expected = optical_depth_along_ray(
            atmosphere,
            zenith_position(height, atmosphere.planet_radius),
            light_direction(cos),
            config.integration_steps,
        );
        let value = table.get((i, j));
        assert_relative_eq!(value.x, expected.x, max_relative = 1e-6);
        assert_relative_eq!(value.y, expected.y, max_relative = 1e-6);
    }
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let mut config = small_config(2);
    config.integration_steps = 0;
    assert!(matches!(
        precompute(&config, &SerialBackend),
        Err(PrecomputeError::InvalidStepCount("integration"))
    ));

    let mut config = small_config(2);
    config.atmosphere.planet_radius = f32::NAN;
    assert!(precompute(&config, &SerialBackend).is_err());
}

#[test]
fn earth_sky_at_noon_and_at_night() {
    let config = small_config(4);
    let backend = RayonBackend::new(config.num_threads).unwrap();
    let tables = precompute(&config, &backend).unwrap();

    for id in tables.ids() {
        match tables.get(id).unwrap() {
            TableRef::Planar(table) => assert!(table.is_finite(), "{id}"),
            TableRef::Volume(table) => {
                assert!(table.is_finite(), "{id}");
                assert!(all_non_negative(table), "{id}");
            }
        }
    }

    // Second height cell (about 29 km), looking straight down
    let down = config.resolution.view / 2 - 1;
    let last_light = config.resolution.light - 1;
    let day = tables.total().rayleigh.get((1, down, last_light));
    let night = tables.total().rayleigh.get((1, down, 0));
    assert!(day.truncate().min_element() > 0.0, "{day}");
    // Rayleigh scattering is strongest in blue
    assert!(day.z > day.x);
    for channel in 0..3 {
        assert!(night[channel] < 1e-3 * day[channel], "{night} vs {day}");
    }

    // Looking up from low in the atmosphere, air outshines aerosols
    let last_view = config.resolution.view - 1;
    let rayleigh = tables.total().rayleigh.get((0, last_view, last_light));
    let mie = tables.total().mie.get((0, last_view, last_light));
    assert!(rayleigh.z > mie.z, "{rayleigh} vs {mie}");

    // Higher orders add light
    let single = tables
        .scattering(1)
        .unwrap()
        .rayleigh
        .get((1, down, last_light));
    assert!(day.z > single.z);
}

#[test]
fn sunlight_table() {
    let config = small_config(1);
    let tables = precompute(&config, &SerialBackend).unwrap();
    let sunlight = tables.sunlight();
    assert_eq!(sunlight.shape(), &[4, 8]);

    // Top of the atmosphere, sun overhead
    let top = sunlight.get((3, 7));
    for channel in 0..3 {
        assert!(top[channel] > 0.9, "{top}");
        assert!(top[channel] <= 1.0, "{top}");
    }
    // At the ground with the sun below the horizon
    assert_eq!(sunlight.get((0, 0)), Vec4::ZERO);
    // Blue is attenuated the most
    let ground = sunlight.get((0, 7));
    assert!(ground.z < ground.x);
}

#[test]
fn single_scattering_only_skips_higher_orders() {
    let config = small_config(1);
    let tables = precompute(&config, &SerialBackend).unwrap();

    assert!(tables.scattering(2).is_none());
    assert!(tables.get(TableId::Gather(Channel::Rayleigh)).is_none());
    assert_eq!(tables.ids().len(), 10);

    let zero = InscatterTables::new(config.resolution);
    assert_eq!(tables.accumulated(), &zero);
    assert_eq!(tables.total(), tables.scattering(1).unwrap());
}

#[test]
fn orders_are_accumulated_once() {
    let three = precompute(&small_config(3), &SerialBackend).unwrap();
    let four = precompute(&small_config(4), &SerialBackend).unwrap();

    // Raising the maximum order doesn't change the lower orders
    for order in 1..=3 {
        assert_eq!(three.scattering(order), four.scattering(order), "order {order}");
    }
    assert!(three.scattering(4).is_none());
    assert!(four.scattering(4).is_some());

    // Accumulated holds orders 2 and 3, each added exactly once
    let mut expected = InscatterTables::new(three.config().resolution);
    for order in 2..=3 {
        let scattering = four.scattering(order).unwrap();
        multiple::accumulate(scattering, &mut expected, &SerialBackend);
    }
    assert_eq!(three.accumulated(), &expected);

    let sum = |table: &Table3| -> f32 { table.data().iter().map(|texel| texel[2]).sum() };
    let manual: f32 = (2..=3)
        .map(|order| sum(&four.scattering(order).unwrap().rayleigh))
        .sum();
    assert_relative_eq!(
        sum(&three.accumulated().rayleigh),
        manual,
        max_relative = 1e-4
    );
}

#[test]
fn backends_produce_identical_tables() {
    let config = small_config(2);
    let serial = precompute(&config, &SerialBackend).unwrap();
    let parallel = precompute(&config, &RayonBackend::new(Some(3)).unwrap()).unwrap();

    assert_eq!(serial.packed(), parallel.packed());
    assert_eq!(serial.transmittance(), parallel.transmittance());
    assert_eq!(serial.total(), parallel.total());
}

#[test]
fn packed_table_matches_separated_total() {
    let config = small_config(2);
    let tables = precompute(&config, &SerialBackend).unwrap();
    let beta_r = config.atmosphere.rayleigh_scattering;

    let total = tables.total();
    for ((cell, packed), rayleigh) in tables
        .packed()
        .data()
        .indexed_iter()
        .zip(total.rayleigh.data())
    {
        assert_eq!(packed[..3], rayleigh[..3]);
        let mie = total.mie.get(cell);
        assert_eq!(packed[3], mie.x);

        if rayleigh[0] > 1e-6 {
            let unpacked = unpack_mie_inscatter(Vec4::from_array(*packed), beta_r);
            assert_relative_eq!(unpacked.x, mie.x, max_relative = 1e-5);
            assert!(unpacked.is_finite());
        }
    }
}

#[test]
fn transmittance_along_view_rays() {
    let config = small_config(1);
    let tables = precompute(&config, &SerialBackend).unwrap();
    let transmittance = tables.transmittance();

    for texel in transmittance.data() {
        for &channel in &texel[..3] {
            assert!((0.0..=1.0).contains(&channel));
        }
    }

    // From the top looking up, there is almost nothing in the way
    let up = transmittance.get((3, 15, 0));
    assert_abs_diff_eq!(up.x, 1.0, epsilon = 1e-3);
    // Grazing the horizon, there is a lot
    let horizon = transmittance.get((1, 8, 0));
    assert!(horizon.z < 0.5 * up.z);
}

#[test]
fn table_names() {
    assert_eq!(TableId::OpticalDepth.to_string(), "optical-depth");
    assert_eq!(
        TableId::Scattering {
            order: 3,
            channel: Channel::Mie
        }
        .to_string(),
        "scattering/3/mie"
    );
    assert_eq!(TableId::Total(Channel::Rayleigh).to_string(), "total/rayleigh");

    let tables = precompute(&small_config(3), &SerialBackend).unwrap();
    let ids = tables.ids();
    assert_eq!(ids.len(), 3 + 3 * 2 + 2 + 2 + 2 + 1);
    for id in ids {
        assert!(tables.get(id).is_some(), "{id}");
    }
    assert!(tables
        .get(TableId::Scattering {
            order: 0,
            channel: Channel::Rayleigh
        })
        .is_none());
}
