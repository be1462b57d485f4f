//! Ray and sphere geometry.
//!
//! Positions here are relative to the planet center, with +Y as the zenith of
//! the point a table cell describes.

use glam::Vec3;

use crate::lut::clamp_cos;

/// Near and far distances along a ray to the surface of a sphere.
///
/// `near` is negative when the ray starts inside the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    /// Distance to the first crossing
    pub near: f32,
    /// Distance to the second crossing
    pub far: f32,
}

/// Intersections of one ray with two concentric spheres. `None` means the
/// sphere is missed: the ray's line doesn't touch it, or both crossings are
/// behind the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleSphereHit {
    /// Crossings of the first (inner) sphere
    pub inner: Option<Span>,
    /// Crossings of the second (outer) sphere
    pub outer: Option<Span>,
}

impl DoubleSphereHit {
    /// Whether the ray misses both spheres.
    pub fn is_miss(&self) -> bool {
        self.inner.is_none() && self.outer.is_none()
    }
}

/// Intersect a ray with two spheres centered at the origin.
///
/// `radii` are the radii of the inner and outer sphere. `direction` doesn't
/// need to be normalized; distances are in units of its length.
pub fn intersect_double_sphere(origin: Vec3, direction: Vec3, radii: [f32; 2]) -> DoubleSphereHit {
    let a = direction.dot(direction);
    let b = 2.0 * origin.dot(direction);
    let origin_sq = origin.dot(origin);

    let [inner, outer] = radii.map(|radius| {
        let c = origin_sq - radius * radius;
        let d = b * b - 4.0 * a * c;
        if d < 0.0 || a <= 0.0 {
            return None;
        }

        let d = d.sqrt();
        let span = Span {
            near: (-b - d) / (2.0 * a),
            far: (-b + d) / (2.0 * a),
        };
        (span.far >= 0.0).then_some(span)
    });

    DoubleSphereHit { inner, outer }
}

/// Unit view direction for a view zenith cosine, in the XY plane.
pub fn view_direction(cos_view_zenith: f32) -> Vec3 {
    let cos = clamp_cos(cos_view_zenith);
    Vec3::new(f32::sqrt((1.0 - cos * cos).max(0.0)), cos, 0.0)
}

/// Unit light direction for a light zenith cosine.
///
/// The tables have no azimuth axis, so the light is placed in the vertical
/// plane of the view direction, on the same side.
pub fn light_direction(cos_light_zenith: f32) -> Vec3 {
    view_direction(cos_light_zenith)
}

/// Position of a point `height` km above the ground, straight up (+Y) from
/// the planet center.
pub fn zenith_position(height: f32, planet_radius: f32) -> Vec3 {
    Vec3::new(0.0, planet_radius + height, 0.0)
}

/// Where a ray starting inside the atmosphere stops: at the ground if it hits
/// it, otherwise where it leaves the top of the atmosphere.
pub fn ray_end(origin: Vec3, direction: Vec3, planet_radius: f32, top_radius: f32) -> Vec3 {
    let hit = intersect_double_sphere(origin, direction, [planet_radius, top_radius]);
    let length = match (hit.inner, hit.outer) {
        (Some(ground), _) if ground.near > 0.0 => ground.near,
        (_, Some(top)) => top.far.max(0.0),
        _ => 0.0,
    };
    origin + direction * length
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const RADII: [f32; 2] = [6360.0, 6620.0];

    #[test]
    fn outside_and_looking_away_misses() {
        let hit = intersect_double_sphere(Vec3::new(0.0, 7000.0, 0.0), Vec3::Y, RADII);
        assert!(hit.is_miss());
        assert_eq!(hit.inner, None);
        assert_eq!(hit.outer, None);

        let hit = intersect_double_sphere(Vec3::new(9000.0, 0.0, 0.0), Vec3::Y, RADII);
        assert!(hit.is_miss());
    }

    #[test]
    fn outside_and_looking_at_the_planet() {
        let hit = intersect_double_sphere(Vec3::new(0.0, 7000.0, 0.0), -Vec3::Y, RADII);
        let ground = hit.inner.unwrap();
        let top = hit.outer.unwrap();
        assert_abs_diff_eq!(ground.near, 640.0, epsilon = 1e-2);
        assert_abs_diff_eq!(ground.far, 13360.0, epsilon = 1e-2);
        assert_abs_diff_eq!(top.near, 380.0, epsilon = 1e-2);
        assert_abs_diff_eq!(top.far, 13620.0, epsilon = 1e-2);
    }

    #[test]
    fn inside_the_atmosphere() {
        let origin = zenith_position(1.0, RADII[0]);

        let hit = intersect_double_sphere(origin, Vec3::Y, RADII);
        let top = hit.outer.unwrap();
        assert!(top.near < 0.0);
        assert_abs_diff_eq!(top.far, 259.0, epsilon = 1e-2);
        assert!(hit.inner.is_none());

        let end = ray_end(origin, Vec3::Y, RADII[0], RADII[1]);
        assert_abs_diff_eq!(end.y, RADII[1], epsilon = 1e-2);

        let end = ray_end(origin, -Vec3::Y, RADII[0], RADII[1]);
        assert_abs_diff_eq!(end.y, RADII[0], epsilon = 1e-2);
    }

    #[test]
    fn directions_are_unit_length() {
        for cos in [-1.0, -0.3, 0.0, 0.7, 1.0, 5.0] {
            assert_abs_diff_eq!(view_direction(cos).length(), 1.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(light_direction(0.5).y, 0.5);
    }
}
