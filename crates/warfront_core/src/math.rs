//! Fixed-point math utilities for deterministic simulation.
//!
//! All game simulation uses fixed-point arithmetic to ensure
//! deterministic behavior across platforms. Floating-point
//! operations can produce different results on different CPUs,
//! and transcendental functions differ between libm builds.
//!
//! Geographic positions use a planar approximation: a degree of latitude
//! is a constant number of kilometres and a degree of longitude shrinks
//! with the cosine of latitude. This is accurate enough for separations
//! below roughly a thousand kilometres.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);
/// π / 2.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_852);
/// π / 4.
pub const FRAC_PI_4: Fixed = Fixed::from_bits(3_373_259_426);
/// Degrees to radians factor.
pub const DEG_TO_RAD: Fixed = Fixed::from_bits(74_961_321);
/// Radians to degrees factor.
pub const RAD_TO_DEG: Fixed = Fixed::from_bits(246_083_499_208);
/// Kilometres per degree of latitude (110.574).
pub const KM_PER_DEG_LAT: Fixed = Fixed::from_bits(474_911_713_788);
/// Kilometres per degree of longitude at the equator (111.320).
pub const KM_PER_DEG_LNG: Fixed = Fixed::from_bits(478_115_759_391);

/// Build a fixed-point value from a ratio of integers.
///
/// Used instead of float literals so constants stay exact and
/// platform-independent.
#[must_use]
pub fn ratio(numerator: i32, denominator: i32) -> Fixed {
    Fixed::from_num(numerator) / Fixed::from_num(denominator)
}

/// Fixed-point 2D vector.
///
/// In the simulation this is a planar displacement in kilometres,
/// `x` pointing east and `y` pointing north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Vector rotated 90° counter-clockwise.
    #[must_use]
    pub fn perp_left(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Check whether both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Shorten the vector to `max_len` if it is longer.
    #[must_use]
    pub fn clamp_length(self, max_len: Fixed) -> Self {
        let len = self.length();
        if len <= max_len || len == Fixed::ZERO {
            self
        } else {
            self.scale(max_len / len)
        }
    }

    /// Compass bearing of this vector in degrees (0 = north, 90 = east).
    #[must_use]
    pub fn bearing_deg(self) -> Fixed {
        let deg = atan2_deg(self.x, self.y);
        if deg < Fixed::ZERO {
            deg + Fixed::from_num(360)
        } else {
            deg
        }
    }
}

/// Computes the square root of a fixed-point number.
///
/// Works on the raw bits with an integer Newton iteration, so the
/// result is exact to the last fractional bit and identical on every
/// platform.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    // sqrt(bits / 2^32) = sqrt(bits * 2^32) / 2^32
    let n = (value.to_bits() as u128) << 32;
    let mut x = 1u128 << ((128 - n.leading_zeros()).div_ceil(2));
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            break;
        }
        x = y;
    }

    Fixed::from_bits(x as i64)
}

/// Cosine of an angle given in degrees.
///
/// Range-reduces to [-90°, 90°] and evaluates a Taylor series in
/// Horner form; error is below 1e-6 across the range.
#[must_use]
pub fn cos_deg(deg: Fixed) -> Fixed {
    let full = Fixed::from_num(360);
    let half = Fixed::from_num(180);
    let quarter = Fixed::from_num(90);

    let mut d = deg % full;
    if d > half {
        d -= full;
    } else if d < -half {
        d += full;
    }

    let mut sign = Fixed::ONE;
    if d.abs() > quarter {
        d = half - d.abs();
        sign = -Fixed::ONE;
    }

    let x = d * DEG_TO_RAD;
    let x2 = x * x;
    let one = Fixed::ONE;
    let series = one
        - x2 / Fixed::from_num(2)
            * (one
                - x2 / Fixed::from_num(12)
                    * (one
                        - x2 / Fixed::from_num(30)
                            * (one - x2 / Fixed::from_num(56) * (one - x2 / Fixed::from_num(90)))));
    series * sign
}

/// Four-quadrant arctangent in degrees, in (-180°, 180°].
///
/// Uses the `z·π/4 + 0.273·z·(1 − z)` approximation on the first octant
/// (max error ≈ 0.2°), which is plenty for presentation headings.
#[must_use]
pub fn atan2_deg(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }

    let ax = x.abs();
    let ay = y.abs();
    let (z, swapped) = if ax >= ay {
        (ay / ax, false)
    } else {
        (ax / ay, true)
    };

    let mut angle = z * FRAC_PI_4 + ratio(273, 1000) * z * (Fixed::ONE - z);
    if swapped {
        angle = FRAC_PI_2 - angle;
    }
    if x < Fixed::ZERO {
        angle = PI - angle;
    }
    if y < Fixed::ZERO {
        angle = -angle;
    }

    angle * RAD_TO_DEG
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, north positive.
    #[serde(with = "fixed_serde")]
    pub lat: Fixed,
    /// Longitude in degrees, east positive.
    #[serde(with = "fixed_serde")]
    pub lng: Fixed,
}

impl GeoPoint {
    /// Create a point from fixed-point degrees.
    #[must_use]
    pub const fn new(lat: Fixed, lng: Fixed) -> Self {
        Self { lat, lng }
    }

    /// Create a point from micro-degrees (exact integer input).
    #[must_use]
    pub fn from_micro_degrees(lat: i32, lng: i32) -> Self {
        let scale = Fixed::from_num(1_000_000);
        Self::new(Fixed::from_num(lat) / scale, Fixed::from_num(lng) / scale)
    }

    /// Planar displacement from `self` to `other` in kilometres (east, north).
    #[must_use]
    pub fn delta_km(self, other: Self) -> Vec2Fixed {
        let mean_lat = (self.lat + other.lat) / Fixed::from_num(2);
        let east = (other.lng - self.lng) * KM_PER_DEG_LNG * cos_deg(mean_lat);
        let north = (other.lat - self.lat) * KM_PER_DEG_LAT;
        Vec2Fixed::new(east, north)
    }

    /// Planar distance in kilometres.
    #[must_use]
    pub fn distance_km(self, other: Self) -> Fixed {
        self.delta_km(other).length()
    }

    /// Check whether `other` lies within `radius_km`, without a square root.
    #[must_use]
    pub fn within_km(self, other: Self, radius_km: Fixed) -> bool {
        let delta = self.delta_km(other);
        delta.dot(delta) <= radius_km.saturating_mul(radius_km)
    }

    /// Move by a planar displacement in kilometres.
    #[must_use]
    pub fn offset_km(self, delta: Vec2Fixed) -> Self {
        let min_cos = ratio(1, 100);
        let lng_scale = KM_PER_DEG_LNG * cos_deg(self.lat).max(min_cos);
        Self::new(
            self.lat + delta.y / KM_PER_DEG_LAT,
            self.lng + delta.x / lng_scale,
        )
    }

    /// Compass bearing towards `other` in degrees.
    #[must_use]
    pub fn bearing_to(self, other: Self) -> Fixed {
        self.delta_km(other).bearing_deg()
    }
}

/// Axis-aligned latitude/longitude rectangle bounding a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern edge.
    #[serde(with = "fixed_serde")]
    pub min_lat: Fixed,
    /// Northern edge.
    #[serde(with = "fixed_serde")]
    pub max_lat: Fixed,
    /// Western edge.
    #[serde(with = "fixed_serde")]
    pub min_lng: Fixed,
    /// Eastern edge.
    #[serde(with = "fixed_serde")]
    pub max_lng: Fixed,
}

impl GeoBounds {
    /// Create bounds from whole degrees.
    #[must_use]
    pub fn from_degrees(min_lat: i32, max_lat: i32, min_lng: i32, max_lng: i32) -> Self {
        Self {
            min_lat: Fixed::from_num(min_lat),
            max_lat: Fixed::from_num(max_lat),
            min_lng: Fixed::from_num(min_lng),
            max_lng: Fixed::from_num(max_lng),
        }
    }

    /// The whole globe.
    #[must_use]
    pub fn world() -> Self {
        Self::from_degrees(-85, 85, -180, 180)
    }

    /// Check whether a point lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    /// Clamp a point into the bounds.
    #[must_use]
    pub fn clamp(&self, point: GeoPoint) -> GeoPoint {
        GeoPoint::new(
            point.lat.clamp(self.min_lat, self.max_lat),
            point.lng.clamp(self.min_lng, self.max_lng),
        )
    }

    /// Largest absolute latitude covered (where longitude degrees are shortest).
    #[must_use]
    pub fn max_abs_lat(&self) -> Fixed {
        self.min_lat.abs().max(self.max_lat.abs())
    }
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::world()
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Fixed, b: Fixed, eps: Fixed) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_sqrt_exact_squares() {
        assert_eq!(fixed_sqrt(Fixed::from_num(25)), Fixed::from_num(5));
        assert_eq!(fixed_sqrt(Fixed::from_num(400_000_000)), Fixed::from_num(20_000));
        assert_eq!(fixed_sqrt(Fixed::ZERO), Fixed::ZERO);
        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
    }

    #[test]
    fn test_sqrt_fraction() {
        let root = fixed_sqrt(Fixed::from_num(2));
        assert!(close(root, Fixed::from_num(1.414_213_56), ratio(1, 1_000_000)));
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(4)).normalize();
        assert!(close(norm.x, ratio(3, 5), ratio(1, 100_000)));
        assert!(close(norm.y, ratio(4, 5), ratio(1, 100_000)));
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2Fixed::new(Fixed::from_num(6), Fixed::from_num(8));
        let clamped = v.clamp_length(Fixed::from_num(5));
        assert!(close(clamped.length(), Fixed::from_num(5), ratio(1, 10_000)));
        assert_eq!(v.clamp_length(Fixed::from_num(20)), v);
    }

    #[test]
    fn test_cos_deg_known_values() {
        let eps = ratio(1, 100_000);
        assert!(close(cos_deg(Fixed::ZERO), Fixed::ONE, eps));
        assert!(close(cos_deg(Fixed::from_num(60)), ratio(1, 2), eps));
        assert!(close(cos_deg(Fixed::from_num(90)), Fixed::ZERO, eps));
        assert!(close(cos_deg(Fixed::from_num(180)), -Fixed::ONE, eps));
        assert!(close(cos_deg(Fixed::from_num(-60)), ratio(1, 2), eps));
        assert!(close(cos_deg(Fixed::from_num(420)), ratio(1, 2), eps));
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let eps = ratio(1, 2);
        let north = Vec2Fixed::new(Fixed::ZERO, Fixed::ONE);
        let east = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
        let south = Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE);
        let west = Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO);
        assert!(close(north.bearing_deg(), Fixed::ZERO, eps));
        assert!(close(east.bearing_deg(), Fixed::from_num(90), eps));
        assert!(close(south.bearing_deg(), Fixed::from_num(180), eps));
        assert!(close(west.bearing_deg(), Fixed::from_num(270), eps));
    }

    #[test]
    fn test_geo_distance_one_degree_latitude() {
        let a = GeoPoint::new(Fixed::from_num(10), Fixed::from_num(20));
        let b = GeoPoint::new(Fixed::from_num(11), Fixed::from_num(20));
        assert!(close(a.distance_km(b), ratio(110_574, 1000), ratio(1, 1000)));
    }

    #[test]
    fn test_geo_offset_roundtrip() {
        let origin = GeoPoint::new(Fixed::from_num(45), Fixed::from_num(5));
        let moved = origin.offset_km(Vec2Fixed::new(Fixed::from_num(30), Fixed::from_num(-40)));
        let back = origin.delta_km(moved);
        assert!(close(back.x, Fixed::from_num(30), ratio(1, 5)));
        assert!(close(back.y, Fixed::from_num(-40), ratio(1, 100)));
    }

    #[test]
    fn test_bounds_contains_and_clamp() {
        let bounds = GeoBounds::from_degrees(0, 10, 0, 10);
        let inside = GeoPoint::new(Fixed::from_num(5), Fixed::from_num(5));
        let outside = GeoPoint::new(Fixed::from_num(12), Fixed::from_num(-1));
        assert!(bounds.contains(inside));
        assert!(!bounds.contains(outside));
        assert_eq!(
            bounds.clamp(outside),
            GeoPoint::new(Fixed::from_num(10), Fixed::from_num(0))
        );
    }
}
