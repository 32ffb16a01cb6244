//! Geofence geometry.
//!
//! A geofence is a circle on the Earth's surface. Rules compare a bounding
//! circle against the requester's estimated location (a circle whose radius
//! is the geolocation accuracy) using great-circle distance on a spherical
//! Earth.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the Earth with a radius in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Radius in meters.
    pub radius: f64,
}

/// Relationship between two geofences.
///
/// `subset` and `superset` are independent flags. Neither is set when the
/// circles are disjoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intersection {
    /// The circles share no area.
    pub disjoint: bool,
    /// The first circle lies strictly inside the second.
    pub subset: bool,
    /// The second circle lies strictly inside the first.
    pub superset: bool,
}

impl Intersection {
    /// The relationship seen from the other operand.
    #[must_use]
    pub fn inverse(self) -> Self {
        Self {
            disjoint: self.disjoint,
            subset: self.superset,
            superset: self.subset,
        }
    }
}

impl Geofence {
    /// Create a geofence from a center and a radius in meters.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, radius: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius,
        }
    }

    /// Haversine distance between the two centers, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Describe how `self` relates to `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Intersection {
        let distance = self.distance_to(other);

        if distance >= self.radius + other.radius {
            return Intersection {
                disjoint: true,
                ..Intersection::default()
            };
        }

        Intersection {
            disjoint: false,
            superset: self.radius - other.radius > distance,
            subset: other.radius - self.radius > distance,
        }
    }
}

impl fmt::Display for Geofence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@ {}, {} ({}m)",
            self.latitude, self.longitude, self.radius
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london(radius: f64) -> Geofence {
        Geofence::new(51.5074, -0.1278, radius)
    }

    fn paris(radius: f64) -> Geofence {
        Geofence::new(48.8566, 2.3522, radius)
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        assert!(london(1.0).distance_to(&london(5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_london_paris() {
        let d = london(0.0).distance_to(&paris(0.0));
        // Roughly 343.5 km on a spherical Earth.
        assert!((d - 343_500.0).abs() < 2_000.0, "distance was {d}");
    }

    #[test]
    fn test_distance_symmetric() {
        let a = london(0.0).distance_to(&paris(0.0));
        let b = paris(0.0).distance_to(&london(0.0));
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint() {
        let i = london(1_000.0).intersection(&paris(1_000.0));
        assert!(i.disjoint);
        assert!(!i.subset);
        assert!(!i.superset);
    }

    #[test]
    fn test_touching_circles_are_disjoint() {
        let a = Geofence::new(0.0, 0.0, 0.0);
        let b = Geofence::new(0.0, 0.0, 0.0);
        assert!(a.intersection(&b).disjoint);
    }

    #[test]
    fn test_overlap_without_containment() {
        let i = london(200_000.0).intersection(&paris(200_000.0));
        assert!(!i.disjoint);
        assert!(!i.subset);
        assert!(!i.superset);
    }

    #[test]
    fn test_superset_and_subset() {
        let big = london(1_000_000.0);
        let small = paris(1_000.0);

        let i = big.intersection(&small);
        assert!(!i.disjoint);
        assert!(i.superset);
        assert!(!i.subset);

        let j = small.intersection(&big);
        assert!(!j.disjoint);
        assert!(j.subset);
        assert!(!j.superset);
    }

    #[test]
    fn test_intersection_symmetry() {
        let cases = [
            (london(1_000.0), paris(1_000.0)),
            (london(200_000.0), paris(200_000.0)),
            (london(1_000_000.0), paris(10.0)),
            (london(25.0), london(5_000.0)),
        ];

        for (a, b) in cases {
            assert_eq!(a.intersection(&b), b.intersection(&a).inverse());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Geofence::new(51.5, -0.25, 1000.0).to_string(),
            "@ 51.5, -0.25 (1000m)"
        );
    }
}
