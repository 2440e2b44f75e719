//! Hierarchical Triangular Mesh (HTM) trixel lookup
//!
//! The sphere is split into the eight faces of an octahedron (S0-S3, N0-N3).
//! Each level divides a spherical triangle into four children by joining the
//! midpoints of its edges, labelled `0`-`3`. A trixel's name is the base face
//! followed by one digit per level, so the name of a coarser level is always
//! a prefix of the name of every finer level that contains the same point.
//!
//! The integer id encodes the same path two bits at a time, with the base
//! face as `1s ff` (`N` = `11`, `S` = `10`):
//!
//! ```text
//! N02323033011          = 11 00 10 11 10 11 00 11 11 00 01 01 = 13349829
//! N02323033011211311    = ...                                  = 54680902005
//! ```

use crate::error::{IngestError, Result};

/// Deepest level supported; keeps ids within 64 bits with room to spare
pub const MAX_DEPTH: u32 = 20;

const EPSILON: f64 = 1.0e-15;

type Vec3 = [f64; 3];

const VERTICES: [Vec3; 6] = [
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, -1.0],
];

const SOUTH_FACES: [[usize; 3]; 4] = [[1, 5, 2], [2, 5, 3], [3, 5, 4], [4, 5, 1]];
const NORTH_FACES: [[usize; 3]; 4] = [[1, 0, 4], [4, 0, 3], [3, 0, 2], [2, 0, 1]];

fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn midpoint(a: &Vec3, b: &Vec3) -> Vec3 {
    let m = [a[0] + b[0], a[1] + b[1], a[2] + b[2]];
    let norm = dot(&m, &m).sqrt();
    [m[0] / norm, m[1] / norm, m[2] / norm]
}

fn is_inside(p: &Vec3, v0: &Vec3, v1: &Vec3, v2: &Vec3) -> bool {
    dot(&cross(v0, v1), p) >= -EPSILON
        && dot(&cross(v1, v2), p) >= -EPSILON
        && dot(&cross(v2, v0), p) >= -EPSILON
}

fn unit_vector(ra: f64, dec: f64) -> Vec3 {
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
}

/// Base face of a point: hemisphere flag and face index
fn base_face(p: &Vec3) -> (bool, usize) {
    let [x, y, z] = *p;
    let north = z >= 0.0;
    let quadrant = if x > 0.0 && y >= 0.0 {
        0
    } else if x <= 0.0 && y > 0.0 {
        1
    } else if x < 0.0 && y <= 0.0 {
        2
    } else {
        3
    };
    // North faces run N3..N0 around the quadrants, south faces S0..S3.
    let face = if north { 3 - quadrant } else { quadrant };
    (north, face)
}

fn check_depth(depth: u32) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(IngestError::config(format!(
            "HTM depth {} exceeds the maximum of {}",
            depth, MAX_DEPTH
        )));
    }
    Ok(())
}

fn check_coordinates(ra: f64, dec: f64) -> Result<()> {
    if !ra.is_finite() || !dec.is_finite() || !(-90.0..=90.0).contains(&dec) {
        return Err(IngestError::Coordinate {
            column: "ra/dec".to_string(),
            value: format!("({}, {})", ra, dec),
        });
    }
    Ok(())
}

/// Trixel path of a point: base face then one child digit per level
fn trixel_path(ra: f64, dec: f64, depth: u32) -> Result<(bool, usize, Vec<u8>)> {
    check_depth(depth)?;
    check_coordinates(ra, dec)?;

    let p = unit_vector(ra, dec);
    let (north, face) = base_face(&p);
    let corners = if north { NORTH_FACES[face] } else { SOUTH_FACES[face] };
    let [mut v0, mut v1, mut v2] = corners.map(|i| VERTICES[i]);

    let mut digits = Vec::with_capacity(depth as usize);
    for _ in 0..depth {
        let w2 = midpoint(&v0, &v1);
        let w0 = midpoint(&v1, &v2);
        let w1 = midpoint(&v2, &v0);

        let (digit, next) = if is_inside(&p, &v0, &w2, &w1) {
            (0, [v0, w2, w1])
        } else if is_inside(&p, &v1, &w0, &w2) {
            (1, [v1, w0, w2])
        } else if is_inside(&p, &v2, &w1, &w0) {
            (2, [v2, w1, w0])
        } else {
            (3, [w0, w1, w2])
        };

        digits.push(digit);
        [v0, v1, v2] = next;
    }

    Ok((north, face, digits))
}

/// HTM name of a point, e.g. `N02323033011` at depth 10
pub fn name(ra: f64, dec: f64, depth: u32) -> Result<String> {
    let (north, face, digits) = trixel_path(ra, dec, depth)?;
    let mut name = String::with_capacity(digits.len() + 2);
    name.push(if north { 'N' } else { 'S' });
    name.push(char::from(b'0' + face as u8));
    name.extend(digits.iter().map(|d| char::from(b'0' + d)));
    Ok(name)
}

/// HTM integer id of a point
pub fn id(ra: f64, dec: f64, depth: u32) -> Result<u64> {
    let (north, face, digits) = trixel_path(ra, dec, depth)?;
    let base = if north { 3u64 } else { 2u64 };
    let id = digits
        .iter()
        .fold(base * 4 + face as u64, |acc, d| acc * 4 + u64::from(*d));
    Ok(id)
}

/// Convert an HTM name into its integer id
pub fn name_to_id(name: &str) -> Result<u64> {
    let invalid = || IngestError::config(format!("Invalid HTM name '{}'", name));
    let mut chars = name.chars();
    let mut id = match chars.next() {
        Some('N') => 3u64,
        Some('S') => 2u64,
        _ => return Err(invalid()),
    };
    let mut levels = 0usize;
    for c in chars {
        let digit = c.to_digit(4).ok_or_else(invalid)?;
        id = id * 4 + u64::from(digit);
        levels += 1;
    }
    if levels == 0 || levels > MAX_DEPTH as usize + 1 {
        return Err(invalid());
    }
    Ok(id)
}

/// Names for many `(ra, dec)` pairs
pub fn name_bulk(depth: u32, coords: &[(f64, f64)]) -> Result<Vec<String>> {
    coords.iter().map(|&(ra, dec)| name(ra, dec, depth)).collect()
}

/// Ids for many `(ra, dec)` pairs
pub fn id_bulk(depth: u32, coords: &[(f64, f64)]) -> Result<Vec<u64>> {
    coords.iter().map(|&(ra, dec)| id(ra, dec, depth)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RA: f64 = 288.70392;
    const DEC: f64 = 9.99498;

    #[test]
    fn test_known_names() {
        assert_eq!(name(RA, DEC, 10).unwrap(), "N02323033011");
        assert_eq!(name(RA, DEC, 13).unwrap(), "N02323033011211");
        assert_eq!(name(RA, DEC, 16).unwrap(), "N02323033011211311");
    }

    #[test]
    fn test_known_ids() {
        assert_eq!(id(RA, DEC, 10).unwrap(), 13_349_829);
        assert_eq!(id(RA, DEC, 13).unwrap(), 854_389_093);
        assert_eq!(id(RA, DEC, 16).unwrap(), 54_680_902_005);
    }

    #[test]
    fn test_base_faces() {
        assert_eq!(name(0.0, 0.0, 5).unwrap(), "N320000");
        assert_eq!(name(90.0, -45.0, 5).unwrap(), "S011000");
        assert_eq!(name(180.0, 89.9, 5).unwrap(), "N210000");
        assert_eq!(name(359.999, -89.9, 4).unwrap(), "S31000");
    }

    #[test]
    fn test_name_to_id_matches_id() {
        let n = name(RA, DEC, 16).unwrap();
        assert_eq!(name_to_id(&n).unwrap(), id(RA, DEC, 16).unwrap());
        assert!(name_to_id("X0123").is_err());
        assert!(name_to_id("N4").is_err());
    }

    #[test]
    fn test_depth_limit() {
        assert!(name(RA, DEC, MAX_DEPTH).is_ok());
        assert!(matches!(name(RA, DEC, MAX_DEPTH + 1), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_invalid_declination() {
        assert!(matches!(id(10.0, 91.0, 16), Err(IngestError::Coordinate { .. })));
        assert!(name(f64::NAN, 0.0, 16).is_err());
    }

    #[test]
    fn test_bulk() {
        let names = name_bulk(16, &[(RA, DEC), (0.0, 0.0)]).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "N02323033011211311");
        let ids = id_bulk(16, &[(RA, DEC)]).unwrap();
        assert_eq!(ids, vec![54_680_902_005]);
    }

    proptest! {
        #[test]
        fn prop_coarser_levels_are_prefixes(ra in 0.0f64..360.0, dec in -90.0f64..=90.0) {
            let fine = name(ra, dec, 16).unwrap();
            prop_assert_eq!(fine.len(), 18);
            prop_assert_eq!(&name(ra, dec, 13).unwrap(), &fine[..15]);
            prop_assert_eq!(&name(ra, dec, 10).unwrap(), &fine[..12]);
        }

        #[test]
        fn prop_ids_nest(ra in 0.0f64..360.0, dec in -90.0f64..=90.0) {
            let fine = id(ra, dec, 16).unwrap();
            prop_assert_eq!(id(ra, dec, 13).unwrap(), fine >> 6);
            prop_assert_eq!(id(ra, dec, 10).unwrap(), fine >> 12);
        }
    }
}
