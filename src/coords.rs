//! Coordinate-system rotation between the core's internal "xzy" layout (x,
//! z in-plane, y the film-normal/thickness direction) and the external
//! "xyz" layout every public interface uses (x, y in-plane, z out-of-plane).
//!
//! `(x,y,z)_ext <-> (x,-z,y)_int` (spec.md §6).

use crate::vector::Vector3;

/// External xyz -> internal xzy.
pub fn ext_to_int(v: Vector3) -> Vector3 {
    Vector3::new(v.x, v.z, -v.y)
}

/// Internal xzy -> external xyz.
pub fn int_to_ext(v: Vector3) -> Vector3 {
    Vector3::new(v.x, -v.z, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let back = int_to_ext(ext_to_int(v));
        assert_eq!(back, v);
    }

    #[test]
    fn matches_spec_formula() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let internal = ext_to_int(v);
        assert_eq!(internal, Vector3::new(1.0, 3.0, -2.0));
    }
}
