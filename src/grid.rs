//! The KEMAR measurement grid and position resolution.
//!
//! Filters were measured at 14 elevations from -40 to +90 degrees in steps
//! of 10 degrees. Each elevation carries a fixed number of azimuth
//! measurements around the full circle, but only azimuths up to and
//! including 180 degrees exist on disk: the head is assumed symmetric, so
//! positions beyond 180 degrees reuse the mirrored filter with the left and
//! right channels swapped.

/// Lowest measured elevation in degrees.
pub const MIN_ELEVATION: i32 = -40;
/// Highest measured elevation in degrees.
pub const MAX_ELEVATION: i32 = 90;
/// Spacing between measured elevations in degrees.
pub const ELEVATION_STEP: i32 = 10;
/// Number of measured elevations.
pub const N_ELEVATIONS: usize = ((MAX_ELEVATION - MIN_ELEVATION) / ELEVATION_STEP + 1) as usize;

/// Total number of azimuths measured per elevation over the full circle.
/// This also fixes the azimuth increment at each elevation.
const MEASURED_AZIMUTHS: [u32; N_ELEVATIONS] =
    [56, 60, 72, 72, 72, 72, 72, 60, 56, 45, 36, 24, 12, 1];

/// Number of azimuth filters stored on disk at elevation index `el_idx`.
///
/// Only half of the measured circle is stored; at the pole (+90 degrees)
/// this degenerates to a single filter.
pub fn azimuth_count(el_idx: usize) -> usize {
    (MEASURED_AZIMUTHS[el_idx] / 2 + 1) as usize
}

/// Number of azimuths measured over the full circle at elevation index
/// `el_idx`.
pub fn measured_azimuths(el_idx: usize) -> u32 {
    MEASURED_AZIMUTHS[el_idx]
}

/// Index of the measured elevation closest to `elevation` degrees.
///
/// Out of range elevations clamp to the first or last row.
pub fn elevation_index(elevation: f32) -> usize {
    let idx = ((elevation - MIN_ELEVATION as f32) / ELEVATION_STEP as f32).round() as i64;
    idx.clamp(0, N_ELEVATIONS as i64 - 1) as usize
}

/// Elevation in degrees of the row at `el_idx`.
pub fn index_to_elevation(el_idx: usize) -> i32 {
    MIN_ELEVATION + el_idx as i32 * ELEVATION_STEP
}

/// Azimuth in degrees of the filter at `(el_idx, az_idx)`.
pub fn index_to_azimuth(el_idx: usize, az_idx: usize) -> i32 {
    (az_idx as f64 * 360.0 / MEASURED_AZIMUTHS[el_idx] as f64).round() as i32
}

/// A resolved cell in the measurement grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridIndex {
    /// Elevation row, `0..N_ELEVATIONS`.
    pub elevation: usize,
    /// Azimuth column within the row, `0..azimuth_count(elevation)`.
    pub azimuth: usize,
    /// The position lies beyond 180 degrees: the consumer must swap the
    /// left and right channels of the filter pair.
    pub flip: bool,
}

impl GridIndex {
    /// Signed azimuth in degrees this cell stands for, negative when the
    /// mirrored half of the circle is in use.
    pub fn signed_azimuth(&self) -> i32 {
        let azim = index_to_azimuth(self.elevation, self.azimuth);
        if self.flip {
            -azim
        } else {
            azim
        }
    }
}

/// Resolve a continuous position in degrees to the nearest measured cell.
///
/// The azimuth is folded into `[0, 360)` and reflected onto the stored
/// half circle; the elevation clamps to the measured range. This never
/// fails: any finite input maps to a valid cell.
pub fn resolve(elevation: f32, azimuth: f32) -> GridIndex {
    let el_idx = elevation_index(elevation);
    let measured = MEASURED_AZIMUTHS[el_idx] as f32;
    let count = azimuth_count(el_idx);

    let mut azimuth = azimuth % 360.0;
    if azimuth < 0.0 {
        azimuth += 360.0;
    }

    let flip = azimuth > 180.0;
    if flip {
        azimuth = 360.0 - azimuth;
    }

    let az_idx = (azimuth / (360.0 / measured)).round() as i64;
    let az_idx = az_idx.clamp(0, count as i64 - 1) as usize;

    GridIndex {
        elevation: el_idx,
        azimuth: az_idx,
        flip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_half_circle_plus_pole() {
        for el_idx in 0..N_ELEVATIONS {
            assert_eq!(
                azimuth_count(el_idx),
                (measured_azimuths(el_idx) / 2 + 1) as usize
            );
        }

        let pole = elevation_index(90.0);
        assert_eq!(pole, N_ELEVATIONS - 1);
        assert_eq!(azimuth_count(pole), 1);
    }

    #[test]
    fn resolve_is_deterministic() {
        for &(e, a) in &[(0.0, 0.0), (42.5, 137.2), (-33.0, 355.0), (90.0, 17.0)] {
            assert_eq!(resolve(e, a), resolve(e, a));
        }
    }

    #[test]
    fn reflection_toggles_flip() {
        for el in [-40.0, 0.0, 50.0] {
            for az in [181.0, 200.0, 270.0, 359.0] {
                let mirrored = resolve(el, az);
                let direct = resolve(el, 360.0 - az);

                assert_eq!(mirrored.elevation, direct.elevation);
                assert_eq!(mirrored.azimuth, direct.azimuth);
                assert!(mirrored.flip);
                assert!(!direct.flip);
            }
        }
    }

    #[test]
    fn elevation_clamps_to_grid() {
        assert_eq!(resolve(-1000.0, 0.0).elevation, 0);
        assert_eq!(resolve(1000.0, 0.0).elevation, N_ELEVATIONS - 1);
        assert_eq!(elevation_index(f32::MIN), 0);
        assert_eq!(elevation_index(f32::MAX), N_ELEVATIONS - 1);
    }

    #[test]
    fn azimuth_folds_into_circle() {
        let reference = resolve(10.0, 90.0);

        for turns in 1..4 {
            let wrapped = resolve(10.0, 90.0 + turns as f32 * 360.0);
            assert_eq!(wrapped, reference);

            let negative = resolve(10.0, 90.0 - turns as f32 * 360.0);
            assert_eq!(negative, reference);
        }
    }

    #[test]
    fn forty_up_ninety_across() {
        let idx = resolve(40.0, 90.0);
        assert_eq!(idx.elevation, 8);
        assert!(!idx.flip);

        let behind = resolve(40.0, 270.0);
        assert_eq!(behind.elevation, 8);
        assert_eq!(behind.azimuth, idx.azimuth);
        assert!(behind.flip);
        assert_eq!(behind.signed_azimuth(), -idx.signed_azimuth());
    }

    #[test]
    fn index_round_trips_to_degrees() {
        assert_eq!(index_to_elevation(0), -40);
        assert_eq!(index_to_elevation(8), 40);
        assert_eq!(index_to_elevation(N_ELEVATIONS - 1), 90);

        // 56 measurements at -40 degrees puts column 14 at about 90 degrees.
        assert_eq!(index_to_azimuth(0, 14), 90);
        assert_eq!(index_to_azimuth(N_ELEVATIONS - 1, 0), 0);
    }
}
