//! First Fresnel zone geometry.
//!
//! The radius of the _n_-th Fresnel zone at a point along a link is
//! _rₙ = √(n λ d₁ d₂ / (d₁ + d₂))_. With distances in kilometres, frequency
//! in GHz and the radius in metres, the first zone reduces to the well-known
//! radio-engineering approximation
//!
//! _r = 17.32 × √(d₁ d₂ / (f D))_
//!
//! where _D = d₁ + d₂_ is the total link length.

/// Constant of the first zone approximation (m, km, GHz units).
pub const FIRST_ZONE_CONSTANT: f64 = 17.32;

/// Radius (in metres) of the first Fresnel zone of a link.
///
///  - `distance_m` is the total link length in metres.
///  - `frequency_mhz` is the carrier frequency in MHz.
///  - `split_ratio` places the sample point along the link, as a fraction of
///    the total length from the transmitter: `0.5` is the midpoint, where the
///    zone is widest.
///
/// Degenerate links (non-positive distance or frequency, or a split point at
/// or beyond either end) have a radius of zero.
pub fn first_zone_radius(distance_m: f64, frequency_mhz: f64, split_ratio: f64) -> f64 {
    if !(distance_m > 0.0) || !(frequency_mhz > 0.0) {
        return 0.0;
    }

    let d1_km = distance_m * split_ratio / 1000.0;
    let d2_km = distance_m * (1.0 - split_ratio) / 1000.0;
    let d_km = distance_m / 1000.0;
    let f_ghz = frequency_mhz / 1000.0;

    if !(d1_km > 0.0) || !(d2_km > 0.0) {
        return 0.0;
    }

    FIRST_ZONE_CONSTANT * ((d1_km * d2_km) / (f_ghz * d_km)).sqrt()
}

/// Extra antenna height needed to keep `clearance_ratio` of the first zone
/// clear at the sample point. Never negative.
///
/// A ratio of `0.6` is the usual rule of thumb for "practically unobstructed".
pub fn fresnel_margin(
    distance_m: f64,
    frequency_mhz: f64,
    split_ratio: f64,
    clearance_ratio: f64,
) -> f64 {
    (first_zone_radius(distance_m, frequency_mhz, split_ratio) * clearance_ratio).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lora_eu_ten_km_midpoint() {
        assert_relative_eq!(
            first_zone_radius(10_000.0, 868.0, 0.5),
            29.39395530198226,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            fresnel_margin(10_000.0, 868.0, 0.5, 0.6),
            17.636373181189356,
            epsilon = 1e-9
        );
    }

    #[test]
    fn degenerate_links() {
        assert_eq!(first_zone_radius(0.0, 868.0, 0.5), 0.0);
        assert_eq!(first_zone_radius(-5.0, 868.0, 0.5), 0.0);
        assert_eq!(first_zone_radius(10_000.0, 0.0, 0.5), 0.0);
        assert_eq!(first_zone_radius(10_000.0, -868.0, 0.5), 0.0);
        assert_eq!(first_zone_radius(10_000.0, 868.0, 0.0), 0.0);
        assert_eq!(first_zone_radius(10_000.0, 868.0, 1.0), 0.0);
        assert_eq!(first_zone_radius(f64::NAN, 868.0, 0.5), 0.0);
    }

    #[test]
    fn scales_with_frequency_and_distance() {
        let base = first_zone_radius(10_000.0, 868.0, 0.5);
        assert!(base > 0.0);

        // r ∝ 1/√f
        let quad_freq = first_zone_radius(10_000.0, 4.0 * 868.0, 0.5);
        assert_relative_eq!(quad_freq, base / 2.0, max_relative = 1e-12);

        // r ∝ √d
        let quad_dist = first_zone_radius(40_000.0, 868.0, 0.5);
        assert_relative_eq!(quad_dist, base * 2.0, max_relative = 1e-12);
    }

    #[test]
    fn widest_at_midpoint() {
        let mid = first_zone_radius(20_000.0, 433.0, 0.5);
        let off = first_zone_radius(20_000.0, 433.0, 0.2);
        assert!(off < mid);
        assert_relative_eq!(off, first_zone_radius(20_000.0, 433.0, 0.8), max_relative = 1e-12);
    }

    #[test]
    fn margin_never_negative() {
        assert_eq!(fresnel_margin(10_000.0, 868.0, 0.5, -1.0), 0.0);
        assert_eq!(fresnel_margin(10_000.0, 868.0, 0.5, 0.0), 0.0);
    }
}
