//! Antenna height policy.
//!
//! The height used for an antenna is the largest of:
//!
//!  - the height supplied for the site,
//!  - the global minimum height,
//!  - the terrain floor: what it takes to clear the tallest terrain feature
//!    near the site, plus a safety margin,
//!  - the terrain floor plus the Fresnel margin, that is, extra clearance on
//!    top of the obstruction-clearing height,
//!
//! then capped into the `[min_height, max_height]` band. The cap can leave a
//! site below what the terrain floor asks for; that is a deliberate practical
//! limit and is reported through [`HeightDecision::capped`] rather than
//! treated as an error.

/// Smallest pixel size considered when turning a radius into pixels.
const MIN_PIXEL_SIZE: f64 = 1e-6;

/// Tolerance when deciding whether a height was raised above its input.
const ADAPTED_EPSILON: f64 = 1e-9;

/// Global bounds and Fresnel margin applied to every site of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightPolicy {
    /// Lowest height any antenna is assumed to be at (metres).
    pub min_height: f64,

    /// Highest height any antenna may be raised to (metres).
    pub max_height: f64,

    /// Extra clearance over the terrain floor (metres), 0 when disabled.
    pub fresnel_margin: f64,
}

impl Default for HeightPolicy {
    fn default() -> Self {
        Self {
            min_height: 4.0,
            max_height: 120.0,
            fresnel_margin: 0.0,
        }
    }
}

/// Outcome of the height policy for one site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightDecision {
    /// Height as supplied (or defaulted).
    pub input: f64,

    /// Terrain clearance floor.
    pub terrain_floor: f64,

    /// Fresnel margin in effect.
    pub fresnel_margin: f64,

    /// Height the physics would ask for, before the global cap.
    pub uncapped: f64,

    /// Height actually used.
    pub used: f64,
}

impl HeightDecision {
    /// Whether the site was raised above its input height.
    pub fn adapted(&self) -> bool {
        self.used > self.input + ADAPTED_EPSILON
    }

    /// Whether the global maximum cut the height below what was asked for.
    pub fn capped(&self) -> bool {
        self.uncapped > self.used
    }
}

impl HeightPolicy {
    /// Decides the height for a site given its input height and terrain floor.
    pub fn resolve(&self, input: f64, terrain_floor: f64) -> HeightDecision {
        let uncapped = input
            .max(self.min_height)
            .max(terrain_floor)
            .max(terrain_floor + self.fresnel_margin);

        // max then min rather than clamp: never panics on an inverted band
        let used = uncapped.max(self.min_height).min(self.max_height);

        HeightDecision {
            input,
            terrain_floor,
            fresnel_margin: self.fresnel_margin,
            uncapped,
            used,
        }
    }
}

/// Half-width in pixels of the square terrain window sampled around a site.
///
/// Uses the finer of the two pixel dimensions, and always at least one pixel.
pub fn sampling_half_width(local_radius_m: f64, pixel_size_m: f64) -> usize {
    let pixel = pixel_size_m.max(MIN_PIXEL_SIZE);
    let pixels = (local_radius_m / pixel).ceil();
    if pixels.is_finite() && pixels >= 1.0 {
        pixels as usize
    } else {
        1
    }
}

/// Height needed above the ground to clear the tallest terrain in the window,
/// plus `clearance_margin`. Zero when the window is empty, never negative.
pub fn terrain_floor(window_max: Option<f64>, ground_elev: f64, clearance_margin: f64) -> f64 {
    match window_max {
        Some(top) => (top - ground_elev + clearance_margin).max(0.0),
        None => 0.0,
    }
}
