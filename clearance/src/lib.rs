//! Radio clearance heuristics for fixed antenna sites.
//!
//! Coverage in this workspace is purely geometric: a node covers a cell when
//! there is line of sight between its antenna and the ground at that cell.
//! Line of sight alone is optimistic for radio links, and raw site heights
//! from upstream feeds are often wrong or missing. This crate holds the two
//! small pieces of radio engineering used to correct for that:
//!
//!  - [`fresnel`]: the standard approximation of the radius of the first
//!    Fresnel zone, the ellipsoid around a direct path which should stay
//!    clear of obstructions for near free-space propagation;
//!
//!  - [`height`]: the policy turning a supplied antenna height, a terrain
//!    clearance floor and a Fresnel margin into the height actually used,
//!    bounded into a configured band.
//!
//! Everything here is functionally pure and does no I/O, so it can be used
//! concurrently and tested without any terrain data.

#![forbid(unsafe_code)]

pub mod fresnel;
pub mod height;

pub use fresnel::{first_zone_radius, fresnel_margin};
pub use height::{sampling_half_width, terrain_floor, HeightDecision, HeightPolicy};
