//! Line-of-sight coverage of a network of fixed radio nodes.
//!
//! A run reads node positions from a loosely shaped CSV or JSON feed, keeps
//! the usable ones, picks an antenna height for each against the terrain
//! (raising it over nearby obstructions and the first Fresnel zone), runs
//! one visibility computation per node on a worker pool, and sums the
//! visibility rasters into a raster counting, for every terrain cell, how
//! many nodes see it.
//!
//! The visibility computation itself is external: see
//! [`viewshed::VisibilityPrimitive`]. [`pipeline`] strings everything
//! together.

#![forbid(unsafe_code)]

pub mod config;
pub mod coverage;
pub mod error;
pub mod export;
pub mod grid;
pub mod height;
pub mod nodes;
pub mod pipeline;
pub mod raster;
pub mod terrain;
pub mod viewshed;

pub use error::{Error, Result};
