//! Antenna height resolution against the terrain.

use clearance::{fresnel_margin, sampling_half_width, terrain_floor, HeightPolicy};
use serde::Serialize;

use crate::{
    config::{Config, HeightMode},
    nodes::ValidatedNode,
    terrain::{GridPosition, Terrain},
};

/// A validated node with the antenna height it will be computed with.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedObserver {
    pub node: ValidatedNode,

    /// Where the node sits on the terrain grid, `None` if outside it.
    pub position: Option<GridPosition>,

    pub input_height_m: f64,
    pub min_required_height_m: f64,
    pub fresnel_margin_m: f64,
    pub used_height_m: f64,

    /// Terrain elevation under the node, if defined.
    pub ground_elev_m: Option<f64>,

    /// Whether the height maximum cut below the clearance height.
    pub capped: bool,
}

/// Height statistics of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeightStats {
    pub height_mode: HeightMode,
    pub height_nodes_adapted: usize,
    pub height_nodes_capped: usize,
    pub height_input_min_m: f64,
    pub height_input_max_m: f64,
    pub height_used_min_m: f64,
    pub height_used_max_m: f64,
    pub radio_frequency_mhz: f64,
    pub height_fresnel_enabled: bool,
    pub height_fresnel_margin_m: f64,
}

/// Applies the height policy of a run to nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightResolver {
    pub mode: HeightMode,
    pub default_height_m: f64,
    pub local_radius_m: f64,
    pub clearance_margin_m: f64,
    pub fresnel_enabled: bool,
    pub frequency_mhz: f64,
    pub policy: HeightPolicy,
}

impl HeightResolver {
    pub fn from_config(config: &Config) -> Self {
        let height = &config.height;
        let margin = if height.use_fresnel {
            fresnel_margin(
                config.viewshed.max_distance_m,
                config.radio.frequency_mhz,
                height.fresnel_sample_ratio,
                height.fresnel_clearance_ratio,
            )
        } else {
            0.0
        };

        Self {
            mode: height.mode,
            default_height_m: height.default_m,
            local_radius_m: height.local_radius_m,
            clearance_margin_m: height.clearance_margin_m,
            fresnel_enabled: height.use_fresnel,
            frequency_mhz: config.radio.frequency_mhz,
            policy: HeightPolicy {
                min_height: height.min_m,
                max_height: height.max_m,
                fresnel_margin: margin,
            },
        }
    }

    /// Resolves the antenna height of one node.
    pub fn resolve(&self, node: &ValidatedNode, terrain: &Terrain) -> ResolvedObserver {
        let input = node.height_m.unwrap_or(self.default_height_m);
        let position = terrain.locate(node.position);
        let ground = position.and_then(|p| terrain.elevation(p.cell));

        let floor = match (self.mode, position, ground) {
            (HeightMode::AdaptiveMin, Some(position), Some(ground)) => {
                let half = sampling_half_width(self.local_radius_m, terrain.pixel_size());
                terrain_floor(terrain.window_max(position.cell, half), ground, self.clearance_margin_m)
            }
            _ => 0.0,
        };

        let decision = self.policy.resolve(input, floor);
        if decision.capped() {
            log::warn!(
                "node {}: height capped at {:.1} m, {:.1} m needed for clearance",
                node.id,
                decision.used,
                decision.uncapped
            );
        }

        ResolvedObserver {
            node: node.clone(),
            position,
            input_height_m: decision.input,
            min_required_height_m: decision.terrain_floor,
            fresnel_margin_m: decision.fresnel_margin,
            used_height_m: decision.used,
            ground_elev_m: ground,
            capped: decision.capped(),
        }
    }

    /// Resolves every node, in order, and gathers statistics.
    pub fn resolve_all(
        &self,
        nodes: &[ValidatedNode],
        terrain: &Terrain,
    ) -> (Vec<ResolvedObserver>, HeightStats) {
        let observers: Vec<ResolvedObserver> =
            nodes.iter().map(|node| self.resolve(node, terrain)).collect();

        let range = |values: &mut dyn Iterator<Item = f64>| {
            values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                None => Some((v, v)),
            })
            .unwrap_or((0.0, 0.0))
        };
        let (input_min, input_max) = range(&mut observers.iter().map(|o| o.input_height_m));
        let (used_min, used_max) = range(&mut observers.iter().map(|o| o.used_height_m));

        let adapted = observers
            .iter()
            .filter(|o| o.used_height_m > o.input_height_m + 1e-9)
            .count();
        let capped = observers.iter().filter(|o| o.capped).count();

        let stats = HeightStats {
            height_mode: self.mode,
            height_nodes_adapted: adapted,
            height_nodes_capped: capped,
            height_input_min_m: input_min,
            height_input_max_m: input_max,
            height_used_min_m: used_min,
            height_used_max_m: used_max,
            radio_frequency_mhz: self.frequency_mhz,
            height_fresnel_enabled: self.fresnel_enabled,
            height_fresnel_margin_m: self.policy.fresnel_margin,
        };
        log::info!(
            "heights resolved for {} node(s): {} raised, {} capped, used {:.1}..{:.1} m",
            observers.len(),
            adapted,
            capped,
            used_min,
            used_max
        );

        (observers, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::tests::terrain;
    use approx::assert_relative_eq;
    use geo::Point;

    fn node(id: &str, x: f64, y: f64, height: Option<f64>) -> ValidatedNode {
        ValidatedNode {
            id: id.to_string(),
            name: id.to_string(),
            position: Point::new(x, y),
            height_m: height,
            row: 1,
            metadata: Vec::new(),
        }
    }

    fn resolver_with(configure: impl FnOnce(&mut Config)) -> HeightResolver {
        let mut config = Config::default();
        config.height.use_fresnel = false;
        configure(&mut config);
        HeightResolver::from_config(&config)
    }

    /// 5x5 cells of 10 units, flat at 100 except a 130 peak in a corner.
    fn hill() -> Terrain {
        let mut values = vec![100.0; 25];
        values[0] = 130.0;
        terrain(5, 5, 10.0, values)
    }

    #[test]
    fn flat_window_requires_margin_only() {
        let flat = terrain(5, 5, 10.0, vec![0.0; 25]);
        let resolver = resolver_with(|c| c.height.clearance_margin_m = 2.0);
        let observer = resolver.resolve(&node("n", 25.0, 25.0, Some(10.0)), &flat);
        assert_eq!(observer.min_required_height_m, 2.0);
        assert_eq!(observer.used_height_m, 10.0);
        assert_eq!(observer.ground_elev_m, Some(0.0));
    }

    #[test]
    fn raised_over_nearby_peak() {
        let resolver = resolver_with(|c| c.height.local_radius_m = 20.0);
        let observer = resolver.resolve(&node("n", 15.0, 35.0, Some(6.0)), &hill());
        // cell (1, 1): the peak at (0, 0) is within 2 cells
        assert_eq!(observer.min_required_height_m, 32.0);
        assert_eq!(observer.used_height_m, 32.0);

        let resolver = resolver_with(|c| c.height.local_radius_m = 5.0);
        let observer = resolver.resolve(&node("n", 35.0, 15.0, Some(6.0)), &hill());
        assert_eq!(observer.min_required_height_m, 2.0);
        assert_eq!(observer.used_height_m, 6.0);
    }

    #[test]
    fn fixed_mode_ignores_terrain() {
        let resolver = resolver_with(|c| {
            c.height.mode = HeightMode::Fixed;
            c.height.local_radius_m = 50.0;
        });
        let observer = resolver.resolve(&node("n", 15.0, 35.0, None), &hill());
        assert_eq!(observer.min_required_height_m, 0.0);
        assert_eq!(observer.used_height_m, 6.0);
        assert_eq!(observer.ground_elev_m, Some(100.0));
    }

    #[test]
    fn outside_grid_has_no_floor() {
        let resolver = resolver_with(|_| {});
        let observer = resolver.resolve(&node("n", 500.0, 500.0, Some(1.0)), &hill());
        assert!(observer.position.is_none());
        assert_eq!(observer.ground_elev_m, None);
        assert_eq!(observer.min_required_height_m, 0.0);
        assert_eq!(observer.used_height_m, 4.0);
    }

    #[test]
    fn fresnel_margin_on_top_of_floor() {
        let flat = terrain(5, 5, 10.0, vec![0.0; 25]);
        let resolver = resolver_with(|c| {
            c.height.use_fresnel = true;
            c.viewshed.max_distance_m = 10_000.0;
        });
        let observer = resolver.resolve(&node("n", 25.0, 25.0, Some(6.0)), &flat);
        assert_relative_eq!(observer.fresnel_margin_m, 17.636373181189356, epsilon = 1e-9);
        assert_relative_eq!(observer.used_height_m, 2.0 + 17.636373181189356, epsilon = 1e-9);
    }

    #[test]
    fn monotonic_in_radius_margin_and_ratio() {
        let terrain = hill();
        let target = node("n", 35.0, 15.0, Some(6.0));

        let mut previous = 0.0;
        for radius in [0.0, 10.0, 20.0, 30.0, 40.0, 80.0] {
            let used = resolver_with(|c| c.height.local_radius_m = radius)
                .resolve(&target, &terrain)
                .used_height_m;
            assert!(used >= previous);
            previous = used;
        }

        let mut previous = 0.0;
        for margin in [0.0, 1.0, 5.0, 50.0, 500.0] {
            let used = resolver_with(|c| c.height.clearance_margin_m = margin)
                .resolve(&target, &terrain)
                .used_height_m;
            assert!(used >= previous && used <= 120.0);
            previous = used;
        }

        let mut previous = 0.0;
        for ratio in [0.0, 0.3, 0.6, 1.0, 10.0] {
            let used = resolver_with(|c| {
                c.height.use_fresnel = true;
                c.height.fresnel_clearance_ratio = ratio;
            })
            .resolve(&target, &terrain)
            .used_height_m;
            assert!(used >= previous && used <= 120.0);
            previous = used;
        }
    }

    #[test]
    fn statistics() {
        let terrain = hill();
        let resolver = resolver_with(|c| {
            c.height.local_radius_m = 20.0;
            c.height.max_m = 30.0;
        });
        let nodes = vec![
            node("peak-side", 15.0, 35.0, Some(6.0)),
            node("plain", 45.0, 5.0, Some(8.0)),
            node("away", 900.0, 900.0, None),
        ];
        let (observers, stats) = resolver.resolve_all(&nodes, &terrain);

        assert_eq!(observers.len(), 3);
        assert_eq!(observers[0].used_height_m, 30.0);
        assert_eq!(stats.height_nodes_capped, 1);
        assert_eq!(stats.height_nodes_adapted, 1);
        assert_eq!(stats.height_input_min_m, 6.0);
        assert_eq!(stats.height_input_max_m, 8.0);
        assert_eq!(stats.height_used_min_m, 6.0);
        assert_eq!(stats.height_used_max_m, 30.0);
        assert_eq!(stats.height_mode, HeightMode::AdaptiveMin);
        assert!(!stats.height_fresnel_enabled);
    }
}
