use serde::{Deserialize, Serialize};

/// Fixed constants of the map-image pyramid the tiles were rendered at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            min_zoom: 0,
            max_zoom: 5,
            scale_x: 0.5,
            scale_y: 0.5,
            offset_x: 4096.0,
            offset_y: 4096.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapPoint {
    pub px: f64,
    pub py: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

/// Renderable bounds of the map image at native zoom, plus the world-space
/// rectangle they cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    pub px_width: f64,
    pub px_height: f64,
    pub world_min: WorldPoint,
    pub world_max: WorldPoint,
}

/// Pure affine transform between the game's world coordinates and
/// map-projection pixels. World y grows northward, screen y grows downward,
/// hence the sign flip on the y axis.
#[derive(Debug, Clone)]
pub struct CoordinateProjector {
    config: ProjectionConfig,
}

impl CoordinateProjector {
    pub fn new(config: ProjectionConfig) -> Self {
        Self { config }
    }

    pub fn to_map_space(&self, world_x: f64, world_y: f64) -> MapPoint {
        MapPoint {
            px: world_x * self.config.scale_x + self.config.offset_x,
            py: self.config.offset_y - world_y * self.config.scale_y,
        }
    }

    pub fn to_world_space(&self, px: f64, py: f64) -> WorldPoint {
        WorldPoint {
            x: (px - self.config.offset_x) / self.config.scale_x,
            y: (self.config.offset_y - py) / self.config.scale_y,
        }
    }

    pub fn compute_bounds(&self, image_width: u32, image_height: u32) -> MapBounds {
        let px_width = f64::from(image_width);
        let px_height = f64::from(image_height);
        let top_left = self.to_world_space(0.0, 0.0);
        let bottom_right = self.to_world_space(px_width, px_height);
        MapBounds {
            px_width,
            px_height,
            world_min: WorldPoint {
                x: top_left.x.min(bottom_right.x),
                y: top_left.y.min(bottom_right.y),
            },
            world_max: WorldPoint {
                x: top_left.x.max(bottom_right.x),
                y: top_left.y.max(bottom_right.y),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CoordinateProjector, ProjectionConfig};

    const EPSILON: f64 = 1e-9;

    #[test]
    fn round_trips_world_coordinates() {
        let projector = CoordinateProjector::new(ProjectionConfig::default());
        let samples = [
            (0.0, 0.0),
            (-3257.5, 4820.25),
            (7999.875, -6021.0),
            (123.456_789, -987.654_321),
        ];
        for (x, y) in samples {
            let mapped = projector.to_map_space(x, y);
            let world = projector.to_world_space(mapped.px, mapped.py);
            assert!(
                (world.x - x).abs() < EPSILON && (world.y - y).abs() < EPSILON,
                "round trip drifted for ({x}, {y}): got ({}, {})",
                world.x,
                world.y
            );
        }
    }

    #[test]
    fn map_y_axis_is_flipped() {
        let projector = CoordinateProjector::new(ProjectionConfig::default());
        let north = projector.to_map_space(0.0, 1000.0);
        let south = projector.to_map_space(0.0, -1000.0);
        assert!(north.py < south.py, "north should render above south");
    }

    #[test]
    fn bounds_cover_the_image_corners() {
        let projector = CoordinateProjector::new(ProjectionConfig::default());
        let bounds = projector.compute_bounds(8192, 8192);
        assert_eq!(bounds.px_width, 8192.0);
        assert_eq!(bounds.px_height, 8192.0);

        let min_corner = projector.to_map_space(bounds.world_min.x, bounds.world_max.y);
        assert!((min_corner.px - 0.0).abs() < EPSILON);
        assert!((min_corner.py - 0.0).abs() < EPSILON);
        let max_corner = projector.to_map_space(bounds.world_max.x, bounds.world_min.y);
        assert!((max_corner.px - 8192.0).abs() < EPSILON);
        assert!((max_corner.py - 8192.0).abs() < EPSILON);
    }
}
