use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
}

impl Waypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `to`, `frac` in [0, 1]
    pub fn lerp(&self, to: &Waypoint, frac: f64) -> Waypoint {
        Waypoint {
            x: self.x + frac * (to.x - self.x),
            y: self.y + frac * (to.y - self.y),
        }
    }
}

fn default_overview_scale() -> f64 {
    2.0
}

/// Camera route panned during the overview pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPath {
    pub waypoints: Vec<Waypoint>,
    pub zoom: f64,
    /// Uniform entity size multiplier while in the overview phase
    #[serde(default = "default_overview_scale")]
    pub overview_scale: f64,
}

impl CameraPath {
    pub fn new(waypoints: Vec<Waypoint>, zoom: f64) -> Result<Self> {
        let path = Self {
            waypoints,
            zoom,
            overview_scale: default_overview_scale(),
        };
        path.validate()?;
        Ok(path)
    }

    /// Load a path such as `{"waypoints": [{"x": 0, "y": 0}], "zoom": 1.5}`
    pub fn from_json(config: Value) -> Result<Self> {
        let path: Self =
            serde_json::from_value(config).map_err(|e| anyhow!("Invalid camera path: {}", e))?;
        path.validate()?;
        Ok(path)
    }

    fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            bail!("Camera path needs at least one waypoint");
        }
        if !(self.zoom > 0.0) {
            bail!("Camera zoom must be positive, got {}", self.zoom);
        }
        if !(self.overview_scale > 0.0) {
            bail!("Overview scale must be positive, got {}", self.overview_scale);
        }
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    pub fn last(&self) -> Waypoint {
        self.waypoints[self.waypoints.len() - 1]
    }

    /// Time allotted to each segment when the path spans `duration`
    pub fn segment_budget(&self, duration: f64) -> f64 {
        match self.segment_count() {
            0 => duration,
            n => duration / n as f64,
        }
    }

    /// Segment index and interpolated position after `elapsed` of `duration`
    pub fn position_at(&self, elapsed: f64, duration: f64) -> (usize, Waypoint) {
        let segments = self.segment_count();
        if segments == 0 {
            return (0, self.waypoints[0]);
        }
        if duration <= 0.0 || elapsed >= duration {
            return (segments - 1, self.last());
        }

        let budget = self.segment_budget(duration);
        let elapsed = elapsed.max(0.0);
        let segment = ((elapsed / budget) as usize).min(segments - 1);
        let frac = ((elapsed - segment as f64 * budget) / budget).clamp(0.0, 1.0);
        let from = &self.waypoints[segment];
        let to = &self.waypoints[segment + 1];
        (segment, from.lerp(to, frac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square() -> CameraPath {
        CameraPath::new(
            vec![
                Waypoint::new(0.0, 0.0),
                Waypoint::new(10.0, 0.0),
                Waypoint::new(10.0, 10.0),
            ],
            1.5,
        )
        .unwrap()
    }

    #[test]
    fn test_interpolates_within_segment() {
        let path = square();
        // 2 segments over 4s -> 2s each
        let (segment, pos) = path.position_at(1.0, 4.0);
        assert_eq!(segment, 0);
        assert_eq!(pos, Waypoint::new(5.0, 0.0));

        let (segment, pos) = path.position_at(3.0, 4.0);
        assert_eq!(segment, 1);
        assert_eq!(pos, Waypoint::new(10.0, 5.0));
    }

    #[test]
    fn test_end_clamps_to_last_waypoint() {
        let path = square();
        assert_eq!(path.position_at(9.0, 4.0), (1, Waypoint::new(10.0, 10.0)));
    }

    #[test]
    fn test_from_json() {
        let path = CameraPath::from_json(json!({
            "waypoints": [{"x": 1.0, "y": 2.0}],
            "zoom": 3.0
        }))
        .unwrap();
        assert_eq!(path.segment_count(), 0);
        assert_eq!(path.overview_scale, 2.0);
        assert_eq!(path.position_at(0.5, 1.0).1, Waypoint::new(1.0, 2.0));
    }

    #[test]
    fn test_rejects_empty_path() {
        assert!(CameraPath::from_json(json!({"waypoints": [], "zoom": 1.0})).is_err());
        assert!(CameraPath::new(vec![Waypoint::new(0.0, 0.0)], 0.0).is_err());
    }
}
