use crate::devices::ScannedDevice;
use serde::Serialize;
use std::f64::consts::PI;
use std::str::FromStr;

pub const SERIES_LABEL: &str = "Estimated distance (m)";
const RING_COUNT: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartTheme {
    #[default]
    Classic,
    Radar,
}

impl FromStr for ChartTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(ChartTheme::Classic),
            "radar" => Ok(ChartTheme::Radar),
            other => Err(format!("unknown chart theme {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Palette {
    pub fill: &'static str,
    pub stroke: &'static str,
    pub grid: &'static str,
    pub text: &'static str,
    pub background: &'static str,
}

impl ChartTheme {
    pub fn palette(self) -> Palette {
        match self {
            ChartTheme::Classic => Palette {
                fill: "rgba(54, 162, 235, 0.2)",
                stroke: "rgba(54, 162, 235, 1)",
                grid: "#c9ced8",
                text: "#111111",
                background: "#ffffff",
            },
            ChartTheme::Radar => Palette {
                fill: "rgba(255, 0, 0, 0.2)",
                stroke: "rgba(255, 0, 0, 1)",
                grid: "red",
                text: "red",
                background: "#000000",
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
    pub annotation: Vec<String>,
}

/// One chart instance bound to a canvas. Instances are never mutated after
/// creation; a new render builds a new instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RadarChart {
    pub id: u64,
    pub canvas: String,
    pub series_label: &'static str,
    pub theme: ChartTheme,
    pub points: Vec<ChartPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RadarGeometry {
    pub center: Point,
    pub radius: f64,
    pub scale_max: f64,
    pub axes: Vec<Point>,
    pub rings: Vec<Vec<Point>>,
    pub points: Vec<Point>,
}

impl RadarChart {
    fn build<D: ScannedDevice>(id: u64, canvas: &str, devices: &[D], theme: ChartTheme) -> Self {
        let points = devices
            .iter()
            .map(|d| ChartPoint {
                label: d.display_name().to_string(),
                value: d.distance(),
                annotation: d.annotation(),
            })
            .collect();
        Self {
            id,
            canvas: canvas.to_string(),
            series_label: SERIES_LABEL,
            theme,
            points,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.points.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Upper bound of the radial scale; the scale always begins at zero.
    pub fn scale_max(&self) -> f64 {
        let max = self
            .points
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        nice_ceil(max)
    }

    pub fn geometry(&self, size: f64) -> RadarGeometry {
        let center = Point {
            x: size / 2.0,
            y: size / 2.0,
        };
        // leave room for point labels around the plot
        let radius = size * 0.32;
        let scale_max = self.scale_max();
        let n = self.points.len();

        let axes = (0..n).map(|i| polar(center, radius, axis_angle(i, n))).collect();
        let rings = (1..=RING_COUNT)
            .map(|ring| {
                let r = radius * ring as f64 / RING_COUNT as f64;
                (0..n).map(|i| polar(center, r, axis_angle(i, n))).collect()
            })
            .collect();
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ratio = if p.value.is_finite() {
                    (p.value / scale_max).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                polar(center, radius * ratio, axis_angle(i, n))
            })
            .collect();

        RadarGeometry {
            center,
            radius,
            scale_max,
            axes,
            rings,
            points,
        }
    }

    fn destroy(self) {
        tracing::debug!(
            "Destroyed chart #{} on canvas {} ({} points)",
            self.id,
            self.canvas,
            self.points.len()
        );
    }
}

fn axis_angle(index: usize, count: usize) -> f64 {
    -PI / 2.0 + 2.0 * PI * index as f64 / count.max(1) as f64
}

fn polar(center: Point, r: f64, angle: f64) -> Point {
    Point {
        x: center.x + r * angle.cos(),
        y: center.y + r * angle.sin(),
    }
}

/// Rounds up to 1, 2 or 5 times a power of ten.
fn nice_ceil(value: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    let fraction = value / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Named chart surface. Holds at most one live chart.
#[derive(Debug)]
pub struct Canvas {
    name: String,
    live: Option<RadarChart>,
    next_id: u64,
    created: u64,
    destroyed: u64,
}

impl Canvas {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            live: None,
            next_id: 1,
            created: 0,
            destroyed: 0,
        }
    }

    pub fn chart(&self) -> Option<&RadarChart> {
        self.live.as_ref()
    }

    /// Destroys the current chart, then binds a freshly built one.
    pub fn redraw<D: ScannedDevice>(&mut self, devices: &[D], theme: ChartTheme) -> &RadarChart {
        self.destroy();
        let chart = RadarChart::build(self.next_id, &self.name, devices, theme);
        self.next_id += 1;
        self.created += 1;
        self.live.insert(chart)
    }

    pub fn destroy(&mut self) {
        if let Some(old) = self.live.take() {
            old.destroy();
            self.destroyed += 1;
        }
    }

    pub fn live_instances(&self) -> u64 {
        self.created - self.destroyed
    }
}
