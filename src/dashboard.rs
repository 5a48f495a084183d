use crate::chart::{Canvas, ChartTheme, RadarChart};
use crate::config::AppConfig;
use crate::devices::ScanResult;
use crate::error::{ErrorKind, PollError};
use crate::map::{LatLon, MapView};
use crate::table::DeviceTable;
use serde::Serialize;

pub const MAP_WIDTH: f64 = 640.0;
pub const MAP_HEIGHT: f64 = 400.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Every presentation surface of the page. Owned by one poller; nothing here is global.
#[derive(Debug)]
pub struct Dashboard {
    pub table: DeviceTable,
    canvas: Canvas,
    map: Option<MapView>,
    pub alert: Option<String>,
    pub last_error: Option<CycleFailure>,
    pub generation: u64,
    theme: ChartTheme,
    map_container: String,
    tile_url: String,
}

impl Dashboard {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            table: DeviceTable::default(),
            canvas: Canvas::new(config.chart_canvas.clone()),
            map: None,
            alert: None,
            last_error: None,
            generation: 0,
            theme: config.chart_theme,
            map_container: config.map_container.clone(),
            tile_url: config.map_tile_url.clone(),
        }
    }

    pub fn chart(&self) -> Option<&RadarChart> {
        self.canvas.chart()
    }

    #[cfg(test)]
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// The map panel, hidden while the latest result carries no location.
    pub fn map(&self) -> Option<&MapView> {
        self.map.as_ref().filter(|m| !m.markers().is_empty())
    }

    pub fn render(&mut self, result: &ScanResult) {
        match result {
            ScanResult::Passive { devices, .. } => {
                self.table.rebuild(devices);
                self.canvas.redraw(devices, self.theme);
                // the view stays initialized, only its markers go
                if let Some(map) = self.map.as_mut() {
                    map.clear_markers();
                }
            }
            ScanResult::Active { base, devices } => {
                self.table.rebuild(devices);
                self.canvas.redraw(devices, self.theme);
                let map = self.map.get_or_insert_with(|| {
                    MapView::new(
                        &self.map_container,
                        &self.tile_url,
                        LatLon {
                            lat: base.lat,
                            lon: base.lon,
                        },
                        MAP_WIDTH,
                        MAP_HEIGHT,
                    )
                });
                map.plot(*base, devices);
            }
        }

        debug_assert_eq!(self.canvas.live_instances(), 1);

        let fresh = result.new_devices();
        self.alert = if fresh.is_empty() {
            None
        } else {
            Some(format!("New device connected: {}", fresh.join(", ")))
        };
        self.last_error = None;
        self.generation += 1;
    }

    /// Records a failed cycle. The previously rendered surfaces stay as they are.
    pub fn report(&mut self, err: &PollError) {
        self.last_error = Some(CycleFailure {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            generation: self.generation,
            table: self.table.clone(),
            chart: self.canvas.chart().cloned(),
            map: self.map().map(|m| MapSnapshot {
                container: m.container.clone(),
                center: m.center,
                zoom: m.zoom,
                markers: m.markers().to_vec(),
            }),
            alert: self.alert.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MapSnapshot {
    pub container: String,
    pub center: LatLon,
    pub zoom: u8,
    pub markers: Vec<crate::map::Marker>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardSnapshot {
    pub generation: u64,
    pub table: DeviceTable,
    pub chart: Option<RadarChart>,
    pub map: Option<MapSnapshot>,
    pub alert: Option<String>,
    pub last_error: Option<CycleFailure>,
}
