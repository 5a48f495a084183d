use crate::devices::{BaseLocation, GeoDevice};
use serde::Serialize;
use std::f64::consts::PI;

pub const TILE_SIZE: f64 = 256.0;
pub const INITIAL_ZOOM: u8 = 17;
pub const MAX_ZOOM: u8 = 18;
/// Bounds are grown by this ratio on every side before fitting.
pub const BOUNDS_PADDING: f64 = 0.5;
const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    fn around(p: LatLon) -> Self {
        Self {
            south: p.lat,
            west: p.lon,
            north: p.lat,
            east: p.lon,
        }
    }

    fn extend(&mut self, p: LatLon) {
        self.south = self.south.min(p.lat);
        self.north = self.north.max(p.lat);
        self.west = self.west.min(p.lon);
        self.east = self.east.max(p.lon);
    }

    pub fn pad(self, ratio: f64) -> Self {
        let lat_buf = (self.north - self.south).abs() * ratio;
        let lon_buf = (self.east - self.west).abs() * ratio;
        Self {
            south: (self.south - lat_buf).max(-MAX_LATITUDE),
            west: self.west - lon_buf,
            north: (self.north + lat_buf).min(MAX_LATITUDE),
            east: self.east + lon_buf,
        }
    }

    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lon >= self.west && p.lon <= self.east
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    Base,
    Device,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub position: LatLon,
    pub radius: u8,
    pub color: &'static str,
    pub popup: Vec<String>,
}

impl Marker {
    fn base(base: BaseLocation) -> Self {
        Self {
            kind: MarkerKind::Base,
            position: LatLon {
                lat: base.lat,
                lon: base.lon,
            },
            radius: 10,
            color: "blue",
            popup: vec!["Base station".into()],
        }
    }

    fn device(device: &GeoDevice) -> Self {
        Self {
            kind: MarkerKind::Device,
            position: LatLon {
                lat: device.lat,
                lon: device.lon,
            },
            radius: 8,
            color: "red",
            popup: device.popup(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tile {
    pub url: String,
    pub left: f64,
    pub top: f64,
}

/// Tile map bound to a named container. Created once, then re-centered and
/// re-populated on every geolocated render.
#[derive(Clone, Debug, Serialize)]
pub struct MapView {
    pub container: String,
    pub tile_url: String,
    pub width: f64,
    pub height: f64,
    pub center: LatLon,
    pub zoom: u8,
    markers: Vec<Marker>,
}

impl MapView {
    pub fn new(container: &str, tile_url: &str, origin: LatLon, width: f64, height: f64) -> Self {
        tracing::debug!("Initialized map {container} at {:.6},{:.6}", origin.lat, origin.lon);
        Self {
            container: container.to_string(),
            tile_url: tile_url.to_string(),
            width,
            height,
            center: origin,
            zoom: INITIAL_ZOOM,
            markers: Vec::new(),
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Drops every previous marker, then plots the base and each device.
    pub fn plot(&mut self, base: BaseLocation, devices: &[GeoDevice]) {
        self.clear_markers();
        self.markers.push(Marker::base(base));
        self.markers.extend(devices.iter().map(Marker::device));
        if let Some(bounds) = self.marker_bounds() {
            self.fit_bounds(bounds.pad(BOUNDS_PADDING));
        }
        let visible = self.visible_bounds();
        if !self.markers.iter().all(|m| visible.contains(m.position)) {
            tracing::warn!("Some markers fall outside the fitted view of {}", self.container);
        }
    }

    pub fn marker_bounds(&self) -> Option<Bounds> {
        let mut iter = self.markers.iter().map(|m| m.position);
        let mut bounds = Bounds::around(iter.next()?);
        for p in iter {
            bounds.extend(p);
        }
        Some(bounds)
    }

    /// Picks the deepest zoom at which `bounds` fits the viewport and centers on it.
    pub fn fit_bounds(&mut self, bounds: Bounds) {
        let mut zoom = 0;
        for z in (0..=MAX_ZOOM).rev() {
            let sw = project(LatLon { lat: bounds.south, lon: bounds.west }, z);
            let ne = project(LatLon { lat: bounds.north, lon: bounds.east }, z);
            if (ne.0 - sw.0).abs() <= self.width && (sw.1 - ne.1).abs() <= self.height {
                zoom = z;
                break;
            }
        }
        // center on the projected midpoint, latitude is not linear in mercator
        let sw = project(LatLon { lat: bounds.south, lon: bounds.west }, zoom);
        let ne = project(LatLon { lat: bounds.north, lon: bounds.east }, zoom);
        self.zoom = zoom;
        self.center = unproject((sw.0 + ne.0) / 2.0, (sw.1 + ne.1) / 2.0, zoom);
    }

    fn origin(&self) -> (f64, f64) {
        let (cx, cy) = project(self.center, self.zoom);
        (cx - self.width / 2.0, cy - self.height / 2.0)
    }

    /// Position of a coordinate in viewport pixels, origin top-left.
    pub fn to_screen(&self, p: LatLon) -> (f64, f64) {
        let (x, y) = project(p, self.zoom);
        let (ox, oy) = self.origin();
        (x - ox, y - oy)
    }

    pub fn visible_bounds(&self) -> Bounds {
        let (ox, oy) = self.origin();
        let nw = unproject(ox, oy, self.zoom);
        let se = unproject(ox + self.width, oy + self.height, self.zoom);
        Bounds {
            south: se.lat,
            west: nw.lon,
            north: nw.lat,
            east: se.lon,
        }
    }

    pub fn tiles(&self) -> Vec<Tile> {
        let (ox, oy) = self.origin();
        let count = 1_i64 << self.zoom;
        let first_x = (ox / TILE_SIZE).floor() as i64;
        let last_x = ((ox + self.width) / TILE_SIZE).ceil() as i64;
        let first_y = ((oy / TILE_SIZE).floor() as i64).max(0);
        let last_y = (((oy + self.height) / TILE_SIZE).ceil() as i64).min(count);

        let mut tiles = Vec::new();
        for ty in first_y..last_y {
            for tx in first_x..last_x {
                let wrapped = tx.rem_euclid(count);
                tiles.push(Tile {
                    url: self.tile_url(wrapped, ty),
                    left: tx as f64 * TILE_SIZE - ox,
                    top: ty as f64 * TILE_SIZE - oy,
                });
            }
        }
        tiles
    }

    fn tile_url(&self, x: i64, y: i64) -> String {
        self.tile_url
            .replace("{s}", "a")
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

/// Spherical Web Mercator, world pixel coordinates at `zoom`.
fn project(p: LatLon, zoom: u8) -> (f64, f64) {
    let scale = TILE_SIZE * f64::from(1_u32 << zoom);
    let lat = p.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (p.lon + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    (x, y)
}

fn unproject(x: f64, y: f64, zoom: u8) -> LatLon {
    let scale = TILE_SIZE * f64::from(1_u32 << zoom);
    let lon = x / scale * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * y / scale);
    let lat = n.sinh().atan().to_degrees();
    LatLon { lat, lon }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(ip: &str, lat: f64, lon: f64) -> GeoDevice {
        GeoDevice {
            ip: ip.into(),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            name: None,
            rssi: -62.0,
            distance_m: 5.01,
            lat,
            lon,
        }
    }

    fn view() -> MapView {
        MapView::new(
            "map",
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            LatLon { lat: 40.0, lon: -3.0 },
            640.0,
            400.0,
        )
    }

    #[test]
    fn projection_roundtrips() {
        let p = LatLon { lat: 40.4168, lon: -3.7038 };
        let (x, y) = project(p, 12);
        let back = unproject(x, y, 12);
        assert!((back.lat - p.lat).abs() < 1e-9);
        assert!((back.lon - p.lon).abs() < 1e-9);
    }

    #[test]
    fn fitted_view_contains_every_marker() {
        let mut map = view();
        let base = BaseLocation { lat: 40.0, lon: -3.0 };
        map.plot(
            base,
            &[
                geo("192.168.1.2", 40.00004, -3.00003),
                geo("192.168.1.3", 39.99991, -2.99985),
                geo("192.168.1.4", 40.00012, -3.00021),
            ],
        );
        assert_eq!(map.markers().len(), 4);
        let visible = map.visible_bounds();
        for marker in map.markers() {
            assert!(visible.contains(marker.position), "{marker:?} outside {visible:?}");
            let (x, y) = map.to_screen(marker.position);
            assert!((0.0..=map.width).contains(&x) && (0.0..=map.height).contains(&y));
        }
        assert!(map.zoom > 10);
    }

    #[test]
    fn replot_leaves_no_previous_markers() {
        let mut map = view();
        let base = BaseLocation { lat: 40.0, lon: -3.0 };
        map.plot(base, &[geo("192.168.1.2", 40.0001, -3.0001), geo("192.168.1.3", 40.0002, -3.0)]);
        map.plot(base, &[]);
        assert_eq!(map.markers().len(), 1);
        assert_eq!(map.markers()[0].kind, MarkerKind::Base);
        assert_eq!(map.zoom, MAX_ZOOM);
    }

    #[test]
    fn padding_grows_each_side() {
        let padded = Bounds {
            south: 10.0,
            west: 20.0,
            north: 12.0,
            east: 24.0,
        }
        .pad(0.5);
        assert_eq!(padded.south, 9.0);
        assert_eq!(padded.north, 13.0);
        assert_eq!(padded.west, 18.0);
        assert_eq!(padded.east, 26.0);
    }

    #[test]
    fn tiles_cover_the_viewport() {
        let mut map = view();
        map.plot(BaseLocation { lat: 40.0, lon: -3.0 }, &[geo("192.168.1.2", 40.001, -3.002)]);
        let tiles = map.tiles();
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.url.starts_with("https://a.tile.openstreetmap.org/")));
        assert!(tiles.iter().any(|t| t.left <= 0.0 && t.top <= 0.0));
        assert!(tiles
            .iter()
            .any(|t| t.left + TILE_SIZE >= map.width && t.top + TILE_SIZE >= map.height));
    }
}
