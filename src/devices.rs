use serde::{Deserialize, Serialize};

/// Device reported by the passive monitor (`GET /api/devices`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveDevice {
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    pub distance: f64,
}

/// Device reported by an active, geolocated scan (`POST /api/scan`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoDevice {
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    pub rssi: f64,
    pub distance_m: f64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<PassiveDevice>,
    pub new_devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub base: BaseLocation,
    pub devices: Vec<GeoDevice>,
}

/// One decoded backend answer. The two device shapes are kept apart on purpose
/// so each surface renders the column set of the contract it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScanResult {
    Passive {
        devices: Vec<PassiveDevice>,
        new_devices: Vec<String>,
    },
    Active {
        base: BaseLocation,
        devices: Vec<GeoDevice>,
    },
}

impl ScanResult {
    pub fn new_devices(&self) -> &[String] {
        match self {
            ScanResult::Passive { new_devices, .. } => new_devices,
            ScanResult::Active { .. } => &[],
        }
    }
}

impl From<DevicesResponse> for ScanResult {
    fn from(resp: DevicesResponse) -> Self {
        ScanResult::Passive {
            devices: resp.devices,
            new_devices: resp.new_devices,
        }
    }
}

impl From<ScanResponse> for ScanResult {
    fn from(resp: ScanResponse) -> Self {
        ScanResult::Active {
            base: resp.base,
            devices: resp.devices,
        }
    }
}

/// Common view over both device shapes used by the table and the chart.
pub trait ScannedDevice {
    /// Table header for this shape, in column order.
    const COLUMNS: &'static [&'static str];

    fn ip(&self) -> &str;
    fn mac(&self) -> &str;
    fn name(&self) -> Option<&str>;
    fn distance(&self) -> f64;
    fn cells(&self) -> Vec<String>;

    fn display_name(&self) -> &str {
        match self.name() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.ip(),
        }
    }

    fn annotation(&self) -> Vec<String> {
        vec![
            format!("Name: {}", self.name().unwrap_or("-")),
            format!("IP: {}", self.ip()),
            format!("MAC: {}", self.mac()),
            format!("Distance: {} m", self.distance()),
        ]
    }
}

impl ScannedDevice for PassiveDevice {
    const COLUMNS: &'static [&'static str] = &["IP", "MAC", "Name", "Zone", "Distance (m)"];

    fn ip(&self) -> &str {
        &self.ip
    }

    fn mac(&self) -> &str {
        &self.mac
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn distance(&self) -> f64 {
        self.distance
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.ip.clone(),
            self.mac.clone(),
            self.name.clone().unwrap_or_else(|| "-".into()),
            self.zone.clone().unwrap_or_else(|| "-".into()),
            self.distance.to_string(),
        ]
    }
}

impl ScannedDevice for GeoDevice {
    const COLUMNS: &'static [&'static str] =
        &["IP", "MAC", "RSSI (dBm)", "Distance (m)", "Latitude", "Longitude"];

    fn ip(&self) -> &str {
        &self.ip
    }

    fn mac(&self) -> &str {
        &self.mac
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn distance(&self) -> f64 {
        self.distance_m
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.ip.clone(),
            self.mac.clone(),
            self.rssi.to_string(),
            self.distance_m.to_string(),
            self.lat.to_string(),
            self.lon.to_string(),
        ]
    }
}

impl GeoDevice {
    pub fn popup(&self) -> Vec<String> {
        vec![
            format!("IP: {}", self.ip),
            format!("MAC: {}", self.mac),
            format!("RSSI: {} dBm", self.rssi),
            format!("Distance: {} m", self.distance_m),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_envelope_decodes_with_missing_optionals() -> anyhow::Result<()> {
        let body = r#"{
            "devices": [{"ip": "10.0.0.7", "mac": "AA:BB:CC:DD:EE:07", "distance": 8.27}],
            "new_devices": []
        }"#;
        let resp: DevicesResponse = serde_json::from_str(body)?;
        let dev = &resp.devices[0];
        assert_eq!(dev.name, None);
        assert_eq!(dev.display_name(), "10.0.0.7");
        assert_eq!(dev.cells()[2], "-");
        Ok(())
    }

    #[test]
    fn geo_shape_is_not_a_passive_shape() {
        let body = r#"{"devices": [{"ip": "10.0.0.9", "mac": "AA", "rssi": -61, "distance_m": 4.47, "lat": 40.0, "lon": -3.0}], "new_devices": []}"#;
        assert!(serde_json::from_str::<DevicesResponse>(body).is_err());
    }

    #[test]
    fn blank_name_falls_back_to_ip() {
        let dev = GeoDevice {
            ip: "192.168.1.20".into(),
            mac: "AA:BB:CC:DD:EE:20".into(),
            name: Some("  ".into()),
            rssi: -55.0,
            distance_m: 2.24,
            lat: 40.00001,
            lon: -3.00002,
        };
        assert_eq!(dev.display_name(), "192.168.1.20");
        assert_eq!(dev.cells()[2], "-55");
        assert_eq!(dev.popup()[2], "RSSI: -55 dBm");
    }

    #[test]
    fn active_result_has_no_new_devices() {
        let result = ScanResult::from(ScanResponse {
            base: BaseLocation { lat: 40.0, lon: -3.0 },
            devices: vec![],
        });
        assert!(result.new_devices().is_empty());
        assert!(matches!(result, ScanResult::Active { ref devices, .. } if devices.is_empty()));
    }
}
