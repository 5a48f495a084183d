use crate::chart::ChartTheme;
use std::env;
use std::time::Duration;

pub struct AppConfig {
    pub backend_url: String,
    pub http_bind: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub passive_polling: bool,
    pub chart_canvas: String,
    pub map_container: String,
    pub map_tile_url: String,
    pub chart_theme: ChartTheme,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            backend_url: env_var("BACKEND_URL", "http://127.0.0.1:5000")
                .trim_end_matches('/')
                .to_string(),
            http_bind: env_var("HTTP_BIND", "0.0.0.0:8080"),
            poll_interval: Duration::from_secs(
                env_var("POLL_INTERVAL_SECS", "10")
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .unwrap_or(10),
            ),
            poll_timeout: Duration::from_millis(
                env_var("POLL_TIMEOUT_MS", "5000").parse().unwrap_or(5000),
            ),
            passive_polling: parse_flag(&env_var("PASSIVE_POLLING", "true")).unwrap_or(true),
            chart_canvas: env_var("CHART_CANVAS", "radarChart"),
            map_container: env_var("MAP_CONTAINER", "map"),
            map_tile_url: env_var(
                "MAP_TILE_URL",
                "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            ),
            chart_theme: env_var("CHART_THEME", "classic")
                .parse()
                .unwrap_or_default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".into(),
            http_bind: "0.0.0.0:8080".into(),
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(5000),
            passive_polling: true,
            chart_canvas: "radarChart".into(),
            map_container: "map".into(),
            map_tile_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".into(),
            chart_theme: ChartTheme::default(),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
