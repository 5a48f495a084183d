use crate::chart::RadarChart;
use crate::dashboard::Dashboard;
use crate::map::MapView;
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;

const CHART_SIZE: f64 = 420.0;

#[derive(Clone, PartialEq)]
pub struct LabelView {
    pub x: String,
    pub y: String,
    pub anchor: &'static str,
    pub text: String,
}

#[derive(Clone, PartialEq)]
pub struct DotView {
    pub cx: String,
    pub cy: String,
    pub annotation: String,
}

#[derive(Clone, PartialEq)]
pub struct ChartView {
    pub canvas: String,
    pub size: String,
    pub background: &'static str,
    pub fill: &'static str,
    pub stroke: &'static str,
    pub grid: &'static str,
    pub text: &'static str,
    pub series_label: String,
    pub polygon: String,
    pub rings: Vec<String>,
    pub spokes: Vec<(String, String, String, String)>,
    pub labels: Vec<LabelView>,
    pub dots: Vec<DotView>,
}

#[derive(Clone, PartialEq)]
pub struct TileView {
    pub url: String,
    pub style: String,
}

#[derive(Clone, PartialEq)]
pub struct MarkerView {
    pub cx: String,
    pub cy: String,
    pub r: String,
    pub color: &'static str,
    pub popup: String,
}

#[derive(Clone, PartialEq)]
pub struct MapPanel {
    pub container: String,
    pub style: String,
    pub tiles: Vec<TileView>,
    pub markers: Vec<MarkerView>,
    pub width: String,
    pub height: String,
}

#[derive(Clone, PartialEq, Props)]
pub struct LiveProps {
    pub generation: u64,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
    pub empty: bool,
    pub alert: Option<String>,
    pub error: Option<String>,
    pub chart: Option<ChartView>,
    pub map: Option<MapPanel>,
}

impl LiveProps {
    pub fn from_dashboard(dash: &Dashboard) -> Self {
        Self {
            generation: dash.generation,
            columns: dash.table.columns.clone(),
            rows: dash.table.rows.clone(),
            empty: dash.table.is_empty(),
            alert: dash.alert.clone(),
            error: dash.last_error.as_ref().map(|e| e.message.clone()),
            chart: dash.chart().map(chart_view),
            map: dash.map().map(map_panel),
        }
    }
}

#[derive(Clone, PartialEq, Props)]
pub struct AppProps {
    pub backend_url: String,
    pub live: LiveProps,
}

pub fn render_html(backend_url: &str, dash: &Dashboard) -> String {
    let mut app = VirtualDom::new_with_props(
        App,
        AppProps {
            backend_url: backend_url.to_string(),
            live: LiveProps::from_dashboard(dash),
        },
    );
    // Build the tree before rendering to avoid SSR panics.
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

/// Inner HTML of the live region, pushed to browsers after every cycle.
pub fn render_live(dash: &Dashboard) -> String {
    let mut app = VirtualDom::new_with_props(Live, LiveProps::from_dashboard(dash));
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

fn fmt(v: f64) -> String {
    format!("{v:.1}")
}

fn chart_view(chart: &RadarChart) -> ChartView {
    let geo = chart.geometry(CHART_SIZE);
    let palette = chart.theme.palette();
    let join = |pts: &[crate::chart::Point]| {
        pts.iter()
            .map(|p| format!("{},{}", fmt(p.x), fmt(p.y)))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let labels = chart
        .points
        .iter()
        .zip(geo.axes.iter())
        .map(|(p, axis)| {
            let dx = axis.x - geo.center.x;
            let anchor = if dx > 1.0 {
                "start"
            } else if dx < -1.0 {
                "end"
            } else {
                "middle"
            };
            LabelView {
                x: fmt(geo.center.x + (axis.x - geo.center.x) * 1.12),
                y: fmt(geo.center.y + (axis.y - geo.center.y) * 1.12),
                anchor,
                text: p.label.clone(),
            }
        })
        .collect();
    let dots = chart
        .points
        .iter()
        .zip(geo.points.iter())
        .map(|(p, pos)| DotView {
            cx: fmt(pos.x),
            cy: fmt(pos.y),
            annotation: p.annotation.join("\n"),
        })
        .collect();

    ChartView {
        canvas: chart.canvas.clone(),
        size: fmt(CHART_SIZE),
        background: palette.background,
        fill: palette.fill,
        stroke: palette.stroke,
        grid: palette.grid,
        text: palette.text,
        series_label: format!("{} (max {})", chart.series_label, geo.scale_max),
        polygon: join(&geo.points),
        rings: geo.rings.iter().map(|ring| join(ring)).collect(),
        spokes: geo
            .axes
            .iter()
            .map(|a| (fmt(geo.center.x), fmt(geo.center.y), fmt(a.x), fmt(a.y)))
            .collect(),
        labels,
        dots,
    }
}

fn map_panel(map: &MapView) -> MapPanel {
    let tiles = map
        .tiles()
        .into_iter()
        .map(|t| TileView {
            style: format!("left:{}px;top:{}px;", fmt(t.left), fmt(t.top)),
            url: t.url,
        })
        .collect();
    let markers = map
        .markers()
        .iter()
        .map(|m| {
            let (x, y) = map.to_screen(m.position);
            MarkerView {
                cx: fmt(x),
                cy: fmt(y),
                r: m.radius.to_string(),
                color: m.color,
                popup: m.popup.join("\n"),
            }
        })
        .collect();
    MapPanel {
        container: map.container.clone(),
        style: format!("width:{}px;height:{}px;", map.width, map.height),
        tiles,
        markers,
        width: fmt(map.width),
        height: fmt(map.height),
    }
}

#[component]
fn Live(props: LiveProps) -> Element {
    rsx! {
        if let Some(error) = props.error.clone() {
            div { class: "status error", "Last cycle failed: {error}" }
        }
        if let Some(alert) = props.alert.clone() {
            div { id: "alert", class: "alert", "{alert}" }
        } else {
            div { id: "alert", class: "alert empty" }
        }
        div { class: "card",
            h2 { class: "card-title", "Devices" }
            table { id: "deviceTable",
                thead {
                    tr {
                        for col in props.columns.iter() {
                            th { "{col}" }
                        }
                    }
                }
                tbody {
                    for row in props.rows.iter() {
                        tr {
                            for cell in row.iter() {
                                td { "{cell}" }
                            }
                        }
                    }
                }
            }
            if props.empty {
                p { class: "caption", "No devices in the last result" }
            }
        }
        if let Some(chart) = props.chart.clone() {
            div { class: "card",
                h2 { class: "card-title", "{chart.series_label}" }
                svg {
                    id: "{chart.canvas}",
                    "width": "{chart.size}",
                    "height": "{chart.size}",
                    "viewBox": "0 0 {chart.size} {chart.size}",
                    style: "background:{chart.background}",
                    for ring in chart.rings.iter() {
                        polygon { "points": "{ring}", "fill": "none", "stroke": "{chart.grid}" }
                    }
                    for (x1, y1, x2, y2) in chart.spokes.iter() {
                        line { "x1": "{x1}", "y1": "{y1}", "x2": "{x2}", "y2": "{y2}", "stroke": "{chart.grid}" }
                    }
                    polygon { "points": "{chart.polygon}", "fill": "{chart.fill}", "stroke": "{chart.stroke}", "stroke-width": "1" }
                    for dot in chart.dots.iter() {
                        circle { "cx": "{dot.cx}", "cy": "{dot.cy}", "r": "3", "fill": "{chart.stroke}",
                            title { "{dot.annotation}" }
                        }
                    }
                    for label in chart.labels.iter() {
                        text { "x": "{label.x}", "y": "{label.y}", "fill": "{chart.text}", "text-anchor": "{label.anchor}", "font-size": "12", "{label.text}" }
                    }
                }
            }
        }
        if let Some(map) = props.map.clone() {
            div { class: "card",
                h2 { class: "card-title", "Map" }
                div { id: "{map.container}", class: "map", style: "{map.style}",
                    for tile in map.tiles.iter() {
                        img { class: "tile", src: "{tile.url}", style: "{tile.style}", alt: "" }
                    }
                    svg { class: "overlay", "width": "{map.width}", "height": "{map.height}",
                        for marker in map.markers.iter() {
                            circle { "cx": "{marker.cx}", "cy": "{marker.cy}", "r": "{marker.r}",
                                "fill": "{marker.color}", "stroke": "{marker.color}", "fill-opacity": "0.7",
                                title { "{marker.popup}" }
                            }
                        }
                    }
                }
                p { class: "caption", "Map data © OpenStreetMap contributors" }
            }
        }
    }
}

#[component]
fn App(props: AppProps) -> Element {
    let styles = r#"
* { box-sizing: border-box; }
body, html { margin: 0; padding: 0; background: #f3f5f9; }
.page { min-height: 100vh; display: flex; justify-content: center; padding: 32px 16px; color: #1d2433; font-family: "Inter", system-ui, -apple-system, sans-serif; }
.shell { width: min(960px, 100%); display: flex; flex-direction: column; gap: 12px; }
.title { font-size: 26px; margin: 0; }
.subtitle { margin: 0; color: #5d667a; font-size: 15px; }
.card { background: #fff; border: 1px solid #dfe3ea; border-radius: 14px; padding: 20px; box-shadow: 0 8px 24px rgba(20,30,50,0.06); }
.card-title { margin: 0 0 12px 0; font-size: 18px; }
.scan-form { display: flex; flex-wrap: wrap; gap: 10px; align-items: center; }
.scan-form input { width: 140px; padding: 9px 10px; border-radius: 8px; border: 1px solid #c9ced8; }
.pill-btn { padding: 9px 14px; border-radius: 10px; border: 1px solid #c9ced8; background: #1d2433; color: #fff; font-weight: 700; cursor: pointer; }
.status { color: #5d667a; font-size: 14px; min-height: 18px; }
.status.error { color: #b3261e; }
.alert { padding: 12px 14px; border-radius: 10px; background: #ffe8e6; color: #8c1d18; font-weight: 700; }
.alert.empty { display: none; }
table { width: 100%; border-collapse: collapse; font-size: 14px; }
th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #eceff4; }
.map { position: relative; overflow: hidden; border-radius: 10px; background: #dde3ea; }
.map .tile { position: absolute; width: 256px; height: 256px; }
.map .overlay { position: absolute; left: 0; top: 0; }
.caption { margin: 6px 0 0 0; color: #7c859c; font-size: 12px; }
"#;

    let script = r#"
(() => {
  const live = document.getElementById('live');
  const status = document.getElementById('scan-status');
  const form = document.getElementById('scan-form');
  const refresh = document.getElementById('refresh-btn');
  let ws;

  async function post(url, body) {
    const res = await fetch(url, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: body ? JSON.stringify(body) : undefined,
    });
    if (!res.ok) {
      const text = await res.text();
      throw new Error(text || res.statusText);
    }
    return res.json();
  }

  form?.addEventListener('submit', async (evt) => {
    evt.preventDefault();
    status.textContent = 'Scanning...';
    try {
      const data = await post('/api/scan', {
        latitude: document.getElementById('lat').value,
        longitude: document.getElementById('lon').value,
      });
      status.textContent = `${data.table.rows.length} devices found`;
    } catch (err) {
      status.textContent = err.message;
    }
  });

  refresh?.addEventListener('click', async () => {
    status.textContent = 'Polling...';
    try {
      await post('/api/poll');
      status.textContent = '';
    } catch (err) {
      status.textContent = err.message;
    }
  });

  function connect() {
    const proto = location.protocol === 'https:' ? 'wss' : 'ws';
    ws = new WebSocket(`${proto}://${location.host}/ws/dashboard`);
    ws.onmessage = (evt) => { live.innerHTML = evt.data; };
    ws.onerror = () => ws && ws.close();
    ws.onclose = () => setTimeout(connect, 2000);
  }

  connect();
})();
"#;

    rsx! {
        div { class: "page",
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            div { class: "shell",
                div { class: "header",
                    h1 { class: "title", "Wi-Fi Radar" }
                    p { class: "subtitle", "Devices reported by {props.backend_url}" }
                }
                div { class: "card",
                    form { id: "scan-form", class: "scan-form",
                        input { id: "lat", name: "lat", placeholder: "Latitude" }
                        input { id: "lon", name: "lon", placeholder: "Longitude" }
                        button { class: "pill-btn", r#type: "submit", "Scan here" }
                        button { id: "refresh-btn", class: "pill-btn", r#type: "button", "Refresh" }
                        a { class: "pill-btn", href: "/download/csv", "Download CSV" }
                    }
                    div { id: "scan-status", class: "status" }
                }
                div { id: "live", "data-generation": "{props.live.generation}",
                    Live {
                        generation: props.live.generation,
                        columns: props.live.columns.clone(),
                        rows: props.live.rows.clone(),
                        empty: props.live.empty,
                        alert: props.live.alert.clone(),
                        error: props.live.error.clone(),
                        chart: props.live.chart.clone(),
                        map: props.live.map.clone(),
                    }
                }
            }
        }
        style { "{styles}" }
        script { "{script}" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::devices::{BaseLocation, GeoDevice, PassiveDevice, ScanResult};
    use crate::map::MarkerKind;

    #[test]
    fn live_fragment_lists_rows_and_alert() {
        let mut dash = Dashboard::new(&AppConfig::default());
        dash.render(&ScanResult::Passive {
            devices: vec![PassiveDevice {
                ip: "10.0.0.5".into(),
                mac: "AA:BB:CC:DD:EE:01".into(),
                name: Some("Phone".into()),
                zone: Some("Living Room".into()),
                distance: 3.2,
            }],
            new_devices: vec!["Phone".into()],
        });

        let html = render_live(&dash);
        assert_eq!(html.matches("<tr>").count(), 2);
        assert!(html.contains("Living Room"));
        assert!(html.contains("New device connected: Phone"));
        assert!(html.contains("radarChart"));
        assert!(!html.contains("class=\"map\""));
    }

    #[test]
    fn page_embeds_map_markers_for_geolocated_scans() {
        let mut dash = Dashboard::new(&AppConfig::default());
        dash.render(&ScanResult::Active {
            base: BaseLocation { lat: 40.0, lon: -3.0 },
            devices: vec![GeoDevice {
                ip: "192.168.1.4".into(),
                mac: "AA:BB:CC:DD:EE:04".into(),
                name: None,
                rssi: -58.0,
                distance_m: 3.16,
                lat: 40.00002,
                lon: -3.00003,
            }],
        });

        let live = LiveProps::from_dashboard(&dash);
        let map = live.map.expect("map panel");
        assert_eq!(map.markers.len(), 2);
        assert!(map.markers[1].popup.contains("RSSI: -58 dBm"));

        let html = render_html("http://127.0.0.1:5000", &dash);
        assert!(html.contains("Wi-Fi Radar"));
        assert!(html.contains("tile.openstreetmap.org"));
        assert_eq!(dash.map().map(|m| m.markers()[0].kind), Some(MarkerKind::Base));
    }
}
