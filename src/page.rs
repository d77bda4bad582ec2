use crate::popup::escape_html;
use crate::write_output_file;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_CENTER: (f64, f64) = (37.90, -94.66); // continental US view
pub const DEFAULT_ZOOM: u8 = 4;
pub const DEFAULT_TILE_URL: &str = "https://{s}.tile.osm.org/{z}/{x}/{y}.png";
pub const DEFAULT_ATTRIBUTION: &str =
    "&copy; <a href=\"https://osm.org/copyright\">OpenStreetMap</a> contributors";

const LEAFLET_CSS_URL: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS_URL: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

/// Viewport and base-layer parameters for the emitted page. The defaults
/// frame the continental US over the public OSM tile service.
#[derive(Debug, Clone)]
pub struct MapView {
    pub center: (f64, f64),
    pub zoom: u8,
    pub tile_url: String,
    pub attribution: String,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            tile_url: DEFAULT_TILE_URL.to_string(),
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }
}

/// One marker as embedded into the page script: position plus pre-built
/// popup markup.
#[derive(Debug, Serialize)]
pub struct MarkerData {
    pub lat: f64,
    pub lon: f64,
    pub popup: String,
}

pub struct MapPageContext<'a> {
    pub(crate) title: &'a str,
    pub(crate) source: &'a str,
    pub(crate) generated_at: &'a DateTime<Local>,
    pub(crate) view: &'a MapView,
    pub(crate) markers: &'a [MarkerData],
}

pub async fn save_map_page(output_path: &Path, context: &MapPageContext<'_>) -> Result<()> {
    let html = render_map_page(context)?;
    write_output_file(output_path, html.as_bytes()).await
}

/// Renders the self-contained map page: Leaflet from its CDN, the base tile
/// layer attached first, then the marker layer built from the embedded grant
/// data. An empty marker list still yields a complete page.
pub fn render_map_page(context: &MapPageContext<'_>) -> Result<String> {
    let generated_at = context
        .generated_at
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();
    let markers_json = embed_json(context.markers)?;
    let tile_url_json = embed_json(&context.view.tile_url)?;
    let attribution_json = embed_json(&context.view.attribution)?;
    let (center_lat, center_lon) = context.view.center;

    let mut html = String::with_capacity(4096 + markers_json.len());
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(context.title)));
    html.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"{LEAFLET_CSS_URL}\">\n"
    ));
    html.push_str(&format!("<script src=\"{LEAFLET_JS_URL}\"></script>\n"));
    html.push_str("<style>\n");
    html.push_str(PAGE_STYLE);
    html.push_str("\n</style>\n</head>\n<body>\n");
    html.push_str("<div id=\"map\"></div>\n");
    html.push_str("<div class=\"panel\">\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(context.title)));
    html.push_str(&format!(
        "<div class=\"meta\">{} grants plotted</div>\n",
        context.markers.len()
    ));
    html.push_str(&format!(
        "<div class=\"meta\">Source: <span class=\"mono\">{}</span></div>\n",
        escape_html(context.source)
    ));
    html.push_str(&format!(
        "<div class=\"meta\">Generated <span class=\"mono\">{}</span></div>\n",
        escape_html(&generated_at)
    ));
    html.push_str("</div>\n");
    html.push_str("<script>\n");
    html.push_str(&format!("const GRANTS = {markers_json};\n"));
    html.push_str(&format!(
        "const basemap = L.tileLayer({tile_url_json}, {{ attribution: {attribution_json} }});\n"
    ));
    html.push_str("const grantLayer = L.layerGroup();\n");
    html.push_str("for (const grant of GRANTS) {\n");
    html.push_str("  L.marker([grant.lat, grant.lon]).bindPopup(grant.popup).addTo(grantLayer);\n");
    html.push_str("}\n");
    html.push_str(&format!(
        "const map = L.map(\"map\").setView([{center_lat}, {center_lon}], {});\n",
        context.view.zoom
    ));
    html.push_str("basemap.addTo(map);\n");
    html.push_str("grantLayer.addTo(map);\n");
    html.push_str("</script>\n</body>\n</html>\n");
    Ok(html)
}

// JSON destined for a <script> block; '<' is escaped so marker popups can
// never terminate the surrounding script element.
fn embed_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).context("failed to serialize embedded page data")?;
    Ok(json.replace('<', "\\u003c"))
}

const PAGE_STYLE: &str = r"
html,
body {
  height: 100%;
  margin: 0;
}

#map {
  height: 100%;
}

.panel {
  position: absolute;
  top: 12px;
  right: 12px;
  z-index: 1000;
  max-width: 320px;
  padding: 12px 16px;
  border-radius: 10px;
  background: rgba(255, 255, 255, 0.92);
  box-shadow: 0 8px 24px rgba(31, 27, 22, 0.18);
  font-family: 'Segoe UI', sans-serif;
}

.panel h1 {
  margin: 0 0 6px;
  font-size: 1.1rem;
}

.panel .meta {
  color: #555;
  font-size: 12px;
}

.panel .mono {
  font-family: ui-monospace, monospace;
}
";

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markers: &[MarkerData]) -> String {
        let generated_at = Local::now();
        let view = MapView::default();
        let context = MapPageContext {
            title: "NEH Grants of the 1960s",
            source: "neh_1960s_grants.geojson",
            generated_at: &generated_at,
            view: &view,
            markers,
        };
        render_map_page(&context).unwrap()
    }

    #[test]
    fn empty_collection_still_produces_a_complete_page() {
        let page = render(&[]);
        assert!(page.contains("const GRANTS = [];"));
        assert!(page.contains("L.tileLayer"));
        assert!(page.contains("tile.osm.org"));
        assert!(page.contains("L.map(\"map\").setView([37.9, -94.66], 4);"));
        assert!(page.contains("0 grants plotted"));
    }

    #[test]
    fn base_layer_attaches_before_the_marker_layer() {
        let page = render(&[]);
        let basemap = page.find("basemap.addTo(map);").unwrap();
        let markers = page.find("grantLayer.addTo(map);").unwrap();
        assert!(basemap < markers);
    }

    #[test]
    fn embedded_popups_cannot_close_the_script_element() {
        let markers = [MarkerData {
            lat: 41.88,
            lon: -87.62,
            popup: "<p>fine</p></script><script>alert(1)</script>".to_string(),
        }];
        let page = render(&markers);
        // Leaflet include plus the inline block, and nothing injected.
        assert_eq!(page.matches("</script>").count(), 2);
        assert!(page.contains("\\u003c/script>"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let generated_at = Local::now();
        let view = MapView::default();
        let markers = [MarkerData {
            lat: 41.88,
            lon: -87.62,
            popup: "<p>popup</p>".to_string(),
        }];
        let context = MapPageContext {
            title: "Grants",
            source: "grants.geojson",
            generated_at: &generated_at,
            view: &view,
            markers: &markers,
        };
        assert_eq!(
            render_map_page(&context).unwrap(),
            render_map_page(&context).unwrap()
        );
    }
}
