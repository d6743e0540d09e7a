use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::json;

use boat_ride::models::{Label, RideScore};

use crate::cli::MapArgs;

/// A `score --out` report, or a bare array of score records.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapInput {
    Report { trip_id: String, scores: Vec<RideScore> },
    Records(Vec<RideScore>),
}

fn label_color(label: Label) -> &'static str {
    match label {
        Label::Great => "#2ecc71",
        Label::Ok => "#f1c40f",
        Label::Rough => "#e67e22",
        Label::Avoid => "#e74c3c",
    }
}

pub async fn exec(args: MapArgs) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(&args.report)
        .await
        .with_context(|| format!("Failed to read score report {}", args.report.display()))?;
    let (trip_id, scores) = match serde_json::from_str(&json).context("Malformed score report")? {
        MapInput::Report { trip_id, scores } => (trip_id, scores),
        MapInput::Records(scores) => ("trip".to_string(), scores),
    };
    if scores.is_empty() {
        bail!("No scores in {}", args.report.display());
    }

    let out = args
        .out
        .unwrap_or_else(|| args.report.with_extension("html"));
    let html = render(&trip_id, &scores)?;
    tokio::fs::write(&out, html)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    log::info!("Wrote map of {} points to {}", scores.len(), out.display());
    println!("Wrote: {}", out.display());
    Ok(())
}

/// JSON safe to inline in a `<script>` element.
fn script_json(value: &serde_json::Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Leaflet page with one marker per record and legs colored by the label at their start.
pub fn render(trip_id: &str, scores: &[RideScore]) -> anyhow::Result<String> {
    let points: Vec<serde_json::Value> = scores
        .iter()
        .map(|s| {
            json!({
                "lat": s.lat,
                "lon": s.lon,
                "t": s.t_local,
                "score": s.score,
                "label": s.label,
                "name": s.env.notes.get("route_name"),
                "reasons": s.reasons,
                "penalties": s.penalties,
                "waterway": s.env.waterway,
            })
        })
        .collect();
    let legs: Vec<serde_json::Value> = scores
        .windows(2)
        .map(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            json!({
                "a": [a.lat, a.lon],
                "b": [b.lat, b.lon],
                "color": label_color(a.label),
                "label": a.label,
                "score": a.score,
                "t": a.t_local,
            })
        })
        .collect();

    let points = script_json(&serde_json::Value::Array(points))?;
    let legs = script_json(&serde_json::Value::Array(legs))?;
    let title = escape_html(trip_id);

    Ok(format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Boat ride: {title}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
  <style>
    body {{ margin: 0; font-family: system-ui, sans-serif; }}
    #map {{ height: 100vh; width: 100vw; }}
    .popup pre {{ white-space: pre-wrap; font-size: 12px; }}
  </style>
</head>
<body>
<div id="map"></div>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script>
  const points = {points};
  const legs = {legs};
  const map = L.map('map');

  L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
    maxZoom: 18,
    attribution: '&copy; OpenStreetMap contributors'
  }}).addTo(map);

  const esc = (v) => String(v ?? '').replace(/[&<>"]/g, (c) => ({{'&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;'}})[c]);

  points.forEach((p) => {{
    const popup = `<div class="popup">
      <b>${{esc(p.name || p.t)}}</b><br/>
      <b>Time:</b> ${{esc(p.t)}}<br/>
      <b>Score:</b> ${{p.score}} (${{esc(p.label)}})<br/>
      <b>Waterway:</b> ${{esc(p.waterway || 'unknown')}}<br/>
      <b>Lat/Lon:</b> ${{p.lat.toFixed(5)}}, ${{p.lon.toFixed(5)}}<br/>
      <b>Reasons:</b> ${{esc(p.reasons.join('; ') || 'none')}}
      <pre>${{esc(JSON.stringify(p.penalties, null, 2))}}</pre>
    </div>`;
    L.circleMarker([p.lat, p.lon], {{ radius: 5 }}).addTo(map).bindPopup(popup);
  }});

  legs.forEach((leg) => {{
    const popup = `<div class="popup"><b>${{esc(leg.t)}}</b><br/>${{esc(leg.label)}} (${{leg.score}})</div>`;
    L.polyline([leg.a, leg.b], {{ color: leg.color, weight: 6, opacity: 0.9 }}).addTo(map).bindPopup(popup);
  }});

  map.fitBounds(L.latLngBounds(points.map((p) => [p.lat, p.lon])).pad(0.2));
</script>
</body>
</html>
"#
    ))
}
