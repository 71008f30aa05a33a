//! `/` and `/display_data`: human-readable HTML views.

use std::fmt::Write;

use axum::{extract::State, response::Html, routing::get, Router};

use crate::models::{Measurement, SensorSample};
use crate::{QueryService, TelemetryRecord};

// ---

pub fn router() -> Router<QueryService> {
    // ---
    Router::new()
        .route("/", get(status_page))
        .route("/display_data", get(history_page))
}

fn cell(m: Measurement, unit: &str) -> String {
    match m.value() {
        Some(v) => format!("{v:.1}{unit}"),
        None => "--".to_string(),
    }
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"10\"><title>{title}</title></head>\
         <body><h1>{title}</h1>\n{body}</body></html>\n"
    ))
}

/// Live reading and node status.
async fn status_page(State(service): State<QueryService>) -> Html<String> {
    // ---
    let mut body = String::new();
    let link = service.connectivity();
    let _ = writeln!(
        body,
        "<p>Network: {:?} &middot; {} of {} records retained</p>",
        link.state,
        service.record_count(),
        service.config().history_capacity
    );

    match service.live() {
        Some(live) => {
            let _ = writeln!(body, "<p>Sampled at {}</p>\n<table>", live.timestamp);
            body.push_str("<tr><th>Sensor</th><th>Temp</th><th>Humidity</th></tr>\n");
            for (i, SensorSample { temperature, humidity }) in live.samples.iter().enumerate() {
                let _ = writeln!(
                    body,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    i + 1,
                    cell(*temperature, " &deg;F"),
                    cell(*humidity, " %")
                );
            }
            body.push_str("</table>\n");
        }
        None => body.push_str("<p>No reading yet.</p>\n"),
    }

    body.push_str("<p><a href=\"/display_data\">History</a></p>\n");
    page("Telemetry node", &body)
}

/// The retained history as a table, newest first.
async fn history_page(State(service): State<QueryService>) -> Html<String> {
    // ---
    let records = service.records(service.config().history_capacity);
    page("Telemetry history", &history_table(&records))
}

fn history_table(records: &[TelemetryRecord]) -> String {
    // ---
    let Some(first) = records.first() else {
        return "<p>No records.</p>\n".to_string();
    };

    let mut out = String::from("<table>\n<tr><th>Time</th>");
    for i in 1..=first.sensor_count() {
        let _ = write!(out, "<th>T{i}</th><th>H{i}</th>");
    }
    out.push_str("</tr>\n");

    for record in records {
        let _ = write!(out, "<tr><td>{}</td>", record.timestamp);
        for (t, h) in record.temp.iter().zip(&record.humidity) {
            let _ = write!(out, "<td>{}</td><td>{}</td>", cell(*t, ""), cell(*h, ""));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}
