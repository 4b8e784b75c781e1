//! GeoJSON `FeatureCollection` rendering of incident records.
//!
//! One feature per record. The primary point is `[meta.longitude,
//! meta.latitude]`; events with their own coordinates add further points
//! unless the exact `[lon, lat]` pair is already present. One point yields
//! a `Point` geometry, more yield a `MultiPoint`. `places` runs parallel to
//! the point list.

use crate::model::incident::IncidentRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Renders `records` as a FeatureCollection.
///
/// Records should already be redacted for the caller; any `private`
/// mapping still present is merged into `properties`.
pub fn to_feature_collection(records: &[IncidentRecord]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": records.iter().map(to_feature).collect::<Vec<_>>(),
    })
}

pub fn to_feature(record: &IncidentRecord) -> Value {
    let meta = &record.meta;
    let mut points = vec![[meta.longitude, meta.latitude]];
    let mut places = vec![place(meta.place_id.as_ref(), meta.place_name.as_deref())];

    for event in meta.events.iter().flatten() {
        let Some(point) = event.coordinates() else {
            continue;
        };
        if points.contains(&point) {
            continue;
        }
        points.push(point);
        places.push(place(event.place_id.as_ref(), event.place_name.as_deref()));
    }

    let geometry = if points.len() == 1 {
        json!({"type": "Point", "coordinates": points[0]})
    } else {
        json!({"type": "MultiPoint", "coordinates": points})
    };

    let mut properties = Map::new();
    properties.insert("id".into(), json!(record.name));
    properties.insert("summary".into(), json!(record.description));
    properties.insert("description".into(), json!(meta.description));
    properties.insert("updated".into(), json!(render_ms(record.updated)));
    properties.insert("added".into(), json!(render_ms(record.created)));
    properties.insert("link".into(), json!(meta.link));
    properties.insert("date".into(), json!(render_ms(meta.date)));
    properties.insert("country".into(), json!(meta.country));
    properties.insert("rating".into(), meta.rating.clone().unwrap_or(Value::Null));
    properties.insert("feed".into(), json!(meta.feed));
    properties.insert("disease".into(), json!(meta.disease));
    properties.insert("species".into(), json!(meta.species));
    properties.insert(
        "symptoms".into(),
        meta.extra.get("symptoms").cloned().unwrap_or(Value::Null),
    );
    properties.insert("places".into(), Value::Array(places));

    if let Some(private) = &record.private {
        for (key, value) in private {
            properties.insert(key.clone(), value.clone());
        }
    }

    json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    })
}

fn place(place_id: Option<&Value>, place_name: Option<&str>) -> Value {
    json!({
        "place_id": place_id.cloned().unwrap_or(Value::Null),
        "place_name": place_name,
    })
}

/// RFC 3339 (UTC) for epoch milliseconds; the raw number when out of range.
fn render_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::{render_ms, to_feature};
    use crate::model::incident::{IncidentEvent, IncidentMeta, IncidentRecord};
    use serde_json::json;
    use uuid::Uuid;

    fn record_with_events(events: Vec<IncidentEvent>) -> IncidentRecord {
        let mut meta = IncidentMeta::new(1_393_632_000_000, 1.0, 2.0);
        meta.place_name = Some("Nairobi".into());
        meta.events = Some(events);
        IncidentRecord::new(Uuid::new_v4(), "hm-1", "summary", meta)
    }

    fn event_at(lon: f64, lat: f64, name: &str) -> IncidentEvent {
        IncidentEvent {
            longitude: Some(lon),
            latitude: Some(lat),
            place_name: Some(name.into()),
            ..IncidentEvent::default()
        }
    }

    #[test]
    fn event_at_primary_coordinates_keeps_a_point() {
        let feature = to_feature(&record_with_events(vec![event_at(2.0, 1.0, "same")]));
        assert_eq!(
            feature["geometry"],
            json!({"type": "Point", "coordinates": [2.0, 1.0]})
        );
        assert_eq!(feature["properties"]["places"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn distinct_event_coordinates_become_a_multipoint() {
        let feature = to_feature(&record_with_events(vec![
            event_at(3.0, 4.0, "Mombasa"),
            event_at(3.0, 4.0, "Mombasa again"),
            IncidentEvent::default(),
        ]));
        assert_eq!(
            feature["geometry"],
            json!({"type": "MultiPoint", "coordinates": [[2.0, 1.0], [3.0, 4.0]]})
        );
        assert_eq!(
            feature["properties"]["places"],
            json!([
                {"place_id": null, "place_name": "Nairobi"},
                {"place_id": null, "place_name": "Mombasa"}
            ])
        );
    }

    #[test]
    fn properties_carry_record_fields_and_private_keys() {
        let mut record = record_with_events(Vec::new());
        record.meta.feed = Some("promed".into());
        record.meta.extra.insert("symptoms".into(), json!(["fever"]));
        record.private = Some(json!({"score": 7}).as_object().cloned().unwrap());

        let properties = &to_feature(&record)["properties"];
        assert_eq!(properties["id"], json!("hm-1"));
        assert_eq!(properties["summary"], json!("summary"));
        assert_eq!(properties["feed"], json!("promed"));
        assert_eq!(properties["symptoms"], json!(["fever"]));
        assert_eq!(properties["date"], json!("2014-03-01T00:00:00.000Z"));
        assert_eq!(properties["score"], json!(7));
    }

    #[test]
    fn dates_render_as_rfc3339() {
        assert_eq!(render_ms(0), "1970-01-01T00:00:00.000Z");
    }
}
