use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{GeoPoint, Record, ShipmentPayload, Value};

/// Column holding the owning organization identifier.
pub const ORG_UID_COLUMN: &str = "org_uid";

/// Column holding the nested shipment properties.
pub const PROPERTIES_COLUMN: &str = "properties";

const LATITUDE_KEY: &str = "latitude";
const LONGITUDE_KEY: &str = "longitude";

/// Narrows a decoded [`Record`] into the payload written to the warehouse.
///
/// The identifier must be a non-empty string, the organization a string (possibly empty, which
/// is how NULL decodes) and `properties` a JSON object. Any other shape is reported as
/// [`ErrorKind::RecordShapeInvalid`]. The geographic point is optional and never fails the
/// record.
pub fn extract_shipment(record: &Record, uid_column: &str) -> EtlResult<ShipmentPayload> {
    let uid = match record.get(uid_column) {
        Some(Value::String(uid)) if !uid.is_empty() => uid.clone(),
        Some(Value::String(_)) => bail!(
            ErrorKind::RecordShapeInvalid,
            "Record identifier is empty",
            format!("column `{uid_column}` is null or empty")
        ),
        Some(other) => bail!(
            ErrorKind::RecordShapeInvalid,
            "Record identifier is not a string",
            format!("column `{uid_column}` holds a {}", other.type_name())
        ),
        None => bail!(
            ErrorKind::RecordShapeInvalid,
            "Record identifier is missing",
            format!("column `{uid_column}` is not selected")
        ),
    };

    let org_uid = match record.get(ORG_UID_COLUMN) {
        Some(Value::String(org_uid)) => org_uid.clone(),
        Some(other) => bail!(
            ErrorKind::RecordShapeInvalid,
            "Record organization is not a string",
            format!("shipment `{uid}`: `{ORG_UID_COLUMN}` holds a {}", other.type_name())
        ),
        None => bail!(
            ErrorKind::RecordShapeInvalid,
            "Record organization is missing",
            format!("shipment `{uid}`: column `{ORG_UID_COLUMN}` is not selected")
        ),
    };

    let Some(properties) = record.get(PROPERTIES_COLUMN) else {
        bail!(
            ErrorKind::RecordShapeInvalid,
            "Record properties are missing",
            format!("shipment `{uid}`: column `{PROPERTIES_COLUMN}` is not selected")
        );
    };
    let Some(properties) = properties.as_json_object() else {
        bail!(
            ErrorKind::RecordShapeInvalid,
            "Record properties are not a JSON object",
            format!(
                "shipment `{uid}`: `{PROPERTIES_COLUMN}` holds a {}",
                properties.type_name()
            )
        );
    };

    let geo_point = extract_geo_point(properties);
    if geo_point.is_none() {
        debug!(%uid, "shipment has no usable coordinates");
    }

    // `serde_json::Map` is ordered by key, which makes the serialization canonical.
    let properties_json = serde_json::to_string(properties)?;

    Ok(ShipmentPayload {
        uid,
        org_uid,
        properties_json,
        geo_point,
    })
}

/// Reads `latitude` and `longitude` from the top level of `properties`.
///
/// Both must be JSON numbers forming a valid coordinate, otherwise no point is derived.
pub fn extract_geo_point(properties: &Map<String, JsonValue>) -> Option<GeoPoint> {
    let latitude = properties.get(LATITUDE_KEY)?.as_f64()?;
    let longitude = properties.get(LONGITUDE_KEY)?.as_f64()?;

    GeoPoint::new(longitude, latitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(properties: Value) -> Record {
        Record::from_iter([
            ("uid", Value::from("shp_1")),
            ("org_uid", Value::from("org_1")),
            ("properties", properties),
        ])
    }

    #[test]
    fn derives_point_from_coordinates() {
        let shipment = extract_shipment(
            &record(Value::Json(json!({"latitude": 40.7, "longitude": -74.0}))),
            "uid",
        )
        .unwrap();

        assert_eq!(shipment.uid, "shp_1");
        assert_eq!(shipment.org_uid, "org_1");
        assert_eq!(
            shipment.geo_point,
            Some(GeoPoint {
                longitude: -74.0,
                latitude: 40.7
            })
        );
    }

    #[test]
    fn empty_properties_have_no_point() {
        let shipment = extract_shipment(&record(Value::Json(json!({}))), "uid").unwrap();

        assert_eq!(shipment.properties_json, "{}");
        assert!(shipment.geo_point.is_none());
    }

    #[test]
    fn partial_or_non_numeric_coordinates_have_no_point() {
        for properties in [
            json!({"latitude": 40.7}),
            json!({"latitude": "40.7", "longitude": -74.0}),
            json!({"latitude": 95.0, "longitude": -74.0}),
            json!({"latitude": null, "longitude": -74.0}),
        ] {
            let shipment = extract_shipment(&record(Value::Json(properties)), "uid").unwrap();
            assert!(shipment.geo_point.is_none());
        }
    }

    #[test]
    fn properties_are_serialized_canonically() {
        let shipment = extract_shipment(
            &record(Value::Json(json!({
                "zone": "b",
                "note": "say \"hi\"\n",
                "address": {"street": "Main"}
            }))),
            "uid",
        )
        .unwrap();

        assert_eq!(
            shipment.properties_json,
            r#"{"address":{"street":"Main"},"note":"say \"hi\"\n","zone":"b"}"#
        );
    }

    #[test]
    fn properties_must_be_an_object() {
        for properties in [
            Value::from(""),
            Value::Json(json!([1, 2])),
            Value::I64(3),
        ] {
            let err = extract_shipment(&record(properties), "uid").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RecordShapeInvalid);
        }
    }

    #[test]
    fn identifier_must_be_present_and_non_empty() {
        let missing = Record::from_iter([
            ("org_uid", Value::from("org_1")),
            ("properties", Value::Json(json!({}))),
        ]);
        let empty = Record::from_iter([
            ("uid", Value::from("")),
            ("org_uid", Value::from("org_1")),
            ("properties", Value::Json(json!({}))),
        ]);

        for record in [missing, empty] {
            let err = extract_shipment(&record, "uid").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RecordShapeInvalid);
        }
    }

    #[test]
    fn null_organization_is_accepted() {
        let record = Record::from_iter([
            ("uid", Value::from("shp_2")),
            ("org_uid", Value::from("")),
            ("properties", Value::Json(json!({}))),
        ]);

        let shipment = extract_shipment(&record, "uid").unwrap();

        assert_eq!(shipment.org_uid, "");
    }

    #[test]
    fn custom_identifier_column_is_used() {
        let record = Record::from_iter([
            ("shipment_uid", Value::from("shp_3")),
            ("org_uid", Value::from("org_1")),
            ("properties", Value::Json(json!({}))),
        ]);

        assert_eq!(
            extract_shipment(&record, "shipment_uid").unwrap().uid,
            "shp_3"
        );
    }
}
