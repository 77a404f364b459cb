use serde_json::json;

use crate::types::{Record, Value};

/// Builds a shipment record the way the row decoder would produce it.
pub fn shipment_record(uid: &str, org_uid: &str, properties: serde_json::Value) -> Record {
    Record::from_iter([
        ("uid", Value::from(uid)),
        ("org_uid", Value::from(org_uid)),
        ("status", Value::from("delivered")),
        ("properties", Value::Json(properties)),
    ])
}

/// Builds a shipment record located in New York.
pub fn located_shipment_record(uid: &str) -> Record {
    shipment_record(
        uid,
        "org_1",
        json!({"latitude": 40.7, "longitude": -74.0, "carrier": "ups"}),
    )
}

/// Builds a shipment record without any coordinates.
pub fn unlocated_shipment_record(uid: &str) -> Record {
    shipment_record(uid, "org_1", json!({}))
}
