use etl::types::ShipmentPayload;
use gcp_bigquery_client::model::query_parameter::QueryParameter;
use gcp_bigquery_client::model::query_parameter_type::QueryParameterType;
use gcp_bigquery_client::model::query_parameter_value::QueryParameterValue;
use gcp_bigquery_client::model::query_request::QueryRequest;

/// Geography column filled from the shipment coordinates.
pub const GEO_POINT_COLUMN: &str = "geo_point";

/// Builds the insert statement for one shipment.
///
/// Only the already sanitized table name is placed into the text, every value is a named
/// parameter. Without coordinates the geography column is set to `null`.
pub fn insert_statement(full_table_name: &str, with_geo_point: bool) -> String {
    let geo_point = if with_geo_point {
        "st_geogpoint(@longitude, @latitude)"
    } else {
        "null"
    };

    format!(
        "insert into {full_table_name} (uid, org_uid, properties, {GEO_POINT_COLUMN}) \
         values (@uid, @org_uid, parse_json(@properties), {geo_point})"
    )
}

fn scalar_parameter(name: &str, r#type: &str, value: String) -> QueryParameter {
    QueryParameter {
        name: Some(name.to_string()),
        parameter_type: Some(QueryParameterType {
            r#type: r#type.to_string(),
            array_type: None,
            struct_types: None,
        }),
        parameter_value: Some(QueryParameterValue {
            value: Some(value),
            array_values: None,
            struct_values: None,
        }),
    }
}

/// Returns the named parameters bound by [`insert_statement`].
pub fn insert_parameters(shipment: &ShipmentPayload) -> Vec<QueryParameter> {
    let mut parameters = vec![
        scalar_parameter("uid", "STRING", shipment.uid.clone()),
        scalar_parameter("org_uid", "STRING", shipment.org_uid.clone()),
        scalar_parameter("properties", "STRING", shipment.properties_json.clone()),
    ];

    if let Some(geo_point) = shipment.geo_point {
        parameters.push(scalar_parameter(
            "longitude",
            "FLOAT64",
            geo_point.longitude.to_string(),
        ));
        parameters.push(scalar_parameter(
            "latitude",
            "FLOAT64",
            geo_point.latitude.to_string(),
        ));
    }

    parameters
}

/// Builds the complete query request inserting `shipment`.
pub fn insert_request(full_table_name: &str, shipment: &ShipmentPayload) -> QueryRequest {
    let statement = insert_statement(full_table_name, shipment.geo_point.is_some());

    let mut request = QueryRequest::new(statement);
    request.parameter_mode = Some("NAMED".to_string());
    request.query_parameters = Some(insert_parameters(shipment));

    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl::types::GeoPoint;

    fn shipment(geo_point: Option<GeoPoint>) -> ShipmentPayload {
        ShipmentPayload {
            uid: "shp_1".to_string(),
            org_uid: "org_1".to_string(),
            properties_json: r#"{"note":"it's \"fragile\""}"#.to_string(),
            geo_point,
        }
    }

    fn parameter_values(parameters: &[QueryParameter]) -> Vec<(String, String, String)> {
        parameters
            .iter()
            .map(|parameter| {
                (
                    parameter.name.clone().unwrap(),
                    parameter.parameter_type.as_ref().unwrap().r#type.clone(),
                    parameter
                        .parameter_value
                        .as_ref()
                        .unwrap()
                        .value
                        .clone()
                        .unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_statement_with_geo_point() {
        assert_eq!(
            insert_statement("`p.logs.shipments`", true),
            "insert into `p.logs.shipments` (uid, org_uid, properties, geo_point) \
             values (@uid, @org_uid, parse_json(@properties), st_geogpoint(@longitude, @latitude))"
        );
    }

    #[test]
    fn test_statement_without_geo_point() {
        assert_eq!(
            insert_statement("`p.logs.shipments`", false),
            "insert into `p.logs.shipments` (uid, org_uid, properties, geo_point) \
             values (@uid, @org_uid, parse_json(@properties), null)"
        );
    }

    #[test]
    fn test_parameters_bind_coordinates_in_point_order() {
        let parameters = insert_parameters(&shipment(GeoPoint::new(-74.0, 40.7)));

        assert_eq!(
            parameter_values(&parameters)[3..],
            [
                ("longitude".to_string(), "FLOAT64".to_string(), "-74".to_string()),
                ("latitude".to_string(), "FLOAT64".to_string(), "40.7".to_string()),
            ]
        );
    }

    #[test]
    fn test_properties_are_bound_verbatim() {
        let request = insert_request("`p.logs.shipments`", &shipment(None));

        assert_eq!(request.parameter_mode.as_deref(), Some("NAMED"));
        assert!(!request.query.contains("fragile"));

        let values = parameter_values(request.query_parameters.as_deref().unwrap());
        assert_eq!(values.len(), 3);
        assert_eq!(
            values[2],
            (
                "properties".to_string(),
                "STRING".to_string(),
                r#"{"note":"it's \"fragile\""}"#.to_string()
            )
        );
    }
}
