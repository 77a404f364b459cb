/// A geographic point derived from the `latitude` and `longitude` shipment properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Builds a point when both coordinates are finite and within WGS84 bounds.
    pub fn new(longitude: f64, latitude: f64) -> Option<Self> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);

        valid.then_some(Self {
            longitude,
            latitude,
        })
    }
}

/// Everything the warehouse needs to archive one shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentPayload {
    pub uid: String,
    pub org_uid: String,
    /// `properties` serialized as canonical JSON (object keys sorted).
    pub properties_json: String,
    pub geo_point: Option<GeoPoint>,
}
