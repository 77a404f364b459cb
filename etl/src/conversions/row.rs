use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use futures::{Stream, StreamExt};
use tokio_postgres::Row;
use serde_json::Value as JsonValue;
use tokio_postgres::types::{FromSql, Kind, Type};
use tracing::trace;

use crate::conversions::numeric::PgNumeric;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::types::{Record, Value};

/// Raw binary cell as sent by the server, `None` for SQL NULL.
///
/// Accepts every type so that decoding can be done by [`decode_cell`] based on the column type.
struct RawCell<'a>(Option<&'a [u8]>);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(Some(raw)))
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(None))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Decodes a stream of source rows into [`Record`]s.
///
/// The first failure ends the useful part of the stream: callers must stop at the first error
/// since no partial record is ever produced.
pub fn decode_rows<S>(rows: S) -> impl Stream<Item = EtlResult<Record>>
where
    S: Stream<Item = Result<Row, tokio_postgres::Error>>,
{
    rows.map(|row| match row {
        Ok(row) => decode_row(&row),
        Err(err) => Err(etl_error!(
            ErrorKind::RowDecodeFailed,
            "Failed to fetch source row",
            err.to_string(),
            source: err
        )),
    })
}

/// Decodes every column of `row`, in result set order.
pub fn decode_row(row: &Row) -> EtlResult<Record> {
    let mut fields = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let cell: RawCell<'_> = row.try_get(idx).map_err(|err| {
            etl_error!(
                ErrorKind::RowDecodeFailed,
                "Failed to read column value",
                format!("column `{}`: {err}", column.name()),
                source: err
            )
        })?;

        let value = decode_cell(column.type_(), cell.0).map_err(|err| {
            etl_error!(
                ErrorKind::RowDecodeFailed,
                "Failed to decode column value",
                format!(
                    "column `{}` of type `{}`: {}",
                    column.name(),
                    column.type_(),
                    err.detail().unwrap_or_default()
                )
            )
        })?;

        fields.push((column.name().to_string(), value));
    }

    trace!(columns = fields.len(), "decoded source row");

    Ok(Record::new(fields))
}

/// Decodes one binary cell of type `ty`.
///
/// NULL becomes an empty string and dates and times are rendered as ISO 8601 strings. Arrays of
/// the common element types become JSON arrays with `null` for missing elements. `bytea` and enum
/// labels are read as lossy UTF-8 text. Any other type is kept as text when its binary form is
/// printable UTF-8, and as `\x` prefixed hex otherwise.
pub fn decode_cell(ty: &Type, raw: Option<&[u8]>) -> EtlResult<Value> {
    let Some(raw) = raw else {
        return Ok(Value::String(String::new()));
    };

    let value = match *ty {
        Type::BOOL => Value::Bool(parse::<bool>(ty, raw)?),
        Type::INT2 => Value::I64(i64::from(parse::<i16>(ty, raw)?)),
        Type::INT4 => Value::I64(i64::from(parse::<i32>(ty, raw)?)),
        Type::INT8 => Value::I64(parse::<i64>(ty, raw)?),
        Type::OID => Value::I64(i64::from(parse::<u32>(ty, raw)?)),
        Type::FLOAT4 => Value::F64(f64::from(parse::<f32>(ty, raw)?)),
        Type::FLOAT8 => Value::F64(parse::<f64>(ty, raw)?),
        Type::NUMERIC => Value::Numeric(parse::<PgNumeric>(ty, raw)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Value::String(parse::<String>(ty, raw)?)
        }
        Type::UUID => Value::String(parse::<uuid::Uuid>(ty, raw)?.to_string()),
        Type::DATE => Value::String(parse::<NaiveDate>(ty, raw)?.to_string()),
        Type::TIME => Value::String(parse::<NaiveTime>(ty, raw)?.to_string()),
        Type::TIMESTAMP => Value::String(format_timestamp(parse::<NaiveDateTime>(ty, raw)?)),
        Type::TIMESTAMPTZ => Value::String(format_timestamptz(parse::<DateTime<Utc>>(ty, raw)?)),
        Type::JSON | Type::JSONB => Value::Json(parse::<serde_json::Value>(ty, raw)?),
        Type::BOOL_ARRAY => array::<bool, _>(ty, raw, JsonValue::Bool)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            array::<String, _>(ty, raw, JsonValue::String)?
        }
        Type::INT2_ARRAY => array::<i16, _>(ty, raw, JsonValue::from)?,
        Type::INT4_ARRAY => array::<i32, _>(ty, raw, JsonValue::from)?,
        Type::INT8_ARRAY => array::<i64, _>(ty, raw, JsonValue::from)?,
        Type::OID_ARRAY => array::<u32, _>(ty, raw, JsonValue::from)?,
        Type::FLOAT4_ARRAY => array::<f32, _>(ty, raw, |v| json_float(f64::from(v)))?,
        Type::FLOAT8_ARRAY => array::<f64, _>(ty, raw, json_float)?,
        Type::NUMERIC_ARRAY => array::<PgNumeric, _>(ty, raw, |v| JsonValue::String(v.to_string()))?,
        Type::UUID_ARRAY => array::<uuid::Uuid, _>(ty, raw, |v| JsonValue::String(v.to_string()))?,
        Type::DATE_ARRAY => array::<NaiveDate, _>(ty, raw, |v| JsonValue::String(v.to_string()))?,
        Type::TIME_ARRAY => array::<NaiveTime, _>(ty, raw, |v| JsonValue::String(v.to_string()))?,
        Type::TIMESTAMP_ARRAY => {
            array::<NaiveDateTime, _>(ty, raw, |v| JsonValue::String(format_timestamp(v)))?
        }
        Type::TIMESTAMPTZ_ARRAY => {
            array::<DateTime<Utc>, _>(ty, raw, |v| JsonValue::String(format_timestamptz(v)))?
        }
        Type::JSON_ARRAY | Type::JSONB_ARRAY => array::<JsonValue, _>(ty, raw, |v| v)?,
        Type::BYTEA_ARRAY => array::<Vec<u8>, _>(ty, raw, |v| {
            JsonValue::String(String::from_utf8_lossy(&v).into_owned())
        })?,
        Type::BYTEA => Value::String(String::from_utf8_lossy(raw).into_owned()),
        _ if matches!(ty.kind(), Kind::Enum(_)) => {
            Value::String(String::from_utf8_lossy(raw).into_owned())
        }
        _ => opaque(raw),
    };

    Ok(value)
}

/// Decodes a one dimensional array into a JSON array, mapping each present element.
fn array<'a, T, F>(ty: &Type, raw: &'a [u8], element: F) -> EtlResult<Value>
where
    T: FromSql<'a>,
    F: Fn(T) -> JsonValue,
{
    let elements = parse::<Vec<Option<T>>>(ty, raw)?
        .into_iter()
        .map(|value| value.map(&element).unwrap_or(JsonValue::Null))
        .collect();

    Ok(Value::Json(JsonValue::Array(elements)))
}

/// JSON has no representation for NaN and infinities, they become `null`.
fn json_float(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn format_timestamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn format_timestamptz(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Renders a value of a type without a dedicated mapping.
///
/// Types whose binary form is text (extension types like `citext`) stay readable, anything else
/// uses the `\x` hex notation Postgres uses for `bytea`.
fn opaque(raw: &[u8]) -> Value {
    if let Ok(text) = std::str::from_utf8(raw)
        && !text.chars().any(|c| c.is_control() && !c.is_whitespace())
    {
        return Value::String(text.to_string());
    }

    let mut hex = String::with_capacity(2 + raw.len() * 2);
    hex.push_str("\\x");
    for byte in raw {
        hex.push_str(&format!("{byte:02x}"));
    }

    Value::String(hex)
}

fn parse<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> EtlResult<T> {
    T::from_sql(ty, raw).map_err(|err| {
        EtlError::from((
            ErrorKind::ConversionError,
            "Invalid binary value",
            err.to_string(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_decodes_to_empty_string() {
        for ty in [Type::TEXT, Type::INT8, Type::JSONB, Type::BOOL] {
            assert_eq!(
                decode_cell(&ty, None).unwrap(),
                Value::String(String::new())
            );
        }
    }

    #[test]
    fn scalars_keep_their_native_type() {
        assert_eq!(
            decode_cell(&Type::BOOL, Some(&[1])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode_cell(&Type::INT4, Some(&42i32.to_be_bytes())).unwrap(),
            Value::I64(42)
        );
        assert_eq!(
            decode_cell(&Type::INT2, Some(&(-7i16).to_be_bytes())).unwrap(),
            Value::I64(-7)
        );
        assert_eq!(
            decode_cell(&Type::FLOAT8, Some(&40.7f64.to_be_bytes())).unwrap(),
            Value::F64(40.7)
        );
        assert_eq!(
            decode_cell(&Type::VARCHAR, Some(b"delivered")).unwrap(),
            Value::from("delivered")
        );
    }

    #[test]
    fn bytes_decode_to_text() {
        assert_eq!(
            decode_cell(&Type::BYTEA, Some(b"org-17")).unwrap(),
            Value::from("org-17")
        );
        assert_eq!(
            decode_cell(&Type::BYTEA, Some(&[0x6f, 0xff, 0x6b])).unwrap(),
            Value::from("o\u{fffd}k")
        );
    }

    #[test]
    fn json_and_jsonb_decode_to_documents() {
        let json_raw = br#"{"latitude":40.7}"#;
        assert_eq!(
            decode_cell(&Type::JSON, Some(json_raw)).unwrap(),
            Value::Json(json!({"latitude": 40.7}))
        );

        let mut jsonb_raw = vec![1u8];
        jsonb_raw.extend_from_slice(br#"{"tags":["fragile"]}"#);
        assert_eq!(
            decode_cell(&Type::JSONB, Some(&jsonb_raw)).unwrap(),
            Value::Json(json!({"tags": ["fragile"]}))
        );
    }

    #[test]
    fn uuid_and_timestamps_decode_to_strings() {
        let uid = uuid::Uuid::from_u128(0x1234);
        assert_eq!(
            decode_cell(&Type::UUID, Some(uid.as_bytes())).unwrap(),
            Value::String(uid.to_string())
        );

        // One day after the Postgres epoch, in microseconds.
        let micros = 86_400_000_000i64.to_be_bytes();
        assert_eq!(
            decode_cell(&Type::TIMESTAMPTZ, Some(&micros)).unwrap(),
            Value::from("2000-01-02T00:00:00Z")
        );
        assert_eq!(
            decode_cell(&Type::TIMESTAMP, Some(&micros)).unwrap(),
            Value::from("2000-01-02T00:00:00")
        );
    }

    #[test]
    fn malformed_binary_is_an_error() {
        let err = decode_cell(&Type::INT8, Some(&[0, 1])).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    /// Builds the binary form of a one dimensional array with elements of type `element_oid`.
    fn array_raw(element_oid: u32, elements: &[Option<&[u8]>]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&i32::from(elements.iter().any(Option::is_none)).to_be_bytes());
        raw.extend_from_slice(&element_oid.to_be_bytes());
        raw.extend_from_slice(&(elements.len() as i32).to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        for element in elements {
            match element {
                Some(bytes) => {
                    raw.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    raw.extend_from_slice(bytes);
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }

        raw
    }

    #[test]
    fn text_arrays_decode_to_json_arrays() {
        let raw = array_raw(Type::TEXT.oid(), &[Some(b"fragile"), Some(b"cold")]);

        assert_eq!(
            decode_cell(&Type::TEXT_ARRAY, Some(&raw)).unwrap(),
            Value::Json(json!(["fragile", "cold"]))
        );
    }

    #[test]
    fn array_null_elements_become_json_null() {
        let first = 7i32.to_be_bytes();
        let raw = array_raw(Type::INT4.oid(), &[Some(&first), None]);

        assert_eq!(
            decode_cell(&Type::INT4_ARRAY, Some(&raw)).unwrap(),
            Value::Json(json!([7, null]))
        );
    }

    #[test]
    fn non_finite_floats_in_arrays_become_null() {
        let finite = 1.5f64.to_be_bytes();
        let nan = f64::NAN.to_be_bytes();
        let raw = array_raw(Type::FLOAT8.oid(), &[Some(&finite), Some(&nan)]);

        assert_eq!(
            decode_cell(&Type::FLOAT8_ARRAY, Some(&raw)).unwrap(),
            Value::Json(json!([1.5, null]))
        );
    }

    #[test]
    fn unmapped_binary_types_decode_to_hex() {
        // An interval of one day: microseconds, days, months.
        let mut raw = Vec::new();
        raw.extend_from_slice(&0i64.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());

        assert_eq!(
            decode_cell(&Type::INTERVAL, Some(&raw)).unwrap(),
            Value::from("\\x00000000000000000000000100000000")
        );
    }

    #[test]
    fn unmapped_textual_types_stay_readable() {
        let citext = Type::new(
            "citext".to_string(),
            16_385,
            Kind::Simple,
            "public".to_string(),
        );

        assert_eq!(
            decode_cell(&citext, Some(b"Warehouse A")).unwrap(),
            Value::from("Warehouse A")
        );
    }
}
