//! Type-preserving line codec for documents
//!
//! Each document is written as one line of JSON. Values JSON cannot carry
//! natively are wrapped in single-key objects whose key is a `$` type tag:
//!
//! | value            | line form                                              |
//! |------------------|--------------------------------------------------------|
//! | int32            | `42`                                                   |
//! | int64            | `{"$numberLong":"42"}`                                 |
//! | double           | `42.0`, or `{"$numberDouble":"NaN"}` when not finite   |
//! | datetime         | `{"$date":"2024-05-01T02:03:04.005Z"}`                 |
//! | datetime, year outside 0000-9999 | `{"$date":{"$numberLong":"253402300800000"}}` |
//! | binary           | `{"$binary":{"base64":"AQI=","subType":"00"}}`         |
//! | object id        | `{"$oid":"65f0c0ffee0000000000abcd"}`                  |
//! | `$`-keyed fields | `{"$document":{"$set":1}}`                             |
//!
//! Dates whose year RFC 3339 cannot spell are written as epoch
//! milliseconds, so they keep millisecond precision only.
//!
//! Tags are never inferred from the shape of a string, so decoding is
//! unambiguous.
//!
//! # Example
//!
//! ```
//! use docvault_core::document::{codec, Document, ObjectId};
//!
//! let doc = Document::new().with("_id", ObjectId::new()).with("n", 1i64);
//! let line = codec::encode(&doc);
//! assert_eq!(codec::decode(&line).unwrap(), doc);
//! ```

use super::value::{Binary, Document, ObjectId, Value};
use crate::error::DecodeError;
use base64::Engine;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as Json};

/// File extension of archive entries holding encoded documents
pub const LINE_EXTENSION: &str = "jsonl";

const TAG_LONG: &str = "$numberLong";
const TAG_DOUBLE: &str = "$numberDouble";
const TAG_DATE: &str = "$date";
const TAG_BINARY: &str = "$binary";
const TAG_OID: &str = "$oid";
const TAG_DOCUMENT: &str = "$document";

/// Encode a document as a single line (no trailing newline).
pub fn encode(doc: &Document) -> String {
    encode_document(doc).to_string()
}

/// Decode one line back into a document.
pub fn decode(line: &str) -> std::result::Result<Document, DecodeError> {
    let json: Json = serde_json::from_str(line.trim_end_matches(['\r', '\n']))
        .map_err(|e| DecodeError::new(line, format!("invalid JSON: {}", e)))?;

    match decode_value(json).map_err(|reason| DecodeError::new(line, reason))? {
        Value::Document(doc) => Ok(doc),
        other => Err(DecodeError::new(
            line,
            format!("top-level value is {}, expected document", other.type_name()),
        )),
    }
}

/// Encode a single value in its tagged JSON form.
pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int32(i) => Json::Number(Number::from(*i)),
        Value::Int64(i) => tagged(TAG_LONG, Json::String(i.to_string())),
        Value::Double(f) => match Number::from_f64(*f) {
            Some(n) => Json::Number(n),
            None => tagged(TAG_DOUBLE, Json::String(non_finite_name(*f).to_string())),
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(encode_value).collect()),
        Value::Document(doc) => encode_document(doc),
        Value::DateTime(dt) => tagged(TAG_DATE, encode_date(dt)),
        Value::Binary(bin) => {
            let mut inner = Map::new();
            inner.insert(
                "base64".into(),
                Json::String(base64::engine::general_purpose::STANDARD.encode(&bin.bytes)),
            );
            inner.insert("subType".into(), Json::String(format!("{:02x}", bin.subtype)));
            tagged(TAG_BINARY, Json::Object(inner))
        }
        Value::ObjectId(oid) => tagged(TAG_OID, Json::String(oid.to_hex())),
    }
}

fn encode_document(doc: &Document) -> Json {
    let fields: Map<String, Json> = doc
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();

    if doc.keys().any(|k| k.starts_with('$')) {
        tagged(TAG_DOCUMENT, Json::Object(fields))
    } else {
        Json::Object(fields)
    }
}

fn encode_date(dt: &DateTime<Utc>) -> Json {
    if (0..=9999).contains(&dt.year()) {
        Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    } else {
        tagged(TAG_LONG, Json::String(dt.timestamp_millis().to_string()))
    }
}

fn tagged(tag: &str, inner: Json) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), inner);
    Json::Object(map)
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

type DecodeResult<T> = std::result::Result<T, String>;

fn decode_value(json: Json) -> DecodeResult<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(b)),
        Json::Number(n) => decode_number(&n),
        Json::String(s) => Ok(Value::String(s)),
        Json::Array(items) => items
            .into_iter()
            .map(decode_value)
            .collect::<DecodeResult<Vec<_>>>()
            .map(Value::Array),
        Json::Object(map) => decode_object(map),
    }
}

fn decode_number(n: &Number) -> DecodeResult<Value> {
    if let Some(i) = n.as_i64() {
        return Ok(match i32::try_from(i) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(i),
        });
    }
    if n.is_u64() {
        return Err(format!("integer {} out of range", n));
    }
    n.as_f64()
        .map(Value::Double)
        .ok_or_else(|| format!("unrepresentable number {}", n))
}

fn decode_object(map: Map<String, Json>) -> DecodeResult<Value> {
    if map.len() == 1 {
        if let Some(tag) = map.keys().next().filter(|k| k.starts_with('$')).cloned() {
            let inner = map.into_iter().next().map(|(_, v)| v).unwrap_or(Json::Null);
            return decode_tagged(&tag, inner);
        }
    }

    if let Some(key) = map.keys().find(|k| k.starts_with('$')) {
        return Err(format!("unexpected type tag '{}' among document fields", key));
    }

    decode_fields(map).map(Value::Document)
}

fn decode_fields(map: Map<String, Json>) -> DecodeResult<Document> {
    map.into_iter()
        .map(|(k, v)| decode_value(v).map(|v| (k, v)))
        .collect()
}

fn decode_tagged(tag: &str, inner: Json) -> DecodeResult<Value> {
    match tag {
        TAG_LONG => {
            let s = expect_str(tag, &inner)?;
            s.parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| format!("invalid {} '{}': {}", tag, s, e))
        }
        TAG_DOUBLE => {
            let s = expect_str(tag, &inner)?;
            let f = match s {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other
                    .parse::<f64>()
                    .map_err(|e| format!("invalid {} '{}': {}", tag, other, e))?,
            };
            Ok(Value::Double(f))
        }
        TAG_DATE => decode_date(inner).map(Value::DateTime),
        TAG_BINARY => decode_binary(inner).map(Value::Binary),
        TAG_OID => {
            let s = expect_str(tag, &inner)?;
            ObjectId::parse_str(s).map(Value::ObjectId)
        }
        TAG_DOCUMENT => match inner {
            Json::Object(fields) => decode_fields(fields).map(Value::Document),
            other => Err(format!("{} must wrap an object, got {}", tag, other)),
        },
        other => Err(format!("unknown type tag '{}'", other)),
    }
}

fn decode_date(inner: Json) -> DecodeResult<DateTime<Utc>> {
    match inner {
        Json::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid {} '{}': {}", TAG_DATE, s, e)),
        Json::Object(map) => {
            let millis = map
                .get(TAG_LONG)
                .and_then(Json::as_str)
                .ok_or_else(|| format!("{} object must hold {}", TAG_DATE, TAG_LONG))?
                .parse::<i64>()
                .map_err(|e| format!("invalid {} millis: {}", TAG_DATE, e))?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("{} millis {} out of range", TAG_DATE, millis))
        }
        other => Err(format!("invalid {} payload {}", TAG_DATE, other)),
    }
}

fn decode_binary(inner: Json) -> DecodeResult<Binary> {
    let map = match inner {
        Json::Object(map) => map,
        other => return Err(format!("invalid {} payload {}", TAG_BINARY, other)),
    };
    let encoded = map
        .get("base64")
        .and_then(Json::as_str)
        .ok_or_else(|| format!("{} requires a base64 field", TAG_BINARY))?;
    let subtype = map
        .get("subType")
        .and_then(Json::as_str)
        .ok_or_else(|| format!("{} requires a subType field", TAG_BINARY))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid {} base64: {}", TAG_BINARY, e))?;
    let subtype = u8::from_str_radix(subtype, 16)
        .map_err(|e| format!("invalid {} subType '{}': {}", TAG_BINARY, subtype, e))?;

    Ok(Binary { subtype, bytes })
}

fn expect_str<'a>(tag: &str, inner: &'a Json) -> DecodeResult<&'a str> {
    inner
        .as_str()
        .ok_or_else(|| format!("{} must hold a string, got {}", tag, inner))
}
