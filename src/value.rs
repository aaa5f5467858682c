//! Raw document values.
//!
//! A [`Value`] is what a document holds before any field coercion is applied;
//! a [`RawDocument`] is one stored record (attribute name -> value). The JSON
//! conversions here are the document shape exchanged with a store and must
//! round-trip every value kind, which is why identities, dates, datetimes and
//! decimals are written as single-key tagged objects.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value as Json};

use crate::datatype::Decimal;
use crate::error::{DocmapError, Result};
use crate::identity::Identity;

pub type RawDocument = BTreeMap<String, Value>;

pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const OID_TAG: &str = "$oid";
const DATE_TAG: &str = "$date";
const DATETIME_TAG: &str = "$datetime";
const DECIMAL_TAG: &str = "$decimal";
// non-finite floats have no JSON number
const FLOAT_TAG: &str = "$float";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identity(Identity),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
    Array(Vec<Value>),
    Document(RawDocument),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Identity(_) => "Identity",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Decimal(_) => "Decimal",
            Value::Array(_) => "Array",
            Value::Document(_) => "Document",
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    // Null, empty strings and empty collections
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Document(d) => d.is_empty(),
            _ => false,
        }
    }
    pub fn as_identity(&self) -> Option<Identity> {
        match self {
            Value::Identity(identity) => Some(*identity),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
    pub fn as_document(&self) -> Option<&RawDocument> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }
    /// Identities held by an identity array, skipping anything else.
    pub fn identities(&self) -> Vec<Identity> {
        match self {
            Value::Array(a) => a.iter().filter_map(Value::as_identity).collect(),
            Value::Identity(identity) => vec![*identity],
            _ => Vec::new(),
        }
    }
    /// Equality as the store sees it: integers and floats compare numerically.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_eq(y))
            }
            _ => self == other,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::Number(Number::from(*i)),
            Value::Float(f) => match Number::from_f64(*f) {
                Some(n) => Json::Number(n),
                None => tagged(FLOAT_TAG, Json::String(f.to_string())),
            },
            Value::String(s) => Json::String(s.clone()),
            Value::Identity(identity) => tagged(OID_TAG, Json::Number(Number::from(identity.value()))),
            Value::Date(d) => tagged(DATE_TAG, Json::String(d.format(DATE_FORMAT).to_string())),
            Value::DateTime(dt) => {
                tagged(DATETIME_TAG, Json::String(dt.format(DATETIME_FORMAT).to_string()))
            }
            Value::Decimal(d) => tagged(DECIMAL_TAG, Json::String(d.to_string())),
            Value::Array(a) => Json::Array(a.iter().map(Value::to_json).collect()),
            Value::Document(d) => Json::Object(document_to_json(d)),
        }
    }

    pub fn from_json(json: &Json) -> Result<Value> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().ok_or_else(|| corrupt(json))?),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(a) => Value::Array(a.iter().map(Value::from_json).collect::<Result<_>>()?),
            Json::Object(o) => {
                if o.len() == 1 {
                    if let Some(tagged) = from_tagged(o)? {
                        return Ok(tagged);
                    }
                }
                Value::Document(document_from_json(o)?)
            }
        })
    }
}

fn tagged(tag: &str, inner: Json) -> Json {
    let mut map = Map::new();
    map.insert(tag.to_string(), inner);
    Json::Object(map)
}

fn corrupt(json: &Json) -> DocmapError {
    DocmapError::DataCorruption {
        message: format!("unreadable document value {json}"),
    }
}

fn from_tagged(object: &Map<String, Json>) -> Result<Option<Value>> {
    let Some((tag, inner)) = object.iter().next() else {
        return Ok(None);
    };
    let value = match (tag.as_str(), inner) {
        (OID_TAG, Json::Number(n)) => Value::Identity(Identity::new(n.as_u64().ok_or_else(|| corrupt(inner))?)),
        (DATE_TAG, Json::String(s)) => {
            Value::Date(NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| corrupt(inner))?)
        }
        (DATETIME_TAG, Json::String(s)) => Value::DateTime(
            NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|_| corrupt(inner))?,
        ),
        (DECIMAL_TAG, Json::String(s)) => Value::Decimal(Decimal::from_str(s).ok_or_else(|| corrupt(inner))?),
        (FLOAT_TAG, Json::String(s)) => Value::Float(s.parse::<f64>().map_err(|_| corrupt(inner))?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

pub fn document_to_json(document: &RawDocument) -> Map<String, Json> {
    document
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

pub fn document_from_json(object: &Map<String, Json>) -> Result<RawDocument> {
    object
        .iter()
        .map(|(name, value)| Ok((name.clone(), Value::from_json(value)?)))
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// ------------- Conversions -------------
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl From<Identity> for Value {
    fn from(identity: Identity) -> Self {
        Value::Identity(identity)
    }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}
impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}
impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}
impl From<RawDocument> for Value {
    fn from(d: RawDocument) -> Self {
        Value::Document(d)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds a [`RawDocument`] from `name => value` pairs.
///
/// ```
/// use docmap::{doc, Value};
/// let d = doc! { "title" => "Dune", "pages" => 412 };
/// assert_eq!(d["pages"], Value::Integer(412));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::value::RawDocument::new() };
    ( $( $name:expr => $value:expr ),+ $(,)? ) => {{
        let mut document = $crate::value::RawDocument::new();
        $( document.insert(::std::string::String::from($name), $crate::value::Value::from($value)); )+
        document
    }};
}
