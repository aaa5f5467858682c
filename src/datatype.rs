// used for dates and timestamps in documents
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a decimal
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;
use std::ops;

use crate::identity::Identity;
use crate::value::{DATE_FORMAT, RawDocument, Value};

// ------------- Field Types --------------
// The coercion rule of a declared field. Every rule is idempotent: casting an
// already cast value yields the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Object,
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Decimal,
    Identity,
    Array,
    Hash,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Object => "Object",
            FieldType::String => "String",
            FieldType::Integer => "Integer",
            FieldType::Float => "Float",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
            FieldType::Decimal => "Decimal",
            FieldType::Identity => "Identity",
            FieldType::Array => "Array",
            FieldType::Hash => "Hash",
        }
    }

    /// Casts `value` into the canonical form of this type, or hands the value
    /// back when it cannot be represented.
    pub fn cast(&self, value: Value) -> Result<Value, Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if !matches!(self, FieldType::Object | FieldType::String)
            && matches!(&value, Value::String(s) if s.trim().is_empty())
        {
            return Ok(Value::Null);
        }
        match self {
            FieldType::Object => Ok(value),
            FieldType::String => cast_string(value),
            FieldType::Integer => cast_integer(value),
            FieldType::Float => cast_float(value),
            FieldType::Boolean => cast_boolean(value),
            FieldType::Date => cast_date(value),
            FieldType::DateTime => cast_datetime(value),
            FieldType::Decimal => cast_decimal(value),
            FieldType::Identity => cast_identity(value),
            FieldType::Array => match value {
                Value::Array(_) => Ok(value),
                other => Err(other),
            },
            FieldType::Hash => match value {
                Value::Document(_) => Ok(value),
                other => Err(other),
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn cast_string(value: Value) -> Result<Value, Value> {
    match value {
        Value::String(_) => Ok(value),
        Value::Integer(i) => Ok(Value::String(i.to_string())),
        Value::Float(f) => Ok(Value::String(f.to_string())),
        Value::Boolean(b) => Ok(Value::String(b.to_string())),
        Value::Identity(identity) => Ok(Value::String(identity.to_string())),
        Value::Decimal(d) => Ok(Value::String(d.to_string())),
        other => Err(other),
    }
}

// Floats outside the i64 range would saturate.
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f.trunc() as i64)
}

fn cast_integer(value: Value) -> Result<Value, Value> {
    match value {
        Value::Integer(_) => Ok(value),
        Value::Float(f) => integral(f).map(Value::Integer).ok_or(value),
        Value::Decimal(ref d) if d.is_integer() => d.with_scale(0).to_string().parse::<i64>().map(Value::Integer).map_err(|_| value),
        Value::String(ref s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            match s.parse::<f64>().ok().and_then(integral) {
                Some(i) => Ok(Value::Integer(i)),
                None => Err(value),
            }
        }
        other => Err(other),
    }
}

fn cast_float(value: Value) -> Result<Value, Value> {
    let parsed = match &value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        Value::Decimal(d) => d.to_string().parse::<f64>().ok(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(Value::Float(f)),
        _ => Err(value),
    }
}

fn cast_boolean(value: Value) -> Result<Value, Value> {
    match value {
        Value::Boolean(_) => Ok(value),
        Value::Integer(1) => Ok(Value::Boolean(true)),
        Value::Integer(0) => Ok(Value::Boolean(false)),
        Value::String(ref s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(Value::Boolean(true)),
            "false" | "0" | "no" | "n" => Ok(Value::Boolean(false)),
            _ => Err(value),
        },
        other => Err(other),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn cast_date(value: Value) -> Result<Value, Value> {
    match value {
        Value::Date(_) => Ok(value),
        Value::DateTime(dt) => Ok(Value::Date(dt.date())),
        Value::String(ref s) => parse_datetime(s).map(|dt| Value::Date(dt.date())).ok_or(value),
        other => Err(other),
    }
}

fn cast_datetime(value: Value) -> Result<Value, Value> {
    match value {
        Value::DateTime(_) => Ok(value),
        Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
        Value::String(ref s) => parse_datetime(s).map(Value::DateTime).ok_or(value),
        other => Err(other),
    }
}

fn cast_decimal(value: Value) -> Result<Value, Value> {
    match value {
        Value::Decimal(_) => Ok(value),
        Value::Integer(i) => Ok(Value::Decimal(Decimal(BigDecimal::from(i)))),
        // through the shortest decimal form, so 0.1 stays 0.1
        Value::Float(f) if f.is_finite() => Decimal::from_str(&f.to_string()).map(Value::Decimal).ok_or(value),
        Value::String(ref s) => Decimal::from_str(s.trim()).map(Value::Decimal).ok_or(value),
        other => Err(other),
    }
}

fn cast_identity(value: Value) -> Result<Value, Value> {
    match value {
        Value::Identity(_) => Ok(value),
        Value::Integer(i) if i >= 0 => Ok(Value::Identity(Identity::new(i as u64))),
        Value::String(ref s) => s.parse::<Identity>().map(Value::Identity).map_err(|_| value),
        other => Err(other),
    }
}

// ------------- Data Types --------------
// Rust types that typed accessors read and write. The conversion from a value
// only succeeds for the canonical form produced by `FIELD_TYPE`.
pub trait DataType: Sized {
    const FIELD_TYPE: FieldType;
    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn data_type(&self) -> &'static str {
        Self::FIELD_TYPE.name()
    }
}

impl DataType for String {
    const FIELD_TYPE: FieldType = FieldType::String;
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(String::from)
    }
    fn into_value(self) -> Value {
        Value::String(self)
    }
}
impl DataType for i64 {
    const FIELD_TYPE: FieldType = FieldType::Integer;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}
impl DataType for f64 {
    const FIELD_TYPE: FieldType = FieldType::Float;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}
impl DataType for bool {
    const FIELD_TYPE: FieldType = FieldType::Boolean;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}
impl DataType for NaiveDate {
    const FIELD_TYPE: FieldType = FieldType::Date;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::Date(self)
    }
}
impl DataType for NaiveDateTime {
    const FIELD_TYPE: FieldType = FieldType::DateTime;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}
impl DataType for Decimal {
    const FIELD_TYPE: FieldType = FieldType::Decimal;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(d) => Some(d.clone()),
            _ => None,
        }
    }
    fn into_value(self) -> Value {
        Value::Decimal(self)
    }
}
impl DataType for Identity {
    const FIELD_TYPE: FieldType = FieldType::Identity;
    fn from_value(value: &Value) -> Option<Self> {
        value.as_identity()
    }
    fn into_value(self) -> Value {
        Value::Identity(self)
    }
}
impl DataType for Vec<Value> {
    const FIELD_TYPE: FieldType = FieldType::Array;
    fn from_value(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }
    fn into_value(self) -> Value {
        Value::Array(self)
    }
}
impl DataType for RawDocument {
    const FIELD_TYPE: FieldType = FieldType::Hash;
    fn from_value(value: &Value) -> Option<Self> {
        value.as_document().cloned()
    }
    fn into_value(self) -> Value {
        Value::Document(self)
    }
}

// Special types below
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn new(decimal: BigDecimal) -> Self {
        Self(decimal)
    }
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
