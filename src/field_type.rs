//! Field type tokens shared by schema files and the warehouse catalog.
//!
//! [`FieldType`] is the closed set of column types a table can declare. The
//! codec is total: every variant has one canonical uppercase token, and any
//! token outside that set decodes to [`FieldType::Unknown`] instead of
//! failing, so a schema file written against a newer service still loads.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Numeric,
    Record,
    Date,
    Time,
    DateTime,
    Geography,
    Unknown,
}

impl FieldType {
    /// Every recognised type, in declaration order. `Unknown` is excluded.
    pub const KNOWN: [FieldType; 12] = [
        FieldType::String,
        FieldType::Bytes,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Timestamp,
        FieldType::Numeric,
        FieldType::Record,
        FieldType::Date,
        FieldType::Time,
        FieldType::DateTime,
        FieldType::Geography,
    ];

    pub fn as_token(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Numeric => "NUMERIC",
            FieldType::Record => "RECORD",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Unknown => "UNKNOWN",
        }
    }

    /// Decodes a token, falling back to `Unknown` for anything unrecognised.
    pub fn from_token(token: &str) -> Self {
        match token {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" => FieldType::Integer,
            "FLOAT" => FieldType::Float,
            "BOOLEAN" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "NUMERIC" => FieldType::Numeric,
            "RECORD" => FieldType::Record,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::DateTime,
            "GEOGRAPHY" => FieldType::Geography,
            _ => FieldType::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FieldType::Unknown)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(FieldType::from_token(value))
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_token())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Ok(FieldType::from_token(&token))
    }
}
