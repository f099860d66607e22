// used for date and time conformance checks
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a BigDecimal
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;
// used to overload common operations for datatypes
use std::ops;

use crate::descriptor::Cell;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";

// ------------- XSD Types --------------
/// The external type vocabulary that declared source types are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XsdType {
    Byte,
    Short,
    Int,
    Long,
    Integer,
    UnsignedByte,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
    Float,
    Double,
    Decimal,
    String,
    DateTime,
    Date,
    Time,
    Duration,
    Boolean,
}

impl XsdType {
    pub fn local_name(&self) -> &'static str {
        match self {
            XsdType::Byte => "byte",
            XsdType::Short => "short",
            XsdType::Int => "int",
            XsdType::Long => "long",
            XsdType::Integer => "integer",
            XsdType::UnsignedByte => "unsignedByte",
            XsdType::UnsignedShort => "unsignedShort",
            XsdType::UnsignedInt => "unsignedInt",
            XsdType::UnsignedLong => "unsignedLong",
            XsdType::Float => "float",
            XsdType::Double => "double",
            XsdType::Decimal => "decimal",
            XsdType::String => "string",
            XsdType::DateTime => "dateTime",
            XsdType::Date => "date",
            XsdType::Time => "time",
            XsdType::Duration => "duration",
            XsdType::Boolean => "boolean",
        }
    }
    pub fn uri(&self) -> String {
        format!("{}{}", XSD_NAMESPACE, self.local_name())
    }
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            XsdType::Byte
                | XsdType::Short
                | XsdType::Int
                | XsdType::Long
                | XsdType::Integer
                | XsdType::UnsignedByte
                | XsdType::UnsignedShort
                | XsdType::UnsignedInt
                | XsdType::UnsignedLong
        )
    }
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, XsdType::Float | XsdType::Double | XsdType::Decimal)
    }

    /// Maps a declared source type onto the vocabulary. Exact names are looked up
    /// first, then the type family is guessed from the name (`Int64Dtype`,
    /// `float16`, `datetime64[ns, UTC]`). Returns `None` when neither applies.
    pub fn map_declared(declared: &str) -> Option<XsdType> {
        let lowered = declared.trim().to_lowercase();
        let exact = match lowered.as_str() {
            "int8" => Some(XsdType::Byte),
            "int16" => Some(XsdType::Short),
            "int32" | "int" => Some(XsdType::Int),
            "int64" => Some(XsdType::Long),
            "integer" => Some(XsdType::Integer),
            "uint8" => Some(XsdType::UnsignedByte),
            "uint16" => Some(XsdType::UnsignedShort),
            "uint32" => Some(XsdType::UnsignedInt),
            "uint64" => Some(XsdType::UnsignedLong),
            "float" | "float32" => Some(XsdType::Float),
            "float64" | "double" => Some(XsdType::Double),
            "decimal" | "numeric" | "number" => Some(XsdType::Decimal),
            "string" | "str" | "object" | "text" | "varchar" | "char" | "character"
            | "category" | "factor" | "array" | "list" | "complex" | "unknown" => {
                Some(XsdType::String)
            }
            "datetime" | "datetime64" | "datetime64[ns]" | "timestamp" => Some(XsdType::DateTime),
            "date" => Some(XsdType::Date),
            "time" => Some(XsdType::Time),
            "timedelta" | "duration" => Some(XsdType::Duration),
            "bool" | "boolean" => Some(XsdType::Boolean),
            _ => None,
        };
        exact.or_else(|| {
            if lowered.contains("int") {
                Some(XsdType::Int)
            } else if lowered.contains("float") {
                Some(XsdType::Double)
            } else if lowered.contains("date") {
                Some(XsdType::DateTime)
            } else if lowered.contains("bool") {
                Some(XsdType::Boolean)
            } else {
                None
            }
        })
    }

    /// Whether a non-null cell is a valid lexical value of this type.
    pub fn conforms(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Null => false,
            Cell::Boolean(_) => matches!(self, XsdType::Boolean | XsdType::String),
            Cell::Integer(i) => match self {
                XsdType::Byte => i8::try_from(*i).is_ok(),
                XsdType::Short => i16::try_from(*i).is_ok(),
                XsdType::Int => i32::try_from(*i).is_ok(),
                XsdType::UnsignedByte => u8::try_from(*i).is_ok(),
                XsdType::UnsignedShort => u16::try_from(*i).is_ok(),
                XsdType::UnsignedInt => u32::try_from(*i).is_ok(),
                XsdType::UnsignedLong => *i >= 0,
                XsdType::Boolean => *i == 0 || *i == 1,
                t => t.is_numeric() || *t == XsdType::String,
            },
            Cell::Float(x) => match self {
                t if t.is_integral() => x.is_finite() && x.fract() == 0.0,
                XsdType::Float | XsdType::Double => true,
                XsdType::Decimal => x.is_finite(),
                XsdType::String => true,
                _ => false,
            },
            Cell::Text(s) => self.conforms_text(s.trim()),
        }
    }

    fn conforms_text(&self, s: &str) -> bool {
        match self {
            XsdType::String => true,
            XsdType::Boolean => matches!(s, "true" | "false" | "1" | "0"),
            XsdType::Float | XsdType::Double => {
                s.parse::<f64>().is_ok() || matches!(s, "INF" | "-INF" | "NaN")
            }
            XsdType::Decimal => Decimal::from_str(s).is_some(),
            t if t.is_integral() => s.parse::<i64>().is_ok_and(|i| t.conforms(&Cell::Integer(i))),
            XsdType::Date => NaiveDate::from_str(s).is_ok(),
            XsdType::Time => NaiveTime::from_str(s).is_ok(),
            XsdType::DateTime => {
                NaiveDateTime::from_str(s).is_ok()
                    || chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDate::from_str(s).is_ok()
            }
            // ISO 8601 durations such as P1DT2H
            XsdType::Duration => s.trim_start_matches('-').starts_with('P') && s.len() > 1,
            _ => false,
        }
    }
}

impl fmt::Display for XsdType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "xsd:{}", self.local_name())
    }
}

// ------------- Decimal --------------
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal (BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal (decimal)),
            _ => None
        }
    }
    pub fn from_f64(x: f64) -> Option<Decimal> {
        if x.is_finite() {
            Decimal::from_str(&x.to_string())
        } else {
            None
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
