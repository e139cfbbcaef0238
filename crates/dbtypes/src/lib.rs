//! Scalar type system shared by the storage core.
//!
//! [`SqlType`] is the declared type of a column; [`Value`] is a runtime scalar
//! tagged with the variant it was constructed as. Comparisons and equality
//! are only defined between values of the same variant — cross-type
//! comparisons return `None` rather than silently coercing.


use std::cmp::Ordering;

/// Declared column type. `Varchar` carries the declared maximum length so
/// page layouts can validate row widths without consulting the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Integer,
    Float,
    Varchar { max_length: u16 },
    Boolean,
    Date,
}

impl SqlType {
    /// Stable on-disk id, written into `TableHeaderPageLayout` column records.
    pub fn type_id(&self) -> u8 {
        match self {
            SqlType::Integer => 1,
            SqlType::Float => 2,
            SqlType::Varchar { .. } => 3,
            SqlType::Boolean => 4,
            SqlType::Date => 5,
        }
    }

    pub fn from_type_id(id: u8, max_length: u16) -> Option<Self> {
        match id {
            1 => Some(SqlType::Integer),
            2 => Some(SqlType::Float),
            3 => Some(SqlType::Varchar { max_length }),
            4 => Some(SqlType::Boolean),
            5 => Some(SqlType::Date),
            _ => None,
        }
    }
}

/// A runtime scalar value. `Date` is stored as days since the Unix epoch, the
/// same compact integer encoding used for other fixed-width on-disk fields.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Varchar(String),
    Boolean(bool),
    Date(i32),
    Null,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.eq(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.eq(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.eq(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.eq(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.eq(b)),
            (Value::Null, Value::Null) => Some(true),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_same_type(other).unwrap_or(false)
    }
}
