//! Tagged values exchanged with remote objects.

use std::sync::Arc;

use qbridge_protocol::ObjectRef;
use qbridge_runtime::{Connection, Result};
use serde_json::Value;

use crate::object::Object;
use crate::schema::ValueKind;

/// A property value, method argument or signal parameter.
///
/// Inbound values are shaped by the declared [`ValueKind`]; a value that does not
/// fit its tag is kept as [`Variant::Var`].
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
	Null,
	Bool(bool),
	Int(i64),
	Double(f64),
	String(String),
	Object(Object),
	/// Untyped JSON: `var`, `array` and `map` values.
	Var(Value),
}

/// `i64::MIN`, exactly representable as a double.
const I64_MIN_F64: f64 = -9_223_372_036_854_775_808.0;
/// 2^63, the first double above `i64::MAX`.
const I64_END_F64: f64 = 9_223_372_036_854_775_808.0;

impl Variant {
	/// Converts an inbound JSON value declared as `kind`.
	///
	/// Object references are resolved to proxies through `connection`, creating and
	/// referencing them on first sight.
	pub fn from_wire(connection: &Arc<Connection>, kind: ValueKind, value: Value) -> Result<Self> {
		if value.is_null() {
			return Ok(Variant::Null);
		}
		Ok(match kind {
			ValueKind::Bool => match value {
				Value::Bool(b) => Variant::Bool(b),
				other => Variant::Var(other),
			},
			ValueKind::Int => match value.as_i64() {
				Some(i) => Variant::Int(i),
				// Integral doubles are common from loosely typed peers.
				None => match value.as_f64() {
					Some(f) if f.fract() == 0.0 && (I64_MIN_F64..I64_END_F64).contains(&f) => {
						Variant::Int(f as i64)
					}
					_ => Variant::Var(value),
				},
			},
			ValueKind::Double => match value.as_f64() {
				Some(f) => Variant::Double(f),
				None => Variant::Var(value),
			},
			ValueKind::String => match value {
				Value::String(s) => Variant::String(s),
				other => Variant::Var(other),
			},
			ValueKind::Object | ValueKind::Var => match Object::resolve(connection, &value)? {
				Some(object) => Variant::Object(object),
				None => Variant::Var(value),
			},
			ValueKind::Array | ValueKind::Map => Variant::Var(value),
		})
	}

	/// The outbound JSON form. Objects become identifier references.
	pub fn to_wire(&self) -> Value {
		match self {
			Variant::Null => Value::Null,
			Variant::Bool(b) => Value::Bool(*b),
			Variant::Int(i) => Value::from(*i),
			Variant::Double(f) => Value::from(*f),
			Variant::String(s) => Value::String(s.clone()),
			Variant::Object(object) => ObjectRef::value_for(object.identifier()),
			Variant::Var(value) => value.clone(),
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Variant::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Variant::Bool(b) => Some(*b),
			Variant::Var(value) => value.as_bool(),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Variant::Int(i) => Some(*i),
			Variant::Var(value) => value.as_i64(),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Variant::Double(f) => Some(*f),
			Variant::Int(i) => Some(*i as f64),
			Variant::Var(value) => value.as_f64(),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Variant::String(s) => Some(s),
			Variant::Var(value) => value.as_str(),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Object> {
		match self {
			Variant::Object(object) => Some(object),
			_ => None,
		}
	}

	/// Borrows the raw JSON of a `var`, `array` or `map` value.
	pub fn as_json(&self) -> Option<&Value> {
		match self {
			Variant::Var(value) => Some(value),
			_ => None,
		}
	}
}

impl From<bool> for Variant {
	fn from(value: bool) -> Self {
		Variant::Bool(value)
	}
}

impl From<i32> for Variant {
	fn from(value: i32) -> Self {
		Variant::Int(value.into())
	}
}

impl From<i64> for Variant {
	fn from(value: i64) -> Self {
		Variant::Int(value)
	}
}

impl From<usize> for Variant {
	fn from(value: usize) -> Self {
		Variant::Int(i64::try_from(value).unwrap_or(i64::MAX))
	}
}

impl From<f64> for Variant {
	fn from(value: f64) -> Self {
		Variant::Double(value)
	}
}

impl From<&str> for Variant {
	fn from(value: &str) -> Self {
		Variant::String(value.to_string())
	}
}

impl From<String> for Variant {
	fn from(value: String) -> Self {
		Variant::String(value)
	}
}

impl From<Object> for Variant {
	fn from(value: Object) -> Self {
		Variant::Object(value)
	}
}

impl From<&Object> for Variant {
	fn from(value: &Object) -> Self {
		Variant::Object(value.clone())
	}
}

impl From<Value> for Variant {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Variant::Null,
			other => Variant::Var(other),
		}
	}
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
	fn from(value: Option<T>) -> Self {
		value.map_or(Variant::Null, Into::into)
	}
}

impl std::fmt::Display for Variant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Variant::Null => f.write_str("null"),
			Variant::Bool(b) => write!(f, "{b}"),
			Variant::Int(i) => write!(f, "{i}"),
			Variant::Double(d) => write!(f, "{d}"),
			Variant::String(s) => f.write_str(s),
			Variant::Object(object) => write!(f, "{}({})", object.type_name(), object.identifier()),
			Variant::Var(value) => write!(f, "{value}"),
		}
	}
}
