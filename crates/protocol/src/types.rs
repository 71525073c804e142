//! Type descriptors and object reference values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Key marking a JSON object as a reference to a remote object.
pub const OBJECT_TAG_KEY: &str = "_qbackend_";
/// Value of [`OBJECT_TAG_KEY`] for object references.
pub const OBJECT_TAG: &str = "object";

/// Schema of a remote type as delivered by the peer.
///
/// Parameter entries are type tags, optionally followed by a parameter name
/// (`"int start"`). A descriptor with `omitted` set carries only the name: the peer
/// already delivered the full description and expects it to be cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
	pub name: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub properties: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub methods: BTreeMap<String, Vec<String>>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub signals: BTreeMap<String, Vec<String>>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub omitted: bool,
}

impl TypeDescriptor {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	pub fn with_property(mut self, name: &str, tag: &str) -> Self {
		self.properties.insert(name.to_string(), tag.to_string());
		self
	}

	pub fn with_method(mut self, name: &str, params: &[&str]) -> Self {
		self.methods
			.insert(name.to_string(), params.iter().map(|p| p.to_string()).collect());
		self
	}

	pub fn with_signal(mut self, name: &str, params: &[&str]) -> Self {
		self.signals
			.insert(name.to_string(), params.iter().map(|p| p.to_string()).collect());
		self
	}
}

/// Splits a parameter entry into its type tag and optional name.
pub fn split_param(entry: &str) -> (&str, Option<&str>) {
	let entry = entry.trim();
	match entry.split_once(char::is_whitespace) {
		Some((tag, name)) => {
			let name = name.trim();
			(tag, (!name.is_empty()).then_some(name))
		}
		None => (entry, None),
	}
}

/// A reference to a remote object embedded in a JSON value.
///
/// Inbound references carry the object's type so a proxy can be built on first sight;
/// outbound references only need the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
	pub identifier: String,
	pub type_info: Option<TypeDescriptor>,
}

impl ObjectRef {
	/// Parses an object reference, returning `None` for any other value.
	pub fn from_value(value: &Value) -> Option<Self> {
		let object = value.as_object()?;
		if object.get(OBJECT_TAG_KEY).and_then(Value::as_str) != Some(OBJECT_TAG) {
			return None;
		}
		let identifier = object.get("identifier")?.as_str()?.to_string();
		let type_info = object
			.get("type")
			.and_then(|t| serde_json::from_value(t.clone()).ok());
		Some(Self {
			identifier,
			type_info,
		})
	}

	/// The outbound form of a reference to `identifier`.
	pub fn value_for(identifier: &str) -> Value {
		json!({ OBJECT_TAG_KEY: OBJECT_TAG, "identifier": identifier })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_param() {
		assert_eq!(split_param("int"), ("int", None));
		assert_eq!(split_param("int start"), ("int", Some("start")));
		assert_eq!(split_param("  array   rowData "), ("array", Some("rowData")));
	}

	#[test]
	fn test_descriptor_defaults() {
		let descriptor: TypeDescriptor =
			serde_json::from_value(json!({"name": "Person", "omitted": true})).unwrap();
		assert!(descriptor.omitted);
		assert!(descriptor.properties.is_empty());

		let full: TypeDescriptor = serde_json::from_value(json!({
			"name": "Person",
			"properties": {"name": "string", "age": "int"},
			"methods": {"setName": ["string"]},
			"signals": {"nameChanged": [], "greeted": ["string who"]}
		}))
		.unwrap();
		assert_eq!(full.properties["age"], "int");
		assert_eq!(full.signals["greeted"], vec!["string who".to_string()]);
		assert!(!full.omitted);
	}

	#[test]
	fn test_object_ref_parsing() {
		let value = json!({
			"_qbackend_": "object",
			"identifier": "person-1",
			"type": {"name": "Person", "properties": {"name": "string"}}
		});
		let reference = ObjectRef::from_value(&value).unwrap();
		assert_eq!(reference.identifier, "person-1");
		assert_eq!(reference.type_info.unwrap().name, "Person");

		assert!(ObjectRef::from_value(&json!({"identifier": "x"})).is_none());
		assert!(ObjectRef::from_value(&json!({"_qbackend_": "object"})).is_none());
		assert!(ObjectRef::from_value(&json!("x")).is_none());
	}

	#[test]
	fn test_outbound_reference() {
		assert_eq!(
			ObjectRef::value_for("abc"),
			json!({"_qbackend_": "object", "identifier": "abc"})
		);
	}
}
