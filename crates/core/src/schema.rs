//! Runtime schemas built from wire type descriptors.
//!
//! A [`Schema`] is the typed view of a [`TypeDescriptor`]: each type tag becomes a
//! [`ValueKind`], each property is linked to its setter method and change signal, and
//! lookups are by name. The [`SchemaRegistry`] caches schemas by type name for the
//! lifetime of a connection, which also resolves descriptors the peer sends in
//! abbreviated (`omitted`) form.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use qbridge_protocol::{TypeDescriptor, split_param};

/// Property that marks a type as a list model.
pub const MODEL_PROPERTY: &str = "_qb_model";

/// Native representation of a wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
	String,
	Int,
	Double,
	Bool,
	/// Any JSON value.
	Var,
	/// A reference to another remote object.
	Object,
	Array,
	Map,
}

impl ValueKind {
	/// Parses a type tag. Unknown tags yield `None`.
	pub fn from_tag(tag: &str) -> Option<Self> {
		Some(match tag {
			"string" => ValueKind::String,
			"int" => ValueKind::Int,
			"double" => ValueKind::Double,
			"bool" => ValueKind::Bool,
			"var" => ValueKind::Var,
			"object" => ValueKind::Object,
			"array" => ValueKind::Array,
			"map" => ValueKind::Map,
			_ => return None,
		})
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ValueKind::String => "string",
			ValueKind::Int => "int",
			ValueKind::Double => "double",
			ValueKind::Bool => "bool",
			ValueKind::Var => "var",
			ValueKind::Object => "object",
			ValueKind::Array => "array",
			ValueKind::Map => "map",
		}
	}

	/// Parses a tag, treating unknown tags as [`ValueKind::Var`].
	fn from_tag_or_var(type_name: &str, member: &str, tag: &str) -> Self {
		Self::from_tag(tag).unwrap_or_else(|| {
			tracing::debug!(type_name, member, tag, "Unknown type tag, using var");
			ValueKind::Var
		})
	}
}

impl std::fmt::Display for ValueKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
	pub name: Option<String>,
	pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
	pub name: String,
	pub kind: ValueKind,
	/// Method that writes this property, if the type has one.
	pub setter: Option<String>,
	/// Signal that reports changes to this property, if the type has one.
	pub change_signal: Option<String>,
}

impl Property {
	pub fn is_writable(&self) -> bool {
		self.setter.is_some()
	}
}

/// A method or a signal: a name and its parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
	pub name: String,
	pub params: Vec<Parameter>,
}

/// Typed, immutable view of a remote type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
	name: String,
	properties: BTreeMap<String, Property>,
	methods: BTreeMap<String, Member>,
	signals: BTreeMap<String, Member>,
}

impl Schema {
	/// Builds a schema from a full descriptor.
	pub fn from_descriptor(descriptor: &TypeDescriptor) -> Self {
		let type_name = descriptor.name.as_str();
		let members = |entries: &BTreeMap<String, Vec<String>>| -> BTreeMap<String, Member> {
			entries
				.iter()
				.map(|(name, params)| {
					let params = params
						.iter()
						.map(|entry| {
							let (tag, param_name) = split_param(entry);
							Parameter {
								name: param_name.map(str::to_string),
								kind: ValueKind::from_tag_or_var(type_name, name, tag),
							}
						})
						.collect();
					(
						name.clone(),
						Member {
							name: name.clone(),
							params,
						},
					)
				})
				.collect()
		};
		let methods = members(&descriptor.methods);
		let signals = members(&descriptor.signals);

		let properties = descriptor
			.properties
			.iter()
			.map(|(name, tag)| {
				let setter = setter_name(name).filter(|setter| {
					methods
						.get(setter)
						.is_some_and(|method| method.params.len() == 1)
				});
				let change_signal = Some(change_signal_name(name)).filter(|signal| signals.contains_key(signal));
				(
					name.clone(),
					Property {
						name: name.clone(),
						kind: ValueKind::from_tag_or_var(type_name, name, tag),
						setter,
						change_signal,
					},
				)
			})
			.collect();

		Self {
			name: descriptor.name.clone(),
			properties,
			methods,
			signals,
		}
	}

	/// A schema with no members, used when a type cannot be resolved.
	pub fn empty(name: &str) -> Self {
		Self {
			name: name.to_string(),
			properties: BTreeMap::new(),
			methods: BTreeMap::new(),
			signals: BTreeMap::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn properties(&self) -> impl Iterator<Item = &Property> {
		self.properties.values()
	}

	pub fn methods(&self) -> impl Iterator<Item = &Member> {
		self.methods.values()
	}

	pub fn signals(&self) -> impl Iterator<Item = &Member> {
		self.signals.values()
	}

	pub fn property(&self, name: &str) -> Option<&Property> {
		self.properties.get(name)
	}

	pub fn method(&self, name: &str) -> Option<&Member> {
		self.methods.get(name)
	}

	pub fn signal(&self, name: &str) -> Option<&Member> {
		self.signals.get(name)
	}

	/// The one-argument `set<Property>` method for `property`.
	pub fn setter_for(&self, property: &str) -> Option<&Member> {
		let setter = self.properties.get(property)?.setter.as_deref()?;
		self.methods.get(setter)
	}

	/// The `<property>Changed` signal for `property`.
	pub fn change_signal_for(&self, property: &str) -> Option<&Member> {
		let signal = self.properties.get(property)?.change_signal.as_deref()?;
		self.signals.get(signal)
	}

	/// The property whose change signal is `signal`.
	pub fn property_for_change_signal(&self, signal: &str) -> Option<&Property> {
		self.properties
			.values()
			.find(|p| p.change_signal.as_deref() == Some(signal))
	}

	/// Whether objects of this type are list models.
	pub fn is_model(&self) -> bool {
		self.properties.contains_key(MODEL_PROPERTY)
	}
}

fn setter_name(property: &str) -> Option<String> {
	let mut chars = property.chars();
	let first = chars.next()?;
	Some(format!("set{}{}", first.to_uppercase(), chars.as_str()))
}

fn change_signal_name(property: &str) -> String {
	format!("{property}Changed")
}

/// Schema cache keyed by type name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
	schemas: DashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the schema for `descriptor`, building and caching it on first sight.
	///
	/// A cached schema is never replaced. An `omitted` descriptor is resolved by name;
	/// if the name was never delivered, an empty schema is returned (and not cached).
	pub fn resolve(&self, descriptor: &TypeDescriptor) -> Arc<Schema> {
		if let Some(schema) = self.get(&descriptor.name) {
			return schema;
		}
		if descriptor.omitted {
			tracing::warn!(type_name = %descriptor.name, "Omitted type was never described, using empty schema");
			return Arc::new(Schema::empty(&descriptor.name));
		}
		let schema = Arc::new(Schema::from_descriptor(descriptor));
		tracing::debug!(
			type_name = %descriptor.name,
			properties = schema.properties.len(),
			methods = schema.methods.len(),
			signals = schema.signals.len(),
			"Built schema"
		);
		Arc::clone(
			self.schemas
				.entry(descriptor.name.clone())
				.or_insert(schema)
				.value(),
		)
	}

	pub fn get(&self, type_name: &str) -> Option<Arc<Schema>> {
		self.schemas.get(type_name).map(|r| Arc::clone(r.value()))
	}

	pub fn contains(&self, type_name: &str) -> bool {
		self.schemas.contains_key(type_name)
	}

	pub fn len(&self) -> usize {
		self.schemas.len()
	}

	pub fn is_empty(&self) -> bool {
		self.schemas.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn person() -> TypeDescriptor {
		TypeDescriptor::named("Person")
			.with_property("name", "string")
			.with_property("age", "int")
			.with_property("friend", "object")
			.with_property("tags", "array")
			.with_method("setName", &["string"])
			.with_method("setAge", &["int", "bool"])
			.with_method("greet", &["string who"])
			.with_signal("nameChanged", &[])
			.with_signal("greeted", &["string who", "int times"])
	}

	#[test]
	fn test_kinds_from_tags() {
		let schema = Schema::from_descriptor(&person());
		assert_eq!(schema.property("name").unwrap().kind, ValueKind::String);
		assert_eq!(schema.property("age").unwrap().kind, ValueKind::Int);
		assert_eq!(schema.property("friend").unwrap().kind, ValueKind::Object);
		assert_eq!(schema.property("tags").unwrap().kind, ValueKind::Array);
	}

	#[test]
	fn test_unknown_tag_is_var() {
		let schema = Schema::from_descriptor(&TypeDescriptor::named("T").with_property("blob", "QByteArray"));
		assert_eq!(schema.property("blob").unwrap().kind, ValueKind::Var);
	}

	#[test]
	fn test_setter_requires_one_parameter() {
		let schema = Schema::from_descriptor(&person());
		assert_eq!(schema.setter_for("name").unwrap().name, "setName");
		assert!(schema.property("name").unwrap().is_writable());
		assert!(schema.setter_for("age").is_none());
		assert!(schema.setter_for("friend").is_none());
	}

	#[test]
	fn test_change_signal_linking() {
		let schema = Schema::from_descriptor(&person());
		assert_eq!(schema.change_signal_for("name").unwrap().name, "nameChanged");
		assert!(schema.change_signal_for("age").is_none());
		assert_eq!(schema.property_for_change_signal("nameChanged").unwrap().name, "name");
	}

	#[test]
	fn test_signal_parameters() {
		let schema = Schema::from_descriptor(&person());
		let greeted = schema.signal("greeted").unwrap();
		assert_eq!(greeted.params.len(), 2);
		assert_eq!(greeted.params[0].name.as_deref(), Some("who"));
		assert_eq!(greeted.params[1].kind, ValueKind::Int);
	}

	#[test]
	fn test_is_model() {
		assert!(!Schema::from_descriptor(&person()).is_model());
		let model = TypeDescriptor::named("People").with_property(MODEL_PROPERTY, "object");
		assert!(Schema::from_descriptor(&model).is_model());
	}

	#[test]
	fn test_registry_caches_by_name() {
		let registry = SchemaRegistry::new();
		let first = registry.resolve(&person());
		let second = registry.resolve(&TypeDescriptor::named("Person").with_property("other", "int"));
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn test_registry_resolves_omitted() {
		let registry = SchemaRegistry::new();
		let full = registry.resolve(&person());

		let omitted = TypeDescriptor {
			omitted: true,
			..TypeDescriptor::named("Person")
		};
		assert!(Arc::ptr_eq(&full, &registry.resolve(&omitted)));
	}

	#[test]
	fn test_registry_omitted_miss_is_empty_and_uncached() {
		let registry = SchemaRegistry::new();
		let omitted = TypeDescriptor {
			omitted: true,
			..TypeDescriptor::named("Ghost")
		};
		let schema = registry.resolve(&omitted);
		assert_eq!(schema.name(), "Ghost");
		assert_eq!(schema.properties().count(), 0);
		assert!(!registry.contains("Ghost"));
	}
}
