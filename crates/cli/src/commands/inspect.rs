//! `qbridge inspect`: one snapshot of everything the backend exposes up front.

use std::collections::BTreeMap;

use qbridge::{ClientOptions, Object, TypeDescriptor, Variant};
use serde::Serialize;
use serde_json::Value;

use super::summarize;
use crate::cli::BackendArgs;
use crate::error::Result;
use crate::session::with_client;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectData {
	pub version: i64,
	pub creatable_types: Vec<TypeDescriptor>,
	pub root: ObjectSummary,
	/// List models referenced by root properties, by property name.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub models: BTreeMap<String, ModelSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
	pub identifier: String,
	#[serde(rename = "type")]
	pub type_name: String,
	pub properties: Value,
	pub methods: Vec<String>,
	pub signals: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
	pub identifier: String,
	pub roles: Vec<String>,
	pub row_count: usize,
	pub windowed: bool,
}

pub async fn run(backend: &BackendArgs, options: ClientOptions, models: bool) -> Result<InspectData> {
	with_client(backend, options, move |client| {
		let version = client.version()?;
		let creatable_types = client.creatable_types()?;
		let root = client.root()?;
		tracing::info!(version, types = creatable_types.len(), root = %root.type_name(), "Connected");

		let models = if models { model_summaries(&root)? } else { BTreeMap::new() };
		Ok(InspectData {
			version,
			creatable_types,
			root: summarize(&root)?,
			models,
		})
	})
	.await
}

fn model_summaries(root: &Object) -> Result<BTreeMap<String, ModelSummary>> {
	let mut summaries = BTreeMap::new();
	let names: Vec<String> = root.schema().properties().map(|p| p.name.clone()).collect();
	for name in names {
		let Variant::Object(object) = root.property(&name)? else {
			continue;
		};
		if !object.is_model() {
			continue;
		}
		let model = object.as_model()?;
		summaries.insert(
			name,
			ModelSummary {
				identifier: object.identifier().to_string(),
				roles: model.role_names().to_vec(),
				row_count: model.row_count()?,
				windowed: model.is_windowed(),
			},
		);
	}
	Ok(summaries)
}
