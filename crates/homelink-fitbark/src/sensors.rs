//! Dog activity sensors

use async_trait::async_trait;
use homelink_core::{Result, SensorDescriptor, Snapshot, SnapshotSource, Transform, UniqueId};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::client::FitbarkApi;

pub const ATTRIBUTION: &str = "Data provided by fitbark.com";
pub const ICON: &str = "mdi:dog-side";

/// Fetcher key of the shared relation list
pub const RELATIONS_FETCHER: &str = "dog_relations";

const FIELD_RELATIONS: &str = "dog_relations";
const FIELD_ACTIVITY: &str = "hourly_average";
const FIELD_NAME: &str = "name";
const FIELD_MEDICAL_CONDITIONS: &str = "medical_conditions";

/// Dog fields never shown as attributes
pub const HIDDEN_FIELDS: [&str; 8] = [
    "slug",
    "picture_hash",
    "country",
    "zip",
    "tzoffset",
    "tzname",
    "bluetooth_id",
    FIELD_NAME,
];

/// A dog listed in the user's relations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DogRef {
    pub slug: String,
    pub name: Option<String>,
}

/// Dogs of a relations snapshot; relations without a slug are skipped
pub fn dogs_in(snapshot: &Snapshot) -> Vec<DogRef> {
    let Some(Value::Array(relations)) = snapshot.get(FIELD_RELATIONS) else {
        return Vec::new();
    };
    relations
        .iter()
        .filter_map(|relation| {
            let dog = relation.get("dog")?;
            match dog.get("slug").and_then(Value::as_str) {
                Some(slug) => Some(DogRef {
                    slug: slug.to_string(),
                    name: dog.get(FIELD_NAME).and_then(Value::as_str).map(str::to_string),
                }),
                None => {
                    tracing::warn!("Skipping FitBark relation without a dog slug");
                    None
                }
            }
        })
        .collect()
}

/// Sensor descriptor of one dog
pub fn descriptor(dog: &DogRef) -> SensorDescriptor {
    let fallback = dog.name.clone().unwrap_or_else(|| dog.slug.clone());
    SensorDescriptor::new("activity", fallback, FIELD_ACTIVITY, Transform::Integer)
        .with_name_field(FIELD_NAME)
        .with_icon(ICON)
        .with_attributes(HIDDEN_FIELDS)
        .with_attribution(ATTRIBUTION)
}

/// Dog slug with `-` → `_`
pub fn unique_id(slug: &str) -> UniqueId {
    UniqueId::new(slug)
}

/// Flatten `medical_conditions` to a list of condition names
pub fn normalize_dog(mut dog: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Array(conditions)) = dog.get(FIELD_MEDICAL_CONDITIONS) {
        let names: Vec<Value> = conditions
            .iter()
            .filter_map(|condition| condition.get(FIELD_NAME).cloned())
            .collect();
        dog.insert(FIELD_MEDICAL_CONDITIONS.to_string(), Value::Array(names));
    }
    dog
}

/// The user's dog relations
pub struct DogRelationsSource {
    api: Arc<dyn FitbarkApi>,
}

impl DogRelationsSource {
    pub fn new(api: Arc<dyn FitbarkApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotSource for DogRelationsSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let relations = self.api.dog_relations().await?;
        Ok(Snapshot::from_pairs([(FIELD_RELATIONS, Value::Array(relations))]))
    }

    fn source_name(&self) -> &str {
        RELATIONS_FETCHER
    }
}

/// One dog's record, normalized
pub struct DogSource {
    api: Arc<dyn FitbarkApi>,
    slug: String,
}

impl DogSource {
    pub fn new(api: Arc<dyn FitbarkApi>, slug: impl Into<String>) -> Self {
        Self {
            api,
            slug: slug.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for DogSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let dog = normalize_dog(self.api.dog(&self.slug).await?);
        Ok(Snapshot::new(dog.into_iter().collect()))
    }

    fn source_name(&self) -> &str {
        &self.slug
    }
}
