//! User-assigned characteristic metadata
//! Records are keyed by (device address, service UUID, characteristic UUID).
//! The connection task only reads them, to pick how a value is rendered.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::types::CharacteristicId;
use crate::core::formatter::{DataType, Endianness};

pub use store::MetadataStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicMetadata {
    pub device_address: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub endianness: Endianness,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CharacteristicMetadata {
    pub fn new(device_address: &str, id: &CharacteristicId, fields: MetadataFields) -> Self {
        let now = Utc::now();
        Self {
            device_address: device_address.to_string(),
            service_uuid: id.service,
            characteristic_uuid: id.characteristic,
            name: fields.name,
            description: fields.description,
            data_type: fields.data_type,
            endianness: fields.endianness,
            unit: fields.unit,
            min_value: fields.min_value,
            max_value: fields.max_value,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.service_uuid, self.characteristic_uuid)
    }

    pub fn matches(&self, device_address: &str, id: &CharacteristicId) -> bool {
        self.device_address.eq_ignore_ascii_case(device_address) && self.id() == *id
    }
}

/// Editable part of a metadata record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data_type: DataType,
    pub endianness: Endianness,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// Keyed lookup consulted when rendering a freshly read value
pub trait MetadataLookup: Send + Sync {
    fn lookup(&self, device_address: &str, id: &CharacteristicId) -> Option<CharacteristicMetadata>;

    /// Data type and byte order to render with; defaults when no record exists
    fn rendering(&self, device_address: &str, id: &CharacteristicId) -> (DataType, Endianness) {
        self.lookup(device_address, id)
            .map(|m| (m.data_type, m.endianness))
            .unwrap_or_default()
    }
}

/// Lookup with no records: everything renders as hex
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataLookup for NoMetadata {
    fn lookup(&self, _device_address: &str, _id: &CharacteristicId) -> Option<CharacteristicMetadata> {
        None
    }
}
