//! JSON-file backed metadata store

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use tokio::fs;

use crate::core::bluetooth::types::CharacteristicId;
use crate::metadata::{CharacteristicMetadata, MetadataFields, MetadataLookup};
use crate::utils::ensure_directory_exists;

/// Metadata records, persisted to `path` after every change when one is set
#[derive(Debug, Default)]
pub struct MetadataStore {
    path: Option<PathBuf>,
    records: RwLock<Vec<CharacteristicMetadata>>,
}

impl MetadataStore {
    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads records from `path`, starting empty if the file does not exist yet.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let json = fs::read_to_string(&path).await?;
            let records: Vec<CharacteristicMetadata> = serde_json::from_str(&json)?;
            info!("Loaded {} metadata records from {:?}", records.len(), path);
            records
        } else {
            warn!("Metadata file not found at {:?}, starting empty.", path);
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// Inserts or updates the record for the key, keeping its creation time.
    pub async fn save_metadata(
        &self,
        device_address: &str,
        id: &CharacteristicId,
        fields: MetadataFields,
    ) -> Result<CharacteristicMetadata> {
        let saved = {
            let mut records = self.write();
            match records.iter_mut().find(|m| m.matches(device_address, id)) {
                Some(existing) => {
                    existing.name = fields.name;
                    existing.description = fields.description;
                    existing.data_type = fields.data_type;
                    existing.endianness = fields.endianness;
                    existing.unit = fields.unit;
                    existing.min_value = fields.min_value;
                    existing.max_value = fields.max_value;
                    existing.updated_at = Utc::now();
                    existing.clone()
                }
                None => {
                    let record = CharacteristicMetadata::new(device_address, id, fields);
                    records.push(record.clone());
                    record
                }
            }
        };
        self.persist().await?;
        Ok(saved)
    }

    pub fn get(&self, device_address: &str, id: &CharacteristicId) -> Option<CharacteristicMetadata> {
        self.read().iter().find(|m| m.matches(device_address, id)).cloned()
    }

    pub fn metadata_for_device(&self, device_address: &str) -> Vec<CharacteristicMetadata> {
        self.read()
            .iter()
            .filter(|m| m.device_address.eq_ignore_ascii_case(device_address))
            .cloned()
            .collect()
    }

    /// All records, most recently updated first
    pub fn all(&self) -> Vec<CharacteristicMetadata> {
        let mut records = self.read().clone();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    /// Removes the record for the key. Returns whether one existed.
    pub async fn delete(&self, device_address: &str, id: &CharacteristicId) -> Result<bool> {
        let removed = {
            let mut records = self.write();
            let before = records.len();
            records.retain(|m| !m.matches(device_address, id));
            records.len() != before
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Removes every record of a device and returns how many were dropped.
    pub async fn delete_all_for_device(&self, device_address: &str) -> Result<usize> {
        let removed = {
            let mut records = self.write();
            let before = records.len();
            records.retain(|m| !m.device_address.eq_ignore_ascii_case(device_address));
            before - records.len()
        };
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = match serde_json::to_string_pretty(&*self.read()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize metadata to JSON: {}", e);
                return Err(e.into());
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(parent).await?;
        }
        fs::write(path, json).await?;
        info!("Metadata saved to {:?}", path);
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<CharacteristicMetadata>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<CharacteristicMetadata>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataLookup for MetadataStore {
    fn lookup(&self, device_address: &str, id: &CharacteristicId) -> Option<CharacteristicMetadata> {
        self.get(device_address, id)
    }
}
