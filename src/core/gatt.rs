//! GATT topology model
//! Snapshot of a peripheral's services and characteristics. Discovery replaces
//! the whole list; a completed read produces a new list in which only the
//! matching characteristic differs.

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    HIDDEN_SERVICES, PROPERTY_INDICATE, PROPERTY_NOTIFY, PROPERTY_READ, PROPERTY_WRITE,
    PROPERTY_WRITE_NO_RESPONSE,
};
use crate::core::bluetooth::types::{CharacteristicId, RawService};

/// Capability of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CharacteristicProperty {
    Read,
    Write,
    WriteNoResponse,
    Notify,
    Indicate,
}

impl CharacteristicProperty {
    const ALL: [(u8, Self); 5] = [
        (PROPERTY_READ, Self::Read),
        (PROPERTY_WRITE, Self::Write),
        (PROPERTY_WRITE_NO_RESPONSE, Self::WriteNoResponse),
        (PROPERTY_NOTIFY, Self::Notify),
        (PROPERTY_INDICATE, Self::Indicate),
    ];

    /// Expands a GATT property bitmask, ignoring bits outside the known set
    pub fn from_bits(bits: u8) -> Vec<Self> {
        Self::ALL
            .iter()
            .filter(|(mask, _)| bits & mask != 0)
            .map(|(_, property)| *property)
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::WriteNoResponse => "WRITE_NO_RESP",
            Self::Notify => "NOTIFY",
            Self::Indicate => "INDICATE",
        }
    }
}

/// One characteristic and its last-read value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    /// Raw bytes of the last successful read
    pub value: Option<Vec<u8>>,
    pub value_size: usize,
    /// `value` rendered for display
    pub formatted_value: Option<String>,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, properties: Vec<CharacteristicProperty>) -> Self {
        Self {
            uuid,
            properties,
            value: None,
            value_size: 0,
            formatted_value: None,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Read)
    }

    /// Returns a copy carrying the given value
    pub fn with_value(&self, value: Vec<u8>, formatted_value: String) -> Self {
        Self {
            value_size: value.len(),
            value: Some(value),
            formatted_value: Some(formatted_value),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

/// Builds the exposed topology from a raw discovery result.
pub fn build_topology(raw: &[RawService]) -> Vec<ServiceInfo> {
    raw.iter()
        .filter(|service| !HIDDEN_SERVICES.contains(&service.uuid))
        .map(|service| ServiceInfo {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .iter()
                .map(|c| CharacteristicInfo::new(c.uuid, CharacteristicProperty::from_bits(c.properties)))
                .collect(),
        })
        .collect()
}

/// Every readable characteristic, in discovery order.
pub fn readable_characteristics(services: &[ServiceInfo]) -> Vec<CharacteristicId> {
    services
        .iter()
        .flat_map(|service| {
            service
                .characteristics
                .iter()
                .filter(|c| c.is_readable())
                .map(move |c| CharacteristicId::new(service.uuid, c.uuid))
        })
        .collect()
}

/// Looks up a characteristic by id.
pub fn find_characteristic<'a>(services: &'a [ServiceInfo], id: &CharacteristicId) -> Option<&'a CharacteristicInfo> {
    services
        .iter()
        .find(|s| s.uuid == id.service)?
        .characteristics
        .iter()
        .find(|c| c.uuid == id.characteristic)
}

/// Returns a new topology where only the characteristic `id` carries the new value.
pub fn apply_read(
    services: &[ServiceInfo],
    id: &CharacteristicId,
    value: &[u8],
    formatted_value: &str,
) -> Vec<ServiceInfo> {
    services
        .iter()
        .map(|service| {
            if service.uuid != id.service {
                return service.clone();
            }
            ServiceInfo {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| {
                        if c.uuid == id.characteristic {
                            c.with_value(value.to_vec(), formatted_value.to_string())
                        } else {
                            c.clone()
                        }
                    })
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{
        UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_DEVICE_NAME, UUID_GENERIC_ACCESS_SERVICE,
        UUID_GENERIC_ATTRIBUTE_SERVICE,
    };
    use crate::core::bluetooth::types::RawCharacteristic;

    fn raw_topology() -> Vec<RawService> {
        vec![
            RawService {
                uuid: UUID_GENERIC_ACCESS_SERVICE,
                characteristics: vec![RawCharacteristic { uuid: UUID_DEVICE_NAME, properties: PROPERTY_READ }],
            },
            RawService { uuid: UUID_GENERIC_ATTRIBUTE_SERVICE, characteristics: vec![] },
            RawService {
                uuid: UUID_BATTERY_SERVICE,
                characteristics: vec![
                    RawCharacteristic { uuid: UUID_BATTERY_LEVEL, properties: PROPERTY_READ | PROPERTY_NOTIFY },
                    RawCharacteristic { uuid: Uuid::from_u128(0xabc), properties: PROPERTY_WRITE },
                ],
            },
        ]
    }

    #[test]
    fn properties_from_bitmask() {
        assert_eq!(
            CharacteristicProperty::from_bits(PROPERTY_READ | PROPERTY_INDICATE | 0x80),
            vec![CharacteristicProperty::Read, CharacteristicProperty::Indicate]
        );
        assert!(CharacteristicProperty::from_bits(0).is_empty());
    }

    #[test]
    fn hidden_services_are_filtered() {
        let services = build_topology(&raw_topology());
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].uuid, UUID_BATTERY_SERVICE);
        assert_eq!(
            readable_characteristics(&services),
            vec![CharacteristicId::new(UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL)]
        );
    }

    #[test]
    fn apply_read_touches_only_the_target() {
        let services = build_topology(&raw_topology());
        let id = CharacteristicId::new(UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL);
        let updated = apply_read(&services, &id, &[0x64], "64\n\"d\"");

        let battery = find_characteristic(&updated, &id).unwrap();
        assert_eq!(battery.value.as_deref(), Some(&[0x64][..]));
        assert_eq!(battery.value_size, 1);
        assert_eq!(battery.formatted_value.as_deref(), Some("64\n\"d\""));
        assert_eq!(updated[0].characteristics[1], services[0].characteristics[1]);

        // unknown ids leave the snapshot equal
        let missing = CharacteristicId::new(Uuid::from_u128(1), UUID_BATTERY_LEVEL);
        assert_eq!(apply_read(&services, &missing, &[1], "01"), services);
    }

    #[test]
    fn equality_is_by_value() {
        let a = CharacteristicInfo::new(UUID_BATTERY_LEVEL, vec![]).with_value(vec![1, 2], "x".into());
        let b = CharacteristicInfo::new(UUID_BATTERY_LEVEL, vec![]).with_value(vec![1, 2], "x".into());
        assert_eq!(a, b);
        let c = a.with_value(vec![1, 3], "x".into());
        assert_ne!(a, c);
    }
}
