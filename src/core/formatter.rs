//! Characteristic value formatting
//! Renders raw characteristic bytes as text according to a declared data type
//! and byte order. Every failure resolves to a descriptive string.

use serde::{Deserialize, Serialize};

/// Rendered for an empty or absent value
pub const NOT_AVAILABLE: &str = "N/A";

/// Rendered when `DataType::String` bytes are not valid UTF-8
pub const INVALID_TEXT: &str = "Invalid UTF-8";

/// How a characteristic's bytes should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Float,
    /// Hex dump followed by an ASCII projection
    #[default]
    HexRaw,
}

/// Byte order of multi-byte numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endianness {
    /// Most common for BLE payloads
    #[default]
    LittleEndian,
    /// Network byte order
    BigEndian,
}

/// Decodes `bytes` into display text.
pub fn format_value(bytes: Option<&[u8]>, data_type: DataType, endianness: Endianness) -> String {
    let bytes = match bytes {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return NOT_AVAILABLE.to_string(),
    };

    match data_type {
        DataType::String => format_as_string(bytes),
        DataType::Integer => format_as_integer(bytes, endianness),
        DataType::Float => format_as_float(bytes, endianness),
        DataType::HexRaw => format_as_hex_and_ascii(bytes),
    }
}

fn format_as_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => INVALID_TEXT.to_string(),
    }
}

fn format_as_integer(bytes: &[u8], endianness: Endianness) -> String {
    let decoded = match bytes.len() {
        1 => Ok((i64::from(bytes[0] as i8), u64::from(bytes[0]))),
        2 => fixed::<2>(bytes).map(|raw| {
            let unsigned = match endianness {
                Endianness::LittleEndian => u16::from_le_bytes(raw),
                Endianness::BigEndian => u16::from_be_bytes(raw),
            };
            (i64::from(unsigned as i16), u64::from(unsigned))
        }),
        4 => fixed::<4>(bytes).map(|raw| {
            let unsigned = match endianness {
                Endianness::LittleEndian => u32::from_le_bytes(raw),
                Endianness::BigEndian => u32::from_be_bytes(raw),
            };
            (i64::from(unsigned as i32), u64::from(unsigned))
        }),
        len => return format!("Size {} bytes - use Int8/16/32", len),
    };

    match decoded {
        Ok((signed, unsigned)) => format!("Signed: {}\nUnsigned: {}", signed, unsigned),
        Err(e) => format!("Parse error: {}", e),
    }
}

fn format_as_float(bytes: &[u8], endianness: Endianness) -> String {
    let decoded = match bytes.len() {
        4 => fixed::<4>(bytes).map(|raw| match endianness {
            Endianness::LittleEndian => f64::from(f32::from_le_bytes(raw)),
            Endianness::BigEndian => f64::from(f32::from_be_bytes(raw)),
        }),
        8 => fixed::<8>(bytes).map(|raw| match endianness {
            Endianness::LittleEndian => f64::from_le_bytes(raw),
            Endianness::BigEndian => f64::from_be_bytes(raw),
        }),
        len => return format!("Size {} bytes - use Float(4) or Double(8)", len),
    };

    match decoded {
        Ok(value) => format!("{:.6}", value),
        Err(e) => format!("Parse error: {}", e),
    }
}

fn format_as_hex_and_ascii(bytes: &[u8]) -> String {
    let hex = bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    let ascii: String = bytes
        .iter()
        .map(|&b| if (0x20..=0x7E).contains(&b) { b as char } else { '.' })
        .collect();
    format!("{}\n\"{}\"", hex, ascii)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], std::array::TryFromSliceError> {
    bytes.try_into()
}
