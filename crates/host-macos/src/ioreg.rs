//! Parsing of `ioreg -a` property-list output.

use anyhow::{Context, Result};
use phoenix_core::RawPciDevice;
use plist::Value;
use std::io::Cursor;

pub fn parse_plist(bytes: &[u8]) -> Result<Value> {
    Value::from_reader(Cursor::new(bytes)).context("parse ioreg plist")
}

/// Reads IOPCIDevice entries from `ioreg -a -r -c IOPCIDevice -d 1`.
pub fn parse_pci_devices(bytes: &[u8]) -> Result<Vec<RawPciDevice>> {
    let value = parse_plist(bytes)?;
    let Some(entries) = value.as_array() else {
        return Ok(Vec::new());
    };
    let mut devices = Vec::new();
    for entry in entries {
        let Some(dict) = entry.as_dictionary() else {
            continue;
        };
        let (Some(vendor_id), Some(device_id)) = (
            dict.get("vendor-id").and_then(data_u32),
            dict.get("device-id").and_then(data_u32),
        ) else {
            continue;
        };
        let class_code = dict.get("class-code").and_then(data_u32).unwrap_or(0);
        let model = dict.get("model").and_then(data_string);
        let path = dict
            .get("acpi-path")
            .and_then(Value::as_string)
            .map(str::to_string)
            .or_else(|| {
                dict.get("IORegistryEntryName")
                    .and_then(Value::as_string)
                    .map(str::to_string)
            });
        devices.push(RawPciDevice {
            vendor_id,
            device_id,
            class_code,
            path,
            model,
        });
    }
    Ok(devices)
}

/// True when `ioreg -a -r -c IOUSBHostDevice` lists a device with this vendor/product pair.
pub fn has_usb_device(bytes: &[u8], vendor_id: u64, product_id: u64) -> Result<bool> {
    let value = parse_plist(bytes)?;
    let Some(entries) = value.as_array() else {
        return Ok(false);
    };
    Ok(entries.iter().filter_map(Value::as_dictionary).any(|dict| {
        dict.get("idVendor").and_then(Value::as_unsigned_integer) == Some(vendor_id)
            && dict.get("idProduct").and_then(Value::as_unsigned_integer) == Some(product_id)
    }))
}

/// Depth-first search for the first property named `key`.
pub fn find_property<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Dictionary(dict) => {
            if let Some(found) = dict.get(key) {
                return Some(found);
            }
            dict.values().find_map(|child| find_property(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_property(child, key)),
        _ => None,
    }
}

/// Little-endian integer stored as `<data>`; ioreg pads these to 4 bytes.
pub fn data_u32(value: &Value) -> Option<u32> {
    let bytes = value.as_data()?;
    if bytes.is_empty() {
        return None;
    }
    Some(
        bytes
            .iter()
            .take(4)
            .enumerate()
            .fold(0u32, |acc, (idx, byte)| acc | (u32::from(*byte) << (idx * 8))),
    )
}

/// NUL-terminated ASCII stored as `<data>`, or a plain string.
pub fn data_string(value: &Value) -> Option<String> {
    if let Some(text) = value.as_string() {
        return Some(text.to_string());
    }
    let bytes = value.as_data()?;
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// UTF-16LE string stored as `<data>` (EFI firmware-vendor).
pub fn data_utf16(value: &Value) -> Option<String> {
    let bytes = value.as_data()?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    String::from_utf16(&units).ok()
}
