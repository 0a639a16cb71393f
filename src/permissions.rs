use std::{collections::BTreeMap, fs, path::Path};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::errors::CatalogError;

pub const PERMISSION_PREFIX: &str = "android.permission.";
pub const UNKNOWN_LEVEL: &str = "unknown";

const DANGEROUS: &[&str] = &[
    "ACCEPT_HANDOVER",
    "ACCESS_BACKGROUND_LOCATION",
    "ACCESS_COARSE_LOCATION",
    "ACCESS_FINE_LOCATION",
    "ACCESS_MEDIA_LOCATION",
    "ACTIVITY_RECOGNITION",
    "ADD_VOICEMAIL",
    "ANSWER_PHONE_CALLS",
    "BLUETOOTH_ADVERTISE",
    "BLUETOOTH_CONNECT",
    "BLUETOOTH_SCAN",
    "BODY_SENSORS",
    "BODY_SENSORS_BACKGROUND",
    "CALL_PHONE",
    "CAMERA",
    "GET_ACCOUNTS",
    "NEARBY_WIFI_DEVICES",
    "POST_NOTIFICATIONS",
    "PROCESS_OUTGOING_CALLS",
    "READ_CALENDAR",
    "READ_CALL_LOG",
    "READ_CONTACTS",
    "READ_EXTERNAL_STORAGE",
    "READ_MEDIA_AUDIO",
    "READ_MEDIA_IMAGES",
    "READ_MEDIA_VIDEO",
    "READ_MEDIA_VISUAL_USER_SELECTED",
    "READ_PHONE_NUMBERS",
    "READ_PHONE_STATE",
    "READ_SMS",
    "RECEIVE_MMS",
    "RECEIVE_SMS",
    "RECEIVE_WAP_PUSH",
    "RECORD_AUDIO",
    "SEND_SMS",
    "USE_SIP",
    "UWB_RANGING",
    "WRITE_CALENDAR",
    "WRITE_CALL_LOG",
    "WRITE_CONTACTS",
    "WRITE_EXTERNAL_STORAGE",
];

const NORMAL: &[&str] = &[
    "ACCESS_NETWORK_STATE",
    "ACCESS_NOTIFICATION_POLICY",
    "ACCESS_WIFI_STATE",
    "BLUETOOTH",
    "BLUETOOTH_ADMIN",
    "CHANGE_NETWORK_STATE",
    "CHANGE_WIFI_MULTICAST_STATE",
    "CHANGE_WIFI_STATE",
    "EXPAND_STATUS_BAR",
    "FOREGROUND_SERVICE",
    "INTERNET",
    "KILL_BACKGROUND_PROCESSES",
    "MODIFY_AUDIO_SETTINGS",
    "NFC",
    "READ_SYNC_SETTINGS",
    "RECEIVE_BOOT_COMPLETED",
    "REQUEST_IGNORE_BATTERY_OPTIMIZATIONS",
    "SET_ALARM",
    "SET_WALLPAPER",
    "USE_BIOMETRIC",
    "USE_FINGERPRINT",
    "VIBRATE",
    "WAKE_LOCK",
    "WRITE_SYNC_SETTINGS",
];

const SIGNATURE: &[&str] = &[
    "BIND_ACCESSIBILITY_SERVICE",
    "BIND_DEVICE_ADMIN",
    "BIND_NOTIFICATION_LISTENER_SERVICE",
    "BROADCAST_SMS",
    "DUMP",
    "INSTALL_PACKAGES",
    "MANAGE_EXTERNAL_STORAGE",
    "PACKAGE_USAGE_STATS",
    "READ_LOGS",
    "REQUEST_INSTALL_PACKAGES",
    "SYSTEM_ALERT_WINDOW",
    "WRITE_SECURE_SETTINGS",
    "WRITE_SETTINGS",
];

lazy_static! {
    static ref BUILTIN: PermissionCatalog = {
        let mut catalog = PermissionCatalog::default();
        for (names, level) in [(DANGEROUS, "dangerous"), (NORMAL, "normal"), (SIGNATURE, "signature")] {
            for name in names {
                catalog.insert(PermissionEntry {
                    name: format!("{PERMISSION_PREFIX}{name}"),
                    protection_level: level.to_string(),
                    description: None,
                });
            }
        }
        catalog
    };
}

/// One record of a permission reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Full identifier, e.g. `android.permission.CAMERA`.
    pub name: String,
    pub protection_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Permission identifier to protection level lookup.
#[derive(Debug, Default, Clone)]
pub struct PermissionCatalog {
    entries: BTreeMap<String, PermissionEntry>,
}

impl PermissionCatalog {
    /// Well-known platform permissions.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Loads a JSON array of [`PermissionEntry`]. Bare names such as
    /// `CAMERA` are stored under their `android.permission.` identifier.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<PermissionEntry> =
            serde_json::from_str(&text).map_err(|source| CatalogError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, mut entry: PermissionEntry) {
        if !entry.name.contains('.') {
            entry.name = format!("{PERMISSION_PREFIX}{}", entry.name);
        }
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, permission: &str) -> Option<&PermissionEntry> {
        self.entries.get(permission)
    }

    /// Resolves the protection level of `permission`: the catalog first, then
    /// the app's own `<permission>` declarations, otherwise
    /// [`UNKNOWN_LEVEL`].
    pub fn protection_level(
        &self,
        permission: &str,
        declared: &BTreeMap<String, String>,
    ) -> String {
        if let Some(entry) = self.get(permission) {
            return entry.protection_level.clone();
        }
        match declared.get(permission) {
            Some(raw) => protection_level_name(raw),
            None => UNKNOWN_LEVEL.to_string(),
        }
    }
}

/// Normalizes a manifest `protectionLevel` value. Compiled manifests carry
/// the integer form, whose low nibble is the base level and whose upper bits
/// are flags (ignored here).
pub fn protection_level_name(raw: &str) -> String {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u32>().ok(),
    };
    match value.map(|v| v & 0xf) {
        Some(0) => "normal".into(),
        Some(1) => "dangerous".into(),
        Some(2) => "signature".into(),
        Some(3) => "signatureOrSystem".into(),
        Some(_) => UNKNOWN_LEVEL.into(),
        None if raw.is_empty() => UNKNOWN_LEVEL.into(),
        None => raw.to_string(),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub dangerous: usize,
    pub normal: usize,
}

impl RiskCounts {
    /// Counts levels mentioning `dangerous` or `normal`, case-insensitively.
    pub fn tally<'a>(levels: impl IntoIterator<Item = &'a String>) -> Self {
        let mut counts = Self::default();
        for level in levels {
            let level = level.to_lowercase();
            if level.contains("dangerous") {
                counts.dangerous += 1;
            }
            if level.contains("normal") {
                counts.normal += 1;
            }
        }
        counts
    }
}
