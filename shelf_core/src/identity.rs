//! Stable device identity and per-session client ids.

use std::fmt;

/// Stable device identity, e.g. `SHELF_A1B2C3D4E5F6`.
///
/// Derived once at boot from a hardware identifier and used verbatim in
/// per-device topics and every outbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// `{prefix}_{low 48 bits of hw_id as 12 uppercase hex digits}`.
    pub fn from_hardware_id(prefix: &str, hw_id: u64) -> Self {
        Self(format!("{prefix}_{:012X}", hw_id & 0xFFFF_FFFF_FFFF))
    }

    /// Derive from a textual hardware id (e.g. `/etc/machine-id`): the first
    /// 12 hex digits found. `None` when the text has fewer than 12.
    pub fn from_machine_id(prefix: &str, text: &str) -> Option<Self> {
        let hex: String = text
            .chars()
            .filter(char::is_ascii_hexdigit)
            .take(12)
            .collect();
        if hex.len() < 12 {
            return None;
        }
        u64::from_str_radix(&hex, 16)
            .ok()
            .map(|v| Self::from_hardware_id(prefix, v))
    }

    /// Use an operator-assigned identity as is.
    pub fn explicit(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fresh client id for one broker session: `{identity}-{8 hex}`.
    pub fn session_client_id(&self) -> String {
        let rand = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.0, &rand[..8])
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_is_twelve_uppercase_hex_digits() {
        let id = DeviceIdentity::from_hardware_id("SHELF", 0xDEAD_A1B2_C3D4_E5F6);
        assert_eq!(id.as_str(), "SHELF_A1B2C3D4E5F6");
        let small = DeviceIdentity::from_hardware_id("SHELF", 0x2A);
        assert_eq!(small.to_string(), "SHELF_00000000002A");
    }

    #[test]
    fn machine_id_uses_first_twelve_hex_digits() {
        let id = DeviceIdentity::from_machine_id("SHELF", "0123456789abcdef0123456789abcdef\n")
            .expect("derive");
        assert_eq!(id.as_str(), "SHELF_0123456789AB");
        assert!(DeviceIdentity::from_machine_id("SHELF", "xyz").is_none());
    }

    #[test]
    fn client_ids_differ_per_session() {
        let id = DeviceIdentity::explicit("SHELF_TEST");
        let a = id.session_client_id();
        let b = id.session_client_id();
        assert!(a.starts_with("SHELF_TEST-"));
        assert_eq!(a.len(), "SHELF_TEST-".len() + 8);
        assert_ne!(a, b);
    }
}
