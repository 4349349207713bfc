//! Device targets

use secrecy::{ExposeSecret, SecretString};

/// How the logger authenticates against a device
#[derive(Debug, Clone)]
pub enum AuthMode {
    None,
    Password(SecretString),
    EncryptionKey(SecretString),
}

impl AuthMode {
    /// Resolve the configured credentials.
    ///
    /// Empty strings count as absent; an encryption key wins over a password.
    pub fn resolve(password: Option<&str>, encryption_key: Option<&str>) -> Self {
        let present = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

        if let Some(key) = present(encryption_key) {
            AuthMode::EncryptionKey(SecretString::from(key))
        } else if let Some(password) = present(password) {
            AuthMode::Password(SecretString::from(password))
        } else {
            AuthMode::None
        }
    }

    /// Short description for status output; never includes the secret
    pub fn describe(&self) -> &'static str {
        match self {
            AuthMode::None => "no authentication",
            AuthMode::Password(_) => "API password",
            AuthMode::EncryptionKey(_) => "encryption key",
        }
    }

    pub fn password(&self) -> Option<String> {
        match self {
            AuthMode::Password(p) => Some(p.expose_secret().to_string()),
            _ => None,
        }
    }

    pub fn encryption_key(&self) -> Option<String> {
        match self {
            AuthMode::EncryptionKey(k) => Some(k.expose_secret().to_string()),
            _ => None,
        }
    }
}

/// Identity and connection parameters of one device
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    /// Unique name, also the log file stem
    pub name: String,

    pub host: String,

    pub port: u16,

    pub auth: AuthMode,
}
