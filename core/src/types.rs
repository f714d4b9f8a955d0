//! Shared types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Settings domain (one admin page)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Api,
    Backup,
    Inventory,
    Maintenance,
    Notifications,
}

impl Domain {
    /// Every domain, in page order
    pub const ALL: [Domain; 5] = [
        Domain::Api,
        Domain::Backup,
        Domain::Inventory,
        Domain::Maintenance,
        Domain::Notifications,
    ];

    /// Short name used in URLs and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Api => "api",
            Domain::Backup => "backup",
            Domain::Inventory => "inventory",
            Domain::Maintenance => "maintenance",
            Domain::Notifications => "notifications",
        }
    }

    /// Page title
    pub fn title(&self) -> &'static str {
        match self {
            Domain::Api => "API",
            Domain::Backup => "Backup",
            Domain::Inventory => "Inventory",
            Domain::Maintenance => "Maintenance",
            Domain::Notifications => "Notification",
        }
    }

    /// Key of the persisted blob for this domain
    pub fn storage_key(&self) -> &'static str {
        match self {
            Domain::Api => "apiSettings",
            Domain::Backup => "backupSettings",
            Domain::Inventory => "inventorySettings",
            Domain::Maintenance => "maintenanceSettings",
            Domain::Notifications => "notificationSettings",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s) || d.storage_key() == s)
            .ok_or_else(|| Error::UnknownDomain(s.to_string()))
    }
}

/// Primitive setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl SettingValue {
    /// Truthiness as a checkbox would read it
    pub fn as_bool(&self) -> bool {
        match self {
            SettingValue::Boolean(b) => *b,
            SettingValue::Integer(i) => *i != 0,
            SettingValue::Float(f) => *f != 0.0,
            SettingValue::String(s) => matches!(s.trim(), "true" | "1" | "on" | "yes"),
        }
    }

    /// Value as an input control would display it
    pub fn as_text(&self) -> String {
        match self {
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Float(f) => f.to_string(),
            SettingValue::String(s) => s.clone(),
        }
    }

    /// Best-effort typed parse of a raw `key=value` string from the command line
    pub fn parse_loose(raw: &str) -> Self {
        match raw {
            "true" => SettingValue::Boolean(true),
            "false" => SettingValue::Boolean(false),
            _ => SettingValue::String(raw.to_string()),
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(SettingValue::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(SettingValue::Integer)
                .or_else(|| n.as_f64().map(SettingValue::Float)),
            serde_json::Value::String(s) => Some(SettingValue::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Flat settings mapping for one domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsBlob(BTreeMap<String, SettingValue>);

impl SettingsBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a persisted blob
    ///
    /// The top level must be a JSON object. Nested objects one level deep are
    /// flattened into `parent.child` keys; nulls, arrays and deeper nesting are
    /// dropped.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Object(map) = value else {
            return Err(Error::StorageError("settings blob is not an object".into()));
        };

        let mut blob = SettingsBlob::new();
        for (key, value) in &map {
            if let Some(v) = SettingValue::from_json(value) {
                blob.insert(key.clone(), v);
            } else if let serde_json::Value::Object(inner) = value {
                for (child, value) in inner {
                    if let Some(v) = SettingValue::from_json(value) {
                        blob.insert(format!("{}.{}", key, child), v);
                    }
                }
            }
        }
        Ok(blob)
    }

    /// Serialize to the persisted JSON form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(SettingValue::as_bool)
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(SettingValue::as_text)
    }

    /// Set a key; NaN and infinite floats have no JSON form and are skipped
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        let value = value.into();
        if let SettingValue::Float(f) = value {
            if !f.is_finite() {
                return;
            }
        }
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every entry of `other` over this blob
    pub fn extend(&mut self, other: &SettingsBlob) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for SettingsBlob {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut blob = SettingsBlob::new();
        for (k, v) in iter {
            blob.insert(k, v);
        }
        blob
    }
}

impl IntoIterator for SettingsBlob {
    type Item = (String, SettingValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, SettingValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        assert_eq!("api".parse::<Domain>().unwrap(), Domain::Api);
        assert_eq!("Backup".parse::<Domain>().unwrap(), Domain::Backup);
        assert_eq!("maintenanceSettings".parse::<Domain>().unwrap(), Domain::Maintenance);
        assert!("billing".parse::<Domain>().is_err());
    }

    #[test]
    fn test_blob_json_keeps_types() {
        let mut blob = SettingsBlob::new();
        blob.insert("apiTimeout", "30");
        blob.insert("enableCORS", true);
        blob.insert("maxRetries", 3_i64);
        blob.insert("ratio", 0.25);
        blob.insert("empty", "");

        let parsed = SettingsBlob::parse(&blob.to_json().unwrap()).unwrap();
        assert_eq!(parsed, blob);
        assert_eq!(parsed.get("apiTimeout"), Some(&SettingValue::String("30".into())));
        assert_eq!(parsed.get("maxRetries"), Some(&SettingValue::Integer(3)));
    }

    #[test]
    fn test_non_finite_floats_are_not_stored() {
        let mut blob = SettingsBlob::new();
        blob.insert("ratio", 0.5);
        blob.insert("ceiling", f64::INFINITY);
        blob.insert("floor", f64::NEG_INFINITY);
        blob.insert("unknown", f64::NAN);
        let collected: SettingsBlob = [("nan", f64::NAN)].into_iter().collect();

        assert_eq!(blob.len(), 1);
        assert!(collected.is_empty());
        assert_eq!(SettingsBlob::parse(&blob.to_json().unwrap()).unwrap(), blob);
    }

    #[test]
    fn test_blob_parse_flattens_one_level() {
        let raw = r#"{"smtp": {"host": "mail.local", "port": 587}, "list": [1, 2], "n": null, "on": true}"#;
        let blob = SettingsBlob::parse(raw).unwrap();
        assert_eq!(blob.get_text("smtp.host").as_deref(), Some("mail.local"));
        assert_eq!(blob.get("smtp.port"), Some(&SettingValue::Integer(587)));
        assert!(!blob.contains_key("list"));
        assert!(!blob.contains_key("n"));
        assert_eq!(blob.get_bool("on"), Some(true));
    }

    #[test]
    fn test_blob_parse_rejects_non_object() {
        assert!(SettingsBlob::parse("[1,2,3]").is_err());
        assert!(SettingsBlob::parse("\"text\"").is_err());
        assert!(SettingsBlob::parse("{not json").is_err());
    }

    #[test]
    fn test_value_truthiness() {
        assert!(SettingValue::from("true").as_bool());
        assert!(SettingValue::from("1").as_bool());
        assert!(!SettingValue::from("0").as_bool());
        assert!(!SettingValue::from("").as_bool());
        assert!(SettingValue::Integer(2).as_bool());
        assert!(!SettingValue::Integer(0).as_bool());
    }
}
