//! Detected Parameter Model
//!
//! A closed, versioned record of the parameters extracted from a user's
//! request. Keys are a fixed enum, values are a tagged union checked against
//! the key's declared kind, and every field carries its own confidence.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Current version of the parameter schema
pub const PARAMETER_SCHEMA_VERSION: u32 = 1;

/// Keywords (Arabic and English) that mark a business type as commerce
const COMMERCE_KEYWORDS: &[&str] = &[
    "متجر",
    "بيع",
    "تسوق",
    "تجارة",
    "store",
    "shop",
    "sell",
    "commerce",
];

/// Shape of value a parameter key accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Free text
    Text,
    /// One option out of a fixed list
    Choice,
    /// A list of free-text items
    List,
}

/// Closed set of parameters the detector may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKey {
    BusinessType,
    AppName,
    TargetAudience,
    Pages,
    Features,
    PaymentMethod,
    Shipping,
    Language,
    DesignStyle,
}

impl ParameterKey {
    /// All keys, in declaration order
    pub const ALL: [ParameterKey; 9] = [
        ParameterKey::BusinessType,
        ParameterKey::AppName,
        ParameterKey::TargetAudience,
        ParameterKey::Pages,
        ParameterKey::Features,
        ParameterKey::PaymentMethod,
        ParameterKey::Shipping,
        ParameterKey::Language,
        ParameterKey::DesignStyle,
    ];

    /// Wire name (also used as the clarifying question id)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessType => "businessType",
            Self::AppName => "appName",
            Self::TargetAudience => "targetAudience",
            Self::Pages => "pages",
            Self::Features => "features",
            Self::PaymentMethod => "paymentMethod",
            Self::Shipping => "shipping",
            Self::Language => "language",
            Self::DesignStyle => "designStyle",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::BusinessType | Self::AppName | Self::TargetAudience => ValueKind::Text,
            Self::Pages | Self::Features => ValueKind::List,
            Self::PaymentMethod | Self::Shipping | Self::Language | Self::DesignStyle => {
                ValueKind::Choice
            }
        }
    }

    /// Weight of this key in the overall confidence
    pub fn weight(&self) -> f64 {
        match self {
            Self::BusinessType => 3.0,
            Self::Pages | Self::Features | Self::PaymentMethod => 2.0,
            Self::Shipping => 1.5,
            Self::AppName | Self::TargetAudience | Self::Language | Self::DesignStyle => 1.0,
        }
    }

    /// Higher priority questions are surfaced first
    pub fn priority(&self) -> u8 {
        match self {
            Self::BusinessType => 100,
            Self::PaymentMethod => 90,
            Self::Shipping => 85,
            Self::Pages => 70,
            Self::Features => 60,
            Self::TargetAudience => 50,
            Self::AppName => 40,
            Self::Language => 30,
            Self::DesignStyle => 20,
        }
    }

    /// Permissible values for choice keys (empty for text and list keys)
    pub fn options(&self) -> &'static [&'static str] {
        match self {
            Self::PaymentMethod => &["cod", "card", "bankTransfer", "wallet"],
            Self::Shipping => &["local", "national", "international", "pickup"],
            Self::Language => &["ar", "en", "bilingual"],
            Self::DesignStyle => &["modern", "classic", "minimal", "playful"],
            _ => &[],
        }
    }

    /// Keys that only matter for commerce apps
    pub fn is_commerce_only(&self) -> bool {
        matches!(self, Self::PaymentMethod | Self::Shipping)
    }

    /// Whether `value` has the right shape (and option) for this key
    pub fn accepts(&self, value: &ParameterValue) -> bool {
        if value.kind() != self.kind() || value.is_empty() {
            return false;
        }
        match value {
            ParameterValue::Choice(choice) => self.options().contains(&choice.as_str()),
            _ => true,
        }
    }
}

impl std::fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParameterKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CoreError::parse(format!("unknown parameter key: {}", s)))
    }
}

/// Value of a detected parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    Text(String),
    Choice(String),
    List(Vec<String>),
}

impl ParameterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Choice(_) => ValueKind::Choice,
            Self::List(_) => ValueKind::List,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Choice(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }

    /// Human-readable form used in prompts
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) | Self::Choice(s) => s.clone(),
            Self::List(items) => items.join("، "),
        }
    }

    /// Build a value of `key`'s kind from loosely-typed JSON.
    ///
    /// Strings become text/choice values (or a one-item list), arrays of
    /// strings become lists (or are joined for text keys). Anything else,
    /// or a value the key does not accept, yields `None`.
    pub fn from_json(key: ParameterKey, raw: &serde_json::Value) -> Option<ParameterValue> {
        let value = match (key.kind(), raw) {
            (ValueKind::Text, serde_json::Value::String(s)) => Self::Text(s.trim().to_string()),
            (ValueKind::Text, serde_json::Value::Array(items)) => {
                Self::Text(string_items(items)?.join("، "))
            }
            (ValueKind::Choice, serde_json::Value::String(s)) => {
                Self::Choice(s.trim().to_string())
            }
            (ValueKind::List, serde_json::Value::String(s)) => {
                Self::List(vec![s.trim().to_string()])
            }
            (ValueKind::List, serde_json::Value::Array(items)) => Self::List(string_items(items)?),
            _ => return None,
        };
        key.accepts(&value).then_some(value)
    }
}

fn string_items(items: &[serde_json::Value]) -> Option<Vec<String>> {
    let collected: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if collected.is_empty() {
        None
    } else {
        Some(collected)
    }
}

/// Clamp a confidence into [0, 1], mapping NaN to 0
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// A single detected value with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedField {
    pub value: ParameterValue,
    pub confidence: f64,
}

/// The full parameter set for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedParameters {
    pub schema_version: u32,
    pub fields: BTreeMap<ParameterKey, DetectedField>,
    /// Commerce classification fixed by `freeze_requirements`; `None`
    /// derives it from the business type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commerce: Option<bool>,
}

impl Default for DetectedParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectedParameters {
    pub fn new() -> Self {
        Self {
            schema_version: PARAMETER_SCHEMA_VERSION,
            fields: BTreeMap::new(),
            commerce: None,
        }
    }

    pub fn get(&self, key: ParameterKey) -> Option<&DetectedField> {
        self.fields.get(&key)
    }

    /// Set a field, rejecting values that do not fit the key
    pub fn set(
        &mut self,
        key: ParameterKey,
        value: ParameterValue,
        confidence: f64,
    ) -> CoreResult<()> {
        if !key.accepts(&value) {
            return Err(CoreError::validation(format!(
                "value {:?} is not valid for {}",
                value, key
            )));
        }
        self.fields.insert(
            key,
            DetectedField {
                value,
                confidence: clamp_confidence(confidence),
            },
        );
        Ok(())
    }

    /// Confidence of one field (0 when absent)
    pub fn confidence_of(&self, key: ParameterKey) -> f64 {
        self.fields.get(&key).map(|f| f.confidence).unwrap_or(0.0)
    }

    /// Whether the set is treated as a store (frozen or derived)
    pub fn is_commerce(&self) -> bool {
        self.commerce
            .unwrap_or_else(|| self.business_type_is_commerce())
    }

    /// Pin the current required-key set so later edits cannot grow it
    pub fn freeze_requirements(&mut self) {
        self.commerce = Some(self.is_commerce());
    }

    /// Whether the business type text describes a store
    pub fn business_type_is_commerce(&self) -> bool {
        match self.fields.get(&ParameterKey::BusinessType) {
            Some(field) => {
                let text = field.value.display().to_lowercase();
                COMMERCE_KEYWORDS.iter().any(|kw| text.contains(kw))
            }
            None => false,
        }
    }

    /// Whether `key` must be known before generation
    pub fn is_required(&self, key: ParameterKey) -> bool {
        match key {
            ParameterKey::BusinessType | ParameterKey::Pages => true,
            k if k.is_commerce_only() => self.is_commerce(),
            _ => false,
        }
    }

    /// Keys that count toward confidence: required keys plus present keys
    pub fn applicable_keys(&self) -> Vec<ParameterKey> {
        ParameterKey::ALL
            .iter()
            .copied()
            .filter(|k| self.is_required(*k) || self.fields.contains_key(k))
            .collect()
    }

    /// Check the schema version and every stored field
    pub fn validate(&self) -> CoreResult<()> {
        if self.schema_version != PARAMETER_SCHEMA_VERSION {
            return Err(CoreError::validation(format!(
                "unsupported parameter schema version {}",
                self.schema_version
            )));
        }
        for (key, field) in &self.fields {
            if !key.accepts(&field.value) {
                return Err(CoreError::validation(format!(
                    "stored value for {} has the wrong shape",
                    key
                )));
            }
        }
        Ok(())
    }
}
