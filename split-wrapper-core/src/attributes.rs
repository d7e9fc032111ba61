//! Evaluation attributes built per flag key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::{attribute, flag};
use crate::version;

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Attribute name to value.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Facts about the running host that attribute providers draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFacts {
    pub app_version: String,
    pub os_name: String,
    pub os_version: String,
}

impl RuntimeFacts {
    pub fn new(
        app_version: impl Into<String>,
        os_name: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            app_version: app_version.into(),
            os_name: os_name.into(),
            os_version: os_version.into(),
        }
    }

    /// Facts for this host, with the app version supplied by the caller.
    pub fn detect(app_version: impl Into<String>) -> Self {
        let os_name =
            sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string());
        Self::new(app_version, os_name, os_version)
    }
}

type ValueProvider = fn(&RuntimeFacts) -> AttributeValue;

/// Providers registered for one flag.
type AttributeRules = &'static [(&'static str, ValueProvider)];

const APP_VERSION_RULES: AttributeRules = &[(attribute::APP_VERSION, app_version)];

const IS_ASYNC_ON_RULES: AttributeRules = &[
    (attribute::OS_NAME, os_name),
    (attribute::OS_VERSION, os_version),
];

fn app_version(facts: &RuntimeFacts) -> AttributeValue {
    normalized_or_raw(&facts.app_version)
}

fn os_name(facts: &RuntimeFacts) -> AttributeValue {
    facts.os_name.as_str().into()
}

fn os_version(facts: &RuntimeFacts) -> AttributeValue {
    normalized_or_raw(&facts.os_version)
}

fn normalized_or_raw(raw: &str) -> AttributeValue {
    version::normalize(raw)
        .unwrap_or_else(|| raw.to_string())
        .into()
}

fn rules_for(flag_key: &str) -> Option<AttributeRules> {
    match flag_key {
        flag::APP_VERSION => Some(APP_VERSION_RULES),
        flag::IS_ASYNC_ON => Some(IS_ASYNC_ON_RULES),
        _ => None,
    }
}

/// Builds the attribute set each known flag is evaluated with.
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    facts: RuntimeFacts,
}

impl AttributeBuilder {
    pub fn new(facts: RuntimeFacts) -> Self {
        Self { facts }
    }

    pub fn facts(&self) -> &RuntimeFacts {
        &self.facts
    }

    /// Whether `flag_key` has attribute providers registered.
    pub fn is_known(flag_key: &str) -> bool {
        rules_for(flag_key).is_some()
    }

    /// Attributes for `flag_key`.
    ///
    /// Unknown keys yield an empty set and a warning.
    pub fn build(&self, flag_key: &str) -> Attributes {
        let Some(rules) = rules_for(flag_key) else {
            tracing::warn!(flag = flag_key, "no attributes are defined for flag");
            return Attributes::new();
        };

        rules
            .iter()
            .map(|(name, provider)| ((*name).to_string(), provider(&self.facts)))
            .collect()
    }
}
