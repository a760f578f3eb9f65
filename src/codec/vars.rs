//! Package policy variables.
//!
//! A variable value is scalar, list, map or unset. Values of `yaml` typed
//! variables are sent to Fleet as literal YAML strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Discriminant of a [`VarValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Empty,
    Scalar,
    List,
    Map,
}

/// Value of a package policy variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum VarValue {
    /// Never set; encodes as `null`
    #[default]
    Empty,
    /// String, number or boolean
    Scalar(Value),
    List(Vec<Value>),
    Map(Map<String, Value>),
}

impl VarValue {
    /// Classify a decoded JSON or YAML value.
    pub fn unpack(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Array(list) => Self::List(list),
            Value::Object(map) => Self::Map(map),
            scalar => Self::Scalar(scalar),
        }
    }

    pub fn kind(&self) -> VarKind {
        match self {
            Self::Empty => VarKind::Empty,
            Self::Scalar(_) => VarKind::Scalar,
            Self::List(_) => VarKind::List,
            Self::Map(_) => VarKind::Map,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind() == VarKind::Empty
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Scalar(v) => v.clone(),
            Self::List(l) => Value::Array(l.clone()),
            Self::Map(m) => Value::Object(m.clone()),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        Self::Scalar(Value::String(s.to_string()))
    }
}

impl From<Value> for VarValue {
    fn from(value: Value) -> Self {
        Self::unpack(value)
    }
}

impl Serialize for VarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VarValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::unpack)
    }
}

/// A typed variable, as carried by the legacy wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Var {
    #[serde(default)]
    pub value: VarValue,
    #[serde(rename = "type", default)]
    pub var_type: String,
}

impl Var {
    pub fn new(var_type: impl Into<String>, value: impl Into<VarValue>) -> Self {
        Self {
            value: value.into(),
            var_type: var_type.into(),
        }
    }

    /// Value as sent in the simplified format.
    fn encoded(&self) -> Value {
        if self.var_type == "yaml" {
            match &self.value {
                VarValue::Empty | VarValue::Scalar(Value::String(_)) => {}
                other => {
                    if let Ok(yaml) = serde_yaml::to_string(&other.to_json()) {
                        return Value::String(yaml);
                    }
                }
            }
        }
        self.value.to_json()
    }
}

/// Named variables of a package policy, input or stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(pub BTreeMap<String, Var>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, var: Var) {
        self.0.insert(name.into(), var);
    }

    pub fn get(&self, name: &str) -> Option<&Var> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Var)> {
        self.0.iter()
    }

    /// Plain name to value map for the simplified format; `None` when empty.
    pub fn to_map(&self) -> Option<Map<String, Value>> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.encoded()))
                .collect(),
        )
    }

    /// Typed `{value, type}` map for the legacy format; `None` when empty.
    pub fn to_legacy(&self) -> Option<&BTreeMap<String, Var>> {
        if self.0.is_empty() { None } else { Some(&self.0) }
    }

    /// Untyped vars read back from a simplified payload.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        Var {
                            value: VarValue::unpack(v.clone()),
                            var_type: String::new(),
                        },
                    )
                })
                .collect(),
        )
    }
}

impl FromIterator<(String, Var)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Var)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
