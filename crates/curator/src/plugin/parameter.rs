use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PluginError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ParameterKind {
    Boolean,
    String,
    Enumerated(&'static [&'static str]),
    /// Name of a descriptive metadata type (`dc`, `ead`, `mods`, ...).
    MetadataType,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginParameter {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: ParameterKind,
    pub default: Option<&'static str>,
    pub mandatory: bool,
    pub read_only: bool,
    pub description: &'static str,
}

impl PluginParameter {
    pub fn boolean(id: &'static str, name: &'static str, default: bool) -> Self {
        Self {
            id,
            name,
            kind: ParameterKind::Boolean,
            default: Some(if default { "true" } else { "false" }),
            mandatory: true,
            read_only: false,
            description: "",
        }
    }

    pub fn string(id: &'static str, name: &'static str, default: Option<&'static str>) -> Self {
        Self {
            id,
            name,
            kind: ParameterKind::String,
            default,
            mandatory: default.is_some(),
            read_only: false,
            description: "",
        }
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Coerces a raw value to this parameter's type, returning its
    /// canonical string form.
    fn coerce(&self, raw: &str) -> Result<String, PluginError> {
        let invalid = |reason: String| PluginError::InvalidParameter {
            id: self.id.to_string(),
            reason,
        };

        match &self.kind {
            ParameterKind::Boolean => match raw.trim().to_lowercase().as_str() {
                "true" => Ok("true".to_string()),
                "false" => Ok("false".to_string()),
                other => Err(invalid(format!("'{}' is not true or false", other))),
            },
            ParameterKind::String => Ok(raw.to_string()),
            ParameterKind::Enumerated(values) => {
                if values.iter().any(|value| *value == raw) {
                    Ok(raw.to_string())
                } else {
                    Err(invalid(format!(
                        "'{}' is not one of [{}]",
                        raw,
                        values.join(", ")
                    )))
                }
            }
            ParameterKind::MetadataType => {
                let value = raw.trim();
                let valid = !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
                if valid {
                    Ok(value.to_lowercase())
                } else {
                    Err(invalid(format!("'{}' is not a metadata type name", raw)))
                }
            }
        }
    }
}

/// Ordered collection of the parameters a plugin accepts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterSet {
    parameters: Vec<PluginParameter>,
}

impl ParameterSet {
    pub fn new(parameters: Vec<PluginParameter>) -> Self {
        Self { parameters }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginParameter> {
        self.parameters.iter()
    }

    pub fn get(&self, id: &str) -> Option<&PluginParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Binds supplied values. Unknown keys and values that cannot be coerced
    /// are rejected; absent values fall back to the declared default.
    pub fn bind(&self, values: &BTreeMap<String, String>) -> Result<BoundParameters, PluginError> {
        if let Some(unknown) = values.keys().find(|key| self.get(key).is_none()) {
            return Err(PluginError::UnknownParameter(unknown.clone()));
        }

        let mut bound = BTreeMap::new();
        for parameter in &self.parameters {
            let value = match (values.get(parameter.id), parameter.default) {
                (Some(raw), default) => {
                    let value = parameter.coerce(raw)?;
                    if parameter.read_only {
                        let expected = default.map(|d| parameter.coerce(d)).transpose()?;
                        if expected.as_deref() != Some(value.as_str()) {
                            return Err(PluginError::InvalidParameter {
                                id: parameter.id.to_string(),
                                reason: "parameter is read-only".to_string(),
                            });
                        }
                    }
                    Some(value)
                }
                (None, Some(default)) => Some(parameter.coerce(default)?),
                (None, None) if parameter.mandatory => {
                    return Err(PluginError::MissingParameter(parameter.id.to_string()))
                }
                (None, None) => None,
            };

            if let Some(value) = value {
                bound.insert(parameter.id.to_string(), value);
            }
        }

        Ok(BoundParameters { values: bound })
    }
}

/// Immutable parameter values after binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundParameters {
    values: BTreeMap<String, String>,
}

impl BoundParameters {
    pub fn get_str(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn require_str(&self, id: &str) -> Result<&str, PluginError> {
        self.get_str(id)
            .ok_or_else(|| PluginError::MissingParameter(id.to_string()))
    }

    pub fn get_bool(&self, id: &str) -> Result<bool, PluginError> {
        match self.require_str(id)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(PluginError::InvalidParameter {
                id: id.to_string(),
                reason: format!("'{}' is not a boolean", other),
            }),
        }
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}
