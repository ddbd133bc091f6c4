//! Message locations.

use std::fmt;

use crate::error::{ConfluxError, Result};
use crate::value::Value;

const APP_URI: &str = "app_uri";
const GRAPH_ID: &str = "graph_id";
const EXTENSION_GROUP: &str = "extension_group";
const EXTENSION: &str = "extension";

/// Where a message comes from or goes to. Unset parts are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Loc {
    pub app_uri: Option<String>,
    pub graph_id: Option<String>,
    pub extension_group: Option<String>,
    pub extension: Option<String>,
}

impl Loc {
    /// Location of a named extension, the rest left for the engine to fill.
    pub fn extension(name: impl Into<String>) -> Self {
        Self {
            extension: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn new(
        app_uri: Option<&str>,
        graph_id: Option<&str>,
        extension_group: Option<&str>,
        extension: Option<&str>,
    ) -> Self {
        Self {
            app_uri: app_uri.map(str::to_owned),
            graph_id: graph_id.map(str::to_owned),
            extension_group: extension_group.map(str::to_owned),
            extension: extension.map(str::to_owned),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.app_uri.is_none()
            && self.graph_id.is_none()
            && self.extension_group.is_none()
            && self.extension.is_none()
    }

    pub fn to_value(&self) -> Value {
        let parts = [
            (APP_URI, &self.app_uri),
            (GRAPH_ID, &self.graph_id),
            (EXTENSION_GROUP, &self.extension_group),
            (EXTENSION, &self.extension),
        ];
        Value::Object(
            parts
                .into_iter()
                .filter_map(|(k, v)| v.as_ref().map(|s| (k.to_owned(), Value::String(s.clone()))))
                .collect(),
        )
    }

    pub fn from_value(v: &Value) -> Result<Self> {
        let members = v.as_object()?;
        let mut loc = Loc::default();
        for (k, v) in members {
            let slot = match k.as_str() {
                APP_URI => &mut loc.app_uri,
                GRAPH_ID => &mut loc.graph_id,
                EXTENSION_GROUP => &mut loc.extension_group,
                EXTENSION => &mut loc.extension,
                other => {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "unknown location member `{other}`"
                    )))
                }
            };
            *slot = match v {
                Value::Null => None,
                v => Some(v.as_str()?.to_owned()),
            };
        }
        Ok(loc)
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_default();
        write!(
            f,
            "{}/{}/{}/{}",
            part(&self.app_uri),
            part(&self.graph_id),
            part(&self.extension_group),
            part(&self.extension)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_form_skips_unset_parts() {
        let loc = Loc::new(Some("localhost"), None, Some("g"), Some("a"));
        let v = loc.to_value();
        assert_eq!(v.as_object().unwrap().len(), 3);
        assert_eq!(Loc::from_value(&v).unwrap(), loc);
        assert_eq!(loc.to_string(), "localhost//g/a");
    }

    #[test]
    fn rejects_unknown_member() {
        let mut v = Value::object();
        v.insert("planet", Value::from("mars")).unwrap();
        assert!(Loc::from_value(&v).is_err());
    }
}
