//! Module: config
//! Responsibility: decode compiler configuration from TOML.
//! Does not own: the meaning of restricted fields or field typing (see
//! `acsql_core::store`).
//! Boundary: every decode or validation failure surfaces as
//! `ErrorKind::Config`.

use crate::error::Error;
use acsql_core::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

///
/// CompilerConfig
///
/// ```toml
/// [store.restricted]
/// users = ["password", "salt"]
///
/// [store.fields.devices]
/// Uptime = ["number"]
/// ```
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub store: StoreConfig,
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self =
            toml::from_str(text).map_err(|err| Error::config(format!("invalid config: {err}")))?;
        config.validate()?;

        debug!(
            restricted = config.store.restricted.len(),
            typed = config.store.fields.len(),
            "loaded compiler config"
        );

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read config '{}': {err}", path.display()))
        })?;

        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), Error> {
        for (collection, fields) in &self.store.fields {
            if let Some((field, _)) = fields.iter().find(|(_, types)| types.is_empty()) {
                return Err(Error::config(format!(
                    "field '{field}' of collection '{collection}' lists no types"
                )));
            }
        }

        Ok(())
    }
}
