//! Logical-to-physical field mapping for the document store.

use crate::error::{ErrorOrigin, InternalError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///
/// Collection
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    #[display("devices")]
    Devices,
    #[display("faults")]
    Faults,
    #[display("tasks")]
    Tasks,
    #[display("presets")]
    Presets,
    #[display("provisions")]
    Provisions,
    #[display("virtualParameters")]
    VirtualParameters,
    #[display("files")]
    Files,
    #[display("config")]
    Config,
    #[display("permissions")]
    Permissions,
    #[display("users")]
    Users,
}

impl Collection {
    pub const ALL: [Self; 10] = [
        Self::Devices,
        Self::Faults,
        Self::Tasks,
        Self::Presets,
        Self::Provisions,
        Self::VirtualParameters,
        Self::Files,
        Self::Config,
        Self::Permissions,
        Self::Users,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Faults => "faults",
            Self::Tasks => "tasks",
            Self::Presets => "presets",
            Self::Provisions => "provisions",
            Self::VirtualParameters => "virtualParameters",
            Self::Files => "files",
            Self::Config => "config",
            Self::Permissions => "permissions",
            Self::Users => "users",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

///
/// PhysicalType
///
/// Storage type of one field value. Booleans, numbers and dates share the
/// numeric rank; strings and object ids the text rank above it.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PhysicalType {
    #[display("bool")]
    Bool,
    #[display("number")]
    Number,
    #[display("date")]
    Date,
    #[display("string")]
    String,
    #[display("objectId")]
    ObjectId,
}

impl PhysicalType {
    /// Device parameter values may hold any of these.
    pub const VALUE: [Self; 4] = [Self::Bool, Self::Number, Self::Date, Self::String];

    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::String | Self::ObjectId)
    }

    /// Name understood by the store's `$type` operator.
    #[must_use]
    pub const fn type_alias(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::ObjectId => "objectId",
        }
    }
}

///
/// StoreConfig
///
/// Access restrictions and extra field typing, keyed by collection.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub restricted: BTreeMap<Collection, BTreeSet<String>>,
    pub fields: BTreeMap<Collection, BTreeMap<String, Vec<PhysicalType>>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let users = ["password", "salt"].into_iter().map(str::to_string).collect();

        Self {
            restricted: BTreeMap::from([(Collection::Users, users)]),
            fields: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn is_restricted(&self, collection: Collection, field: &str) -> bool {
        self.restricted
            .get(&collection)
            .is_some_and(|fields| fields.contains(field))
    }

    fn field_types(&self, collection: Collection, field: &str) -> Option<&[PhysicalType]> {
        self.fields
            .get(&collection)
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
    }
}

///
/// Field
/// Physical target of a logical parameter.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Field {
    Value {
        path: String,
        types: Vec<PhysicalType>,
    },
    /// Membership of a tag in the device's tag array.
    Tag(String),
}

/// Array field holding device tags.
pub(crate) const TAGS_PATH: &str = "_tags";

/// Physical field for a logical parameter path.
pub fn get_param(
    collection: Collection,
    param: &str,
    config: &StoreConfig,
) -> Result<Field, InternalError> {
    if config.is_restricted(collection, param) {
        return Err(InternalError::access_denied(collection, param));
    }
    if param.is_empty() {
        return Err(InternalError::invalid_query(
            ErrorOrigin::Store,
            "empty parameter path",
        ));
    }

    let field = match collection {
        Collection::Devices => device_field(param),
        other => Field::Value {
            path: param.to_string(),
            types: get_types(other, param).to_vec(),
        },
    };

    Ok(match (field, config.field_types(collection, param)) {
        (Field::Value { path, .. }, Some(types)) => Field::Value {
            path,
            types: types.to_vec(),
        },
        (field, _) => field,
    })
}

fn device_field(param: &str) -> Field {
    let fixed = |path: &str, types: &[PhysicalType]| Field::Value {
        path: path.to_string(),
        types: types.to_vec(),
    };

    match param {
        "DeviceID.ID" => fixed("_id", &[PhysicalType::String]),
        "Events.Inform" => fixed("_lastInform", &[PhysicalType::Date]),
        "Events.Registered" => fixed("_registered", &[PhysicalType::Date]),
        "Events.0_BOOTSTRAP" => fixed("_lastBootstrap", &[PhysicalType::Date]),
        "Events.1_BOOT" => fixed("_lastBoot", &[PhysicalType::Date]),
        _ => {
            if let Some(tag) = param.strip_prefix("Tags.") {
                Field::Tag(tag.to_string())
            } else if let Some(part) = param.strip_prefix("DeviceID.") {
                fixed(&format!("_deviceId._{part}"), &[PhysicalType::String])
            } else {
                fixed(&format!("{param}._value"), &PhysicalType::VALUE)
            }
        }
    }
}

/// Plausible physical types of a field outside the devices collection.
#[must_use]
pub fn get_types(collection: Collection, field: &str) -> &'static [PhysicalType] {
    use PhysicalType as P;

    match (collection, field) {
        (Collection::Tasks, "_id") => &[P::ObjectId],
        (Collection::Faults, "timestamp" | "expiry")
        | (Collection::Tasks, "timestamp" | "expiry")
        | (Collection::Files, "uploadDate") => &[P::Date],
        (Collection::Faults, "retries")
        | (Collection::Presets, "weight")
        | (Collection::Files, "length")
        | (Collection::Permissions, "access") => &[P::Number],
        (Collection::Devices, _) => &P::VALUE,
        // identifiers and metadata
        (_, "_id" | "device" | "channel" | "code" | "message" | "name" | "script")
        | (Collection::Files, "filename" | "metadata.fileType" | "metadata.oui")
        | (Collection::Files, "metadata.productClass" | "metadata.version")
        | (Collection::Permissions, "role" | "resource" | "filter" | "validate")
        | (Collection::Users, "roles")
        | (Collection::Presets, "schedule" | "precondition" | "events")
        | (Collection::Config, "value") => &[P::String],
        _ => &P::VALUE,
    }
}
