//! # Loader Options
//!
//! Controls how decoded Protobuf messages are represented as JSON, for both the
//! responses a client receives and the requests a server handler receives.
//!
//! The options mirror the knobs commonly exposed by dynamic proto loaders
//! (`keepCase`, `longs`, `enums`, `defaults`, `oneofs`) and can be deserialized
//! from any serde format using those camelCase keys.
//!
//! [`DEFAULT_LOADER_OPTIONS`] is the single documented default, threaded explicitly
//! through [`crate::client::ClientSetup`] and [`crate::server::ServerSetup`].
use prost_reflect::{
    DeserializeOptions, DynamicMessage, FieldDescriptor, MapKey, ReflectMessage,
    SerializeOptions, Value as ReflectValue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a family of scalar values is rendered in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    String,
    Number,
}

/// Options applied when transcoding Protobuf messages to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderOptions {
    /// Keep the field names as written in the `.proto` file instead of lowerCamelCase.
    pub keep_case: bool,
    /// Representation of 64-bit integers.
    pub longs: Representation,
    /// Representation of enum values (names or numbers).
    pub enums: Representation,
    /// Emit fields that hold their default value.
    pub defaults: bool,
    /// Add a virtual field per set oneof, named after the oneof, holding the name of the set member.
    pub oneofs: bool,
}

/// Strict, explicit representation: proto field names, 64-bit integers and enums
/// as strings, defaults populated and oneof discriminators emitted.
pub const DEFAULT_LOADER_OPTIONS: LoaderOptions = LoaderOptions {
    keep_case: true,
    longs: Representation::String,
    enums: Representation::String,
    defaults: true,
    oneofs: true,
};

impl Default for LoaderOptions {
    fn default() -> Self {
        DEFAULT_LOADER_OPTIONS
    }
}

impl LoaderOptions {
    pub(crate) fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::new()
            .use_proto_field_name(self.keep_case)
            .stringify_64_bit_integers(self.longs == Representation::String)
            .use_enum_numbers(self.enums == Representation::Number)
            .skip_default_fields(!self.defaults)
    }

    pub(crate) fn deserialize_options(&self) -> DeserializeOptions {
        // Virtual oneof fields may be echoed back by callers.
        DeserializeOptions::new().deny_unknown_fields(false)
    }

    /// Converts a decoded message into JSON according to these options.
    pub fn to_json(&self, message: &DynamicMessage) -> Result<Value, serde_json::Error> {
        let mut value =
            message.serialize_with_options(serde_json::value::Serializer, &self.serialize_options())?;

        if self.oneofs {
            annotate_oneofs(&mut value, message, self.keep_case);
        }

        Ok(value)
    }
}

fn field_key(field: &FieldDescriptor, keep_case: bool) -> String {
    if keep_case {
        field.name().to_string()
    } else {
        field.json_name().to_string()
    }
}

fn map_key_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

fn annotate_oneofs(json: &mut Value, message: &DynamicMessage, keep_case: bool) {
    let Some(object) = json.as_object_mut() else {
        // Well-known types (Timestamp, Duration, ...) serialize to scalars.
        return;
    };

    let descriptor = message.descriptor();

    for oneof in descriptor.oneofs().filter(|oneof| !oneof.is_synthetic()) {
        if let Some(field) = oneof.fields().find(|field| message.has_field(field)) {
            object.insert(
                oneof.name().to_string(),
                Value::String(field_key(&field, keep_case)),
            );
        }
    }

    for field in descriptor.fields() {
        let Some(child) = object.get_mut(&field_key(&field, keep_case)) else {
            continue;
        };

        match &*message.get_field(&field) {
            ReflectValue::Message(nested) => annotate_oneofs(child, nested, keep_case),
            ReflectValue::List(items) => {
                if let Some(array) = child.as_array_mut() {
                    for (json_item, item) in array.iter_mut().zip(items) {
                        if let ReflectValue::Message(nested) = item {
                            annotate_oneofs(json_item, nested, keep_case);
                        }
                    }
                }
            }
            ReflectValue::Map(entries) => {
                if let Some(map) = child.as_object_mut() {
                    for (key, entry) in entries {
                        if let (ReflectValue::Message(nested), Some(json_entry)) =
                            (entry, map.get_mut(&map_key_string(key)))
                        {
                            annotate_oneofs(json_entry, nested, keep_case);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
