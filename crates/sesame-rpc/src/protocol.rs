//! Secret Service methods and their parameter and result shapes.
//!
//! Each method is a unit type implementing [`Method`], which ties the wire
//! name to typed parameters and output so callers cannot mix them up.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sesame_core::WireAttributes;
use sesame_session::wire::base64_bytes;
use sesame_session::EncodedSecret;

/// Well-known name of the service.
pub const SERVICE_NAME: &str = "org.freedesktop.secrets";

/// Object path meaning "no object" (no prompt needed, alias unset).
pub const NO_OBJECT: &str = "/";

/// Notification emitted when a prompt finishes.
pub const PROMPT_COMPLETED: &str = "PromptCompleted";

/// A protocol method.
pub trait Method {
    /// Wire name.
    const NAME: &'static str;
    type Params: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;
}

/// Result of methods that return nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Whether an object path names a real object.
pub fn is_object(path: &str) -> bool {
    !path.is_empty() && path != NO_OBJECT
}

macro_rules! method {
    ($(#[$meta:meta])* $name:ident, $params:ty => $output:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Method for $name {
            const NAME: &'static str = stringify!($name);
            type Params = $params;
            type Output = $output;
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionParams {
    pub algorithm: String,
    #[serde(with = "base64_bytes", default)]
    pub input: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionResult {
    #[serde(with = "base64_bytes", default)]
    pub output: Vec<u8>,
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionParams {
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItemsParams {
    pub attributes: WireAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchItemsResult {
    #[serde(default)]
    pub unlocked: Vec<String>,
    #[serde(default)]
    pub locked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSecretsParams {
    pub items: Vec<String>,
    pub session: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSecretsResult {
    /// Secrets keyed by item path. Locked items are left out.
    #[serde(default)]
    pub secrets: BTreeMap<String, EncodedSecret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsParams {
    pub objects: Vec<String>,
}

/// Result of `Lock` and `Unlock`: the objects changed right away, and a
/// prompt to run for the rest (or [`NO_OBJECT`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResult {
    #[serde(default)]
    pub objects: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptParams {
    pub prompt: String,
    #[serde(default)]
    pub window_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissParams {
    pub prompt: String,
}

/// Payload of the [`PROMPT_COMPLETED`] notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptCompleted {
    pub prompt: String,
    pub dismissed: bool,
    /// Method-specific result: the unlocked paths, the new collection path, ...
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemParams {
    pub item: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProperties {
    pub label: String,
    #[serde(default)]
    pub attributes: WireAttributes,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub modified: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSecretParams {
    pub item: String,
    pub secret: EncodedSecret,
}

/// Properties to change on an item; absent fields are left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetItemPropertiesParams {
    pub item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<WireAttributes>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionParams {
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAliasParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAliasResult {
    /// Collection path, or [`NO_OBJECT`] when the alias is unset.
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAliasParams {
    pub name: String,
    /// Collection path, or [`NO_OBJECT`] to remove the alias.
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionProperties {
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionParams {
    pub properties: CollectionProperties,
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionResult {
    pub collection: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItemProperties {
    pub label: String,
    pub attributes: WireAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemParams {
    pub collection: String,
    pub properties: NewItemProperties,
    pub secret: EncodedSecret,
    pub replace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemResult {
    pub item: String,
    pub prompt: String,
}

method!(
    /// Negotiate a transport session.
    OpenSession, OpenSessionParams => OpenSessionResult
);
method!(CloseSession, CloseSessionParams => Empty);
method!(
    /// Find items across every collection.
    SearchItems, SearchItemsParams => SearchItemsResult
);
method!(GetSecrets, GetSecretsParams => GetSecretsResult);
method!(Unlock, ObjectsParams => LockResult);
method!(Lock, ObjectsParams => LockResult);
method!(
    /// Show a prompt. Completion arrives as a [`PROMPT_COMPLETED`] notification.
    Prompt, PromptParams => Empty
);
method!(Dismiss, DismissParams => Empty);
method!(DeleteItem, ItemParams => PromptResult);
method!(GetItemProperties, ItemParams => ItemProperties);
method!(SetItemProperties, SetItemPropertiesParams => Empty);
method!(SetSecret, SetSecretParams => Empty);
method!(ReadAlias, ReadAliasParams => ReadAliasResult);
method!(SetAlias, SetAliasParams => Empty);
method!(CreateCollection, CreateCollectionParams => CreateCollectionResult);
method!(
    /// Delete a collection with its items. May need a confirmation prompt.
    DeleteCollection, CollectionParams => PromptResult
);
method!(CreateItem, CreateItemParams => CreateItemResult);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(OpenSession::NAME, "OpenSession");
        assert_eq!(GetItemProperties::NAME, "GetItemProperties");
        assert_eq!(CreateItem::NAME, "CreateItem");
    }

    #[test]
    fn test_open_session_input_is_base64() {
        let params = OpenSessionParams {
            algorithm: "plain".to_string(),
            input: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["input"], "AQID");
    }

    #[test]
    fn test_search_result_defaults() {
        let result: SearchItemsResult = serde_json::from_str("{}").unwrap();
        assert!(result.unlocked.is_empty());
        assert!(result.locked.is_empty());
    }

    #[test]
    fn test_set_item_properties_omits_unchanged_fields() {
        let params = SetItemPropertiesParams {
            item: "/org/freedesktop/secrets/collection/login/1".to_string(),
            label: Some("Renamed".to_string()),
            attributes: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["label"], "Renamed");
        assert!(json.get("attributes").is_none());

        let back: SetItemPropertiesParams = serde_json::from_value(json).unwrap();
        assert!(back.attributes.is_none());
    }

    #[test]
    fn test_is_object() {
        assert!(!is_object("/"));
        assert!(!is_object(""));
        assert!(is_object("/org/freedesktop/secrets/collection/login"));
    }
}
