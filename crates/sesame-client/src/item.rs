//! Item handles returned by searches.

use std::fmt;
use std::ops::BitOr;

use sesame_core::attributes;
use sesame_core::{AttributeSet, Schema, SecretValue, WireAttributes};
use sesame_rpc::protocol::{
    GetItemProperties, ItemParams, ItemProperties, SetItemProperties, SetItemPropertiesParams,
    SetSecret, SetSecretParams,
};
use tracing::debug;

use crate::error::Result;
use crate::service::SecretService;

/// Options for [`SecretService::search`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SearchFlags(u32);

impl SearchFlags {
    /// First match only, no unlocking, no secrets.
    pub const NONE: Self = Self(0);

    /// Return every match instead of the first.
    pub const ALL: Self = Self(1 << 1);

    /// Unlock locked matches, prompting if needed.
    pub const UNLOCK: Self = Self(1 << 2);

    /// Fetch the secrets of unlocked matches.
    pub const LOAD_SECRETS: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SearchFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A stored secret and its metadata.
///
/// The handle is a snapshot: it goes stale if the item is changed or removed
/// through another handle.
#[derive(Clone)]
pub struct Item {
    service: SecretService,
    path: String,
    properties: ItemProperties,
    secret: Option<SecretValue>,
}

impl Item {
    /// Fetch the properties of the item at `path`.
    pub async fn load(service: &SecretService, path: &str) -> Result<Self> {
        let properties = service
            .call::<GetItemProperties>(&ItemParams {
                item: path.to_string(),
            })
            .await?;
        Ok(Self {
            service: service.clone(),
            path: path.to_string(),
            properties,
            secret: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.properties.label
    }

    /// Attributes as stored, including meta attributes like `xdg:schema`.
    pub fn attributes(&self) -> &WireAttributes {
        &self.properties.attributes
    }

    /// Attributes decoded through `schema`.
    pub fn decode_attributes(&self, schema: &Schema) -> Result<AttributeSet> {
        Ok(attributes::decode(schema, &self.properties.attributes)?)
    }

    pub fn is_locked(&self) -> bool {
        self.properties.locked
    }

    /// Creation time, seconds since the epoch.
    pub fn created(&self) -> u64 {
        self.properties.created
    }

    /// Last modification time, seconds since the epoch.
    pub fn modified(&self) -> u64 {
        self.properties.modified
    }

    /// The secret, if it has been loaded.
    pub fn secret(&self) -> Option<&SecretValue> {
        self.secret.as_ref()
    }

    pub(crate) fn cache_secret(&mut self, secret: SecretValue) {
        self.properties.locked = false;
        self.secret = Some(secret);
    }

    /// Fetch the secret, unlocking the item if needed.
    pub async fn load_secret(&mut self) -> Result<Option<&SecretValue>> {
        let path = self.path.clone();
        let mut secrets = self.service.get_secrets(std::slice::from_ref(&path)).await?;
        if let Some(secret) = secrets.remove(&path) {
            self.cache_secret(secret);
        }
        Ok(self.secret.as_ref())
    }

    /// Replace the stored secret, unlocking the item if needed.
    ///
    /// The value travels encrypted when the session is.
    pub async fn set_secret(&mut self, secret: &SecretValue) -> Result<()> {
        let service = &self.service;
        let path = &self.path;
        let session = service.session().await?;
        let session_ref = &session;

        let targets = [path.clone()];
        let result = service
            .with_unlock(&targets, move || async move {
                service
                    .call::<SetSecret>(&SetSecretParams {
                        item: path.clone(),
                        secret: session_ref.encode(secret)?,
                    })
                    .await?;
                Ok(())
            })
            .await;
        service.check_session(result, &session).await?;

        debug!(item = %self.path, "replaced secret");
        self.cache_secret(secret.clone());
        Ok(())
    }

    pub async fn set_label(&mut self, label: &str) -> Result<()> {
        self.set_properties(Some(label), None).await?;
        self.properties.label = label.to_string();
        Ok(())
    }

    /// Replace the attributes. They are checked against `schema` before
    /// anything is sent.
    pub async fn set_attributes(&mut self, schema: &Schema, attributes: &AttributeSet) -> Result<()> {
        let wire = attributes::encode(schema, attributes)?;
        self.set_properties(None, Some(&wire)).await?;
        self.properties.attributes = wire;
        Ok(())
    }

    async fn set_properties(&self, label: Option<&str>, attributes: Option<&WireAttributes>) -> Result<()> {
        let service = &self.service;
        let path = &self.path;
        let targets = [path.clone()];
        service
            .with_unlock(&targets, move || async move {
                service
                    .call::<SetItemProperties>(&SetItemPropertiesParams {
                        item: path.clone(),
                        label: label.map(str::to_string),
                        attributes: attributes.cloned(),
                    })
                    .await?;
                Ok(())
            })
            .await?;
        debug!(item = %self.path, "updated item properties");
        Ok(())
    }

    /// Re-read the item's properties.
    pub async fn refresh(&mut self) -> Result<()> {
        let fresh = Self::load(&self.service, &self.path).await?;
        self.properties = fresh.properties;
        Ok(())
    }

    /// Delete the item, confirming through a prompt if the service asks.
    pub async fn delete(self) -> Result<()> {
        self.service.delete_item(&self.path).await
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("path", &self.path)
            .field("label", &self.properties.label)
            .field("locked", &self.properties.locked)
            .field("secret", &self.secret)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_flags() {
        let flags = SearchFlags::ALL | SearchFlags::UNLOCK;
        assert!(flags.contains(SearchFlags::ALL));
        assert!(flags.contains(SearchFlags::UNLOCK));
        assert!(!flags.contains(SearchFlags::LOAD_SECRETS));
        assert!(SearchFlags::NONE.contains(SearchFlags::NONE));
        assert_eq!(SearchFlags::default(), SearchFlags::NONE);
    }
}
