//! Alias and collection resolution.
//!
//! Aliases are resolved lazily and cached per connection. A cached path the
//! service no longer knows is re-resolved once and the operation retried
//! once; a second failure is returned as is.

use std::future::Future;

use sesame_rpc::protocol::{
    is_object, CollectionParams, CollectionProperties, CreateCollection, CreateCollectionParams,
    DeleteCollection, ReadAlias, ReadAliasParams, SetAlias, SetAliasParams, NO_OBJECT,
};
use sesame_rpc::RemoteErrorKind;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::service::SecretService;

/// Alias of the collection used when none is named.
pub const DEFAULT_ALIAS: &str = "default";

/// Label given to the default collection when it has to be created.
pub const DEFAULT_COLLECTION_LABEL: &str = "Default keyring";

impl SecretService {
    /// Ask the service which collection `alias` names. Bypasses the cache.
    pub async fn read_alias(&self, alias: &str) -> Result<Option<String>> {
        let reply = self
            .call::<ReadAlias>(&ReadAliasParams {
                name: alias.to_string(),
            })
            .await?;
        Ok(is_object(&reply.collection).then_some(reply.collection))
    }

    /// Point `alias` at `collection`, or remove it with `None`.
    pub async fn set_alias(&self, alias: &str, collection: Option<&str>) -> Result<()> {
        self.call::<SetAlias>(&SetAliasParams {
            name: alias.to_string(),
            collection: collection.unwrap_or(NO_OBJECT).to_string(),
        })
        .await?;

        let mut aliases = self.inner.aliases.lock();
        match collection {
            Some(path) => aliases.insert(alias.to_string(), path.to_string()),
            None => aliases.remove(alias),
        };
        Ok(())
    }

    /// Create a collection, optionally under `alias`. Returns its path.
    pub async fn create_collection(&self, label: &str, alias: Option<&str>) -> Result<String> {
        let reply = self
            .call::<CreateCollection>(&CreateCollectionParams {
                properties: CollectionProperties {
                    label: label.to_string(),
                },
                alias: alias.unwrap_or_default().to_string(),
            })
            .await?;

        let path = if is_object(&reply.prompt) {
            let result = self.prompt(&reply.prompt).await?;
            result
                .as_str()
                .filter(|path| is_object(path))
                .map(str::to_string)
                .ok_or_else(|| Error::LockedOrDenied("collection was not created".to_string()))?
        } else {
            reply.collection
        };

        info!(collection = %path, label, "created collection");
        if let Some(alias) = alias {
            self.inner.aliases.lock().insert(alias.to_string(), path.clone());
        }
        Ok(path)
    }

    /// Delete a collection and every item in it, confirming through a prompt
    /// if the service asks.
    ///
    /// `collection` is an object path or an alias. Aliases are read afresh,
    /// never from the cache.
    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        let path = if collection.starts_with('/') {
            collection.to_string()
        } else {
            self.read_alias(collection).await?.ok_or_else(|| {
                Error::remote(
                    RemoteErrorKind::NoSuchObject,
                    format!("no collection with alias '{collection}'"),
                )
            })?
        };

        let reply = self
            .call::<DeleteCollection>(&CollectionParams {
                collection: path.clone(),
            })
            .await?;
        if is_object(&reply.prompt) {
            self.prompt(&reply.prompt).await?;
        }

        self.inner.aliases.lock().retain(|_, target| *target != path);
        info!(collection = %path, "deleted collection");
        Ok(())
    }

    /// Resolve `alias` through the cache.
    pub async fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        if let Some(path) = self.cached_alias(alias) {
            return Ok(Some(path));
        }
        let path = self.read_alias(alias).await?;
        if let Some(path) = &path {
            self.inner.aliases.lock().insert(alias.to_string(), path.clone());
        }
        Ok(path)
    }

    /// Resolve the `default` alias, creating the collection if it is unset.
    pub async fn resolve_or_create_default_collection(&self) -> Result<String> {
        match self.resolve_alias(DEFAULT_ALIAS).await? {
            Some(path) => Ok(path),
            None => {
                debug!("no default collection, creating one");
                self.create_collection(DEFAULT_COLLECTION_LABEL, Some(DEFAULT_ALIAS))
                    .await
            }
        }
    }

    fn cached_alias(&self, alias: &str) -> Option<String> {
        self.inner.aliases.lock().get(alias).cloned()
    }

    pub(crate) fn forget_alias(&self, alias: &str) {
        self.inner.aliases.lock().remove(alias);
    }

    /// Map a collection name to a path. Object paths pass through; anything
    /// else is an alias. Returns whether the answer came from the cache.
    async fn resolve_collection(&self, name: &str) -> Result<(String, bool)> {
        if name.starts_with('/') {
            return Ok((name.to_string(), false));
        }
        if let Some(path) = self.cached_alias(name) {
            return Ok((path, true));
        }

        let path = if name == DEFAULT_ALIAS {
            self.resolve_or_create_default_collection().await?
        } else {
            self.resolve_alias(name).await?.ok_or_else(|| {
                Error::remote(
                    RemoteErrorKind::NoSuchObject,
                    format!("no collection with alias '{name}'"),
                )
            })?
        };
        Ok((path, false))
    }

    /// Run `op` against the collection `name` resolves to.
    pub(crate) async fn with_collection<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (path, cached) = self.resolve_collection(name).await?;
        match op(path.clone()).await {
            Err(e) if cached && e.is(RemoteErrorKind::NoSuchObject) => {
                debug!(alias = name, stale = %path, "cached alias is stale, resolving again");
                self.forget_alias(name);
                let (path, _) = self.resolve_collection(name).await?;
                op(path).await
            }
            other => other,
        }
    }
}
