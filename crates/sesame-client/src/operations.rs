//! The operations: lookup, store, remove, search and clear.
//!
//! Each is written once, as an async pipeline over [`SecretService`]. The
//! blocking and callback forms in [`crate::dispatch`] drive these same
//! futures.

use std::collections::HashMap;

use sesame_core::attributes;
use sesame_core::{AttributeSet, Schema, SecretValue, WireAttributes};
use sesame_rpc::protocol::{
    is_object, CreateItem, CreateItemParams, DeleteItem, GetSecrets, GetSecretsParams,
    ItemParams, NewItemProperties, SearchItems, SearchItemsParams, SearchItemsResult,
};
use sesame_rpc::RemoteErrorKind;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::item::{Item, SearchFlags};
use crate::service::SecretService;

impl SecretService {
    /// Find the secret of the first item matching `attributes`.
    ///
    /// Prefers unlocked matches; a locked one is unlocked first. `None` when
    /// nothing matches.
    pub async fn lookup(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
    ) -> Result<Option<SecretValue>> {
        let wire = attributes::encode_for_matching(schema, attributes)?;
        let found = self.search_items(&wire).await?;

        let path = match (found.unlocked.into_iter().next(), found.locked.into_iter().next()) {
            (Some(path), _) => path,
            (None, Some(path)) => {
                self.ensure_unlocked(std::slice::from_ref(&path)).await?;
                path
            }
            (None, None) => {
                debug!(schema = schema.name(), "lookup matched nothing");
                return Ok(None);
            }
        };

        let mut secrets = self.get_secrets(std::slice::from_ref(&path)).await?;
        Ok(secrets.remove(&path))
    }

    /// Store a secret in `collection` (an alias or object path; the
    /// configured default collection when `None`).
    ///
    /// With `replace`, an item with identical attributes is overwritten;
    /// without it the service rejects the duplicate. Returns the item path.
    pub async fn store(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        collection: Option<&str>,
        label: &str,
        secret: &SecretValue,
        replace: bool,
    ) -> Result<String> {
        let wire = attributes::encode(schema, attributes)?;
        let alias = collection.unwrap_or(self.config().default_collection.as_str());
        let session = self.session().await?;

        let wire = &wire;
        let session_ref = &session;
        let result = self
            .with_collection(alias, move |path| async move {
                let targets = [path];
                let targets = &targets;
                self.with_unlock(targets, move || async move {
                    let params = CreateItemParams {
                        collection: targets[0].clone(),
                        properties: NewItemProperties {
                            label: label.to_string(),
                            attributes: wire.clone(),
                        },
                        secret: session_ref.encode(secret)?,
                        replace,
                    };
                    let reply = self.call::<CreateItem>(&params).await?;
                    if !is_object(&reply.prompt) {
                        return Ok(reply.item);
                    }
                    let result = self.prompt(&reply.prompt).await?;
                    result
                        .as_str()
                        .filter(|path| is_object(path))
                        .map(str::to_string)
                        .ok_or_else(|| Error::LockedOrDenied("item was not created".to_string()))
                })
                .await
            })
            .await;

        let item = self.check_session(result, &session).await?;
        info!(item = %item, schema = schema.name(), "stored secret");
        Ok(item)
    }

    /// Delete every item matching `attributes`.
    ///
    /// `true` if at least one item was deleted; no match is `false`.
    pub async fn remove(&self, schema: &Schema, attributes: &AttributeSet) -> Result<bool> {
        Ok(self.delete_matching(schema, attributes).await? > 0)
    }

    /// Delete every item matching `attributes` and report how many went.
    pub async fn clear(&self, schema: &Schema, attributes: &AttributeSet) -> Result<usize> {
        self.delete_matching(schema, attributes).await
    }

    /// Find items matching `attributes`.
    pub async fn search(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        flags: SearchFlags,
    ) -> Result<Vec<Item>> {
        let wire = attributes::encode_for_matching(schema, attributes)?;
        let SearchItemsResult {
            mut unlocked,
            mut locked,
        } = self.search_items(&wire).await?;

        if !flags.contains(SearchFlags::ALL) {
            if unlocked.is_empty() {
                locked.truncate(1);
            } else {
                unlocked.truncate(1);
                locked.clear();
            }
        }

        if flags.contains(SearchFlags::UNLOCK) && !locked.is_empty() {
            match self.unlock(&locked).await {
                Ok(now_unlocked) => {
                    let (done, still): (Vec<_>, Vec<_>) =
                        locked.into_iter().partition(|path| now_unlocked.contains(path));
                    unlocked.extend(done);
                    locked = still;
                }
                // The user said no; report the matches as locked.
                Err(Error::LockedOrDenied(reason)) => debug!(%reason, "search left items locked"),
                Err(e) => return Err(e),
            }
        }

        let mut items = Vec::with_capacity(unlocked.len() + locked.len());
        for path in unlocked.iter().chain(locked.iter()) {
            items.push(Item::load(self, path).await?);
        }

        if flags.contains(SearchFlags::LOAD_SECRETS) {
            let readable: Vec<String> = items
                .iter()
                .filter(|item| !item.is_locked())
                .map(|item| item.path().to_string())
                .collect();
            if !readable.is_empty() {
                let mut secrets = self.get_secrets(&readable).await?;
                for item in &mut items {
                    if let Some(secret) = secrets.remove(item.path()) {
                        item.cache_secret(secret);
                    }
                }
            }
        }

        debug!(schema = schema.name(), found = items.len(), "search finished");
        Ok(items)
    }

    pub(crate) async fn search_items(&self, wire: &WireAttributes) -> Result<SearchItemsResult> {
        let found = self
            .call::<SearchItems>(&SearchItemsParams {
                attributes: wire.clone(),
            })
            .await?;
        debug!(
            unlocked = found.unlocked.len(),
            locked = found.locked.len(),
            "search results"
        );
        Ok(found)
    }

    /// Fetch and decrypt the secrets of `paths`, unlocking them if needed.
    pub(crate) async fn get_secrets(&self, paths: &[String]) -> Result<HashMap<String, SecretValue>> {
        let session = self.session().await?;
        let session_ref = &session;

        let result = self
            .with_unlock(paths, move || async move {
                let reply = self
                    .call::<GetSecrets>(&GetSecretsParams {
                        items: paths.to_vec(),
                        session: session_ref.handle().to_string(),
                    })
                    .await?;

                // Locked items are left out of the reply.
                if let Some(missing) = paths.iter().find(|p| !reply.secrets.contains_key(*p)) {
                    return Err(Error::remote(
                        RemoteErrorKind::IsLocked,
                        format!("no secret returned for {missing}"),
                    ));
                }

                let mut secrets = HashMap::with_capacity(reply.secrets.len());
                for (path, encoded) in &reply.secrets {
                    secrets.insert(path.clone(), session_ref.decode(encoded)?);
                }
                Ok(secrets)
            })
            .await;

        self.check_session(result, &session).await
    }

    pub(crate) async fn delete_item(&self, path: &str) -> Result<()> {
        let targets = [path.to_string()];
        self.with_unlock(&targets, move || async move {
            let reply = self
                .call::<DeleteItem>(&ItemParams {
                    item: path.to_string(),
                })
                .await?;
            if is_object(&reply.prompt) {
                self.prompt(&reply.prompt).await?;
            }
            debug!(item = path, "deleted item");
            Ok(())
        })
        .await
    }

    async fn delete_matching(&self, schema: &Schema, attributes: &AttributeSet) -> Result<usize> {
        let wire = attributes::encode_for_matching(schema, attributes)?;
        let found = self.search_items(&wire).await?;
        if !found.locked.is_empty() {
            self.ensure_unlocked(&found.locked).await?;
        }

        let mut deleted = 0;
        for path in found.unlocked.iter().chain(found.locked.iter()) {
            self.delete_item(path).await?;
            deleted += 1;
        }
        if deleted > 0 {
            info!(schema = schema.name(), deleted, "removed items");
        }
        Ok(deleted)
    }
}
