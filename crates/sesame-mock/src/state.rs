//! The mock's object model: collections, items, aliases, sessions and prompts.
//!
//! Everything lives behind one lock and every handler is a short synchronous
//! transaction on it, so requests handled concurrently never see a half
//! applied change.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Value};
use sesame_core::{SecretValue, WireAttributes};
use sesame_rpc::protocol::{
    CreateCollectionResult, CreateItemResult, ItemProperties, LockResult, SearchItemsResult,
    NO_OBJECT,
};
use sesame_rpc::{JsonRpcRequest, RemoteErrorKind, RpcError, Result};
use sesame_session::{EncodedSecret, Session, SessionError, ALGORITHM_PLAIN};
use tokio::sync::Notify;
use tracing::debug;

/// Root of every object path the mock hands out.
pub const PATH_PREFIX: &str = "/org/freedesktop/secrets";

/// Schema name stamped on the seeded items.
pub const MOCK_SCHEMA: &str = "org.mock.Schema";

/// Name of the unlocked collection the `default` alias points at.
pub const DEFAULT_COLLECTION: &str = "collection";

/// Name of the seeded locked collection.
pub const LOCKED_COLLECTION: &str = "second";

/// Path of the collection called `name`.
pub fn collection_path(name: &str) -> String {
    format!("{PATH_PREFIX}/collection/{name}")
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn not_found(path: &str) -> RpcError {
    RpcError::remote(RemoteErrorKind::NoSuchObject, format!("no such object {path}"))
}

fn locked(path: &str) -> RpcError {
    RpcError::remote(RemoteErrorKind::IsLocked, format!("{path} is locked"))
}

struct MockItem {
    path: String,
    label: String,
    attributes: WireAttributes,
    secret: SecretValue,
    created: u64,
    modified: u64,
}

impl MockItem {
    fn matches(&self, query: &WireAttributes) -> bool {
        query
            .iter()
            .all(|(name, value)| self.attributes.get(name) == Some(value))
    }
}

struct MockCollection {
    path: String,
    label: String,
    locked: bool,
    items: Vec<MockItem>,
    next_item: u64,
}

impl MockCollection {
    fn new(path: String, label: &str, locked: bool) -> Self {
        Self {
            path,
            label: label.to_string(),
            locked,
            items: Vec::new(),
            next_item: 1,
        }
    }

    fn add(&mut self, label: &str, attributes: WireAttributes, secret: SecretValue) -> String {
        let path = format!("{}/{}", self.path, self.next_item);
        self.next_item += 1;
        let stamp = now();
        self.items.push(MockItem {
            path: path.clone(),
            label: label.to_string(),
            attributes,
            secret,
            created: stamp,
            modified: stamp,
        });
        path
    }
}

/// What a prompt does once the user goes along with it.
enum PromptAction {
    Unlock(Vec<String>),
    Delete(String),
    DeleteCollection(String),
}

#[derive(Default)]
struct Options {
    plain_only: bool,
    dismiss_prompts: bool,
    confirm_deletes: bool,
}

#[derive(Default)]
struct Store {
    collections: Vec<MockCollection>,
    aliases: BTreeMap<String, String>,
    sessions: HashMap<String, Arc<Session>>,
    prompts: HashMap<String, PromptAction>,
    counter: u64,
    options: Options,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn collection(&self, path: &str) -> Option<&MockCollection> {
        self.collections.iter().find(|c| c.path == path)
    }

    fn collection_mut(&mut self, path: &str) -> Option<&mut MockCollection> {
        self.collections.iter_mut().find(|c| c.path == path)
    }

    /// The collection an object belongs to: itself, or an item's parent.
    fn owner_mut(&mut self, object: &str) -> Option<&mut MockCollection> {
        self.collections
            .iter_mut()
            .find(|c| c.path == object || c.items.iter().any(|item| item.path == object))
    }

    fn item(&self, path: &str) -> Option<(&MockCollection, &MockItem)> {
        self.collections.iter().find_map(|c| {
            c.items
                .iter()
                .find(|item| item.path == path)
                .map(|item| (c, item))
        })
    }

    fn item_mut(&mut self, path: &str) -> Option<(bool, &mut MockItem)> {
        self.collections.iter_mut().find_map(|c| {
            let is_locked = c.locked;
            c.items
                .iter_mut()
                .find(|item| item.path == path)
                .map(|item| (is_locked, item))
        })
    }

    /// Remove the collection at `path` and the aliases pointing at it.
    fn remove_collection(&mut self, path: &str) -> bool {
        let before = self.collections.len();
        self.collections.retain(|c| c.path != path);
        self.aliases.retain(|_, target| target.as_str() != path);
        self.collections.len() != before
    }

    fn remove_item(&mut self, path: &str) -> bool {
        for collection in &mut self.collections {
            if let Some(index) = collection.items.iter().position(|item| item.path == path) {
                collection.items.remove(index);
                return true;
            }
        }
        false
    }

    fn new_prompt(&mut self, action: PromptAction) -> String {
        let path = format!("{PATH_PREFIX}/prompt/p{}", self.next_id());
        self.prompts.insert(path.clone(), action);
        path
    }

    fn session(&self, handle: &str) -> Result<Arc<Session>> {
        self.sessions.get(handle).cloned().ok_or_else(|| {
            RpcError::remote(RemoteErrorKind::NoSession, format!("no session {handle}"))
        })
    }
}

/// Outcome of running a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOutcome {
    pub dismissed: bool,
    pub result: Value,
}

/// Shared state of a mock service.
///
/// Tests hold it through a [`crate::MockHandle`] to inspect requests and
/// change behavior while a client is connected.
pub struct MockState {
    store: Mutex<Store>,
    held: Mutex<HashSet<String>>,
    released: Notify,
    requests: Mutex<Vec<JsonRpcRequest>>,
}

impl MockState {
    /// An empty service with no collections.
    pub fn empty() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            held: Mutex::new(HashSet::new()),
            released: Notify::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The standard fixture.
    ///
    /// Two collections hold the same three items keyed by `number`,
    /// `string` and `even`, with secrets `"111"`, `"222"` and `"333"`.
    /// [`DEFAULT_COLLECTION`] is unlocked and aliased as `default`;
    /// [`LOCKED_COLLECTION`] is locked.
    pub fn seeded() -> Self {
        let state = Self::empty();
        {
            let mut store = state.store.lock();
            for (name, label, is_locked) in [
                (DEFAULT_COLLECTION, "Collection", false),
                (LOCKED_COLLECTION, "Second", true),
            ] {
                let mut collection = MockCollection::new(collection_path(name), label, is_locked);
                for (number, string, even) in [(1, "one", false), (2, "two", true), (3, "three", false)] {
                    let attributes: WireAttributes = [
                        ("number", number.to_string()),
                        ("string", string.to_string()),
                        ("even", even.to_string()),
                        ("xdg:schema", MOCK_SCHEMA.to_string()),
                    ]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect();
                    let secret = SecretValue::text(format!("{number}{number}{number}"));
                    collection.add(&format!("Item {string}"), attributes, secret);
                }
                store.collections.push(collection);
            }
            store
                .aliases
                .insert("default".to_string(), collection_path(DEFAULT_COLLECTION));
        }
        state
    }

    // --- protocol operations ---

    pub(crate) fn open_session(&self, algorithm: &str, input: &[u8]) -> Result<(Vec<u8>, String)> {
        let mut store = self.store.lock();
        if store.options.plain_only && algorithm != ALGORITHM_PLAIN {
            return Err(RpcError::remote(
                RemoteErrorKind::NotSupported,
                format!("algorithm {algorithm} is not supported"),
            ));
        }
        let handle = format!("{PATH_PREFIX}/session/s{}", store.next_id());
        let (session, output) = Session::accept(algorithm, input, handle.clone()).map_err(|e| match e {
            SessionError::UnsupportedAlgorithm(_) => {
                RpcError::remote(RemoteErrorKind::NotSupported, e.to_string())
            }
            other => RpcError::remote(RemoteErrorKind::InvalidArgs, other.to_string()),
        })?;
        store.sessions.insert(handle.clone(), Arc::new(session));
        debug!(session = %handle, algorithm, "mock opened session");
        Ok((output, handle))
    }

    pub(crate) fn close_session(&self, handle: &str) {
        if let Some(session) = self.store.lock().sessions.remove(handle) {
            session.close();
        }
    }

    pub(crate) fn search(&self, query: &WireAttributes) -> SearchItemsResult {
        let store = self.store.lock();
        let mut result = SearchItemsResult::default();
        for collection in &store.collections {
            for item in collection.items.iter().filter(|item| item.matches(query)) {
                if collection.locked {
                    result.locked.push(item.path.clone());
                } else {
                    result.unlocked.push(item.path.clone());
                }
            }
        }
        result
    }

    /// Secrets of the unlocked items among `items`; locked ones are skipped.
    pub(crate) fn get_secrets(
        &self,
        items: &[String],
        session: &str,
    ) -> Result<BTreeMap<String, EncodedSecret>> {
        let store = self.store.lock();
        let session = store.session(session)?;
        let mut secrets = BTreeMap::new();
        for path in items {
            let (collection, item) = store.item(path).ok_or_else(|| not_found(path))?;
            if collection.locked {
                continue;
            }
            let encoded = session
                .encode(&item.secret)
                .map_err(|e| RpcError::remote(RemoteErrorKind::Failed, e.to_string()))?;
            secrets.insert(path.clone(), encoded);
        }
        Ok(secrets)
    }

    pub(crate) fn unlock(&self, objects: &[String]) -> Result<LockResult> {
        let mut store = self.store.lock();
        let mut done = Vec::new();
        let mut pending = Vec::new();
        for object in objects {
            let collection = store.owner_mut(object).ok_or_else(|| not_found(object))?;
            if collection.locked {
                pending.push(object.clone());
            } else {
                done.push(object.clone());
            }
        }
        let prompt = if pending.is_empty() {
            NO_OBJECT.to_string()
        } else {
            store.new_prompt(PromptAction::Unlock(pending))
        };
        Ok(LockResult {
            objects: done,
            prompt,
        })
    }

    pub(crate) fn lock(&self, objects: &[String]) -> Result<LockResult> {
        let mut store = self.store.lock();
        for object in objects {
            store.owner_mut(object).ok_or_else(|| not_found(object))?.locked = true;
        }
        Ok(LockResult {
            objects: objects.to_vec(),
            prompt: NO_OBJECT.to_string(),
        })
    }

    /// Run a prompt to completion.
    pub(crate) fn prompt(&self, path: &str) -> Result<PromptOutcome> {
        let mut store = self.store.lock();
        let action = store.prompts.remove(path).ok_or_else(|| not_found(path))?;
        if store.options.dismiss_prompts {
            debug!(prompt = path, "mock dismissed prompt");
            return Ok(PromptOutcome {
                dismissed: true,
                result: Value::Null,
            });
        }

        let result = match action {
            PromptAction::Unlock(objects) => {
                for object in &objects {
                    if let Some(collection) = store.owner_mut(object) {
                        collection.locked = false;
                    }
                }
                json!(objects)
            }
            PromptAction::Delete(item) => {
                store.remove_item(&item);
                Value::Null
            }
            PromptAction::DeleteCollection(collection) => {
                store.remove_collection(&collection);
                Value::Null
            }
        };
        Ok(PromptOutcome {
            dismissed: false,
            result,
        })
    }

    pub(crate) fn dismiss(&self, path: &str) -> Result<()> {
        self.store
            .lock()
            .prompts
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    pub(crate) fn delete_item(&self, path: &str) -> Result<String> {
        let mut store = self.store.lock();
        let (collection, _) = store.item(path).ok_or_else(|| not_found(path))?;
        if collection.locked {
            return Err(locked(path));
        }
        if store.options.confirm_deletes {
            return Ok(store.new_prompt(PromptAction::Delete(path.to_string())));
        }
        store.remove_item(path);
        debug!(item = path, "mock deleted item");
        Ok(NO_OBJECT.to_string())
    }

    pub(crate) fn set_item_properties(
        &self,
        path: &str,
        label: Option<String>,
        attributes: Option<WireAttributes>,
    ) -> Result<()> {
        let mut store = self.store.lock();
        let (is_locked, item) = store.item_mut(path).ok_or_else(|| not_found(path))?;
        if is_locked {
            return Err(locked(path));
        }
        if let Some(label) = label {
            item.label = label;
        }
        if let Some(attributes) = attributes {
            item.attributes = attributes;
        }
        item.modified = now();
        Ok(())
    }

    pub(crate) fn set_secret(&self, path: &str, secret: &EncodedSecret) -> Result<()> {
        let mut store = self.store.lock();
        let session = store.session(&secret.session)?;
        let value = session
            .decode(secret)
            .map_err(|e| RpcError::remote(RemoteErrorKind::InvalidArgs, e.to_string()))?;
        let (is_locked, item) = store.item_mut(path).ok_or_else(|| not_found(path))?;
        if is_locked {
            return Err(locked(path));
        }
        item.secret = value;
        item.modified = now();
        debug!(item = path, "mock replaced secret");
        Ok(())
    }

    pub(crate) fn remove_collection(&self, path: &str) -> Result<String> {
        let mut store = self.store.lock();
        if store.collection(path).is_none() {
            return Err(not_found(path));
        }
        if store.options.confirm_deletes {
            return Ok(store.new_prompt(PromptAction::DeleteCollection(path.to_string())));
        }
        store.remove_collection(path);
        debug!(collection = path, "mock deleted collection");
        Ok(NO_OBJECT.to_string())
    }

    pub(crate) fn item_properties(&self, path: &str) -> Result<ItemProperties> {
        let store = self.store.lock();
        let (collection, item) = store.item(path).ok_or_else(|| not_found(path))?;
        Ok(ItemProperties {
            label: item.label.clone(),
            attributes: item.attributes.clone(),
            locked: collection.locked,
            created: item.created,
            modified: item.modified,
        })
    }

    pub(crate) fn read_alias(&self, name: &str) -> String {
        self.store
            .lock()
            .aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| NO_OBJECT.to_string())
    }

    pub(crate) fn set_alias(&self, name: &str, collection: &str) -> Result<()> {
        let mut store = self.store.lock();
        if collection == NO_OBJECT {
            store.aliases.remove(name);
            return Ok(());
        }
        if store.collection(collection).is_none() {
            return Err(not_found(collection));
        }
        store.aliases.insert(name.to_string(), collection.to_string());
        Ok(())
    }

    pub(crate) fn create_collection(&self, label: &str, alias: &str) -> CreateCollectionResult {
        let mut store = self.store.lock();
        if let Some(existing) = store.aliases.get(alias) {
            if store.collection(existing).is_some() {
                return CreateCollectionResult {
                    collection: existing.clone(),
                    prompt: NO_OBJECT.to_string(),
                };
            }
        }

        let slug: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let mut path = collection_path(&slug);
        if store.collection(&path).is_some() {
            path = format!("{path}_{}", store.next_id());
        }
        store
            .collections
            .push(MockCollection::new(path.clone(), label, false));
        if !alias.is_empty() {
            store.aliases.insert(alias.to_string(), path.clone());
        }
        debug!(collection = %path, alias, "mock created collection");
        CreateCollectionResult {
            collection: path,
            prompt: NO_OBJECT.to_string(),
        }
    }

    pub(crate) fn create_item(
        &self,
        collection: &str,
        label: &str,
        attributes: WireAttributes,
        secret: &EncodedSecret,
        replace: bool,
    ) -> Result<CreateItemResult> {
        let mut store = self.store.lock();
        let session = store.session(&secret.session)?;
        let value = session
            .decode(secret)
            .map_err(|e| RpcError::remote(RemoteErrorKind::InvalidArgs, e.to_string()))?;

        let target = store.collection_mut(collection).ok_or_else(|| not_found(collection))?;
        if target.locked {
            return Err(locked(collection));
        }

        if let Some(existing) = target.items.iter_mut().find(|item| item.attributes == attributes) {
            if !replace {
                return Err(RpcError::remote(
                    RemoteErrorKind::AlreadyExists,
                    format!("{} has the same attributes", existing.path),
                ));
            }
            existing.label = label.to_string();
            existing.secret = value;
            existing.modified = now();
            return Ok(CreateItemResult {
                item: existing.path.clone(),
                prompt: NO_OBJECT.to_string(),
            });
        }

        let item = target.add(label, attributes, value);
        debug!(item = %item, "mock created item");
        Ok(CreateItemResult {
            item,
            prompt: NO_OBJECT.to_string(),
        })
    }

    // --- request log and holds ---

    pub(crate) fn record(&self, request: &JsonRpcRequest) {
        self.requests.lock().push(request.clone());
    }

    /// Wait while `method` is held.
    pub(crate) async fn gate(&self, method: &str) {
        loop {
            let released = self.released.notified();
            if !self.held.lock().contains(method) {
                return;
            }
            released.await;
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().clone()
    }

    /// Names of the methods received so far.
    pub fn methods_called(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.method.clone()).collect()
    }

    /// How many times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.method == method).count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Stop answering `method` until [`MockState::release`].
    pub fn hold(&self, method: &str) {
        self.held.lock().insert(method.to_string());
    }

    pub fn release(&self, method: &str) {
        self.held.lock().remove(method);
        self.released.notify_waiters();
    }

    // --- behavior switches ---

    /// Refuse every algorithm but `plain`.
    pub fn set_plain_only(&self, plain_only: bool) {
        self.store.lock().options.plain_only = plain_only;
    }

    /// Dismiss every prompt instead of completing it.
    pub fn set_dismiss_prompts(&self, dismiss: bool) {
        self.store.lock().options.dismiss_prompts = dismiss;
    }

    /// Make deletions go through a confirmation prompt.
    pub fn set_confirm_deletes(&self, confirm: bool) {
        self.store.lock().options.confirm_deletes = confirm;
    }

    // --- fixture manipulation ---

    /// Drop every session, as if the service had restarted.
    pub fn forget_sessions(&self) {
        let sessions: Vec<_> = self.store.lock().sessions.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }

    pub fn open_sessions(&self) -> usize {
        self.store.lock().sessions.len()
    }

    /// Algorithm of the session with `handle`, if it is open.
    pub fn session_algorithm(&self, handle: &str) -> Option<&'static str> {
        self.store
            .lock()
            .sessions
            .get(handle)
            .map(|s| s.algorithm().as_str())
    }

    /// Point `alias` at `path` whether or not a collection lives there.
    pub fn force_alias(&self, alias: &str, path: &str) {
        self.store.lock().aliases.insert(alias.to_string(), path.to_string());
    }

    pub fn forget_aliases(&self) {
        self.store.lock().aliases.clear();
    }

    /// Lock or unlock the collection called `name`.
    pub fn set_locked(&self, name: &str, is_locked: bool) -> bool {
        let path = collection_path(name);
        match self.store.lock().collection_mut(&path) {
            Some(collection) => {
                collection.locked = is_locked;
                true
            }
            None => false,
        }
    }

    /// Label of the collection at `path`.
    pub fn collection_label(&self, path: &str) -> Option<String> {
        self.store.lock().collection(path).map(|c| c.label.clone())
    }

    /// Remove the collection called `name` and the aliases pointing at it.
    pub fn delete_collection(&self, name: &str) -> bool {
        self.store.lock().remove_collection(&collection_path(name))
    }

    /// Whether a collection exists at `path`.
    pub fn has_collection(&self, path: &str) -> bool {
        self.store.lock().collection(path).is_some()
    }

    /// Label of the item at `path`.
    pub fn item_label(&self, path: &str) -> Option<String> {
        self.store.lock().item(path).map(|(_, item)| item.label.clone())
    }

    /// Move the collection called `name` to a fresh path, keeping its items
    /// and repointing its aliases. Returns the new path.
    ///
    /// Clients that cached the old path get `NoSuchObject` on their next use.
    pub fn recreate_collection(&self, name: &str) -> Option<String> {
        let old = collection_path(name);
        let mut store = self.store.lock();
        let new = collection_path(&format!("{name}_{}", store.next_id()));
        let collection = store.collection_mut(&old)?;
        collection.path = new.clone();
        for item in &mut collection.items {
            item.path = item.path.replacen(&old, &new, 1);
        }
        for target in store.aliases.values_mut() {
            if *target == old {
                *target = new.clone();
            }
        }
        Some(new)
    }

    /// Number of items whose attributes include every pair in `query`.
    pub fn count_matching(&self, query: &WireAttributes) -> usize {
        self.store
            .lock()
            .collections
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|item| item.matches(query))
            .count()
    }

    /// The stored secret of the item at `path`, read without a session.
    pub fn secret_of(&self, path: &str) -> Option<SecretValue> {
        self.store.lock().item(path).map(|(_, item)| item.secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sesame_session::Handshake;

    fn query(pairs: &[(&str, &str)]) -> WireAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_seeded_search_splits_by_lock_state() {
        let state = MockState::seeded();
        let found = state.search(&query(&[("number", "2")]));
        assert_eq!(found.unlocked, vec![format!("{}/2", collection_path(DEFAULT_COLLECTION))]);
        assert_eq!(found.locked, vec![format!("{}/2", collection_path(LOCKED_COLLECTION))]);
    }

    #[test]
    fn test_unlock_creates_prompt_for_locked_objects() {
        let state = MockState::seeded();
        let open = collection_path(DEFAULT_COLLECTION);
        let closed = collection_path(LOCKED_COLLECTION);

        let result = state.unlock(&[open.clone(), closed.clone()]).unwrap();
        assert_eq!(result.objects, vec![open]);
        assert_ne!(result.prompt, NO_OBJECT);

        let outcome = state.prompt(&result.prompt).unwrap();
        assert!(!outcome.dismissed);
        assert_eq!(outcome.result, json!([closed]));
        assert!(state.search(&query(&[("number", "1")])).locked.is_empty());
    }

    #[test]
    fn test_dismissed_prompt_leaves_collection_locked() {
        let state = MockState::seeded();
        state.set_dismiss_prompts(true);
        let result = state.unlock(&[collection_path(LOCKED_COLLECTION)]).unwrap();
        assert!(state.prompt(&result.prompt).unwrap().dismissed);
        assert_eq!(state.search(&query(&[("number", "1")])).locked.len(), 1);
    }

    #[test]
    fn test_set_item_properties_on_locked_item_is_refused() {
        let state = MockState::seeded();
        let path = format!("{}/1", collection_path(LOCKED_COLLECTION));
        let err = state
            .set_item_properties(&path, Some("Renamed".to_string()), None)
            .unwrap_err();
        assert!(err.is(RemoteErrorKind::IsLocked));

        let open = format!("{}/1", collection_path(DEFAULT_COLLECTION));
        state
            .set_item_properties(&open, Some("Renamed".to_string()), Some(query(&[("number", "10")])))
            .unwrap();
        assert_eq!(state.item_label(&open).as_deref(), Some("Renamed"));
        assert_eq!(state.count_matching(&query(&[("number", "10")])), 1);
    }

    #[test]
    fn test_collection_delete_through_prompt() {
        let state = MockState::seeded();
        state.set_confirm_deletes(true);
        let path = collection_path(DEFAULT_COLLECTION);

        let prompt = state.remove_collection(&path).unwrap();
        assert_ne!(prompt, NO_OBJECT);
        assert!(state.has_collection(&path));

        state.prompt(&prompt).unwrap();
        assert!(!state.has_collection(&path));
        assert_eq!(state.read_alias("default"), NO_OBJECT);
        assert!(state.remove_collection(&path).unwrap_err().is(RemoteErrorKind::NoSuchObject));
    }

    #[test]
    fn test_delete_locked_item_is_refused() {
        let state = MockState::seeded();
        let path = format!("{}/1", collection_path(LOCKED_COLLECTION));
        let err = state.delete_item(&path).unwrap_err();
        assert!(err.is(RemoteErrorKind::IsLocked));
    }

    #[test]
    fn test_get_secrets_skips_locked_items() {
        let state = MockState::seeded();
        let (_, handle) = state.open_session(ALGORITHM_PLAIN, &[]).unwrap();
        let open = format!("{}/1", collection_path(DEFAULT_COLLECTION));
        let closed = format!("{}/1", collection_path(LOCKED_COLLECTION));

        let secrets = state.get_secrets(&[open.clone(), closed], &handle).unwrap();
        assert_eq!(secrets.len(), 1);
        assert!(secrets.contains_key(&open));
    }

    #[test]
    fn test_unknown_session_is_no_session() {
        let state = MockState::seeded();
        let err = state.get_secrets(&[], "/nope").unwrap_err();
        assert!(err.is(RemoteErrorKind::NoSession));
    }

    #[test]
    fn test_create_item_with_aes_session() {
        let state = MockState::seeded();
        let handshake = Handshake::aes();
        let (output, handle) = state
            .open_session(handshake.algorithm().as_str(), &handshake.input())
            .unwrap();
        let session = handshake.complete(&output, handle).unwrap();

        let secret = session.encode(&SecretValue::text("hunter2")).unwrap();
        let attributes = query(&[("service", "mail")]);
        let created = state
            .create_item(&collection_path(DEFAULT_COLLECTION), "Mail", attributes.clone(), &secret, false)
            .unwrap();
        assert_eq!(state.secret_of(&created.item).unwrap().as_text(), Some("hunter2"));

        let err = state
            .create_item(&collection_path(DEFAULT_COLLECTION), "Mail", attributes, &secret, false)
            .unwrap_err();
        assert!(err.is(RemoteErrorKind::AlreadyExists));
    }

    #[test]
    fn test_plain_only_refuses_aes() {
        let state = MockState::seeded();
        state.set_plain_only(true);
        let handshake = Handshake::aes();
        let err = state
            .open_session(handshake.algorithm().as_str(), &handshake.input())
            .unwrap_err();
        assert!(err.is(RemoteErrorKind::NotSupported));
    }

    #[test]
    fn test_recreate_collection_moves_items_and_aliases() {
        let state = MockState::seeded();
        let new = state.recreate_collection(DEFAULT_COLLECTION).unwrap();
        assert_eq!(state.read_alias("default"), new);
        let found = state.search(&query(&[("number", "3")]));
        assert_eq!(found.unlocked, vec![format!("{new}/3")]);
    }

    #[test]
    fn test_create_collection_reuses_alias() {
        let state = MockState::seeded();
        let result = state.create_collection("Anything", "default");
        assert_eq!(result.collection, collection_path(DEFAULT_COLLECTION));

        state.forget_aliases();
        let result = state.create_collection("Default keyring", "default");
        assert_eq!(result.collection, collection_path("default_keyring"));
        assert_eq!(state.collection_label(&result.collection).as_deref(), Some("Default keyring"));
        assert_eq!(state.read_alias("default"), result.collection);
    }

    #[test]
    fn test_gate_only_stops_held_methods() {
        let state = MockState::seeded();
        state.hold("SearchItems");
        tokio_test::block_on(state.gate("ReadAlias"));

        let mut held = tokio_test::task::spawn(state.gate("SearchItems"));
        assert!(held.poll().is_pending());
        state.release("SearchItems");
        assert!(held.is_woken());
        assert!(held.poll().is_ready());
    }
}
