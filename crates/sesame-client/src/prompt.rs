//! Prompts and the lock state of collections and items.

use std::future::Future;

use sesame_rpc::protocol::{
    is_object, Dismiss, DismissParams, Lock, LockResult, Method, ObjectsParams, Prompt,
    PromptCompleted, PromptParams, Unlock, PROMPT_COMPLETED,
};
use sesame_rpc::{RemoteErrorKind, RpcError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::service::SecretService;

/// The object paths a lock or unlock prompt reports as changed.
fn prompted_objects(method: &str, result: serde_json::Value) -> Vec<String> {
    match serde_json::from_value(result) {
        Ok(objects) => objects,
        Err(e) => {
            warn!(method, error = %e, "malformed prompt result");
            Vec::new()
        }
    }
}

impl SecretService {
    /// Show a prompt and wait until it completes.
    ///
    /// Returns the prompt's result value. A dismissed prompt is
    /// [`Error::LockedOrDenied`].
    pub async fn prompt(&self, prompt: &str) -> Result<serde_json::Value> {
        // Subscribe first so the completion cannot slip past.
        let mut notes = self.connection().subscribe();
        self.call::<Prompt>(&PromptParams {
            prompt: prompt.to_string(),
            window_id: self.config().window_id.clone(),
        })
        .await?;
        debug!(prompt, "waiting for prompt");

        loop {
            let note = tokio::select! {
                note = notes.recv() => note,
                _ = self.connection().closed() => return Err(Error::Transport(RpcError::Closed)),
            };
            let note = match note {
                Ok(note) => note,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed notifications while waiting for prompt");
                    continue;
                }
                Err(RecvError::Closed) => return Err(Error::Transport(RpcError::Closed)),
            };
            if note.method != PROMPT_COMPLETED {
                continue;
            }

            let completed: PromptCompleted = match note.params.map(serde_json::from_value) {
                Some(Ok(completed)) => completed,
                _ => {
                    warn!("malformed prompt completion");
                    continue;
                }
            };
            if completed.prompt != prompt {
                continue;
            }
            if completed.dismissed {
                return Err(Error::LockedOrDenied(format!("prompt {prompt} was dismissed")));
            }
            return Ok(completed.result);
        }
    }

    /// Dismiss a prompt that has not completed.
    pub async fn dismiss_prompt(&self, prompt: &str) -> Result<()> {
        self.call::<Dismiss>(&DismissParams {
            prompt: prompt.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Unlock collections or items, prompting if the service asks.
    ///
    /// Returns the objects that are now unlocked.
    pub async fn unlock(&self, objects: &[String]) -> Result<Vec<String>> {
        self.change_lock::<Unlock>(objects).await
    }

    /// Lock collections or items. Returns the objects that are now locked.
    pub async fn lock(&self, objects: &[String]) -> Result<Vec<String>> {
        self.change_lock::<Lock>(objects).await
    }

    async fn change_lock<M>(&self, objects: &[String]) -> Result<Vec<String>>
    where
        M: Method<Params = ObjectsParams, Output = LockResult>,
    {
        let reply = self
            .call::<M>(&ObjectsParams {
                objects: objects.to_vec(),
            })
            .await?;

        let mut changed = reply.objects;
        if is_object(&reply.prompt) {
            let result = self.prompt(&reply.prompt).await?;
            changed.extend(prompted_objects(M::NAME, result));
        }
        debug!(method = M::NAME, requested = objects.len(), changed = changed.len(), "lock state changed");
        Ok(changed)
    }

    /// Unlock every object in `objects` or fail with `LockedOrDenied`.
    pub(crate) async fn ensure_unlocked(&self, objects: &[String]) -> Result<()> {
        let unlocked = self.unlock(objects).await?;
        match objects.iter().find(|object| !unlocked.contains(object)) {
            Some(still_locked) => Err(Error::LockedOrDenied(format!("{still_locked} is still locked"))),
            None => Ok(()),
        }
    }

    /// Run `op`; if the service says something is locked, unlock `objects`
    /// and run it exactly once more.
    pub(crate) async fn with_unlock<T, F, Fut>(&self, objects: &[String], op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(e) if e.is(RemoteErrorKind::IsLocked) => {
                debug!(?objects, "locked, unlocking before retry");
                self.ensure_unlocked(objects).await?;
                match op().await {
                    Err(e) if e.is(RemoteErrorKind::IsLocked) => {
                        Err(Error::LockedOrDenied(e.to_string()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}
