//! Protocol method handlers backed by [`MockState`].

use std::sync::Arc;

use sesame_rpc::protocol::{
    CloseSession, CreateCollection, CreateItem, DeleteCollection, DeleteItem, Dismiss, Empty,
    GetItemProperties, GetSecrets, GetSecretsResult, Lock, Method, OpenSession,
    OpenSessionResult, Prompt, PromptCompleted, PromptResult, ReadAlias, ReadAliasResult,
    SearchItems, SetAlias, SetItemProperties, SetSecret, Unlock, PROMPT_COMPLETED,
};
use sesame_rpc::{MethodRegistry, Notifier, Result, RpcError};

use crate::state::MockState;

/// Register `f` as the handler of `M`, gated by [`MockState::hold`].
async fn register<M, F>(registry: &MethodRegistry, state: &Arc<MockState>, f: F)
where
    M: Method + 'static,
    F: Fn(&MockState, M::Params) -> Result<M::Output> + Send + Sync + 'static,
{
    let state = state.clone();
    let f = Arc::new(f);
    registry
        .register_method::<M, _, _>(move |params| {
            let state = state.clone();
            let f = f.clone();
            async move {
                state.gate(M::NAME).await;
                (f.as_ref())(&state, params)
            }
        })
        .await;
}

fn completed(notifier: &Notifier, prompt: String, dismissed: bool, result: serde_json::Value) -> Result<()> {
    let note = serde_json::to_value(PromptCompleted {
        prompt,
        dismissed,
        result,
    })
    .map_err(RpcError::Json)?;
    notifier.notify(PROMPT_COMPLETED, note);
    Ok(())
}

/// Fill `registry` with every method the mock answers.
pub async fn install(registry: &MethodRegistry, state: &Arc<MockState>, notifier: Notifier) {
    register::<OpenSession, _>(registry, state, |state, p| {
        let (output, session) = state.open_session(&p.algorithm, &p.input)?;
        Ok(OpenSessionResult { output, session })
    })
    .await;
    register::<CloseSession, _>(registry, state, |state, p| {
        state.close_session(&p.session);
        Ok(Empty {})
    })
    .await;
    register::<SearchItems, _>(registry, state, |state, p| Ok(state.search(&p.attributes))).await;
    register::<GetSecrets, _>(registry, state, |state, p| {
        let secrets = state.get_secrets(&p.items, &p.session)?;
        Ok(GetSecretsResult { secrets })
    })
    .await;
    register::<Unlock, _>(registry, state, |state, p| state.unlock(&p.objects)).await;
    register::<Lock, _>(registry, state, |state, p| state.lock(&p.objects)).await;

    let prompts = notifier.clone();
    register::<Prompt, _>(registry, state, move |state, p| {
        let outcome = state.prompt(&p.prompt)?;
        completed(&prompts, p.prompt, outcome.dismissed, outcome.result)?;
        Ok(Empty {})
    })
    .await;
    register::<Dismiss, _>(registry, state, move |state, p| {
        state.dismiss(&p.prompt)?;
        completed(&notifier, p.prompt, true, serde_json::Value::Null)?;
        Ok(Empty {})
    })
    .await;

    register::<DeleteItem, _>(registry, state, |state, p| {
        Ok(PromptResult {
            prompt: state.delete_item(&p.item)?,
        })
    })
    .await;
    register::<GetItemProperties, _>(registry, state, |state, p| state.item_properties(&p.item)).await;
    register::<SetItemProperties, _>(registry, state, |state, p| {
        state.set_item_properties(&p.item, p.label, p.attributes)?;
        Ok(Empty {})
    })
    .await;
    register::<SetSecret, _>(registry, state, |state, p| {
        state.set_secret(&p.item, &p.secret)?;
        Ok(Empty {})
    })
    .await;
    register::<ReadAlias, _>(registry, state, |state, p| {
        Ok(ReadAliasResult {
            collection: state.read_alias(&p.name),
        })
    })
    .await;
    register::<SetAlias, _>(registry, state, |state, p| {
        state.set_alias(&p.name, &p.collection)?;
        Ok(Empty {})
    })
    .await;
    register::<CreateCollection, _>(registry, state, |state, p| {
        Ok(state.create_collection(&p.properties.label, &p.alias))
    })
    .await;
    register::<DeleteCollection, _>(registry, state, |state, p| {
        Ok(PromptResult {
            prompt: state.remove_collection(&p.collection)?,
        })
    })
    .await;
    register::<CreateItem, _>(registry, state, |state, p| {
        state.create_item(
            &p.collection,
            &p.properties.label,
            p.properties.attributes,
            &p.secret,
            p.replace,
        )
    })
    .await;
}
