//! Method registry for the serving side of a connection.

use crate::error::RpcError;
use crate::protocol::Method;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for RPC method handlers.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle the method call.
    async fn call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value>;
}

/// Adapts a typed async function into a [`MethodHandler`] for `M`.
struct TypedHandler<M, F> {
    f: F,
    _method: std::marker::PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, F, Fut> MethodHandler for TypedHandler<M, F>
where
    M: Method + 'static,
    F: Fn(M::Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M::Output>> + Send,
{
    async fn call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params = params.unwrap_or(serde_json::Value::Null);
        let params: M::Params = serde_json::from_value(params)?;
        let output = (self.f)(params).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Registry for RPC methods.
pub struct MethodRegistry {
    /// Registered methods.
    methods: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Register a method handler.
    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        let mut methods = self.methods.write().await;
        methods.insert(name.into(), handler);
    }

    /// Register a typed handler for protocol method `M`.
    pub async fn register_method<M, F, Fut>(&self, f: F)
    where
        M: Method + 'static,
        F: Fn(M::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Output>> + Send + 'static,
    {
        let handler = TypedHandler::<M, F> {
            f,
            _method: std::marker::PhantomData,
        };
        self.register(M::NAME, Arc::new(handler)).await;
    }

    /// Unregister a method.
    pub async fn unregister(&self, name: &str) {
        let mut methods = self.methods.write().await;
        methods.remove(name);
    }

    /// Call a method.
    pub async fn call(
        &self,
        name: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let handler = {
            let methods = self.methods.read().await;
            methods
                .get(name)
                .cloned()
                .ok_or_else(|| RpcError::MethodNotFound(name.to_string()))?
        };

        debug!("Calling method: {}", name);
        handler.call(params).await
    }

    /// List registered methods.
    pub async fn list(&self) -> Vec<String> {
        let methods = self.methods.read().await;
        let mut names: Vec<String> = methods.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::protocol::{ReadAlias, ReadAliasResult};

    #[tokio::test]
    async fn test_typed_method() {
        let registry = MethodRegistry::new();
        registry
            .register_method::<ReadAlias, _, _>(|params| async move {
                Ok(ReadAliasResult {
                    collection: format!("/collection/{}", params.name),
                })
            })
            .await;

        let result = registry
            .call("ReadAlias", Some(serde_json::json!({"name": "default"})))
            .await
            .unwrap();
        assert_eq!(result["collection"], "/collection/default");
        assert_eq!(registry.list().await, vec!["ReadAlias".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_params() {
        let registry = MethodRegistry::new();
        registry
            .register_method::<ReadAlias, _, _>(|_| async move {
                Err(RpcError::remote(RemoteErrorKind::NoSuchObject, "unreachable"))
            })
            .await;

        let result = registry.call("ReadAlias", Some(serde_json::json!({}))).await;
        assert!(matches!(result, Err(RpcError::Json(_))));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let registry = MethodRegistry::new();

        let result = registry.call("nonexistent", None).await;
        assert!(matches!(result, Err(RpcError::MethodNotFound(_))));
    }
}
