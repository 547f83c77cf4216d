//! Closure-backed capabilities

use super::{Capability, CapabilityContext, CapabilityOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Capability built from an async function of the call arguments.
///
/// `Ok` becomes a successful output, `Err` a capability error.
pub struct FnCapability<F> {
    name: String,
    description: String,
    input_schema: Value,
    func: F,
}

impl<F, Fut> FnCapability<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        func: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn invoke(&self, arguments: Value, _ctx: CapabilityContext) -> CapabilityOutput {
        match (self.func)(arguments).await {
            Ok(output) => CapabilityOutput::success(output),
            Err(message) => CapabilityOutput::error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_fn_capability() {
        let add = FnCapability::new(
            "add",
            "Add two numbers",
            json!({"type": "object"}),
            |args: Value| async move {
                let a = args["a"].as_i64().ok_or("missing a")?;
                let b = args["b"].as_i64().ok_or("missing b")?;
                Ok((a + b).to_string())
            },
        );
        let ctx = CapabilityContext::new(CancellationToken::new(), "c1");
        let out = add.invoke(json!({"a": 2, "b": 3}), ctx.clone()).await;
        assert!(out.success);
        assert_eq!(out.output, "5");

        let out = add.invoke(json!({"a": 2}), ctx).await;
        assert!(!out.success);
        assert_eq!(out.output, "missing b");
    }
}
