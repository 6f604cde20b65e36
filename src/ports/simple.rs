//! A closure-registered [`ActionPort`] implementation.
//!
//! Grounded in `original_source/include/public/vda5050++/handler/
//! simple_multi_action_handler.h`: the original runtime ships a default
//! action handler that lets callers register declarations by closure
//! instead of implementing the full handler interface. SPEC_FULL §6
//! carries this forward as ambient tooling, not a protocol change.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Action;

use super::{ActionContext, ActionHandle, ActionPort, PortError};

type MatchFn = Arc<dyn Fn(&Action) -> bool + Send + Sync>;
type ValidateFn = Arc<
    dyn Fn(&Action, ActionContext) -> (Vec<PortError>, Option<HashMap<String, String>>)
        + Send
        + Sync,
>;
type PrepareFn =
    Arc<dyn Fn(&Action, HashMap<String, String>) -> Result<Arc<dyn ActionHandle>> + Send + Sync>;

struct Declaration {
    matches: MatchFn,
    validate: ValidateFn,
    prepare: PrepareFn,
}

/// Collects action declarations registered by closure and dispatches to
/// the first one whose `matches` predicate accepts an incoming action
/// — the "matching" behavior spec.md §9's design note calls for.
#[derive(Default)]
pub struct SimpleActionPort {
    declarations: Vec<Declaration>,
}

impl SimpleActionPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M, V, P>(&mut self, matches: M, validate: V, prepare: P)
    where
        M: Fn(&Action) -> bool + Send + Sync + 'static,
        V: Fn(&Action, ActionContext) -> (Vec<PortError>, Option<HashMap<String, String>>)
            + Send
            + Sync
            + 'static,
        P: Fn(&Action, HashMap<String, String>) -> Result<Arc<dyn ActionHandle>>
            + Send
            + Sync
            + 'static,
    {
        self.declarations.push(Declaration {
            matches: Arc::new(matches),
            validate: Arc::new(validate),
            prepare: Arc::new(prepare),
        });
    }

    fn find(&self, action: &Action) -> Option<&Declaration> {
        self.declarations.iter().find(|d| (d.matches)(action))
    }
}

#[async_trait]
impl ActionPort for SimpleActionPort {
    fn matches(&self, action: &Action) -> bool {
        self.find(action).is_some()
    }

    async fn validate(
        &self,
        action: &Action,
        context: ActionContext,
    ) -> (Vec<PortError>, Option<HashMap<String, String>>) {
        match self.find(action) {
            Some(decl) => (decl.validate)(action, context),
            None => (
                vec![PortError::new(
                    "unknown_action_type",
                    format!("no declaration matches action type {}", action.action_type),
                )],
                None,
            ),
        }
    }

    async fn prepare(
        &self,
        action: &Action,
        parameters: HashMap<String, String>,
    ) -> Result<Arc<dyn ActionHandle>> {
        match self.find(action) {
            Some(decl) => (decl.prepare)(action, parameters),
            None => Err(crate::error::Vda5050Error::InvalidArgument(format!(
                "no declaration matches action type {}",
                action.action_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockingType;

    struct NoopHandle;
    #[async_trait]
    impl ActionHandle for NoopHandle {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn pause(&self) -> Result<()> {
            Ok(())
        }
        async fn resume(&self) -> Result<()> {
            Ok(())
        }
        async fn cancel(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_to_first_matching_declaration() {
        let mut port = SimpleActionPort::new();
        port.register(
            |a| a.action_type == "wait",
            |_, _| (Vec::new(), Some(HashMap::new())),
            |_, _| Ok(Arc::new(NoopHandle) as Arc<dyn ActionHandle>),
        );

        let action = Action {
            action_id: "a1".into(),
            action_type: "wait".into(),
            blocking_type: BlockingType::Hard,
            action_parameters: HashMap::new(),
        };
        assert!(port.matches(&action));
        let (errors, _) = port.validate(&action, ActionContext::Instant).await;
        assert!(errors.is_empty());
        assert!(port.prepare(&action, HashMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_action_type_reports_error() {
        let port = SimpleActionPort::new();
        let action = Action {
            action_id: "a1".into(),
            action_type: "mystery".into(),
            blocking_type: BlockingType::None,
            action_parameters: HashMap::new(),
        };
        let (errors, _) = port.validate(&action, ActionContext::Instant).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, "unknown_action_type");
    }
}
