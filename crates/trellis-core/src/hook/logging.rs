use super::GraphHook;
use crate::operation::{OperationChain, Output};
use crate::types::{TrellisError, User};

/// Logs every chain a user runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl GraphHook for LoggingHook {
    fn pre_execute(&self, chain: &mut OperationChain, user: &User) -> Result<(), TrellisError> {
        tracing::info!("Running {} as {}", chain, user.user_id);
        Ok(())
    }

    fn on_failure(
        &self,
        result: Option<Output>,
        chain: &OperationChain,
        user: &User,
        error: &TrellisError,
    ) -> Result<Option<Output>, TrellisError> {
        tracing::warn!("Failed to run {} as {}: {}", chain, user.user_id, error);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Count, Operation};

    #[test]
    fn logging_hook_passes_results_through() {
        let hook = LoggingHook;
        let mut chain = OperationChain::from(Operation::from(Count::default()));
        let user = User::new("alice");

        hook.pre_execute(&mut chain, &user).expect("pre");
        assert_eq!(chain.len(), 1);

        let out = hook
            .post_execute(Output::Count(2), &chain, &user)
            .expect("post");
        assert_eq!(out, Output::Count(2));

        let failed = hook
            .on_failure(None, &chain, &user, &TrellisError::Execution("boom".into()))
            .expect("failure");
        assert_eq!(failed, None);
    }
}
