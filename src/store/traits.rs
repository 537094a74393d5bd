use crate::error::ResolveResult;
use crate::logic::ReasonerCommand;

/// Runs reasoner invocations as separate OS processes.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Captured standard output of a successful run.
    async fn run(&self, command: &ReasonerCommand) -> ResolveResult<String>;
}

/// Dereferences upstream HTTP resources (SPARQL endpoints and the like).
#[async_trait::async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        accept: &str,
    ) -> ResolveResult<String>;
}
