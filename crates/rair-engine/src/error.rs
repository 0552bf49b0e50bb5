//! Error types for the world server binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during server startup and world execution.

/// Top-level error for the world server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: rair_core::config::ConfigError,
    },

    /// NPC content references something that does not exist.
    #[error("content error: {source}")]
    Content {
        /// The underlying content error.
        #[from]
        source: rair_core::content::ContentError,
    },

    /// A spawner definition is unusable.
    #[error("spawner error: {source}")]
    Spawner {
        /// The underlying spawner error.
        #[from]
        source: rair_core::spawner::SpawnerError,
    },

    /// World clock initialization failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: rair_core::clock::ClockError,
    },

    /// A world loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: rair_core::runner::RunnerError,
    },

    /// Connecting to storage failed.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: rair_db::DbError,
    },

    /// Connecting to NATS failed.
    #[error("failed to connect to NATS at {url}: {source}")]
    NatsConnect {
        /// Server URL that was tried.
        url: String,
        /// The underlying connect error.
        #[source]
        source: async_nats::ConnectError,
    },

    /// Subscribing to a map's inbound subject failed.
    #[error("failed to subscribe to {subject}: {source}")]
    NatsSubscribe {
        /// Subject that was requested.
        subject: String,
        /// The underlying subscribe error.
        #[source]
        source: async_nats::SubscribeError,
    },

    /// A spawned task panicked or was cancelled.
    #[error("{task} task failed: {source}")]
    Task {
        /// Which task failed: a map name or `persistence`.
        task: String,
        /// The underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[tokio::test]
    async fn task_failure_keeps_its_join_error() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let source = handle.await.unwrap_err();
        assert!(source.is_cancelled());

        let err = EngineError::Task {
            task: "keep".to_owned(),
            source,
        };
        assert!(err.to_string().starts_with("keep task failed"));
        let inner = err.source().unwrap().downcast_ref::<tokio::task::JoinError>().unwrap();
        assert!(inner.is_cancelled());
    }
}
