//! Registry mapping user identifiers to shell sessions.
//!
//! The registry is an explicit object built with its transport, so tests
//! inject fakes and the binary injects russh. Only storage entries are
//! locked; a session operation runs on a cloned `Arc<Session>` after the
//! entry is released.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channel::{ConnectParams, ShellTransport};
use super::completion::{CompletionProtocol, PromptSentinel};
use super::config::SessionConfig;
use super::error::SessionError;
use super::executor::ExecutionOutcome;
use super::session::{Session, SessionInfo, SessionStatus, ToggleOutcome};
use super::storage::{DashMapSessionStorage, SessionStorage};

pub struct SessionRegistry {
    transport: Arc<dyn ShellTransport>,
    protocol: Arc<dyn CompletionProtocol>,
    config: SessionConfig,
    storage: Box<dyn SessionStorage>,
    shutdown_token: CancellationToken,
}

impl SessionRegistry {
    /// Registry using the prompt-sentinel protocol with the configured marker.
    pub fn new(transport: Arc<dyn ShellTransport>, config: SessionConfig) -> Self {
        let protocol = Arc::new(PromptSentinel::new(config.prompt_marker.clone()));
        Self::with_protocol(transport, protocol, config)
    }

    pub fn with_protocol(
        transport: Arc<dyn ShellTransport>,
        protocol: Arc<dyn CompletionProtocol>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            protocol,
            config,
            storage: Box::new(DashMapSessionStorage::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.storage.get(user_id)
    }

    pub fn get_or_create(&self, user_id: &str) -> Arc<Session> {
        self.storage.get_or_insert_with(user_id, &|| {
            Session::new(
                user_id,
                self.transport.clone(),
                self.protocol.clone(),
                self.config.clone(),
                self.shutdown_token.child_token(),
            )
        })
    }

    /// Evict a user's session, disconnecting it first if needed.
    pub async fn remove(&self, user_id: &str) -> bool {
        let Some(session) = self.storage.remove(user_id) else {
            return false;
        };
        match session.disconnect().await {
            Ok(()) | Err(SessionError::NotConnected) => {}
            Err(e) => warn!(user_id, "Error disconnecting evicted session: {}", e),
        }
        true
    }

    /// Connect a user, creating their session on first use.
    ///
    /// A failed attempt leaves the session registered (and disconnected)
    /// so that the next attempt reuses it. After [`shutdown`](Self::shutdown)
    /// no session is created and no connection is opened.
    pub async fn connect(
        &self,
        user_id: &str,
        params: ConnectParams,
    ) -> Result<SessionInfo, SessionError> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }
        self.get_or_create(user_id).connect(params).await
    }

    pub async fn execute(
        &self,
        user_id: &str,
        command: &str,
    ) -> Result<ExecutionOutcome, SessionError> {
        self.existing(user_id)?.execute(command).await
    }

    pub async fn toggle_off(&self, user_id: &str) -> Result<ToggleOutcome, SessionError> {
        self.existing(user_id)?.toggle_off().await
    }

    pub async fn disconnect(&self, user_id: &str) -> Result<(), SessionError> {
        self.existing(user_id)?.disconnect().await
    }

    pub fn status(&self, user_id: &str) -> Option<SessionStatus> {
        self.storage.get(user_id).map(|session| session.status())
    }

    /// Whether freeform text from `user_id` should run as a command.
    pub fn is_interactive(&self, user_id: &str) -> bool {
        self.storage
            .get(user_id)
            .is_some_and(|session| session.is_interactive())
    }

    /// Status of every registered session, keyed by user id.
    pub fn list(&self) -> Vec<(String, SessionStatus)> {
        self.storage
            .sessions()
            .into_iter()
            .map(|session| (session.id().to_string(), session.status()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Interrupt all polling and disconnect every session concurrently.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        let sessions = self.storage.drain();
        info!("Shutting down {} shell session(s)", sessions.len());

        join_all(sessions.iter().map(|session| async move {
            match session.disconnect().await {
                Ok(()) | Err(SessionError::NotConnected) => {}
                Err(e) => warn!(user_id = session.id(), "Error during shutdown: {}", e),
            }
        }))
        .await;
    }

    fn existing(&self, user_id: &str) -> Result<Arc<Session>, SessionError> {
        self.storage.get(user_id).ok_or(SessionError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::session::SessionState;
    use crate::shell::testing::{FakeTransport, fast_config};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn registry_with(transport: &Arc<FakeTransport>) -> SessionRegistry {
        SessionRegistry::new(transport.clone(), fast_config())
    }

    fn params() -> ConnectParams {
        ConnectParams::new("h", 22, "u", "p")
    }

    mod lookup {
        use super::*;

        #[test]
        fn test_get_or_create_returns_same_session() {
            let registry = registry_with(&FakeTransport::new());
            let first = registry.get_or_create("alice");
            let second = registry.get_or_create("alice");

            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(registry.len(), 1);
            assert!(registry.get("bob").is_none());
        }

        #[tokio::test]
        async fn test_operations_on_unknown_user_do_not_create() {
            let registry = registry_with(&FakeTransport::new());

            assert!(matches!(
                registry.execute("ghost", "ls").await,
                Err(SessionError::NotConnected)
            ));
            assert!(matches!(
                registry.toggle_off("ghost").await,
                Err(SessionError::NotConnected)
            ));
            assert!(matches!(
                registry.disconnect("ghost").await,
                Err(SessionError::NotConnected)
            ));
            assert!(registry.is_empty());
            assert!(!registry.is_interactive("ghost"));
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn test_failed_connect_keeps_entry_for_retry() {
            let transport = FakeTransport::new();
            transport.fail_next("Network is unreachable");
            let registry = registry_with(&transport);

            assert!(registry.connect("alice", params()).await.is_err());
            let status = registry.status("alice").unwrap();
            assert_eq!(status.state, SessionState::Disconnected);

            registry.connect("alice", params()).await.unwrap();
            assert!(registry.is_interactive("alice"));
            assert_eq!(registry.len(), 1);
        }

        #[tokio::test]
        async fn test_users_are_isolated() {
            let transport = FakeTransport::new();
            let registry = registry_with(&transport);

            registry.connect("alice", params()).await.unwrap();
            transport.fail_next("Connection refused");
            assert!(registry.connect("bob", params()).await.is_err());

            let outcome = registry.execute("alice", "whoami").await.unwrap();
            assert_eq!(outcome.output, "alice");
            assert!(matches!(
                registry.execute("bob", "whoami").await,
                Err(SessionError::NotConnected)
            ));
        }

        #[tokio::test]
        async fn test_remove_disconnects_session() {
            let transport = FakeTransport::new();
            let registry = registry_with(&transport);
            registry.connect("alice", params()).await.unwrap();

            assert!(registry.remove("alice").await);
            assert!(!registry.remove("alice").await);

            let connection = transport.last_connection();
            assert_eq!(connection.close_calls.load(Ordering::SeqCst), 1);
            assert!(registry.get("alice").is_none());
        }

        #[tokio::test]
        async fn test_list_reports_each_user() {
            let transport = FakeTransport::new();
            let registry = registry_with(&transport);
            registry.connect("alice", params()).await.unwrap();
            registry.get_or_create("bob");

            let mut listed = registry.list();
            listed.sort_by(|a, b| a.0.cmp(&b.0));

            assert_eq!(listed.len(), 2);
            assert_eq!(listed[0].0, "alice");
            assert_eq!(listed[0].1.state, SessionState::Connected);
            assert_eq!(listed[1].0, "bob");
            assert_eq!(listed[1].1.state, SessionState::Disconnected);
        }
    }

    mod shutdown {
        use super::*;

        #[tokio::test]
        async fn test_shutdown_disconnects_everyone() {
            let transport = FakeTransport::new();
            let registry = registry_with(&transport);
            registry.connect("alice", params()).await.unwrap();
            registry.connect("bob", params()).await.unwrap();
            registry.get_or_create("carol");

            registry.shutdown().await;

            assert!(registry.is_shutting_down());
            assert!(registry.is_empty());
            for index in 0..2 {
                let connection = transport.connection(index);
                assert_eq!(connection.channel.close_calls.load(Ordering::SeqCst), 1);
                assert_eq!(connection.close_calls.load(Ordering::SeqCst), 1);
            }
        }

        #[tokio::test]
        async fn test_connect_after_shutdown_is_refused() {
            let transport = FakeTransport::new();
            let registry = registry_with(&transport);
            registry.shutdown().await;

            assert!(matches!(
                registry.connect("late", params()).await,
                Err(SessionError::ShuttingDown)
            ));
            assert!(registry.is_empty());
            assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_connect_racing_shutdown_closes_new_shell() {
            let transport = FakeTransport::new();
            let mut config = fast_config();
            config.settle_delay = Duration::from_millis(100);
            let registry = SessionRegistry::new(transport.clone(), config);

            let (connected, ()) = tokio::join!(registry.connect("alice", params()), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                registry.shutdown().await;
            });

            assert!(matches!(connected, Err(SessionError::ShuttingDown)));
            let connection = transport.connection(0);
            assert_eq!(connection.channel.close_calls.load(Ordering::SeqCst), 1);
            assert_eq!(connection.close_calls.load(Ordering::SeqCst), 1);
            assert!(registry.is_empty());
        }

        #[tokio::test]
        async fn test_shutdown_interrupts_pending_command() {
            let transport = FakeTransport::new();
            let mut config = fast_config();
            config.command_timeout = Duration::from_secs(30);
            let registry = SessionRegistry::new(transport.clone(), config);
            registry.connect("alice", params()).await.unwrap();

            let (executed, ()) = tokio::join!(registry.execute("alice", "sleep 60"), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                registry.shutdown().await;
            });

            let outcome = executed.unwrap();
            assert!(outcome.cancelled);
            assert!(outcome.elapsed < Duration::from_secs(5));
            assert_eq!(
                transport.last_connection().close_calls.load(Ordering::SeqCst),
                1
            );
        }
    }
}
