//! Rate-limited, self-healing channel to the world backend.
//!
//! One mutex guards both the connection and the adaptive delay, so commands
//! from any caller go out strictly one at a time. The delay shrinks while the
//! backend keeps up and doubles whenever it does not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::infrastructure::ports::{CommandConnection, CommandConnector, CommandError, CommandSink};

/// Pacing parameters, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Delay the channel starts with.
    pub base_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Taken off the delay after each success.
    pub success_step_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            min_delay_ms: 10,
            max_delay_ms: 2_000,
            success_step_ms: 5,
        }
    }
}

struct ChannelState {
    connection: Option<Box<dyn CommandConnection>>,
    delay: Duration,
}

impl ChannelState {
    fn on_success(&mut self, config: &ThrottleConfig) {
        let step = Duration::from_millis(config.success_step_ms);
        let floor = Duration::from_millis(config.min_delay_ms);
        self.delay = self.delay.saturating_sub(step).max(floor);
    }

    fn on_failure(&mut self, config: &ThrottleConfig) {
        let ceiling = Duration::from_millis(config.max_delay_ms);
        self.delay = self.delay.saturating_mul(2).min(ceiling);
    }

    /// Close and forget the current connection. Close errors don't matter,
    /// the connection is being thrown away.
    async fn drop_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                tracing::debug!(error = %e, "Ignoring error while closing command connection");
            }
        }
    }
}

/// [`CommandSink`] over a lazily opened backend connection.
pub struct CommandChannel {
    connector: Arc<dyn CommandConnector>,
    config: ThrottleConfig,
    state: Mutex<ChannelState>,
}

impl CommandChannel {
    pub fn new(connector: Arc<dyn CommandConnector>, config: ThrottleConfig) -> Self {
        let delay = Duration::from_millis(config.base_delay_ms)
            .clamp(
                Duration::from_millis(config.min_delay_ms),
                Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
            );
        Self {
            connector,
            config,
            state: Mutex::new(ChannelState {
                connection: None,
                delay,
            }),
        }
    }

    /// Delay currently applied after each send.
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }

    /// Close the open connection, if any. The next send reconnects.
    pub async fn close(&self) {
        self.state.lock().await.drop_connection().await;
    }

    /// Send one command, reconnecting and retrying once on a transient
    /// failure. Anything else leaves the connection and the delay alone.
    async fn execute_locked(
        &self,
        state: &mut ChannelState,
        command: &str,
    ) -> Result<String, CommandError> {
        match self.attempt(state, command).await {
            Ok(reply) => {
                state.on_success(&self.config);
                Ok(reply)
            }
            Err(e) if !e.is_transient() => {
                tracing::warn!(error = %e, "Command refused, not retrying");
                Err(e)
            }
            Err(first) => {
                state.on_failure(&self.config);
                state.drop_connection().await;
                tracing::warn!(
                    error = %first,
                    delay_ms = state.delay.as_millis() as u64,
                    "Command failed, reconnecting and retrying once"
                );

                match self.attempt(state, command).await {
                    Ok(reply) => {
                        state.on_success(&self.config);
                        Ok(reply)
                    }
                    Err(e) => {
                        state.on_failure(&self.config);
                        state.drop_connection().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        state: &mut ChannelState,
        command: &str,
    ) -> Result<String, CommandError> {
        let connection = match state.connection.take() {
            Some(connection) => connection,
            None => self.connector.connect().await?,
        };
        let connection = state.connection.insert(connection);
        connection.execute(command).await
    }
}

#[async_trait]
impl CommandSink for CommandChannel {
    async fn send(&self, command: String) -> Result<String, CommandError> {
        let mut state = self.state.lock().await;
        let result = self.execute_locked(&mut state, &command).await;
        tokio::time::sleep(state.delay).await;
        result
    }

    async fn send_batch(&self, commands: Vec<String>) -> Result<Vec<String>, CommandError> {
        let mut state = self.state.lock().await;
        let mut replies = Vec::with_capacity(commands.len());
        let mut outcome = Ok(());
        for command in &commands {
            match self.execute_locked(&mut state, command).await {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        tokio::time::sleep(state.delay).await;
        outcome.map(|()| replies)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    use super::*;

    /// Connector whose connections follow a shared script of outcomes.
    /// `true` succeeds, `false` fails; an exhausted script succeeds.
    #[derive(Default)]
    struct ScriptedConnector {
        script: Arc<StdMutex<VecDeque<bool>>>,
        connects: AtomicUsize,
        closes: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedConnector {
        fn with_script(outcomes: &[bool]) -> Arc<Self> {
            let connector = Self::default();
            connector
                .script
                .lock()
                .expect("script")
                .extend(outcomes.iter().copied());
            Arc::new(connector)
        }
    }

    struct ScriptedConnection {
        script: Arc<StdMutex<VecDeque<bool>>>,
        closes: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl CommandConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn CommandConnection>, CommandError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConnection {
                script: self.script.clone(),
                closes: self.closes.clone(),
                sent: self.sent.clone(),
            }))
        }
    }

    #[async_trait]
    impl CommandConnection for ScriptedConnection {
        async fn execute(&mut self, command: &str) -> Result<String, CommandError> {
            if command.len() > crate::infrastructure::rcon::MAX_COMMAND_LEN {
                return Err(CommandError::Rejected("too long".into()));
            }
            let ok = self.script.lock().expect("script").pop_front().unwrap_or(true);
            if ok {
                self.sent.lock().expect("sent").push(command.to_string());
                Ok(format!("ok: {command}"))
            } else {
                Err(CommandError::Io("broken pipe".into()))
            }
        }

        async fn close(&mut self) -> Result<(), CommandError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(CommandError::Io("already closed".into()))
        }
    }

    fn fast() -> ThrottleConfig {
        ThrottleConfig {
            base_delay_ms: 4,
            min_delay_ms: 1,
            max_delay_ms: 16,
            success_step_ms: 1,
        }
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_the_connection() {
        let connector = ScriptedConnector::with_script(&[]);
        let channel = CommandChannel::new(connector.clone(), fast());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

        channel.send("say a".into()).await.expect("a");
        channel.send("say b".into()).await.expect("b");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_drops_the_connection_until_the_next_send() {
        let connector = ScriptedConnector::with_script(&[]);
        let channel = CommandChannel::new(connector.clone(), fast());
        channel.close().await;
        assert_eq!(connector.closes.load(Ordering::SeqCst), 0);

        channel.send("say a".into()).await.expect("a");
        channel.close().await;
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);

        channel.send("say b".into()).await.expect("b");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_reconnects_and_retries_once() {
        let connector = ScriptedConnector::with_script(&[false, true]);
        let channel = CommandChannel::new(connector.clone(), fast());

        let reply = channel.send("say hi".into()).await.expect("retried");
        assert_eq!(reply, "ok: say hi");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        // The close error was swallowed.
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_failure_surfaces_the_error() {
        let connector = ScriptedConnector::with_script(&[false, false]);
        let channel = CommandChannel::new(connector.clone(), fast());

        let err = channel.send("say hi".into()).await.expect_err("gave up");
        assert!(matches!(err, CommandError::Io(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert!(connector.sent.lock().expect("sent").is_empty());
    }

    #[tokio::test]
    async fn rejected_commands_keep_the_connection_and_the_pace() {
        let connector = ScriptedConnector::with_script(&[]);
        let channel = CommandChannel::new(connector.clone(), fast());
        channel.send("say a".into()).await.expect("a");
        let delay = channel.current_delay().await;

        let long = "x".repeat(crate::infrastructure::rcon::MAX_COMMAND_LEN + 1);
        let err = channel.send(long).await.expect_err("too long");
        assert!(matches!(err, CommandError::Rejected(_)));
        assert!(!err.is_transient());
        assert_eq!(channel.current_delay().await, delay);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 0);

        channel.send("say b".into()).await.expect("b");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delay_shrinks_to_the_floor_and_doubles_to_the_ceiling() {
        let connector = ScriptedConnector::with_script(&[]);
        let channel = CommandChannel::new(connector.clone(), fast());
        for i in 0..10 {
            channel.send(format!("say {i}")).await.expect("send");
        }
        assert_eq!(channel.current_delay().await, Duration::from_millis(1));

        connector
            .script
            .lock()
            .expect("script")
            .extend([false; 12]);
        for _ in 0..6 {
            let _ = channel.send("say fail".into()).await;
        }
        assert_eq!(channel.current_delay().await, Duration::from_millis(16));
    }

    #[tokio::test]
    async fn defaults_match_the_documented_pacing() {
        let config = ThrottleConfig::default();
        assert_eq!(config.base_delay_ms, 50);
        assert_eq!(config.min_delay_ms, 10);
        assert_eq!(config.max_delay_ms, 2_000);
        assert_eq!(config.success_step_ms, 5);

        let channel = CommandChannel::new(ScriptedConnector::with_script(&[]), config);
        assert_eq!(channel.current_delay().await, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn batch_pays_the_delay_once() {
        let connector = ScriptedConnector::with_script(&[]);
        let config = ThrottleConfig {
            base_delay_ms: 60,
            min_delay_ms: 60,
            max_delay_ms: 60,
            success_step_ms: 0,
        };
        let channel = CommandChannel::new(connector.clone(), config);
        let commands: Vec<String> = (0..10).map(|i| format!("setblock {i} 64 0 stone")).collect();

        let started = Instant::now();
        let replies = channel.send_batch(commands.clone()).await.expect("batch");
        let elapsed = started.elapsed();

        assert_eq!(replies.len(), 10);
        assert_eq!(*connector.sent.lock().expect("sent"), commands);
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn batch_stops_at_the_first_unrecoverable_command() {
        let connector = ScriptedConnector::with_script(&[true, false, false]);
        let channel = CommandChannel::new(connector.clone(), fast());

        let result = channel
            .send_batch(vec!["a".into(), "b".into(), "c".into()])
            .await;
        assert!(result.is_err());
        assert_eq!(*connector.sent.lock().expect("sent"), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_batches_do_not_interleave() {
        let connector = ScriptedConnector::with_script(&[]);
        let channel = Arc::new(CommandChannel::new(connector.clone(), fast()));

        let first: Vec<String> = (0..20).map(|i| format!("a{i}")).collect();
        let second: Vec<String> = (0..20).map(|i| format!("b{i}")).collect();
        let (r1, r2) = tokio::join!(
            channel.send_batch(first.clone()),
            channel.send_batch(second.clone())
        );
        r1.expect("first");
        r2.expect("second");

        let sent = connector.sent.lock().expect("sent").clone();
        let a_first = sent[0].starts_with('a');
        let (head, tail) = sent.split_at(20);
        let (expected_head, expected_tail) = if a_first {
            (&first, &second)
        } else {
            (&second, &first)
        };
        assert_eq!(head, expected_head.as_slice());
        assert_eq!(tail, expected_tail.as_slice());
    }
}
