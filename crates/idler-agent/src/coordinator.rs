use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use idler_core::{ActivityClassifier, ActivitySignal, CompanionPhase, ContainerStatus, NotificationIcon};
use tokio::{sync::Mutex, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::log_stream::{LogActivityStream, StreamError};
use crate::presence::PresenceApi;
use crate::runtime::{ContainerBackend, ControlOutcome, RuntimeController};

const RECONNECT_BACKOFF_MIN: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);
const DRAIN_GRACE: Duration = Duration::from_secs(10);

const MSG_START_TRIGGERED: &str = "Player activity detected, starting headless client...";
const MSG_COMPANION_READY: &str = "Headless client is available.";

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("server container {name} did not answer within {timeout:?}")]
    PrimaryUnreachable { name: String, timeout: Duration },
}

/// Mutable lifecycle bookkeeping. Only the coordinator touches it.
#[derive(Debug, Clone)]
pub struct LifecycleState {
    last_activity_at: Instant,
    shutdown_deadline: Instant,
    awaiting_companion_start: bool,
    phase: CompanionPhase,
}

impl LifecycleState {
    fn new(now: Instant, idle: Duration) -> Self {
        Self {
            last_activity_at: now,
            shutdown_deadline: now + idle,
            awaiting_companion_start: false,
            phase: CompanionPhase::Idle,
        }
    }

    /// Moves both timestamps together so the deadline is never stale.
    fn touch(&mut self, now: Instant, idle: Duration) {
        self.last_activity_at = now;
        self.shutdown_deadline = now + idle;
    }

    fn set_phase(&mut self, phase: CompanionPhase) {
        if self.phase != phase {
            tracing::info!(from = %self.phase, to = %phase, "companion phase changed");
            self.phase = phase;
        }
    }
}

/// What a single idle-check tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotDue,
    NotRunning(ContainerStatus),
    /// Players were online; the deadline was pushed out instead.
    Vetoed(usize),
    /// Fresh activity landed while the tick was checking players.
    Refreshed,
    Stopped,
    /// Activity arrived while the stop was in flight; the companion is
    /// being started again.
    Restarted,
}

pub(crate) fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() || parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

/// Starts the headless container on player activity and stops it once the
/// server has been idle for the configured delay with nobody online.
///
/// Two tasks share [`LifecycleState`]: the log consumer is the only writer
/// on the activity path, and the idle checker only reads the deadline
/// except when a player-count veto counts as fresh activity.
pub struct LifecycleCoordinator {
    config: Config,
    runtime: RuntimeController,
    presence: Arc<dyn PresenceApi>,
    logs: LogActivityStream,
    state: Mutex<LifecycleState>,
    running: CancellationToken,
}

impl LifecycleCoordinator {
    pub fn new(
        config: Config,
        backend: Arc<dyn ContainerBackend>,
        presence: Arc<dyn PresenceApi>,
    ) -> Self {
        let classifier = ActivityClassifier::new(config.activity_kinds.iter().copied());
        let state = LifecycleState::new(Instant::now(), config.shutdown_delay);
        Self {
            runtime: RuntimeController::new(backend.clone()),
            logs: LogActivityStream::new(backend, classifier),
            presence,
            state: Mutex::new(state),
            running: CancellationToken::new(),
            config,
        }
    }

    /// Cancelling the returned token asks both loops to finish.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    async fn snapshot(&self) -> LifecycleState {
        self.state.lock().await.clone()
    }

    fn companion(&self) -> &str {
        &self.config.headless_container
    }

    /// Returns false when shutdown was requested before the sleep finished.
    async fn sleep_or_cancel(&self, d: Duration) -> bool {
        tokio::select! {
            _ = self.running.cancelled() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }

    pub async fn run(self: Arc<Self>) -> Result<(), StartupError> {
        tracing::info!(
            companion = %self.config.headless_container,
            server = %self.config.server_container,
            shutdown_delay = ?self.config.shutdown_delay,
            "starting idle monitor"
        );

        if !self.wait_for_primary().await {
            if !self.is_running() {
                tracing::info!("shutdown requested during startup");
                return Ok(());
            }
            tracing::error!(server = %self.config.server_container, "server never came up, exiting");
            return Err(StartupError::PrimaryUnreachable {
                name: self.config.server_container.clone(),
                timeout: self.config.startup_timeout,
            });
        }

        let initial = self.runtime.status(self.companion()).await;
        tracing::info!(companion = %self.companion(), status = %initial, "initial container status");
        if initial.is_running() {
            let mut st = self.state.lock().await;
            st.touch(Instant::now(), self.config.shutdown_delay);
            st.set_phase(CompanionPhase::Active);
            tracing::info!("container already running, tracking activity from now");
        }

        let mut tasks = JoinSet::new();
        tasks.spawn(
            self.clone()
                .consume_signals()
                .instrument(tracing::info_span!("log_consumer")),
        );
        tasks.spawn(
            self.clone()
                .idle_check_loop()
                .instrument(tracing::info_span!("idle_check")),
        );

        loop {
            tokio::select! {
                _ = self.running.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(Err(e)) if e.is_panic() => tracing::error!(error = %e, "coordinator task panicked"),
                    Some(_) => tracing::debug!("coordinator task finished"),
                    None => break,
                },
            }
        }

        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
            tracing::warn!(grace = ?DRAIN_GRACE, "tasks did not stop in time, aborting");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let st = self.snapshot().await;
        tracing::info!(phase = %st.phase, awaiting_start = st.awaiting_companion_start, "idle monitor stopped");
        Ok(())
    }

    /// Polls the server ping endpoint until it answers or the startup
    /// timeout runs out.
    pub async fn wait_for_primary(&self) -> bool {
        tracing::info!(server = %self.config.server_container, "waiting for server container");
        let started = Instant::now();
        while self.is_running() && started.elapsed() < self.config.startup_timeout {
            if self.presence.ping().await {
                return true;
            }
            if !self.sleep_or_cancel(self.config.startup_poll).await {
                return false;
            }
        }
        tracing::warn!(
            server = %self.config.server_container,
            timeout = ?self.config.startup_timeout,
            "server did not answer ping"
        );
        false
    }

    /// Supervises the log subscription: reconnects with back-off after a
    /// dropped connection, gives up when the server container is gone.
    async fn consume_signals(self: Arc<Self>) {
        let server = self.config.server_container.clone();
        let mut backoff = RECONNECT_BACKOFF_MIN;

        while self.is_running() {
            let subscribed = tokio::select! {
                _ = self.running.cancelled() => break,
                res = self.logs.subscribe(&server, self.running.clone()) => res,
            };

            match subscribed {
                Ok(mut signals) => {
                    backoff = RECONNECT_BACKOFF_MIN;
                    while let Some(item) = signals.next().await {
                        if !self.is_running() {
                            break;
                        }
                        match item {
                            Ok(signal) => self.handle_signal(signal).await,
                            Err(e) => {
                                tracing::warn!(error = %e, "log stream failed");
                                break;
                            }
                        }
                    }
                    if !self.is_running() {
                        break;
                    }
                    tracing::info!(container = %server, "log stream ended, reconnecting");
                }
                Err(StreamError::ResourceNotFound(name)) => {
                    tracing::error!(container = %name, "server container gone, log consumer stopping");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?backoff, "log stream unavailable");
                }
            }

            if !self.sleep_or_cancel(backoff).await {
                break;
            }
            backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
        }
        tracing::debug!("log consumer exited");
    }

    pub(crate) async fn handle_signal(&self, signal: ActivitySignal) {
        match signal {
            ActivitySignal::CompanionStarted => {
                let was_waiting = {
                    let mut st = self.state.lock().await;
                    if st.awaiting_companion_start {
                        st.awaiting_companion_start = false;
                        st.set_phase(CompanionPhase::Active);
                        true
                    } else {
                        false
                    }
                };
                if was_waiting {
                    tracing::info!(companion = %self.companion(), "headless client connected");
                    self.presence
                        .notify(MSG_COMPANION_READY, NotificationIcon::Quest)
                        .await;
                } else {
                    tracing::debug!("ignoring unsolicited headless connection");
                }
            }
            ActivitySignal::Heartbeat(kind) => self.activity_detected(kind.pattern()).await,
        }
    }

    /// Resets the idle deadline and starts the companion if it is down.
    async fn activity_detected(&self, reason: &str) {
        let deadline = {
            let mut st = self.state.lock().await;
            st.touch(Instant::now(), self.config.shutdown_delay);
            st.shutdown_deadline
        };
        tracing::info!(
            reason,
            shutdown_in = ?deadline.saturating_duration_since(Instant::now()),
            "activity detected"
        );

        let status = self.runtime.status(self.companion()).await;
        match status {
            ContainerStatus::Running => {
                let mut st = self.state.lock().await;
                if st.phase == CompanionPhase::Idle {
                    st.set_phase(CompanionPhase::Active);
                }
                return;
            }
            ContainerStatus::NotFound => return,
            ContainerStatus::Stopped | ContainerStatus::Error => {}
        }

        {
            let mut st = self.state.lock().await;
            st.awaiting_companion_start = true;
            st.set_phase(CompanionPhase::StartPending);
        }
        match self.runtime.start(self.companion()).await {
            ControlOutcome::Issued => {
                self.presence
                    .notify(MSG_START_TRIGGERED, NotificationIcon::Default)
                    .await;
            }
            ControlOutcome::Skipped(ContainerStatus::Running) => {
                tracing::debug!("container came up on its own");
            }
            other => {
                tracing::warn!(outcome = ?other, companion = %self.companion(), "start not issued");
            }
        }
    }

    async fn idle_check_loop(self: Arc<Self>) {
        while self.is_running() {
            if !self.sleep_or_cancel(self.config.check_interval).await {
                break;
            }
            match self.idle_tick().await {
                Ok(outcome) => tracing::trace!(?outcome, "idle check"),
                Err(e) => {
                    tracing::error!(error = %format_error_chain(&e), "idle check failed");
                    if !self.sleep_or_cancel(self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("idle checker exited");
    }

    pub(crate) async fn idle_tick(&self) -> anyhow::Result<TickOutcome> {
        let deadline = self.state.lock().await.shutdown_deadline;
        if Instant::now() < deadline {
            return Ok(TickOutcome::NotDue);
        }

        let status = self.runtime.status(self.companion()).await;
        if !status.is_running() {
            return Ok(TickOutcome::NotRunning(status));
        }

        let players = self.presence.fetch_online_players().await;
        if players > 0 {
            tracing::info!(players, "players online");
            self.activity_detected(&format!("{players} players online, aborting shutdown"))
                .await;
            return Ok(TickOutcome::Vetoed(players));
        }
        tracing::info!("no players online");

        let (deadline, last_activity) = {
            let st = self.state.lock().await;
            (st.shutdown_deadline, st.last_activity_at)
        };
        if Instant::now() < deadline {
            return Ok(TickOutcome::Refreshed);
        }

        tracing::info!(
            idle_for = ?last_activity.elapsed(),
            companion = %self.companion(),
            "no activity, stopping container"
        );
        match self.runtime.stop(self.companion()).await {
            ControlOutcome::Failed => {
                anyhow::bail!("failed to stop container {}", self.companion())
            }
            ControlOutcome::Skipped(status) => {
                tracing::warn!(%status, "intended to stop but the container was not running");
                Ok(TickOutcome::NotRunning(status))
            }
            ControlOutcome::Issued => {
                let raced = {
                    let mut st = self.state.lock().await;
                    st.awaiting_companion_start = false;
                    st.set_phase(CompanionPhase::Idle);
                    st.last_activity_at != last_activity
                };
                if raced {
                    self.activity_detected("activity during shutdown, restarting")
                        .await;
                    return Ok(TickOutcome::Restarted);
                }
                Ok(TickOutcome::Stopped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use idler_core::ActivityKind;

    use super::*;
    use crate::presence::fake::FakePresence;
    use crate::runtime::BackendError;
    use crate::runtime::fake::{FakeBackend, LogScript};

    const COMPANION: &str = "fika-headless";
    const SERVER: &str = "fika-server";

    fn setup(
        companion_state: &str,
    ) -> (Arc<LifecycleCoordinator>, Arc<FakeBackend>, Arc<FakePresence>) {
        let backend = Arc::new(FakeBackend::with_container(COMPANION, companion_state));
        backend.set_state(SERVER, "running");
        let presence = Arc::new(FakePresence::alive());
        let coord = Arc::new(LifecycleCoordinator::new(
            Config::default(),
            backend.clone(),
            presence.clone(),
        ));
        (coord, backend, presence)
    }

    fn presence_line() -> ActivitySignal {
        ActivitySignal::Heartbeat(ActivityKind::PresenceSet)
    }

    #[tokio::test(start_paused = true)]
    async fn activity_starts_companion_and_connection_confirms_it() {
        let (coord, backend, presence) = setup("exited");
        let t0 = Instant::now();

        coord.handle_signal(presence_line()).await;

        assert_eq!(backend.starts(), 1);
        let st = coord.snapshot().await;
        assert!(st.awaiting_companion_start);
        assert_eq!(st.phase, CompanionPhase::StartPending);
        assert_eq!(st.last_activity_at, t0);
        assert_eq!(st.shutdown_deadline, t0 + Duration::from_secs(300));
        assert_eq!(
            presence.notifications(),
            vec![(MSG_START_TRIGGERED.to_string(), NotificationIcon::Default)]
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        coord.handle_signal(ActivitySignal::CompanionStarted).await;

        let st = coord.snapshot().await;
        assert!(!st.awaiting_companion_start);
        assert_eq!(st.phase, CompanionPhase::Active);
        assert_eq!(st.shutdown_deadline, t0 + Duration::from_secs(300));
        assert_eq!(presence.notifications().len(), 2);
        assert_eq!(
            presence.notifications()[1],
            (MSG_COMPANION_READY.to_string(), NotificationIcon::Quest)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_connection_is_ignored() {
        let (coord, _backend, presence) = setup("running");
        coord.handle_signal(ActivitySignal::CompanionStarted).await;
        coord.handle_signal(ActivitySignal::CompanionStarted).await;
        assert!(presence.notifications().is_empty());
        assert!(!coord.snapshot().await.awaiting_companion_start);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_while_running_only_moves_the_deadline() {
        let (coord, backend, presence) = setup("running");
        let t0 = Instant::now();
        tokio::time::advance(Duration::from_secs(42)).await;

        coord.handle_signal(presence_line()).await;

        assert_eq!(backend.starts(), 0);
        assert!(presence.notifications().is_empty());
        let st = coord.snapshot().await;
        assert!(!st.awaiting_companion_start);
        assert_eq!(st.shutdown_deadline, st.last_activity_at + Duration::from_secs(300));
        assert_eq!(st.last_activity_at, t0 + Duration::from_secs(42));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_companion_blocks_start() {
        let (coord, backend, presence) = setup("exited");
        backend.remove(COMPANION);

        coord.handle_signal(presence_line()).await;

        assert_eq!(backend.starts(), 0);
        assert!(presence.notifications().is_empty());
        assert!(!coord.snapshot().await.awaiting_companion_start);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_before_deadline_makes_no_api_calls() {
        let (coord, backend, presence) = setup("running");
        tokio::time::advance(Duration::from_secs(299)).await;

        assert_eq!(coord.idle_tick().await.unwrap(), TickOutcome::NotDue);
        assert_eq!(presence.fetches(), 0);
        assert_eq!(backend.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_companion_is_stopped_exactly_once() {
        let (coord, backend, presence) = setup("running");
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(coord.idle_tick().await.unwrap(), TickOutcome::Stopped);
        assert_eq!(backend.stops(), 1);
        assert_eq!(presence.fetches(), 1);
        assert_eq!(backend.state(COMPANION).as_deref(), Some("exited"));
        assert_eq!(coord.snapshot().await.phase, CompanionPhase::Idle);

        assert_eq!(
            coord.idle_tick().await.unwrap(),
            TickOutcome::NotRunning(ContainerStatus::Stopped)
        );
        assert_eq!(backend.stops(), 1);
        assert_eq!(presence.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn online_players_veto_the_stop() {
        let (coord, backend, presence) = setup("running");
        let t0 = Instant::now();
        presence.set_players(2);
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(coord.idle_tick().await.unwrap(), TickOutcome::Vetoed(2));
        assert_eq!(backend.stops(), 0);

        let st = coord.snapshot().await;
        assert_eq!(st.last_activity_at, t0 + Duration::from_secs(301));
        assert_eq!(st.shutdown_deadline, t0 + Duration::from_secs(601));
        assert_eq!(coord.idle_tick().await.unwrap(), TickOutcome::NotDue);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_companion_is_left_alone() {
        let (coord, backend, presence) = setup("exited");
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(
            coord.idle_tick().await.unwrap(),
            TickOutcome::NotRunning(ContainerStatus::Stopped)
        );
        assert_eq!(presence.fetches(), 0);
        assert_eq!(backend.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stop_surfaces_as_tick_error() {
        let (coord, backend, _presence) = setup("running");
        backend.fail_control_with(Some(BackendError::Transport("socket closed".into())));
        tokio::time::advance(Duration::from_secs(301)).await;

        let err = coord.idle_tick().await.unwrap_err();
        assert!(format_error_chain(&err).contains("failed to stop container fika-headless"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_server_aborts_startup() {
        let backend = Arc::new(FakeBackend::with_container(COMPANION, "exited"));
        let presence = Arc::new(FakePresence::default());
        let coord = Arc::new(LifecycleCoordinator::new(
            Config::default(),
            backend.clone(),
            presence.clone(),
        ));
        let t0 = Instant::now();

        let err = coord.run().await.unwrap_err();

        assert!(matches!(err, StartupError::PrimaryUnreachable { ref name, .. } if name == SERVER));
        assert!(Instant::now() >= t0 + Duration::from_secs(30));
        assert!(presence.pings() > 1);
        assert!(backend.subscriptions().is_empty());
        assert_eq!(backend.starts(), 0);
        assert_eq!(backend.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_waiting_for_server_exits_cleanly() {
        let backend = Arc::new(FakeBackend::with_container(COMPANION, "exited"));
        let presence = Arc::new(FakePresence::default());
        let coord = Arc::new(LifecycleCoordinator::new(
            Config::default(),
            backend.clone(),
            presence.clone(),
        ));
        let t0 = Instant::now();

        let shutdown = coord.shutdown_handle();
        let handle = tokio::spawn(coord.clone().run());
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();

        assert!(handle.await.unwrap().is_ok());
        assert!(Instant::now() < t0 + Duration::from_secs(30));
        assert!(presence.pings() >= 1);
        assert!(backend.subscriptions().is_empty());
        assert_eq!(backend.starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_backs_off_after_failed_stop_and_retries() {
        let (coord, backend, _presence) = setup("running");
        tokio::time::advance(Duration::from_secs(301)).await;
        backend.fail_control_with(Some(BackendError::Transport("socket closed".into())));

        let handle = tokio::spawn(coord.clone().idle_check_loop());

        // First tick at +5s fails, then the loop waits out the 10s back-off.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(backend.stop_attempts(), 1);
        assert_eq!(backend.stops(), 0);
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(backend.stop_attempts(), 1);

        backend.fail_control_with(None);
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(backend.stops(), 1);
        assert_eq!(backend.state(COMPANION).as_deref(), Some("exited"));
        assert!(!handle.is_finished());

        coord.shutdown_handle().cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn activity_during_stop_restarts_companion() {
        let (coord, backend, presence) = setup("running");
        backend.delay_stop_by(Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(301)).await;

        let ticking = coord.clone();
        let tick = tokio::spawn(async move { ticking.idle_tick().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        coord.handle_signal(presence_line()).await;

        assert_eq!(tick.await.unwrap().unwrap(), TickOutcome::Restarted);
        assert_eq!(backend.stops(), 1);
        assert_eq!(backend.starts(), 1);
        let st = coord.snapshot().await;
        assert!(st.awaiting_companion_start);
        assert_eq!(st.phase, CompanionPhase::StartPending);
        assert_eq!(
            presence.notifications(),
            vec![(MSG_START_TRIGGERED.to_string(), NotificationIcon::Default)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_follows_logs_and_drains_on_shutdown() {
        let (coord, backend, presence) = setup("exited");
        backend.push_script(LogScript {
            chunks: vec![
                Ok(b"[Info] GET /fika/presence/set 200\n".to_vec()),
                Ok(b"[Fika] headless_7 has connected\n".to_vec()),
            ],
            hold_open: true,
        });

        let shutdown = coord.shutdown_handle();
        let handle = tokio::spawn(coord.clone().run());

        for _ in 0..100 {
            if presence.notifications().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(presence.notifications().len(), 2);
        assert_eq!(backend.starts(), 1);
        assert_eq!(coord.snapshot().await.phase, CompanionPhase::Active);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert!(!coord.is_running());
        assert_eq!(backend.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn running_companion_at_startup_tracks_activity_from_now() {
        let (coord, _backend, _presence) = setup("running");
        let t0 = Instant::now();
        tokio::time::advance(Duration::from_secs(120)).await;

        let shutdown = coord.shutdown_handle();
        let handle = tokio::spawn(coord.clone().run());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let st = coord.snapshot().await;
        assert!(st.last_activity_at >= t0 + Duration::from_secs(120));
        assert_eq!(st.phase, CompanionPhase::Active);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn log_consumer_stops_when_server_container_is_gone() {
        let (coord, backend, _presence) = setup("exited");
        backend.remove(SERVER);

        tokio::time::timeout(Duration::from_secs(60), coord.clone().consume_signals())
            .await
            .unwrap();
        assert!(backend.subscriptions().is_empty());
        assert!(coord.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn log_consumer_reconnects_after_stream_end() {
        let (coord, backend, _presence) = setup("running");
        backend.push_script(LogScript {
            chunks: vec![Ok(b"/fika/update/ping\n".to_vec())],
            hold_open: false,
        });

        let handle = tokio::spawn(coord.clone().consume_signals());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.subscriptions().len(), 2);

        coord.shutdown_handle().cancel();
        handle.await.unwrap();
    }
}
