//! Shutdown coordination.
//!
//! Signals advance a three-state machine. The first signal stops accepting
//! new work and arms the grace timer; the second signal (or the timer)
//! abandons in-flight work; any further signal force-exits the process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mksht_protocol::Scope;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, warn};

/// Default time allowed for in-flight requests after the first signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Exit code used when a signal arrives after draining was abandoned.
pub const FORCE_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Started,
    Stopping,
    Exiting,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Stopping => f.write_str("stopping"),
            Self::Exiting => f.write_str("exiting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEvent {
    Signal,
    GraceExpired,
}

/// Side effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    /// Arm the grace timer and stop accepting new work.
    BeginGrace,
    /// Disarm the grace timer and abandon in-flight work.
    AbandonInFlight,
    /// Terminate the process now.
    ForceExit,
    None,
}

impl ShutdownState {
    /// Transition table. States only ever move forward.
    pub fn next(self, event: ShutdownEvent) -> (Self, ShutdownAction) {
        use ShutdownEvent::*;
        match (self, event) {
            (Self::Started, Signal) => (Self::Stopping, ShutdownAction::BeginGrace),
            (Self::Stopping, Signal | GraceExpired) => {
                (Self::Exiting, ShutdownAction::AbandonInFlight)
            }
            (Self::Exiting, Signal) => (Self::Exiting, ShutdownAction::ForceExit),
            (state, GraceExpired) => (state, ShutdownAction::None),
        }
    }
}

type ForceExit = Arc<dyn Fn() + Send + Sync>;

/// Drives [`ShutdownState`] from a signal feed and exposes the two scopes
/// the server stops on.
pub struct ShutdownCoordinator {
    grace_period: Duration,
    accept: Scope,
    in_flight: Scope,
    state: watch::Sender<ShutdownState>,
    force_exit: ForceExit,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Started);
        Self {
            grace_period,
            accept: Scope::new(),
            in_flight: Scope::new(),
            state,
            force_exit: Arc::new(|| std::process::exit(FORCE_EXIT_CODE)),
        }
    }

    /// Replace the process exit performed on a signal in `Exiting`.
    pub fn with_force_exit(mut self, force_exit: impl Fn() + Send + Sync + 'static) -> Self {
        self.force_exit = Arc::new(force_exit);
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Ends on the first signal: stop accepting new work.
    pub fn accept_scope(&self) -> &Scope {
        &self.accept
    }

    /// Ends on the second signal or when the grace period runs out.
    pub fn in_flight_scope(&self) -> &Scope {
        &self.in_flight
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Consume the signal feed until a force exit is requested. If the feed
    /// closes, a running grace timer still fires.
    pub async fn run(&self, mut signals: mpsc::Receiver<()>) {
        let mut deadline: Option<Instant> = None;
        let mut feed_open = true;

        loop {
            let event = tokio::select! {
                signal = signals.recv(), if feed_open => match signal {
                    Some(()) => ShutdownEvent::Signal,
                    None => {
                        feed_open = false;
                        continue;
                    }
                },
                _ = sleep_until(deadline), if deadline.is_some() => ShutdownEvent::GraceExpired,
                else => std::future::pending().await,
            };

            let from = self.state();
            let (to, action) = from.next(event);
            self.state.send_replace(to);

            match action {
                ShutdownAction::BeginGrace => {
                    info!(
                        "Shutting down; waiting up to {:?} for in-flight requests",
                        self.grace_period
                    );
                    deadline = Some(Instant::now() + self.grace_period);
                    self.accept.cancel();
                }
                ShutdownAction::AbandonInFlight => {
                    match event {
                        ShutdownEvent::Signal => warn!("Second signal; abandoning in-flight requests"),
                        ShutdownEvent::GraceExpired => {
                            warn!("Grace period expired; abandoning in-flight requests")
                        }
                    }
                    deadline = None;
                    self.in_flight.cancel();
                }
                ShutdownAction::ForceExit => {
                    warn!("Signal received while {to}; forcing exit");
                    (self.force_exit)();
                    return;
                }
                ShutdownAction::None => {}
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forward Ctrl-C (and SIGTERM on unix) into a signal feed for
/// [`ShutdownCoordinator::run`].
pub fn signal_feed() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if let Err(e) = forward_signals(tx).await {
            warn!("Signal handling unavailable: {e}");
        }
    });
    rx
}

#[cfg(unix)]
async fn forward_signals(tx: mpsc::Sender<()>) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    // Signals delivered while a send is pending stay queued on the streams.
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        if tx.send(()).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(tx: mpsc::Sender<()>) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        if tx.send(()).await.is_err() {
            return Ok(());
        }
    }
}
