//! Proactive token refresh
//!
//! One [`RefreshScheduler`] owns at most one pending timer. Each arm or cancel
//! bumps a generation counter; a firing whose generation is no longer current
//! discards its result, so a cancel that races an in-flight refresh wins.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::session::SessionView;
use crate::auth::tokens::now_ms;

/// Refresh this long before the access token expires
pub const REFRESH_LEAD_MS: i64 = 60_000;

/// Lower bound between consecutive renewals
pub const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The BFF answered 401
    #[error("unauthorized")]
    Unauthorized,
    #[error("transient failure: {0}")]
    Transient(String),
}

/// Transport the scheduler drives; implemented over HTTP by `BffClient`
pub trait SessionApi: Send + Sync + 'static {
    /// Trade the refresh cookie for new tokens; yields the new `expiresAt`
    fn refresh(&self) -> impl Future<Output = Result<i64, RefreshError>> + Send;
    fn session(&self) -> impl Future<Output = Result<SessionView, RefreshError>> + Send;
    /// Yields the provider logout URL to navigate to
    fn logout(&self) -> impl Future<Output = Result<String, RefreshError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The refresh token was refused; only a new login can recover
    ReauthRequired,
    /// There was never a refresh token; local state was dropped
    SessionCleared,
    /// Anything else; the next session load re-evaluates
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { delay: Duration },
    Firing,
    Renewed { expires_at: i64 },
    Failed(RefreshFailure),
}

/// `max(0, expires_at - now - 60s)`
pub fn refresh_delay(expires_at_ms: i64, now_ms: i64) -> Duration {
    let delay_ms = expires_at_ms
        .saturating_sub(now_ms)
        .saturating_sub(REFRESH_LEAD_MS)
        .max(0);
    Duration::from_millis(delay_ms as u64)
}

#[derive(Default)]
struct Slot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
    has_refresh_token: bool,
}

struct Inner<A> {
    api: A,
    slot: Mutex<Slot>,
    state: watch::Sender<SchedulerState>,
    session: watch::Sender<Option<SessionView>>,
}

impl<A: SessionApi> Inner<A> {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the generation owning the new timer
    fn arm(self: &Arc<Self>, delay: Duration) -> u64 {
        let mut slot = self.slot();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }

        let inner = Arc::clone(self);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_fire(generation).await;
        }));
        drop(slot);

        tracing::debug!(delay_ms = delay.as_millis() as u64, "Refresh timer armed");
        self.state.send_replace(SchedulerState::Armed { delay });
        generation
    }

    fn cancel(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        drop(slot);
        self.state.send_replace(SchedulerState::Idle);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.slot().generation == generation
    }

    async fn on_fire(self: Arc<Self>, generation: u64) {
        let has_refresh_token = {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            // Detach our own handle so a re-arm below doesn't abort this task
            slot.timer = None;
            slot.has_refresh_token
        };
        self.state.send_replace(SchedulerState::Firing);

        let result = self.api.refresh().await;
        if !self.is_current(generation) {
            tracing::debug!("Discarding refresh result of a cancelled timer");
            return;
        }

        match result {
            Ok(expires_at) => {
                tracing::info!(expires_at = expires_at, "Session renewed");
                self.state
                    .send_replace(SchedulerState::Renewed { expires_at });
                let delay = refresh_delay(expires_at, now_ms()).max(MIN_RENEWAL_INTERVAL);
                let rearmed = self.arm(delay);

                match self.api.session().await {
                    Ok(_) if !self.is_current(rearmed) => {
                        tracing::debug!("Discarding session re-fetch of a cancelled timer");
                    }
                    Ok(view) => {
                        self.session.send_replace(Some(view));
                    }
                    Err(e) => tracing::warn!(error = %e, "Session re-fetch after renewal failed"),
                }
            }
            Err(RefreshError::Unauthorized) => {
                let failure = if has_refresh_token {
                    RefreshFailure::ReauthRequired
                } else {
                    RefreshFailure::SessionCleared
                };
                tracing::warn!(failure = ?failure, "Refresh refused");
                self.session.send_replace(None);
                self.state.send_replace(SchedulerState::Failed(failure));
            }
            Err(RefreshError::Transient(reason)) => {
                // Not re-armed; the next session load decides again
                tracing::warn!(reason = %reason, "Refresh failed transiently");
                self.state
                    .send_replace(SchedulerState::Failed(RefreshFailure::Transient));
            }
        }
    }
}

/// Client-side refresh timer bound to one session
pub struct RefreshScheduler<A: SessionApi> {
    inner: Arc<Inner<A>>,
}

impl<A: SessionApi> RefreshScheduler<A> {
    pub fn new(api: A) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                api,
                slot: Mutex::new(Slot::default()),
                state,
                session,
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state.subscribe()
    }

    /// Latest session view; `None` after a refused refresh or logout
    pub fn subscribe_session(&self) -> watch::Receiver<Option<SessionView>> {
        self.inner.session.subscribe()
    }

    /// Replace any pending timer with one firing after `delay`
    pub fn arm(&self, delay: Duration) {
        self.inner.arm(delay);
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Take a freshly loaded session view and schedule accordingly
    pub fn load(&self, view: SessionView) {
        self.inner.slot().has_refresh_token = view.has_refresh_token;

        let delay = if !view.has_refresh_token {
            None
        } else if view.needs_refresh {
            Some(Duration::ZERO)
        } else {
            view.expires_at
                .map(|expires_at| refresh_delay(expires_at, now_ms()))
        };

        self.inner
            .session
            .send_replace(view.is_authenticated.then_some(view));

        match delay {
            Some(delay) => self.arm(delay),
            None => self.cancel(),
        }
    }

    /// Fetch the session from the BFF and [`load`](Self::load) it
    pub async fn load_from_api(&self) -> Result<(), RefreshError> {
        let view = self.inner.api.session().await?;
        self.load(view);
        Ok(())
    }

    /// Stop the timer, then end the session at the BFF
    pub async fn logout(&self) -> Result<String, RefreshError> {
        self.cancel();
        self.inner.session.send_replace(None);
        self.inner.api.logout().await
    }
}

impl<A: SessionApi> Drop for RefreshScheduler<A> {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.slot().timer.take() {
            timer.abort();
        }
    }
}
