//! Session identity hydration.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──hydrate()──▶ InFlight ──ok──▶ Hydrated
//!                                 │
//!                                 ├──401──▶ logged out (token and profile cleared)
//!                                 │
//!                                 └──error, retry once, error──▶ Exhausted
//! ```
//!
//! However many callers ask for the profile at once, one request goes out
//! (through the injected [`RequestCoordinator`]) and everyone gets its
//! result. Once `Hydrated` or `Exhausted`, `hydrate()` answers from memory;
//! only `login`, `set_token`, or an explicit `refresh` fetch again.

pub mod coordinator;

pub use coordinator::RequestCoordinator;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use cartwheel_core::Email;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::commerce::{CommerceApi, CommerceError, Customer};
use crate::error::{SyncError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::storage::{ClientStorage, keys, load_json, store_json};

/// Coordinator type used for profile fetches.
pub type ProfileCoordinator = RequestCoordinator<Customer, SyncError>;

/// Where the guard is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    /// No fetch has been attempted for the current token.
    #[default]
    Uninitialized,
    /// A profile fetch is running.
    InFlight,
    /// The profile was fetched for the current token.
    Hydrated,
    /// The fetch and its retry both failed; no further automatic attempts.
    Exhausted,
}

/// The authenticated user as seen by the UI.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    /// Customer profile, once loaded.
    pub customer: Option<Customer>,
    /// Whether a session token is stored. Distinguishes "not yet hydrated"
    /// (`true`, no customer) from "logged out" (`false`).
    pub token_present: bool,
    /// Guard state.
    pub state: GuardState,
}

impl SessionIdentity {
    /// Logged in with a loaded profile.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token_present && self.customer.is_some()
    }

    /// Token stored but no profile could be loaded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.token_present
            && self.customer.is_none()
            && matches!(self.state, GuardState::Exhausted)
    }
}

/// Single-flight guard over the "who am I" request.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<SessionGuardInner>,
}

struct SessionGuardInner {
    api: Arc<dyn CommerceApi>,
    storage: Arc<dyn ClientStorage>,
    coordinator: Arc<ProfileCoordinator>,
    identity: watch::Sender<SessionIdentity>,
    retry_delay: Duration,
    /// Bumped whenever the token changes so late results from an older
    /// token are dropped.
    epoch: AtomicU64,
}

impl SessionGuard {
    /// Create a guard, restoring any stored token and cached profile.
    ///
    /// A cached profile is shown immediately but still revalidated by the
    /// first `hydrate()`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be read.
    pub fn new(
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
        coordinator: Arc<ProfileCoordinator>,
        retry_delay: Duration,
    ) -> Result<Self, SyncError> {
        let token_present = storage.get(keys::AUTH_TOKEN)?.is_some();
        let customer = if token_present {
            load_json::<Customer>(storage.as_ref(), keys::AUTH_PROFILE)?
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(SessionGuardInner {
                api,
                storage,
                coordinator,
                identity: watch::Sender::new(SessionIdentity {
                    customer,
                    token_present,
                    state: GuardState::Uninitialized,
                }),
                retry_delay,
                epoch: AtomicU64::new(0),
            }),
        })
    }

    /// Current identity.
    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        self.inner.identity.borrow().clone()
    }

    /// Current guard state.
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.inner.identity.borrow().state
    }

    /// Subscribe to identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionIdentity> {
        self.inner.identity.subscribe()
    }

    /// The stored session token.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if storage cannot be read.
    pub fn token(&self) -> Result<Option<String>, SyncError> {
        Ok(self.inner.storage.get(keys::AUTH_TOKEN)?)
    }

    /// Load the profile for the stored token, at most once.
    ///
    /// Safe to call from every component that needs the user: concurrent
    /// calls share one request and later calls answer from memory.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when this call (or the flight it joined)
    /// fails; a 401 also logs the session out.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<SessionIdentity, SyncError> {
        let Some(token) = self.token()? else {
            self.inner.identity.send_if_modified(|identity| {
                if identity.token_present || identity.customer.is_some() {
                    *identity = SessionIdentity::default();
                    true
                } else {
                    false
                }
            });
            return Ok(self.identity());
        };

        match self.state() {
            GuardState::Hydrated | GuardState::Exhausted => return Ok(self.identity()),
            GuardState::Uninitialized | GuardState::InFlight => {}
        }

        self.fetch(token).await?;
        Ok(self.identity())
    }

    /// Force a fresh profile fetch (e.g., after the profile was edited).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a token, otherwise the
    /// fetch error.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Customer, SyncError> {
        let token = self.token()?.ok_or(SyncError::NotAuthenticated)?;
        self.fetch(token).await
    }

    /// Exchange credentials for a token and hydrate the profile.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidEmail` before any request if the email is
    /// malformed, otherwise the login or hydration error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionIdentity, SyncError> {
        let email = Email::parse(email)?;
        let token = self.inner.api.login(email.as_str(), password).await?;
        add_breadcrumb("auth", "Logged in", None);
        self.set_token(&token)?;
        self.hydrate().await
    }

    /// Store a session token obtained elsewhere and re-arm the guard.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the token cannot be stored.
    pub fn set_token(&self, token: &str) -> Result<(), SyncError> {
        self.inner.storage.set(keys::AUTH_TOKEN, token)?;
        self.inner.storage.remove(keys::AUTH_PROFILE)?;
        self.inner.reset(SessionIdentity {
            customer: None,
            token_present: true,
            state: GuardState::Uninitialized,
        });
        Ok(())
    }

    /// Forget the token and profile.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be removed.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<(), SyncError> {
        self.inner.clear_auth()?;
        add_breadcrumb("auth", "Logged out", None);
        info!("Session cleared");
        Ok(())
    }

    /// Drop the session after another request was answered with a 401.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be removed.
    pub(crate) fn expire(&self) -> Result<(), SyncError> {
        warn!("Session token rejected, logging out");
        self.inner.clear_auth()
    }

    async fn fetch(&self, token: String) -> Result<Customer, SyncError> {
        let inner = Arc::clone(&self.inner);
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let key = profile_key(epoch);
        self.inner
            .coordinator
            .run(&key, move || inner.fetch_profile(token, epoch))
            .await
    }
}

fn profile_key(epoch: u64) -> String {
    format!("customer:me:{epoch}")
}

impl SessionGuardInner {
    /// The flight body: first attempt plus one retry after `retry_delay`.
    async fn fetch_profile(self: Arc<Self>, token: String, epoch: u64) -> Result<Customer, SyncError> {
        self.update(epoch, |identity| identity.state = GuardState::InFlight);

        let backoff = ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(1)
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.api.current_customer(&token).await {
                Ok(customer) => {
                    self.hydrated(epoch, &customer)?;
                    return Ok(customer);
                }
                Err(CommerceError::Unauthorized) => {
                    warn!("Session token rejected, logging out");
                    if self.epoch.load(Ordering::SeqCst) == epoch {
                        self.clear_auth()?;
                    }
                    return Err(CommerceError::Unauthorized.into());
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Profile fetch failed");
                    last_error = Some(e);
                }
            }
        }

        error!("Profile fetch retry exhausted");
        self.update(epoch, |identity| identity.state = GuardState::Exhausted);
        Err(last_error
            .unwrap_or_else(|| CommerceError::Http("profile fetch not attempted".to_string()))
            .into())
    }

    fn hydrated(&self, epoch: u64, customer: &Customer) -> Result<(), SyncError> {
        let applied = self.update(epoch, |identity| {
            identity.customer = Some(customer.clone());
            identity.token_present = true;
            identity.state = GuardState::Hydrated;
        });
        if applied {
            store_json(self.storage.as_ref(), keys::AUTH_PROFILE, customer)?;
            set_sentry_user(&customer.id, customer.email.as_deref());
            debug!(customer_id = %customer.id, "Session hydrated");
        }
        Ok(())
    }

    /// Modify the identity only if no token change happened since `epoch`.
    fn update(&self, epoch: u64, modify: impl FnOnce(&mut SessionIdentity)) -> bool {
        self.identity.send_if_modified(|identity| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            modify(identity);
            true
        })
    }

    /// Replace the identity and invalidate running flights.
    ///
    /// Orders cached under the previous identity are dropped too.
    fn reset(&self, identity: SessionIdentity) {
        let mut previous = 0;
        self.identity.send_modify(|current| {
            previous = self.epoch.fetch_add(1, Ordering::SeqCst);
            *current = identity;
        });
        self.coordinator.forget(&profile_key(previous));
        self.api.forget_cached_orders();
    }

    fn clear_auth(&self) -> Result<(), SyncError> {
        self.storage.remove(keys::AUTH_TOKEN)?;
        self.storage.remove(keys::AUTH_PROFILE)?;
        self.reset(SessionIdentity::default());
        clear_sentry_user();
        Ok(())
    }
}
