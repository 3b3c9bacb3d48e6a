//! Session lifecycle: restore, login, logout and remote invalidation.
//!
//! The manager is the only owner of the credential. Other components get
//! read access through [`SessionGate`], handed to them at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::db::{Database, DbResult};
use crate::models::{Credential, Identity, LoginRequest, Role, Session};
use crate::remote::AuthApi;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// Explicit logout.
    Logout,
    /// The persisted credential failed revalidation at startup.
    RevalidationFailed,
    /// A remote service refused the credential mid-session.
    Rejected,
}

/// Session transitions, for the presentation layer (e.g. navigate to login on sign-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Identity),
    SignedOut { reason: SignOutReason },
}

/// A credential together with the generation of the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLease {
    pub credential: Credential,
    pub generation: u64,
}

/// Read access to the active credential, plus a way to report its rejection.
///
/// The generation changes every time a session starts or ends, so a holder
/// of a lease can tell whether the session it was issued under is still the
/// active one.
pub trait SessionGate: Send + Sync {
    /// Current credential and generation, `None` when signed out.
    fn lease(&self) -> Option<SessionLease>;

    fn generation(&self) -> u64;

    /// Current credential, `None` when signed out.
    fn credential(&self) -> Option<Credential> {
        self.lease().map(|lease| lease.credential)
    }

    /// A remote service refused `rejected`. Ends the session if it is still the active one.
    fn invalidate(&self, rejected: &Credential);
}

/// Owns the authenticated session and its persisted copy.
pub struct SessionManager {
    auth: Arc<dyn AuthApi>,
    db: Arc<Mutex<Database>>,
    default_role: Role,
    current: RwLock<Current>,
    loading: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Default)]
struct Current {
    session: Option<Session>,
    generation: u64,
}

/// Clears the loading flag even if `restore` is dropped mid-flight.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthApi>, db: Arc<Mutex<Database>>, default_role: Role) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            auth,
            db,
            default_role,
            current: RwLock::new(Current::default()),
            loading: AtomicBool::new(false),
            events,
        }
    }

    /// Reactivate a persisted session if the auth service still accepts it.
    ///
    /// Never fails: any error leaves the session inactive and the persisted
    /// pair removed. Returns whether a session is now active. A session
    /// that is already active is kept as is, without a remote call.
    pub async fn restore(&self) -> bool {
        if self.is_active() {
            debug!("Session already active, nothing to restore");
            return true;
        }

        self.loading.store(true, Ordering::SeqCst);
        let _guard = LoadingGuard(&self.loading);

        let persisted = match self.with_db(|db| db.load_session()) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Could not read persisted session");
                None
            }
        };

        let Some(session) = persisted else {
            // Drops a lone key left behind by an interrupted write.
            self.clear_persisted();
            debug!("No persisted session");
            return false;
        };

        match self.auth.validate_token(&session.credential).await {
            Ok(()) => {
                info!(user = %session.identity.id, "Restored persisted session");
                let identity = session.identity.clone();
                self.start(session);
                self.emit(SessionEvent::SignedIn(identity));
                true
            }
            Err(e) => {
                info!(error = %e, "Persisted session failed revalidation");
                self.clear_persisted();
                self.take_current();
                self.emit(SessionEvent::SignedOut {
                    reason: SignOutReason::RevalidationFailed,
                });
                false
            }
        }
    }

    /// Exchange email and password for a credential and activate the session.
    ///
    /// Returns `false` on any failure, leaving the session and persisted state untouched.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let email = email.trim();
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = match self.auth.login(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return false;
            }
        };

        // The login call returns only a token; the rest of the identity is derived.
        let session = Session {
            credential: response.token,
            identity: Identity {
                id: email.to_lowercase(),
                email: email.to_string(),
                role: self.default_role,
            },
        };

        if let Err(e) = self.with_db(|db| db.save_session(&session)) {
            warn!(error = %e, "Could not persist session, login aborted");
            return false;
        }

        info!(user = %session.identity.id, "Signed in");
        let identity = session.identity.clone();
        self.start(session);
        self.emit(SessionEvent::SignedIn(identity));
        true
    }

    /// Clear the persisted pair, deactivate, and announce the sign-out.
    pub fn logout(&self) {
        self.end_session(SignOutReason::Logout);
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read_current(|s| s.identity.clone())
    }

    pub fn is_active(&self) -> bool {
        self.read_current(|_| ()).is_some()
    }

    /// True only while [`SessionManager::restore`] is running.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn end_session(&self, reason: SignOutReason) {
        self.clear_persisted();
        let had_session = self.take_current().is_some();
        self.announce_sign_out(had_session, reason);
    }

    fn announce_sign_out(&self, had_session: bool, reason: SignOutReason) {
        if had_session || reason == SignOutReason::Logout {
            info!(?reason, "Signed out");
            self.emit(SessionEvent::SignedOut { reason });
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&mut Database) -> DbResult<T>) -> DbResult<T> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *db)
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.with_db(|db| db.clear_session()) {
            warn!(error = %e, "Could not clear persisted session");
        }
    }

    fn read_current<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.session.as_ref().map(f)
    }

    /// Activate `session`, replacing any previous one under a new generation.
    fn start(&self, session: Session) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.session = Some(session);
        current.generation += 1;
    }

    fn take_current(&self) -> Option<Session> {
        self.take_current_if(|_| true)
    }

    /// Deactivate the session if `matches` holds for it, checked under the same lock.
    fn take_current_if(&self, matches: impl FnOnce(&Session) -> bool) -> Option<Session> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !current.session.as_ref().is_some_and(matches) {
            return None;
        }
        current.generation += 1;
        current.session.take()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl SessionGate for SessionManager {
    fn lease(&self) -> Option<SessionLease> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.session.as_ref().map(|s| SessionLease {
            credential: s.credential.clone(),
            generation: current.generation,
        })
    }

    fn generation(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    fn invalidate(&self, rejected: &Credential) {
        if self.take_current_if(|s| &s.credential == rejected).is_some() {
            warn!("Active credential rejected by remote service");
            self.clear_persisted();
            self.announce_sign_out(true, SignOutReason::Rejected);
        }
    }
}
