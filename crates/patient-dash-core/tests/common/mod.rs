//! In-memory stand-ins for the auth and record services.

#![allow(dead_code)]

pub mod server;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use patient_dash_core::db::Database;
use patient_dash_core::models::{
    Credential, LoginRequest, LoginResponse, PatientDraft, PatientId, RemotePatient, Role,
};
use patient_dash_core::remote::{AuthApi, RecordApi, RemoteError, RemoteResult};
use patient_dash_core::{RecordStore, SessionManager};

pub const PASSWORD: &str = "password123";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

pub fn remote(id: &str, name: &str, dob: &str, registered: &str) -> RemotePatient {
    RemotePatient {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@x.com", id),
        address: "1 Main St, City".to_string(),
        date_of_birth: dob.to_string(),
        registered_date: registered.to_string(),
    }
}

pub fn jane() -> PatientDraft {
    PatientDraft::new("Jane Doe", "jane@x.com", "1 Main St, City", "1990-01-01")
}

/// Auth service accepting [`PASSWORD`] for any email.
#[derive(Default)]
pub struct FakeAuth {
    issued: AtomicUsize,
    valid: Mutex<HashSet<String>>,
    pub validate_calls: AtomicUsize,
}

impl FakeAuth {
    /// Mark `token` as accepted by `validate_token`.
    pub fn accept(&self, token: &str) {
        self.valid.lock().unwrap().insert(token.to_string());
    }

    pub fn revoke(&self, token: &str) {
        self.valid.lock().unwrap().remove(token);
    }
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn login(&self, request: &LoginRequest) -> RemoteResult<LoginResponse> {
        if request.password != PASSWORD {
            return Err(RemoteError::Unauthorized { status: 401 });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{}", n);
        self.accept(&token);
        Ok(LoginResponse {
            token: Credential::new(token),
        })
    }

    async fn validate_token(&self, credential: &Credential) -> RemoteResult<()> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.valid.lock().unwrap().contains(credential.as_str()) {
            Ok(())
        } else {
            Err(RemoteError::Unauthorized { status: 401 })
        }
    }
}

/// Record service keeping rows in a vector.
#[derive(Default)]
pub struct FakeRecords {
    pub rows: Mutex<Vec<RemotePatient>>,
    next_id: AtomicUsize,
    fail_next: Mutex<Option<RemoteError>>,
    /// When set, update and delete wait for a notification before answering.
    gate: Mutex<Option<Arc<Notify>>>,
    held: AtomicUsize,
    pub calls: AtomicUsize,
    pub seen_credentials: Mutex<Vec<String>>,
}

impl FakeRecords {
    pub fn with_rows(rows: Vec<RemotePatient>) -> Self {
        let fake = Self::default();
        *fake.rows.lock().unwrap() = rows;
        fake
    }

    /// The next call fails with `error` instead of touching the rows.
    pub fn fail_next(&self, error: RemoteError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Hold update and delete until the returned handle is notified.
    ///
    /// Release every held call with `notify_waiters` once [`FakeRecords::held_calls`]
    /// reaches the expected count.
    pub fn hold_mutations(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Calls that have reached the gate and are waiting on it.
    pub fn held_calls(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, credential: &Credential) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_credentials
            .lock()
            .unwrap()
            .push(credential.as_str().to_string());
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(notify) = gate {
            let notified = notify.notified();
            tokio::pin!(notified);
            // Registered before counting, so `notify_waiters` after the count never misses it.
            notified.as_mut().enable();
            self.held.fetch_add(1, Ordering::SeqCst);
            notified.await;
            self.held.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn from_draft(id: String, draft: &PatientDraft, registered: &str) -> RemotePatient {
        RemotePatient {
            id,
            name: draft.name.clone(),
            email: draft.email.clone(),
            address: draft.address.clone(),
            date_of_birth: draft.date_of_birth.clone(),
            registered_date: registered.to_string(),
        }
    }
}

#[async_trait]
impl RecordApi for FakeRecords {
    async fn list(&self, credential: &Credential) -> RemoteResult<Vec<RemotePatient>> {
        self.enter(credential)?;
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn create(
        &self,
        credential: &Credential,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient> {
        self.enter(credential)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Self::from_draft(format!("p{}", n), draft, "2024-03-01");
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        credential: &Credential,
        id: &PatientId,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient> {
        self.enter(credential)?;
        self.wait_gate().await;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id.as_str())
            .ok_or(RemoteError::NotFound)?;
        let registered = row.registered_date.clone();
        *row = Self::from_draft(id.to_string(), draft, &registered);
        Ok(row.clone())
    }

    async fn delete(&self, credential: &Credential, id: &PatientId) -> RemoteResult<()> {
        self.enter(credential)?;
        self.wait_gate().await;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id.as_str());
        if rows.len() == before {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }
}

/// Session manager and store wired to the fakes, sharing one in-memory database.
pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub records: Arc<FakeRecords>,
    pub db: Arc<Mutex<Database>>,
    pub session: Arc<SessionManager>,
    pub store: RecordStore,
}

impl Harness {
    pub fn new(records: FakeRecords) -> Self {
        Self::with_db(records, Database::open_in_memory().unwrap())
    }

    pub fn with_db(records: FakeRecords, db: Database) -> Self {
        let auth = Arc::new(FakeAuth::default());
        let records = Arc::new(records);
        let db = Arc::new(Mutex::new(db));
        let session = Arc::new(SessionManager::new(auth.clone(), db.clone(), Role::Admin));
        let store = RecordStore::new(records.clone(), session.clone()).with_today(today);
        Self {
            auth,
            records,
            db,
            session,
            store,
        }
    }

    pub async fn signed_in(records: FakeRecords) -> Self {
        let harness = Self::new(records);
        assert!(harness.session.login("admin@clinic.org", PASSWORD).await);
        harness
    }

    pub fn has_persisted_session(&self) -> bool {
        self.db.lock().unwrap().has_session_keys().unwrap()
    }
}
