#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use subtrack_kernel_contracts::subscription::OwnerId;
use subtrack_kernel_contracts::ContractViolation;
use tracing::info;

pub const ANONYMOUS_PRINCIPAL_PREFIX: &str = "anon_";

type Listener = Arc<dyn Fn(Option<&OwnerId>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct AuthState {
    principal: Option<OwnerId>,
    initialized: bool,
    listeners: BTreeMap<ListenerId, Listener>,
    next_listener_id: u64,
}

/// Mints a fresh anonymous principal id: `anon_` + 16 random bytes, base64url.
pub fn mint_anonymous_principal() -> Result<OwnerId, ContractViolation> {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    OwnerId::new(format!(
        "{ANONYMOUS_PRINCIPAL_PREFIX}{}",
        URL_SAFE_NO_PAD.encode(bytes)
    ))
}

/// Identity context handed to the gateway's callers at construction time.
///
/// Clones share state. Listeners registered with
/// [`AuthContext::on_principal_changed`] run outside the internal lock, so a
/// listener may read the context again.
#[derive(Clone, Default)]
pub struct AuthContext {
    inner: Arc<Mutex<AuthState>>,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AuthContext")
            .field("principal", &state.principal)
            .field("initialized", &state.initialized)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(principal: OwnerId) -> Self {
        let ctx = Self::new();
        {
            let mut state = ctx.lock();
            state.principal = Some(principal);
            state.initialized = true;
        }
        ctx
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_principal(&self) -> Option<OwnerId> {
        self.lock().principal.clone()
    }

    /// False until the first sign-in or sign-out resolves the auth state.
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Registers a listener. When the state is already resolved the listener
    /// is invoked once immediately with the current principal.
    pub fn on_principal_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&OwnerId>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, current) = {
            let mut state = self.lock();
            let id = ListenerId(state.next_listener_id);
            state.next_listener_id = state.next_listener_id.saturating_add(1);
            state.listeners.insert(id, listener.clone());
            let current = state.initialized.then(|| state.principal.clone());
            (id, current)
        };
        if let Some(principal) = current {
            listener(principal.as_ref());
        }
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn sign_in(&self, principal: OwnerId) {
        self.set_principal(Some(principal));
    }

    /// Returns the current principal when already signed in; otherwise mints
    /// and signs in a new anonymous principal.
    pub fn sign_in_anonymously(&self) -> Result<OwnerId, ContractViolation> {
        if let Some(existing) = self.current_principal() {
            info!(principal = existing.as_str(), "already signed in");
            return Ok(existing);
        }
        let principal = mint_anonymous_principal()?;
        self.set_principal(Some(principal.clone()));
        info!(principal = principal.as_str(), "signed in anonymously");
        Ok(principal)
    }

    pub fn sign_out(&self) {
        self.set_principal(None);
        info!("signed out");
    }

    fn set_principal(&self, principal: Option<OwnerId>) {
        let listeners: Vec<Listener> = {
            let mut state = self.lock();
            state.principal = principal.clone();
            state.initialized = true;
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(principal.as_ref());
        }
    }
}
