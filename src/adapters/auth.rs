//! Local account sign-in
//!
//! Keeps the signed-in account in the settings file and publishes the auth
//! state through a watch channel.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::settings_store::SettingsStore;
use crate::backup::{AuthProvider, AuthState, Identity};
use crate::error::{BudgetError, BudgetResult};

pub struct LocalAuth {
    store: Arc<SettingsStore>,
    tx: watch::Sender<AuthState>,
}

impl LocalAuth {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        let state = match store.snapshot().cloud_backup.account {
            Some(identity) => AuthState::Authenticated(identity),
            None => AuthState::NotAuthenticated,
        };
        let (tx, _rx) = watch::channel(state);
        Self { store, tx }
    }

    /// Sign in as `identity`, replacing any current account
    pub fn login(&self, identity: Identity) -> BudgetResult<()> {
        if !is_path_safe_id(&identity.id) {
            return Err(BudgetError::Config(format!(
                "Invalid account id '{}'",
                identity.id
            )));
        }

        self.tx.send_replace(AuthState::Authenticating);
        let stored = identity.clone();
        if let Err(e) = self.store.update(|s| s.cloud_backup.account = Some(stored)) {
            self.tx.send_replace(AuthState::NotAuthenticated);
            return Err(e);
        }

        info!(user = %identity.id, "signed in");
        self.tx.send_replace(AuthState::Authenticated(identity));
        Ok(())
    }
}

/// The id becomes one segment of the remote backup path
fn is_path_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

impl AuthProvider for LocalAuth {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    fn logout(&self) -> BudgetResult<()> {
        self.store.update(|s| s.cloud_backup.account = None)?;
        self.tx.send_replace(AuthState::NotAuthenticated);
        info!("signed out");
        Ok(())
    }
}
