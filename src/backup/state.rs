//! UI-facing cloud backup status
//!
//! The status is a pure function of five inputs. `SyncStateMonitor` gathers
//! those inputs from the collaborators, recomputes whenever the auth state
//! or the in-flight operation changes and on a fixed tick, and publishes the
//! result.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::collaborators::{AuthState, Identity, RemoteBackupDescriptor};
use super::operation::OperationKind;
use super::transfer::BackupTransferService;

/// Everything the status depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncInputs {
    pub auth: AuthState,
    pub entitled: bool,
    pub remote_descriptor: Option<RemoteBackupDescriptor>,
    pub last_backup_date: Option<DateTime<Utc>>,
    pub operation: Option<OperationKind>,
}

/// Cloud backup status shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudBackupState {
    NotAuthenticated,
    Authenticating,
    NotActivated {
        user: Identity,
    },
    Activated {
        user: Identity,
        last_backup_date: Option<DateTime<Utc>>,
        backup_now_available: bool,
        restore_available: bool,
        delete_available: bool,
    },
    BackupInProgress {
        user: Identity,
    },
    RestorationInProgress {
        user: Identity,
    },
    DeletionInProgress {
        user: Identity,
    },
}

impl CloudBackupState {
    pub fn user(&self) -> Option<&Identity> {
        match self {
            Self::NotAuthenticated | Self::Authenticating => None,
            Self::NotActivated { user }
            | Self::Activated { user, .. }
            | Self::BackupInProgress { user }
            | Self::RestorationInProgress { user }
            | Self::DeletionInProgress { user } => Some(user),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::BackupInProgress { .. }
                | Self::RestorationInProgress { .. }
                | Self::DeletionInProgress { .. }
        )
    }
}

impl fmt::Display for CloudBackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "Not signed in"),
            Self::Authenticating => write!(f, "Signing in..."),
            Self::NotActivated { user } => {
                write!(f, "Signed in as {}, cloud backup not available", user.email)
            }
            Self::Activated {
                user,
                last_backup_date,
                ..
            } => match last_backup_date {
                Some(date) => write!(
                    f,
                    "Signed in as {}, last backup {}",
                    user.email,
                    date.format("%Y-%m-%d %H:%M UTC")
                ),
                None => write!(f, "Signed in as {}, no backup yet", user.email),
            },
            Self::BackupInProgress { .. } => write!(f, "Backup in progress"),
            Self::RestorationInProgress { .. } => write!(f, "Restore in progress"),
            Self::DeletionInProgress { .. } => write!(f, "Deletion in progress"),
        }
    }
}

/// Derive the status from its inputs
pub fn derive_state(inputs: &SyncInputs) -> CloudBackupState {
    let user = match &inputs.auth {
        AuthState::NotAuthenticated => return CloudBackupState::NotAuthenticated,
        AuthState::Authenticating => return CloudBackupState::Authenticating,
        AuthState::Authenticated(identity) => identity.clone(),
    };

    if !inputs.entitled {
        return CloudBackupState::NotActivated { user };
    }

    match inputs.operation {
        Some(OperationKind::Backup) => CloudBackupState::BackupInProgress { user },
        Some(OperationKind::Restore) => CloudBackupState::RestorationInProgress { user },
        Some(OperationKind::Delete) => CloudBackupState::DeletionInProgress { user },
        None => {
            let has_backup = inputs.remote_descriptor.is_some();
            CloudBackupState::Activated {
                user,
                last_backup_date: inputs.last_backup_date,
                backup_now_available: true,
                restore_available: has_backup,
                delete_available: has_backup,
            }
        }
    }
}

/// How often `SyncStateMonitor::run` re-reads the inputs without a signal
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Publishes the derived status of one transfer service
pub struct SyncStateMonitor {
    service: Arc<BackupTransferService>,
    tx: watch::Sender<CloudBackupState>,
    refresh_interval: Duration,
}

impl SyncStateMonitor {
    pub fn new(service: Arc<BackupTransferService>) -> Self {
        let (tx, _rx) = watch::channel(CloudBackupState::NotAuthenticated);
        Self {
            service,
            tx,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Entitlement and the remote backup have no change signal; they are
    /// picked up on this tick
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<CloudBackupState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> CloudBackupState {
        self.tx.borrow().clone()
    }

    /// Read every input from the collaborators
    ///
    /// Remote state is only queried for an entitled, idle user; a failed
    /// query counts as no remote backup.
    pub async fn gather_inputs(&self) -> SyncInputs {
        let context = self.service.context();
        let auth = context.auth.current();
        let operation = self.service.operation_flag().current();

        let Some(user_id) = auth.identity().map(|identity| identity.id.clone()) else {
            return SyncInputs {
                auth,
                operation,
                ..SyncInputs::default()
            };
        };

        let entitled = context.entitlement.is_entitled().await;
        let last_backup_date = context.settings.last_backup_date(&user_id).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read last backup date");
            None
        });

        let remote_descriptor = if entitled && operation.is_none() {
            match self.service.query_remote_backup_descriptor().await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(error = %e, "failed to query remote backup");
                    None
                }
            }
        } else {
            None
        };

        SyncInputs {
            auth,
            entitled,
            remote_descriptor,
            last_backup_date,
            operation,
        }
    }

    /// Recompute and publish the status
    pub async fn refresh(&self) -> CloudBackupState {
        let state = derive_state(&self.gather_inputs().await);
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(state = %state, "cloud backup state changed");
            *current = state.clone();
            true
        });
        state
    }

    /// Recompute on every auth or operation change, and on every refresh
    /// tick, until either signal source closes
    pub async fn run(&self) {
        let mut auth = self.service.context().auth.subscribe();
        let mut operation = self.service.operation_flag().subscribe();
        let mut ticker = interval_at(
            Instant::now() + self.refresh_interval,
            self.refresh_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.refresh().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = operation.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            self.refresh().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestEnv;

    fn user() -> Identity {
        Identity::new("U1", "u1@example.com")
    }

    fn signed_in(entitled: bool) -> SyncInputs {
        SyncInputs {
            auth: AuthState::Authenticated(user()),
            entitled,
            ..SyncInputs::default()
        }
    }

    fn descriptor() -> RemoteBackupDescriptor {
        RemoteBackupDescriptor {
            path: "user/U1/backup.zip".into(),
            last_modified: Utc::now(),
            size: 42,
        }
    }

    #[test]
    fn test_unauthenticated_ignores_other_inputs() {
        let inputs = SyncInputs {
            auth: AuthState::NotAuthenticated,
            entitled: true,
            remote_descriptor: Some(descriptor()),
            last_backup_date: Some(Utc::now()),
            operation: Some(OperationKind::Backup),
        };
        assert_eq!(derive_state(&inputs), CloudBackupState::NotAuthenticated);
    }

    #[test]
    fn test_authenticating() {
        let inputs = SyncInputs {
            auth: AuthState::Authenticating,
            ..SyncInputs::default()
        };
        assert_eq!(derive_state(&inputs), CloudBackupState::Authenticating);
    }

    #[test]
    fn test_not_entitled_is_not_activated() {
        let mut inputs = signed_in(false);
        inputs.remote_descriptor = Some(descriptor());
        inputs.operation = Some(OperationKind::Restore);

        assert_eq!(
            derive_state(&inputs),
            CloudBackupState::NotActivated { user: user() }
        );
    }

    #[test]
    fn test_activated_without_remote_backup() {
        let date = Utc::now();
        let mut inputs = signed_in(true);
        inputs.last_backup_date = Some(date);

        assert_eq!(
            derive_state(&inputs),
            CloudBackupState::Activated {
                user: user(),
                last_backup_date: Some(date),
                backup_now_available: true,
                restore_available: false,
                delete_available: false,
            }
        );
    }

    #[test]
    fn test_activated_with_remote_backup() {
        let mut inputs = signed_in(true);
        inputs.remote_descriptor = Some(descriptor());

        match derive_state(&inputs) {
            CloudBackupState::Activated {
                restore_available,
                delete_available,
                backup_now_available,
                ..
            } => {
                assert!(restore_available);
                assert!(delete_available);
                assert!(backup_now_available);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_operation_in_flight() {
        let cases = [
            (OperationKind::Backup, CloudBackupState::BackupInProgress { user: user() }),
            (
                OperationKind::Restore,
                CloudBackupState::RestorationInProgress { user: user() },
            ),
            (
                OperationKind::Delete,
                CloudBackupState::DeletionInProgress { user: user() },
            ),
        ];

        for (kind, expected) in cases {
            let mut inputs = signed_in(true);
            inputs.operation = Some(kind);
            let state = derive_state(&inputs);
            assert!(state.is_busy());
            assert_eq!(state, expected);
        }
    }

    #[tokio::test]
    async fn test_refresh_reflects_remote_backup() {
        let env = TestEnv::signed_in("U1");
        let monitor = SyncStateMonitor::new(env.service.clone());

        match monitor.refresh().await {
            CloudBackupState::Activated {
                restore_available, ..
            } => assert!(!restore_available),
            other => panic!("unexpected state {:?}", other),
        }

        env.service.backup().await.unwrap();

        match monitor.refresh().await {
            CloudBackupState::Activated {
                restore_available,
                last_backup_date,
                ..
            } => {
                assert!(restore_available);
                assert!(last_backup_date.is_some());
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(monitor.current().user().unwrap().id, "U1");
    }

    #[tokio::test]
    async fn test_signed_out_skips_remote_query() {
        let env = TestEnv::signed_out();
        let monitor = SyncStateMonitor::new(env.service.clone());

        assert_eq!(monitor.refresh().await, CloudBackupState::NotAuthenticated);
        assert_eq!(env.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_follows_signals() {
        let env = TestEnv::signed_in("U1");
        let monitor = Arc::new(SyncStateMonitor::new(env.service.clone()));
        let mut states = monitor.subscribe();
        let runner = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run().await })
        };

        states
            .wait_for(|state| matches!(state, CloudBackupState::Activated { .. }))
            .await
            .unwrap();

        let guard = env
            .service
            .operation_flag()
            .try_begin(OperationKind::Delete)
            .unwrap();
        states
            .wait_for(|state| matches!(state, CloudBackupState::DeletionInProgress { .. }))
            .await
            .unwrap();

        drop(guard);
        states
            .wait_for(|state| matches!(state, CloudBackupState::Activated { .. }))
            .await
            .unwrap();

        env.auth.set(AuthState::NotAuthenticated);
        states
            .wait_for(|state| *state == CloudBackupState::NotAuthenticated)
            .await
            .unwrap();

        runner.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_entitlement_and_remote_changes_on_tick() {
        let env = TestEnv::signed_in("U1");
        let monitor = Arc::new(
            SyncStateMonitor::new(env.service.clone())
                .with_refresh_interval(Duration::from_secs(60)),
        );
        let mut states = monitor.subscribe();
        let runner = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run().await })
        };
        states
            .wait_for(|state| {
                matches!(
                    state,
                    CloudBackupState::Activated {
                        restore_available: false,
                        ..
                    }
                )
            })
            .await
            .unwrap();

        env.remote.put(
            "user/U1/backup.zip",
            crate::backup::archive::pack(b"other device", 1).unwrap(),
        );
        states
            .wait_for(|state| {
                matches!(
                    state,
                    CloudBackupState::Activated {
                        restore_available: true,
                        ..
                    }
                )
            })
            .await
            .unwrap();

        env.entitlement.set(false);
        states
            .wait_for(|state| matches!(state, CloudBackupState::NotActivated { .. }))
            .await
            .unwrap();

        runner.abort();
    }
}
