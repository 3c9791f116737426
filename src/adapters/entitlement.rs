//! Premium flag from the settings file

use std::sync::Arc;

use async_trait::async_trait;

use super::settings_store::SettingsStore;
use crate::backup::EntitlementCheck;
use crate::error::BudgetResult;

pub struct PremiumEntitlement {
    store: Arc<SettingsStore>,
}

impl PremiumEntitlement {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }

    pub fn set_premium(&self, premium: bool) -> BudgetResult<()> {
        self.store.update(|s| s.cloud_backup.premium = premium)
    }
}

#[async_trait]
impl EntitlementCheck for PremiumEntitlement {
    async fn is_entitled(&self) -> bool {
        self.store.snapshot().cloud_backup.premium
    }
}
