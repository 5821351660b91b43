use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::credential::{Credential, MANUAL_MARK_TOKEN, NewCredential};
use crate::store::{CredentialStore, Stores};
use crate::utils::day_bounds::Clock;

const CREDENTIAL_TTL_HOURS: i64 = 24;

/// Issues and retires the QR tokens shown at the gates.
pub struct CredentialIssuer {
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialIssuer {
    pub fn new(stores: &Stores, clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials: stores.credentials.clone(),
            clock,
        }
    }

    pub async fn create(
        &self,
        name: Option<String>,
        replaces: Option<u64>,
    ) -> Result<Credential, AppError> {
        let token = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if token == MANUAL_MARK_TOKEN {
            return Err(AppError::invalid(format!("'{MANUAL_MARK_TOKEN}' is reserved")));
        }
        if self.credentials.find_by_token(&token).await?.is_some() {
            return Err(AppError::conflict(format!("QR code '{token}' already exists")));
        }

        if let Some(old_id) = replaces {
            if !self.credentials.deactivate(old_id).await? {
                tracing::warn!(credential_id = old_id, "Credential to replace not found");
            }
        }

        let now = self.clock.now();
        let created = self
            .credentials
            .create(&NewCredential {
                token,
                created_at: now,
                expires_at: Some(now + Duration::hours(CREDENTIAL_TTL_HOURS)),
            })
            .await?;
        tracing::info!(credential_id = created.id, replaces = ?replaces, "QR code issued");
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<Credential>, AppError> {
        Ok(self.credentials.list().await?)
    }

    pub async fn deactivate(&self, id: u64) -> Result<(), AppError> {
        if self.credentials.deactivate(id).await? {
            tracing::info!(credential_id = id, "QR code deactivated");
            Ok(())
        } else {
            Err(AppError::not_found(format!("QR code {id} not found")))
        }
    }
}
