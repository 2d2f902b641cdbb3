use std::sync::Arc;

use crate::ephemeral::EphemeralStore;
use crate::error::EphemeralError;
use crate::models::PresenceStatus;
use crate::repository::Repository;

/// Reconciles a user's coarse availability between the ephemeral store
/// (authoritative for "is online now") and the durable profile row (cold
/// reads). Transitions are broadcast by the event handlers, not here.
pub struct PresenceService {
    ephemeral: Arc<dyn EphemeralStore>,
    repo: Arc<dyn Repository>,
}

impl PresenceService {
    pub fn new(ephemeral: Arc<dyn EphemeralStore>, repo: Arc<dyn Repository>) -> Self {
        PresenceService { ephemeral, repo }
    }

    /// Write the ephemeral presence key and mirror to the profile row in the
    /// background. The durable write never blocks or fails the caller.
    pub async fn set_online(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<(), EphemeralError> {
        self.ephemeral.set_user_online(user_id, status.as_str()).await?;
        self.mirror_to_profile(user_id, status);
        Ok(())
    }

    pub async fn set_offline(&self, user_id: &str) -> Result<(), EphemeralError> {
        self.ephemeral.set_user_offline(user_id).await?;
        self.mirror_to_profile(user_id, PresenceStatus::Offline);
        Ok(())
    }

    pub async fn update_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<(), EphemeralError> {
        match status {
            PresenceStatus::Offline => self.set_offline(user_id).await,
            other => self.set_online(user_id, other).await,
        }
    }

    /// Ephemeral first, durable row on a miss, `offline` as the final
    /// fallback.
    pub async fn get_status(&self, user_id: &str) -> PresenceStatus {
        match self.ephemeral.get_user_status(user_id).await {
            Ok(Some(status)) => {
                if let Some(parsed) = PresenceStatus::parse(&status)
                    && parsed != PresenceStatus::Offline
                {
                    return parsed;
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("presence read for {user_id} failed: {e}"),
        }

        match self.repo.fetch_profile_status(user_id).await {
            Ok(Some(status)) => PresenceStatus::parse(&status).unwrap_or(PresenceStatus::Offline),
            Ok(None) => PresenceStatus::Offline,
            Err(e) => {
                eprintln!("profile status read for {user_id} failed: {e}");
                PresenceStatus::Offline
            }
        }
    }

    fn mirror_to_profile(&self, user_id: &str, status: PresenceStatus) {
        let repo = Arc::clone(&self.repo);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = repo.update_profile_status(&user_id, status.as_str()).await {
                eprintln!("profile status update for {user_id} failed: {e}");
            }
        });
    }
}
