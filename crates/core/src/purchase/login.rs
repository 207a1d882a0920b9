//! Authenticator: submit credentials and judge where the storefront sent us.

use tracing::{info, warn};

use crate::storefront::StorefrontProfile;
use crate::surface::{AutomationSurface, SurfaceError};

use super::config::OrchestratorConfig;
use super::types::{Credentials, FailureKind, PurchaseState, StageFailure};

const STAGE: PurchaseState = PurchaseState::Authenticate;

pub struct Authenticator<'a> {
    surface: &'a dyn AutomationSurface,
    profile: &'a StorefrontProfile,
    config: &'a OrchestratorConfig,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        surface: &'a dyn AutomationSurface,
        profile: &'a StorefrontProfile,
        config: &'a OrchestratorConfig,
    ) -> Self {
        Self {
            surface,
            profile,
            config,
        }
    }

    /// Log in and return the location reached.
    ///
    /// Succeeds only when that location contains the payment marker. Every
    /// failure navigates back to `entry_url` before returning.
    pub async fn login(
        &self,
        credentials: &Credentials,
        entry_url: &str,
    ) -> Result<String, StageFailure> {
        match self
            .surface
            .wait_present(&self.profile.blocking_modal, self.config.short_timeout())
            .await
        {
            Ok(_) => {
                return self
                    .fail(
                        entry_url,
                        StageFailure::new(
                            STAGE,
                            FailureKind::SessionInvalidated,
                            "blocking dialog shown before login",
                        ),
                    )
                    .await;
            }
            Err(e) if e.is_missing() => {}
            Err(e) => return self.fail(entry_url, StageFailure::from_surface(STAGE, &e)).await,
        }

        let location = match self.submit(credentials).await {
            Ok(location) => location,
            Err(e) => {
                let failure = StageFailure::new(
                    STAGE,
                    FailureKind::from(&e),
                    format!("login form: {}", e),
                );
                return self.fail(entry_url, failure).await;
            }
        };

        if location.contains(&self.profile.payment_marker) {
            info!("Logged in, reached {}", location);
            Ok(location)
        } else {
            self.fail(
                entry_url,
                StageFailure::new(
                    STAGE,
                    FailureKind::LoginRejected,
                    format!("login landed on {}", location),
                ),
            )
            .await
        }
    }

    async fn submit(&self, credentials: &Credentials) -> Result<String, SurfaceError> {
        let identifier = self
            .surface
            .wait_clickable(&self.profile.login_identifier, self.config.long_timeout())
            .await?;
        self.surface
            .type_text(&identifier, &credentials.identifier)
            .await?;

        let secret = self
            .surface
            .wait_clickable(&self.profile.login_secret, self.config.short_timeout())
            .await?;
        self.surface.type_text(&secret, &credentials.secret).await?;
        self.surface.submit(&secret).await?;

        self.surface.current_location().await
    }

    async fn fail(&self, entry_url: &str, failure: StageFailure) -> Result<String, StageFailure> {
        if let Err(e) = self.surface.navigate(entry_url).await {
            warn!("Failed to return to {}: {}", entry_url, e);
        }
        Err(failure)
    }
}
