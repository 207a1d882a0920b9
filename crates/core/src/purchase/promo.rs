//! Promo code step, run after cookie acceptance when a code is configured.

use tracing::info;

use crate::storefront::StorefrontProfile;
use crate::surface::{AutomationSurface, SurfaceError};

use super::config::OrchestratorConfig;
use super::reload;
use super::types::{FailureKind, PurchaseState, StageFailure};

const STAGE: PurchaseState = PurchaseState::EnterPromoCode;

pub struct PromoCodeStep<'a> {
    surface: &'a dyn AutomationSurface,
    profile: &'a StorefrontProfile,
    config: &'a OrchestratorConfig,
}

impl<'a> PromoCodeStep<'a> {
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

    /// Type and submit the code, then wait for the storefront to confirm it.
    pub async fn apply(&self, code: &str) -> Result<(), StageFailure> {
        match self.try_apply(code).await {
            Ok(()) => {
                info!("Promo code accepted");
                Ok(())
            }
            Err(e) => {
                reload(self.surface, STAGE).await;
                Err(StageFailure::new(
                    STAGE,
                    FailureKind::from(&e),
                    format!("promo code: {}", e),
                ))
            }
        }
    }

    async fn try_apply(&self, code: &str) -> Result<(), SurfaceError> {
        let input = self
            .surface
            .wait_clickable(&self.profile.promo_code_input, self.config.short_timeout())
            .await?;
        self.surface.type_text(&input, code).await?;
        self.surface.submit(&input).await?;

        // Confirmation needs a server round-trip.
        self.surface
            .wait_clickable(
                &self.profile.promo_code_confirmation,
                self.config.long_timeout(),
            )
            .await?;
        Ok(())
    }
}
