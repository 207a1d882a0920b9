//! Cart builder: add tickets and walk the checkout confirmations.

use tracing::{debug, info};

use crate::storefront::StorefrontProfile;
use crate::surface::{AutomationSurface, ElementHandle, Locator, SurfaceError};

use super::config::OrchestratorConfig;
use super::reload;
use super::types::{FailureKind, PurchaseState, StageFailure};

const STAGE: PurchaseState = PurchaseState::BuildCart;

pub struct CartBuilder<'a> {
    surface: &'a dyn AutomationSurface,
    profile: &'a StorefrontProfile,
    config: &'a OrchestratorConfig,
}

impl<'a> CartBuilder<'a> {
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

    /// Add `guest_count` tickets for `category` and confirm the cart.
    ///
    /// Any missing control reloads the page; a partially built cart is never
    /// repaired. A zero guest count skips the add phase but still confirms.
    pub async fn build(
        &self,
        category: &str,
        guest_count: u32,
        has_companion: bool,
    ) -> Result<(), StageFailure> {
        let result = match self.add_tickets(guest_count, has_companion).await {
            Ok(()) => self.confirm().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Cart confirmed: {} x {}", guest_count, category);
                Ok(())
            }
            Err(failure) => {
                reload(self.surface, STAGE).await;
                Err(failure)
            }
        }
    }

    async fn add_tickets(&self, guest_count: u32, has_companion: bool) -> Result<(), StageFailure> {
        if has_companion {
            self.click(&self.profile.primary_add_control, "primary add control")
                .await?;
            for _ in 0..guest_count {
                self.click(&self.profile.companion_add_control, "companion add control")
                    .await?;
            }
            return Ok(());
        }

        if guest_count == 0 {
            debug!("No guests requested, skipping add phase");
            return Ok(());
        }

        let (locator, first) = self.first_add_control().await?;
        self.surface
            .click(&first)
            .await
            .map_err(|e| step_failure("add control", &e))?;
        for _ in 1..guest_count {
            self.click(locator, "add control").await?;
        }
        Ok(())
    }

    /// First configured add control that becomes clickable.
    async fn first_add_control(&self) -> Result<(&'a Locator, ElementHandle), StageFailure> {
        let mut last_error = None;
        for locator in &self.profile.add_controls {
            match self
                .surface
                .wait_clickable(locator, self.config.short_timeout())
                .await
            {
                Ok(handle) => return Ok((locator, handle)),
                Err(e) => {
                    debug!("Add control {} not usable: {}", locator, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => step_failure("add control", &e),
            None => StageFailure::new(
                STAGE,
                FailureKind::ControlMissing,
                "no add controls configured",
            ),
        })
    }

    /// Continue, review, accept terms, review again.
    async fn confirm(&self) -> Result<(), StageFailure> {
        let steps = [
            (&self.profile.cart_continue, "cart continue"),
            (&self.profile.review_continue, "review continue"),
            (&self.profile.terms_checkbox, "terms checkbox"),
            (&self.profile.review_continue, "review confirm"),
        ];
        for (locator, label) in steps {
            self.click(locator, label).await?;
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator, label: &str) -> Result<(), StageFailure> {
        let handle = self
            .surface
            .wait_clickable(locator, self.config.short_timeout())
            .await
            .map_err(|e| step_failure(label, &e))?;
        self.surface
            .click(&handle)
            .await
            .map_err(|e| step_failure(label, &e))
    }
}

fn step_failure(label: &str, err: &SurfaceError) -> StageFailure {
    StageFailure::new(STAGE, FailureKind::from(err), format!("{}: {}", label, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStorefront, StorefrontScript};

    fn confirmation_clicks(profile: &StorefrontProfile) -> Vec<Locator> {
        vec![
            profile.cart_continue.clone(),
            profile.review_continue.clone(),
            profile.terms_checkbox.clone(),
            profile.review_continue.clone(),
        ]
    }

    #[tokio::test]
    async fn test_adds_guests_then_confirms_in_order() {
        let surface = MockStorefront::new(StorefrontScript::new());
        let profile = StorefrontProfile::default();
        let config = OrchestratorConfig::default();

        CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 2, false)
            .await
            .unwrap();

        let mut expected = vec![profile.add_controls[0].clone(); 2];
        expected.extend(confirmation_clicks(&profile));
        assert_eq!(surface.clicks().await, expected);
    }

    #[tokio::test]
    async fn test_falls_back_to_second_add_control() {
        let profile = StorefrontProfile::default();
        let surface = MockStorefront::new(
            StorefrontScript::new().missing(profile.add_controls[0].clone()),
        );
        let config = OrchestratorConfig::default();

        CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 3, false)
            .await
            .unwrap();

        assert_eq!(surface.clicks_on(&profile.add_controls[1]).await, 3);
        assert_eq!(surface.clicks_on(&profile.add_controls[0]).await, 0);
    }

    #[tokio::test]
    async fn test_companion_mode() {
        let surface = MockStorefront::new(StorefrontScript::new());
        let profile = StorefrontProfile::default();
        let config = OrchestratorConfig::default();

        CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 2, true)
            .await
            .unwrap();

        let clicks = surface.clicks().await;
        assert_eq!(clicks[0], profile.primary_add_control);
        assert_eq!(clicks[1], profile.companion_add_control);
        assert_eq!(clicks[2], profile.companion_add_control);
        assert_eq!(clicks[3..].to_vec(), confirmation_clicks(&profile));
    }

    #[tokio::test]
    async fn test_zero_guests_skips_add_phase_but_confirms() {
        let surface = MockStorefront::new(StorefrontScript::new());
        let profile = StorefrontProfile::default();
        let config = OrchestratorConfig::default();

        CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 0, false)
            .await
            .unwrap();

        assert_eq!(surface.clicks().await, confirmation_clicks(&profile));
    }

    #[tokio::test]
    async fn test_missing_step_reloads_and_fails() {
        let profile = StorefrontProfile::default();
        let surface = MockStorefront::new(
            StorefrontScript::new().missing(profile.terms_checkbox.clone()),
        );
        let config = OrchestratorConfig::default();

        let failure = CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 1, false)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, PurchaseState::BuildCart);
        assert_eq!(failure.kind, FailureKind::ControlMissing);
        assert!(failure.detail.starts_with("terms checkbox"));
        assert_eq!(surface.refresh_count().await, 1);
    }

    #[tokio::test]
    async fn test_no_add_control_found() {
        let profile = StorefrontProfile::default();
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .missing(profile.add_controls[0].clone())
                .missing(profile.add_controls[1].clone()),
        );
        let config = OrchestratorConfig::default();

        let failure = CartBuilder::new(&surface, &profile, &config)
            .build("Floor", 1, false)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::ControlMissing);
        assert!(surface.clicks_on(&profile.cart_continue).await == 0);
        assert_eq!(surface.refresh_count().await, 1);
    }
}
