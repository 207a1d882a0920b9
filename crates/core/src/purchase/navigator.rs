//! Category navigator: bring a category's tab into view and open it.

use tracing::{debug, info};

use crate::storefront::StorefrontProfile;
use crate::surface::AutomationSurface;

use super::config::OrchestratorConfig;
use super::reload;
use super::types::{FailureKind, PurchaseState, StageFailure};

const STAGE: PurchaseState = PurchaseState::NavigateSection;

pub struct CategoryNavigator<'a> {
    surface: &'a dyn AutomationSurface,
    profile: &'a StorefrontProfile,
    config: &'a OrchestratorConfig,
}

impl<'a> CategoryNavigator<'a> {
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

    /// Click the category's tab, paging the category strip until it shows up.
    ///
    /// Paging stops after `max_page_advances` advances or when the paging
    /// control itself is gone; either way the page is reloaded.
    pub async fn navigate(&self, category: &str) -> Result<(), StageFailure> {
        let tab = self.profile.tab_for(category);
        let timeout = self.config.short_timeout();
        let mut advances = 0u32;

        loop {
            match self.surface.wait_clickable(&tab, timeout).await {
                Ok(handle) => {
                    return match self.surface.click(&handle).await {
                        Ok(()) => {
                            info!("Opened category {} after {} page advance(s)", category, advances);
                            Ok(())
                        }
                        Err(e) => self.fail(StageFailure::from_surface(STAGE, &e)).await,
                    };
                }
                Err(e) if e.is_missing() => {
                    debug!("Tab for {} not visible: {}", category, e);
                }
                Err(e) => return self.fail(StageFailure::from_surface(STAGE, &e)).await,
            }

            if advances >= self.config.max_page_advances {
                return self
                    .fail(StageFailure::new(
                        STAGE,
                        FailureKind::CategoryUnreachable,
                        format!("{} not found after {} page advances", category, advances),
                    ))
                    .await;
            }

            let next = match self
                .surface
                .wait_clickable(&self.profile.next_category_page, timeout)
                .await
            {
                Ok(handle) => handle,
                Err(e) if e.is_missing() => {
                    return self
                        .fail(StageFailure::new(
                            STAGE,
                            FailureKind::CategoryUnreachable,
                            format!("{} not in the category strip", category),
                        ))
                        .await;
                }
                Err(e) => return self.fail(StageFailure::from_surface(STAGE, &e)).await,
            };
            if let Err(e) = self.surface.click(&next).await {
                return self.fail(StageFailure::from_surface(STAGE, &e)).await;
            }
            advances += 1;
        }
    }

    async fn fail(&self, failure: StageFailure) -> Result<(), StageFailure> {
        reload(self.surface, STAGE).await;
        Err(failure)
    }
}
