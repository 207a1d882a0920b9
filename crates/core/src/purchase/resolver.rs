//! Section resolver: which requested category can be bought right now.

use tracing::{debug, info};

use crate::storefront::StorefrontProfile;
use crate::surface::{AutomationSurface, SurfaceError};

use super::config::OrchestratorConfig;
use super::types::{Availability, CategoryCandidate, FailureKind, PurchaseState, StageFailure};
use super::reload;

const STAGE: PurchaseState = PurchaseState::ResolveSection;

/// Picks the first available category in caller priority order.
///
/// Availability is recomputed from the rendered entries on every call.
pub struct SectionResolver<'a> {
    surface: &'a dyn AutomationSurface,
    profile: &'a StorefrontProfile,
    config: &'a OrchestratorConfig,
}

impl<'a> SectionResolver<'a> {
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

    /// Return the first available candidate.
    ///
    /// When nothing is available the page is reloaded exactly once so the
    /// storefront refreshes its inventory, and the failure is `Unavailable`.
    pub async fn resolve(&self, candidates: &[String]) -> Result<String, StageFailure> {
        for category in candidates {
            match self.assess(category).await {
                Ok(candidate) if candidate.is_available() => {
                    info!("Category {} is available", category);
                    return Ok(candidate.id);
                }
                Ok(candidate) => {
                    debug!(
                        "Category {} not available: {:?}",
                        category, candidate.availability
                    );
                }
                Err(e) => return Err(self.fail_on_fault(category, &e).await),
            }
        }

        reload(self.surface, STAGE).await;
        Err(StageFailure::new(
            STAGE,
            FailureKind::Unavailable,
            format!("none of [{}] is available", candidates.join(", ")),
        ))
    }

    /// Availability of one category from the currently rendered entries.
    ///
    /// An entry matches when its text contains the category identifier; it
    /// counts as available unless the same text carries the sold-out marker.
    pub async fn assess(&self, category: &str) -> Result<CategoryCandidate, SurfaceError> {
        let entries = self.surface.query_all(&self.profile.category_entries).await?;

        let mut availability = Availability::NotPresent;
        for entry in &entries {
            let text = self.surface.text(entry).await?;
            if !text.contains(category) {
                continue;
            }
            if self.profile.is_sold_out(&text) {
                availability = Availability::SoldOut;
            } else {
                availability = Availability::Available;
                break;
            }
        }

        Ok(CategoryCandidate {
            id: category.to_string(),
            availability,
        })
    }

    /// A fault while checking means "not yet determined": reload and retry later.
    async fn fail_on_fault(&self, category: &str, err: &SurfaceError) -> StageFailure {
        reload(self.surface, STAGE).await;
        if err.is_stale() {
            info!("Stale category entry while checking {}, reloading", category);
            tokio::time::sleep(self.config.reload_settle()).await;
        }
        let kind = if err.is_stale() {
            FailureKind::StaleReference
        } else {
            FailureKind::Unclassified
        };
        StageFailure::new(STAGE, kind, format!("checking {}: {}", category, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStorefront, StorefrontScript};

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            reload_settle_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_available_in_priority_order() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .entry("Balcony - ESGOTADO")
                .entry("Floor R$ 120")
                .entry("Box R$ 900"),
        );
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let chosen = resolver
            .resolve(&categories(&["Balcony", "Floor", "Box"]))
            .await
            .unwrap();
        assert_eq!(chosen, "Floor");
        assert_eq!(surface.refresh_count().await, 0);
    }

    #[tokio::test]
    async fn test_lower_priority_state_is_irrelevant() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .entry("Box R$ 900")
                .entry("Floor R$ 120"),
        );
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let chosen = resolver
            .resolve(&categories(&["Floor", "Box"]))
            .await
            .unwrap();
        assert_eq!(chosen, "Floor");
    }

    #[tokio::test]
    async fn test_nothing_available_reloads_once() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .entry("Balcony esgotado")
                .entry("Floor ESGOTADO"),
        );
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let failure = resolver
            .resolve(&categories(&["Balcony", "Floor", "Box"]))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(failure.stage, PurchaseState::ResolveSection);
        assert_eq!(surface.refresh_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_candidate_list_is_unavailable() {
        let surface = MockStorefront::new(StorefrontScript::new().entry("Floor"));
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let failure = resolver.resolve(&[]).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(surface.refresh_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_entry_reloads_and_reports_stale() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .entry("Floor R$ 120")
                .stale_entry_reads(1),
        );
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let failure = resolver
            .resolve(&categories(&["Floor"]))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::StaleReference);
        assert_eq!(surface.refresh_count().await, 1);

        // Next pass reads fresh entries.
        let chosen = resolver.resolve(&categories(&["Floor"])).await.unwrap();
        assert_eq!(chosen, "Floor");
    }

    #[tokio::test]
    async fn test_assess_distinguishes_sold_out_and_missing() {
        let surface = MockStorefront::new(StorefrontScript::new().entry("Balcony - Esgotado"));
        let profile = StorefrontProfile::default();
        let config = config();
        let resolver = SectionResolver::new(&surface, &profile, &config);

        let balcony = resolver.assess("Balcony").await.unwrap();
        assert_eq!(balcony.availability, Availability::SoldOut);
        let floor = resolver.assess("Floor").await.unwrap();
        assert_eq!(floor.availability, Availability::NotPresent);
    }
}
