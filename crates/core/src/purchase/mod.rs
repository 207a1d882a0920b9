//! The purchase loop and its stages.
//!
//! Each stage borrows the run's surface, storefront profile and config and
//! returns `Result<_, StageFailure>`. Stages recover the page themselves
//! (reload or return to the entry page) before reporting a failure, so the
//! next iteration always starts from a trustworthy view.

mod backoff;
mod cart;
mod config;
mod gate;
pub mod login;
mod navigator;
mod promo;
mod resolver;
mod runner;
mod types;

pub use backoff::BackoffPolicy;
pub use cart::CartBuilder;
pub use config::OrchestratorConfig;
pub use gate::{GateOutcome, ScheduleGate};
pub use login::Authenticator;
pub use navigator::CategoryNavigator;
pub use promo::PromoCodeStep;
pub use resolver::SectionResolver;
pub use runner::PurchaseOrchestrator;
pub use types::*;

use tracing::warn;

use crate::surface::AutomationSurface;

/// Full page reload; a failing reload is logged and left to the next stage.
async fn reload(surface: &dyn AutomationSurface, stage: PurchaseState) {
    if let Err(e) = surface.refresh().await {
        warn!("Reload after {} failure did not complete: {}", stage, e);
    }
}
