//! Testing utilities and mock implementations.
//!
//! [`MockStorefront`] stands in for a real browser session, so the purchase
//! loop and the job service can be exercised end to end without a driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use turnstile_core::testing::{MockStorefront, RecordingReporter, StorefrontScript};
//!
//! let surface = MockStorefront::new(
//!     StorefrontScript::new()
//!         .entry("Floor R$ 120")
//!         .login_redirect("https://tickets.example.com/payment/1"),
//! );
//! let reporter = Arc::new(RecordingReporter::new());
//!
//! // Build a PurchaseOrchestrator with both and run it...
//! ```

mod mock_storefront;
mod recording_reporter;

pub use mock_storefront::{MockStorefront, MockSurfaceFactory, StorefrontScript};
pub use recording_reporter::RecordingReporter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::purchase::{Credentials, PurchaseRequest};

    /// Entry page used by fixtures.
    pub const ENTRY_URL: &str = "https://tickets.example.com/event/42";

    /// Location reached by a successful login.
    pub const PAYMENT_URL: &str = "https://tickets.example.com/payment/checkout/42";

    /// A valid request for `categories` with two guests.
    pub fn purchase_request(categories: &[&str]) -> PurchaseRequest {
        PurchaseRequest {
            entry_url: ENTRY_URL.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            guest_count: 2,
            credentials: Credentials::new("fan@example.com", "hunter2"),
            scheduled_start: None,
            companion: false,
            promo_code: None,
        }
    }
}
