//! Automation surface abstraction.
//!
//! The purchase loop only talks to the storefront through the
//! [`AutomationSurface`] trait. [`WebDriverSurface`] drives a real browser;
//! tests use `testing::MockStorefront`.

mod types;
mod webdriver;

pub use types::*;
pub use webdriver::{WebDriverSurface, WebDriverSurfaceFactory};
