pub mod config;
pub mod metrics;
pub mod purchase;
pub mod status;
pub mod storefront;
pub mod surface;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig, ServiceConfig, WebDriverConfig,
};
pub use purchase::{
    AttemptOutcome, BackoffPolicy, Credentials, FailureKind, OrchestratorConfig, PurchaseError,
    PurchaseOrchestrator, PurchaseReport, PurchaseRequest, PurchaseState, RetryClassification,
    SessionState, StageFailure,
};
pub use status::{
    ChannelReporter, FanoutReporter, StatusEnvelope, StatusEvent, StatusReporter, TracingReporter,
};
pub use storefront::StorefrontProfile;
pub use surface::{
    AutomationSurface, ElementHandle, Locator, SurfaceError, SurfaceFactory, WebDriverSurface,
    WebDriverSurfaceFactory,
};
