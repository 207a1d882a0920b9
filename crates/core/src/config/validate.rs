use super::{types::Config, ConfigError};
use crate::surface::{Locator, CATEGORY_PLACEHOLDER};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Job limits are positive
/// - WebDriver poll interval is not 0
/// - No storefront locator is empty and at least one add control exists
/// - The category tab template names the category exactly once per use, unquoted
/// - The `[purchase]` request, when present, is runnable
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }
    if config.server.max_concurrent_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_concurrent_jobs must be at least 1".to_string(),
        ));
    }

    // WebDriver validation
    if config.webdriver.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "webdriver.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if config.webdriver.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "webdriver.url is required".to_string(),
        ));
    }

    // Storefront validation
    let empty = config.storefront.empty_locators();
    if !empty.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "storefront locators cannot be empty: {}",
            empty.join(", ")
        )));
    }
    if config.storefront.add_controls.is_empty()
        || config.storefront.add_controls.iter().any(|l| l.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "storefront.add_controls needs at least one non-empty locator".to_string(),
        ));
    }
    check_tab_template(&config.storefront.category_tab)?;
    if config.storefront.payment_marker.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "storefront.payment_marker cannot be empty".to_string(),
        ));
    }

    // Purchase validation
    if let Some(purchase) = &config.purchase {
        purchase
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("purchase: {}", e)))?;
    }

    Ok(())
}

/// The tab template is filled with an already quoted literal for xpath and css.
fn check_tab_template(template: &Locator) -> Result<(), ConfigError> {
    let value = template.value();
    if !value.contains(CATEGORY_PLACEHOLDER) {
        return Err(ConfigError::ValidationError(format!(
            "storefront.category_tab must contain {}",
            CATEGORY_PLACEHOLDER
        )));
    }
    if matches!(template, Locator::Xpath(_) | Locator::Css(_)) {
        let quoted = ['\'', '"']
            .iter()
            .any(|q| value.contains(&format!("{q}{CATEGORY_PLACEHOLDER}{q}")));
        if quoted {
            return Err(ConfigError::ValidationError(format!(
                "storefront.category_tab must not quote {}; it is filled with a quoted literal",
                CATEGORY_PLACEHOLDER
            )));
        }
    }
    Ok(())
}
