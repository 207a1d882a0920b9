//! Storefront profile: every locator and marker the purchase loop relies on.
//!
//! Defaults target the Angular storefront the tool was first written for;
//! retargeting another storefront is a matter of overriding `[storefront]`.

use serde::{Deserialize, Serialize};

use crate::surface::{Locator, CATEGORY_PLACEHOLDER};

const PRODUCT_ITEM_ADD: &str = "/html/body/app-root/app-layout/main/app-page-cart/div[2]/app-products-group/div/div/app-product-item[{index}]/div/div/div[2]/div/button[2]/i";

fn product_item_add(index: u32) -> Locator {
    Locator::xpath(PRODUCT_ITEM_ADD.replace("{index}", &index.to_string()))
}

/// Locators and text markers describing one storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontProfile {
    /// Cookie consent button.
    pub cookie_accept: Locator,

    /// Promo / document code input.
    pub promo_code_input: Locator,
    /// Control that appears once the promo code was accepted.
    pub promo_code_confirmation: Locator,

    /// Every rendered category entry; its text carries the category label.
    pub category_entries: Locator,
    /// Tab for one category; must contain `{category}`.
    pub category_tab: Locator,
    /// "Next page" arrow of the category strip.
    pub next_category_page: Locator,

    /// Add-ticket controls tried in order; first match wins.
    pub add_controls: Vec<Locator>,
    /// Primary (membership) add control, companion mode only.
    pub primary_add_control: Locator,
    /// Companion add control, companion mode only.
    pub companion_add_control: Locator,

    pub cart_continue: Locator,
    pub review_continue: Locator,
    pub terms_checkbox: Locator,

    /// Dialog shown when the session was invalidated before login.
    pub blocking_modal: Locator,
    pub login_identifier: Locator,
    pub login_secret: Locator,

    /// Substring of the location reached after a successful login.
    pub payment_marker: String,
    /// Text shown on sold-out category entries (matched case-insensitively).
    pub sold_out_marker: String,
}

impl Default for StorefrontProfile {
    fn default() -> Self {
        Self {
            cookie_accept: Locator::xpath("//a[@class='cc-btn cc-dismiss']"),
            promo_code_input: Locator::id("inputPromocode"),
            promo_code_confirmation: Locator::xpath("//button[@data-cy='promocode-button']"),
            category_entries: Locator::xpath("//app-product-item"),
            category_tab: Locator::xpath(format!("//button[@title={}]", CATEGORY_PLACEHOLDER)),
            next_category_page: Locator::id("sector-next"),
            add_controls: vec![product_item_add(2), product_item_add(1)],
            primary_add_control: product_item_add(1),
            companion_add_control: product_item_add(2),
            cart_continue: Locator::id("buttonContinue"),
            review_continue: Locator::xpath("//button[@data-cy='review-button-continue']"),
            terms_checkbox: Locator::id("tuPpEvent"),
            blocking_modal: Locator::id("swal2-html-container"),
            login_identifier: Locator::id("userLogin"),
            login_secret: Locator::id("password"),
            payment_marker: "payment".to_string(),
            sold_out_marker: "ESGOTADO".to_string(),
        }
    }
}

impl StorefrontProfile {
    /// Tab locator for a specific category.
    pub fn tab_for(&self, category: &str) -> Locator {
        self.category_tab.fill(category)
    }

    /// Whether an entry's text marks it as sold out.
    pub fn is_sold_out(&self, text: &str) -> bool {
        !self.sold_out_marker.is_empty()
            && text
                .to_uppercase()
                .contains(&self.sold_out_marker.to_uppercase())
    }

    /// Names of locators that are configured empty.
    pub fn empty_locators(&self) -> Vec<&'static str> {
        let named = [
            ("cookie_accept", &self.cookie_accept),
            ("promo_code_input", &self.promo_code_input),
            ("promo_code_confirmation", &self.promo_code_confirmation),
            ("category_entries", &self.category_entries),
            ("category_tab", &self.category_tab),
            ("next_category_page", &self.next_category_page),
            ("primary_add_control", &self.primary_add_control),
            ("companion_add_control", &self.companion_add_control),
            ("cart_continue", &self.cart_continue),
            ("review_continue", &self.review_continue),
            ("terms_checkbox", &self.terms_checkbox),
            ("blocking_modal", &self.blocking_modal),
            ("login_identifier", &self.login_identifier),
            ("login_secret", &self.login_secret),
        ];
        named
            .into_iter()
            .filter(|(_, locator)| locator.is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}
