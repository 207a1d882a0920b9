//! Mock storefront implementing [`AutomationSurface`] for testing.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storefront::StorefrontProfile;
use crate::surface::{
    AutomationSurface, ElementHandle, Locator, SurfaceError, SurfaceFactory, CATEGORY_PLACEHOLDER,
};

/// Scripted storefront behavior.
///
/// Category entries are given per page load: the snapshot for the n-th load
/// (navigation or reload) is `loads[n - 1]`, the last snapshot repeating.
/// Before any load the first snapshot is shown.
#[derive(Debug, Clone, Default)]
pub struct StorefrontScript {
    loads: Vec<Vec<String>>,
    tab_pages: Vec<Vec<String>>,
    missing: Vec<Locator>,
    faults: Vec<(Locator, SurfaceError)>,
    blocking_modal: u32,
    login_redirect: Option<String>,
    stale_entry_reads: u32,
    failing_navigations: u32,
}

impl StorefrontScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a category entry to the most recent page-load snapshot.
    pub fn entry(mut self, text: &str) -> Self {
        if self.loads.is_empty() {
            self.loads.push(Vec::new());
        }
        if let Some(last) = self.loads.last_mut() {
            last.push(text.to_string());
        }
        self
    }

    /// Start a new page-load snapshot with these entries.
    pub fn load(mut self, entries: &[&str]) -> Self {
        self.loads.push(entries.iter().map(|e| e.to_string()).collect());
        self
    }

    /// Add a page to the category strip. Without pages every tab is visible.
    pub fn tab_page(mut self, categories: &[&str]) -> Self {
        self.tab_pages
            .push(categories.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Never show this control.
    pub fn missing(mut self, locator: Locator) -> Self {
        self.missing.push(locator);
        self
    }

    /// Fail every wait on this control with `error`.
    pub fn fault(mut self, locator: Locator, error: SurfaceError) -> Self {
        self.faults.push((locator, error));
        self
    }

    /// Show the blocking dialog on the next `times` login checks.
    pub fn blocking_modal(mut self, times: u32) -> Self {
        self.blocking_modal = times;
        self
    }

    /// Location reached after submitting the login form.
    pub fn login_redirect(mut self, location: &str) -> Self {
        self.login_redirect = Some(location.to_string());
        self
    }

    /// The next `reads` entry text reads fail with a stale reference.
    pub fn stale_entry_reads(mut self, reads: u32) -> Self {
        self.stale_entry_reads = reads;
        self
    }

    /// The next `count` navigations fail.
    pub fn failing_navigations(mut self, count: u32) -> Self {
        self.failing_navigations = count;
        self
    }
}

#[derive(Debug, Clone)]
enum Target {
    Control(Locator),
    Entry(String),
}

#[derive(Debug)]
struct MockState {
    script: StorefrontScript,
    page_loads: usize,
    strip_page: usize,
    location: String,
    handles: HashMap<String, Target>,
    next_handle: u64,
    clicks: Vec<Locator>,
    typed: Vec<(Locator, String)>,
    submits: Vec<Locator>,
    navigations: Vec<String>,
    refreshes: usize,
    closed: bool,
}

impl MockState {
    fn issue(&mut self, target: Target) -> ElementHandle {
        self.next_handle += 1;
        let id = format!("mock-element-{}", self.next_handle);
        self.handles.insert(id.clone(), target);
        ElementHandle::new(id)
    }

    fn target(&self, handle: &ElementHandle) -> Result<Target, SurfaceError> {
        self.handles
            .get(handle.id())
            .cloned()
            .ok_or_else(|| SurfaceError::NotFound(handle.id().to_string()))
    }

    fn fault_for(&self, locator: &Locator) -> Option<SurfaceError> {
        self.script
            .faults
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, e)| e.clone())
    }

    fn current_entries(&self) -> Vec<String> {
        if self.script.loads.is_empty() {
            return Vec::new();
        }
        let index = self
            .page_loads
            .saturating_sub(1)
            .min(self.script.loads.len() - 1);
        self.script.loads[index].clone()
    }

    fn page_loaded(&mut self) {
        self.page_loads += 1;
        self.strip_page = 0;
    }
}

/// Mock implementation of the AutomationSurface trait.
///
/// Clones share state, so a test can keep a clone for assertions while the
/// orchestrator owns another.
///
/// # Example
///
/// ```rust,ignore
/// let surface = MockStorefront::new(
///     StorefrontScript::new()
///         .entry("Balcony ESGOTADO")
///         .entry("Floor R$ 120")
///         .login_redirect("https://tickets.example.com/payment/1"),
/// );
///
/// // ... run the orchestrator ...
///
/// assert_eq!(surface.refresh_count().await, 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockStorefront {
    profile: StorefrontProfile,
    state: Arc<RwLock<MockState>>,
}

impl MockStorefront {
    /// Mock storefront using the default storefront profile.
    pub fn new(script: StorefrontScript) -> Self {
        Self::with_profile(StorefrontProfile::default(), script)
    }

    pub fn with_profile(profile: StorefrontProfile, script: StorefrontScript) -> Self {
        Self {
            profile,
            state: Arc::new(RwLock::new(MockState {
                script,
                page_loads: 0,
                strip_page: 0,
                location: "about:blank".to_string(),
                handles: HashMap::new(),
                next_handle: 0,
                clicks: Vec::new(),
                typed: Vec::new(),
                submits: Vec::new(),
                navigations: Vec::new(),
                refreshes: 0,
                closed: false,
            })),
        }
    }

    /// Every clicked control, in order.
    pub async fn clicks(&self) -> Vec<Locator> {
        self.state.read().await.clicks.clone()
    }

    /// Number of clicks on one control.
    pub async fn clicks_on(&self, locator: &Locator) -> usize {
        self.state
            .read()
            .await
            .clicks
            .iter()
            .filter(|l| *l == locator)
            .count()
    }

    /// Text typed into controls, in order.
    pub async fn typed(&self) -> Vec<(Locator, String)> {
        self.state.read().await.typed.clone()
    }

    /// Controls whose form was submitted, in order.
    pub async fn submits(&self) -> Vec<Locator> {
        self.state.read().await.submits.clone()
    }

    /// Successful navigations, in order.
    pub async fn navigations(&self) -> Vec<String> {
        self.state.read().await.navigations.clone()
    }

    pub async fn refresh_count(&self) -> usize {
        self.state.read().await.refreshes
    }

    /// Navigations plus reloads.
    pub async fn page_loads(&self) -> usize {
        self.state.read().await.page_loads
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Whether `locator` is an instance of the category tab template.
    fn is_category_tab(&self, locator: &Locator) -> bool {
        let template = &self.profile.category_tab;
        if mem::discriminant(template) != mem::discriminant(locator) {
            return false;
        }
        match template.value().split_once(CATEGORY_PLACEHOLDER) {
            Some((prefix, suffix)) => {
                let value = locator.value();
                value.len() >= prefix.len() + suffix.len()
                    && value.starts_with(prefix)
                    && value.ends_with(suffix)
            }
            None => template == locator,
        }
    }

    fn is_visible(&self, state: &MockState, locator: &Locator) -> bool {
        if state.script.missing.contains(locator) {
            return false;
        }
        if *locator == self.profile.blocking_modal {
            return state.script.blocking_modal > 0;
        }
        if *locator == self.profile.next_category_page {
            return state.strip_page + 1 < state.script.tab_pages.len();
        }
        if !state.script.tab_pages.is_empty() && self.is_category_tab(locator) {
            return state.script.tab_pages[state.strip_page]
                .iter()
                .any(|category| self.profile.tab_for(category) == *locator);
        }
        true
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.fault_for(locator) {
            return Err(error);
        }
        if !self.is_visible(&state, locator) {
            return Err(SurfaceError::Timeout {
                locator: locator.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if *locator == self.profile.blocking_modal {
            state.script.blocking_modal -= 1;
        }
        Ok(state.issue(Target::Control(locator.clone())))
    }
}

#[async_trait]
impl AutomationSurface for MockStorefront {
    fn name(&self) -> &str {
        "mock"
    }

    async fn wait_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError> {
        self.wait_for(locator, timeout).await
    }

    async fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError> {
        self.wait_for(locator, timeout).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        let mut state = self.state.write().await;
        if let Target::Control(locator) = state.target(element)? {
            if locator == self.profile.next_category_page {
                state.strip_page += 1;
            }
            state.clicks.push(locator);
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.write().await;
        match state.target(element)? {
            Target::Control(locator) => {
                state.typed.push((locator, text.to_string()));
                Ok(())
            }
            Target::Entry(_) => Err(SurfaceError::NotInteractable(element.id().to_string())),
        }
    }

    async fn submit(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        let mut state = self.state.write().await;
        if let Target::Control(locator) = state.target(element)? {
            if locator == self.profile.login_secret {
                if let Some(redirect) = state.script.login_redirect.clone() {
                    state.location = redirect;
                }
            }
            state.submits.push(locator);
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.write().await;
        if state.script.failing_navigations > 0 {
            state.script.failing_navigations -= 1;
            return Err(SurfaceError::Transport(format!("cannot reach {}", url)));
        }
        state.navigations.push(url.to_string());
        state.location = url.to_string();
        state.page_loaded();
        Ok(())
    }

    async fn refresh(&self) -> Result<(), SurfaceError> {
        let mut state = self.state.write().await;
        state.refreshes += 1;
        state.page_loaded();
        Ok(())
    }

    async fn current_location(&self) -> Result<String, SurfaceError> {
        Ok(self.state.read().await.location.clone())
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SurfaceError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.fault_for(locator) {
            return Err(error);
        }
        if *locator == self.profile.category_entries {
            let entries = state.current_entries();
            return Ok(entries
                .into_iter()
                .map(|text| state.issue(Target::Entry(text)))
                .collect());
        }
        if self.is_visible(&state, locator) {
            Ok(vec![state.issue(Target::Control(locator.clone()))])
        } else {
            Ok(Vec::new())
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError> {
        let mut state = self.state.write().await;
        match state.target(element)? {
            Target::Entry(text) => {
                if state.script.stale_entry_reads > 0 {
                    state.script.stale_entry_reads -= 1;
                    return Err(SurfaceError::StaleElement(element.id().to_string()));
                }
                Ok(text)
            }
            Target::Control(locator) => Ok(locator.value().to_string()),
        }
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.state.write().await.closed = true;
        Ok(())
    }
}

/// Factory handing out mock storefronts that share one script.
#[derive(Debug, Clone)]
pub struct MockSurfaceFactory {
    profile: StorefrontProfile,
    script: StorefrontScript,
    error: Option<SurfaceError>,
    created: Arc<RwLock<Vec<MockStorefront>>>,
}

impl MockSurfaceFactory {
    pub fn new(script: StorefrontScript) -> Self {
        Self {
            profile: StorefrontProfile::default(),
            script,
            error: None,
            created: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Factory whose `create` always fails.
    pub fn failing(error: SurfaceError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(StorefrontScript::new())
        }
    }

    /// Surfaces created so far.
    pub async fn created(&self) -> Vec<MockStorefront> {
        self.created.read().await.clone()
    }
}

#[async_trait]
impl SurfaceFactory for MockSurfaceFactory {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let surface = MockStorefront::with_profile(self.profile.clone(), self.script.clone());
        self.created.write().await.push(surface.clone());
        Ok(Box::new(surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_follow_page_loads() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .load(&["Floor ESGOTADO"])
                .load(&["Floor R$ 120"]),
        );
        let profile = StorefrontProfile::default();

        let first = surface.query_all(&profile.category_entries).await.unwrap();
        assert_eq!(surface.text(&first[0]).await.unwrap(), "Floor ESGOTADO");

        surface.navigate("https://x").await.unwrap();
        surface.refresh().await.unwrap();
        let second = surface.query_all(&profile.category_entries).await.unwrap();
        assert_eq!(surface.text(&second[0]).await.unwrap(), "Floor R$ 120");
    }

    #[tokio::test]
    async fn test_tab_visibility_follows_strip_page() {
        let surface = MockStorefront::new(
            StorefrontScript::new()
                .tab_page(&["Balcony"])
                .tab_page(&["Floor"]),
        );
        let profile = StorefrontProfile::default();
        let timeout = Duration::from_millis(1);

        assert!(surface
            .wait_clickable(&profile.tab_for("Floor"), timeout)
            .await
            .is_err());
        let next = surface
            .wait_clickable(&profile.next_category_page, timeout)
            .await
            .unwrap();
        surface.click(&next).await.unwrap();
        assert!(surface
            .wait_clickable(&profile.tab_for("Floor"), timeout)
            .await
            .is_ok());
        assert!(surface
            .wait_clickable(&profile.next_category_page, timeout)
            .await
            .is_err());

        surface.refresh().await.unwrap();
        assert!(surface
            .wait_clickable(&profile.tab_for("Balcony"), timeout)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_factory_records_surfaces() {
        let factory = MockSurfaceFactory::new(StorefrontScript::new());
        let surface = factory.create().await.unwrap();
        surface.close().await.unwrap();

        let created = factory.created().await;
        assert_eq!(created.len(), 1);
        assert!(created[0].is_closed().await);
    }

    #[tokio::test]
    async fn test_failing_factory() {
        let factory = MockSurfaceFactory::failing(SurfaceError::Session("no driver".into()));
        assert!(factory.create().await.is_err());
    }
}
