use super::{FetchStrategy, StrategyError};
use crate::config::{BrowserConfig, Config};
use crate::util::{check_url, has_min_text, visible_text_len};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetScriptExecutionDisabledParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::Page;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Selectors that indicate the article body has been rendered.
const CONTENT_SELECTOR: &str = "article, main, .content, .article, [role=\"main\"]";

const SELECTOR_POLL: Duration = Duration::from_millis(250);

const HARDENING_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--mute-audio",
    "--no-first-run",
    "--disable-blink-features=AutomationControlled",
];

/// Process-wide exclusive gate around headless rendering.
///
/// At most one render runs at a time across all workers; waiters queue in
/// FIFO order. Clones share the same gate.
#[derive(Clone, Default)]
pub struct RenderGate(Arc<Mutex<()>>);

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Something that can turn a URL into rendered DOM HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn render(&self, url: &str) -> Result<String, StrategyError>;
}

/// Headless browser strategy. Slowest and heaviest, always tried last.
pub struct BrowserStrategy {
    renderer: Arc<dyn PageRenderer>,
    gate: RenderGate,
    timeout: Duration,
    enabled: bool,
    min_page_length: usize,
    allow_private: bool,
}

impl BrowserStrategy {
    pub fn from_config(config: &Config, gate: RenderGate) -> Self {
        let renderer = ChromiumRenderer::new(config.browser.clone(), config.user_agent.clone());
        Self::with_renderer(config, Arc::new(renderer), gate)
    }

    pub fn with_renderer(config: &Config, renderer: Arc<dyn PageRenderer>, gate: RenderGate) -> Self {
        Self {
            renderer,
            gate,
            timeout: Duration::from_secs(config.browser.timeout_secs),
            enabled: config.browser.enabled,
            min_page_length: config.min_page_length,
            allow_private: config.allow_private_networks,
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["playwright"]
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn is_available(&self) -> bool {
        self.renderer.is_available().await
    }

    async fn fetch(&self, url: &str) -> Result<String, StrategyError> {
        let parsed = check_url(url, self.allow_private)
            .map_err(|e| StrategyError::InvalidUrl(e.to_string()))?;

        let _permit = self.gate.acquire().await;
        tracing::debug!(url = %parsed, "Render gate acquired");

        let html = tokio::time::timeout(self.timeout, self.renderer.render(parsed.as_str()))
            .await
            .map_err(|_| StrategyError::Timeout(self.timeout))??;

        if !has_min_text(&html, self.min_page_length) {
            return Err(StrategyError::TooShort {
                len: visible_text_len(&html),
                min: self.min_page_length,
            });
        }

        Ok(html)
    }
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn cdp_error(e: impl std::fmt::Display) -> StrategyError {
    StrategyError::Browser(e.to_string())
}

/// Chromium reports failed navigations (DNS, refused connection, blocked
/// by client) in the response rather than as a protocol error.
fn check_navigation(error_text: Option<&str>) -> Result<(), StrategyError> {
    match error_text.filter(|e| !e.is_empty()) {
        Some(e) => Err(StrategyError::Browser(format!("Navigation failed: {e}"))),
        None => Ok(()),
    }
}

/// Re-run `probe` every [`SELECTOR_POLL`] until it succeeds or `deadline`
/// passes. The probe always runs at least once.
async fn poll_until<F, Fut>(deadline: Instant, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        if probe().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL).await;
    }
}

/// Whether a sub-resource request should be refused during rendering.
fn should_block(settings: &BrowserConfig, resource_type: &ResourceType, url: &str) -> bool {
    let by_type = match resource_type {
        ResourceType::Image => settings.block_images,
        ResourceType::Media => settings.block_media,
        ResourceType::Font => settings.block_fonts,
        ResourceType::Stylesheet => settings.block_stylesheets,
        _ => false,
    };
    by_type || settings.is_blocked_url(url)
}

/// Chromium driven over CDP. A fresh browser is launched per render and
/// closed afterwards; the [`RenderGate`] keeps that to one at a time.
pub struct ChromiumRenderer {
    settings: BrowserConfig,
    user_agent: String,
    availability: OnceCell<bool>,
}

impl ChromiumRenderer {
    pub fn new(settings: BrowserConfig, user_agent: String) -> Self {
        Self {
            settings,
            user_agent,
            availability: OnceCell::new(),
        }
    }

    fn launch_config(&self) -> Result<LaunchConfig, String> {
        let mut builder = LaunchConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .args(HARDENING_ARGS.iter().copied());
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build()
    }

    async fn intercept_requests(&self, page: &Page) -> Result<TaskGuard, StrategyError> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(cdp_error)?;

        let pattern = RequestPattern::builder().url_pattern("*").build();
        page.execute(EnableParams::builder().patterns(vec![pattern]).build())
            .await
            .map_err(cdp_error)?;

        let settings = self.settings.clone();
        let page = page.clone();
        Ok(TaskGuard(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let id = event.request_id.clone();
                let result = if should_block(&settings, &event.resource_type, &event.request.url) {
                    tracing::trace!(url = %event.request.url, "Blocked sub-resource");
                    page.execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(id)).await.map(|_| ())
                };
                if let Err(e) = result {
                    tracing::trace!(error = %e, "Request interception stopped");
                    break;
                }
            }
        })))
    }

    async fn wait_for_content(&self, page: &Page) {
        let deadline = Instant::now() + Duration::from_millis(self.settings.selector_wait_ms);
        let found = poll_until(deadline, move || async move {
            page.find_element(CONTENT_SELECTOR).await.is_ok()
        })
        .await;
        if !found {
            tracing::debug!("No content selector appeared, using page as is");
        }
    }

    /// Navigate and return at `DOMContentLoaded`. `Page::goto` would also
    /// wait for `load`, holding the gate while third-party frames finish.
    async fn navigate(&self, page: &Page, url: &str) -> Result<(), StrategyError> {
        let mut dom_ready = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(cdp_error)?;

        let navigated = page
            .execute(NavigateParams::new(url))
            .await
            .map_err(cdp_error)?;
        check_navigation(navigated.result.error_text.as_deref())?;

        match dom_ready.next().await {
            Some(_) => Ok(()),
            None => Err(StrategyError::Browser(
                "Page closed before DOMContentLoaded".to_string(),
            )),
        }
    }

    async fn render_in(&self, browser: &Browser, url: &str) -> Result<String, StrategyError> {
        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(cdp_error)?;
        if self.settings.disable_javascript {
            page.execute(SetScriptExecutionDisabledParams::new(true))
                .await
                .map_err(cdp_error)?;
        }

        let _interceptor = self.intercept_requests(&page).await?;

        self.navigate(&page, url).await?;
        self.wait_for_content(&page).await;
        page.content().await.map_err(cdp_error)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn is_available(&self) -> bool {
        *self
            .availability
            .get_or_init(|| async {
                match self.launch_config() {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Headless browser unavailable");
                        false
                    }
                }
            })
            .await
    }

    async fn render(&self, url: &str) -> Result<String, StrategyError> {
        let config = self.launch_config().map_err(StrategyError::Browser)?;
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(cdp_error)?;
        let _handler = TaskGuard(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        }));

        let result = self.render_in(&browser, url).await;

        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "Browser close failed");
        }
        result
    }
}
