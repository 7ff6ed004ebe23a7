//! Chrome-backed portal session using thirtyfour.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thirtyfour::common::capabilities::chromium::ChromiumLikeCapabilities;
use thirtyfour::{DesiredCapabilities, WebDriver, WebElement};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::selectors::{self, Locator};
use super::session::{run_upload, PortalClient, PortalSession};
use super::types::*;
use crate::config::PortalConfig;

/// WebDriver code point for the Enter key
const ENTER: char = '\u{E007}';

const POLL: Duration = Duration::from_millis(100);
const DRIVER_STARTUP: Duration = Duration::from_secs(10);
const MENU_SETTLE: Duration = Duration::from_secs(5);
const CONFIRM_SETTLE: Duration = Duration::from_secs(2);
const INPUT_ERROR_WAIT: Duration = Duration::from_secs(5);
const CHECKER_PAUSE: Duration = Duration::from_millis(200);
const EXPORT_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
enum Condition {
    Present,
    Visible,
    Clickable,
}

const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView(true);";
const JS_CLICK: &str = "arguments[0].click();";

/// Spawns a fresh chromedriver and Chrome for every upload
pub struct ChromePortal {
    config: PortalConfig,
}

impl ChromePortal {
    pub fn new(config: PortalConfig) -> Result<Self, PortalError> {
        if config.login_url.trim().is_empty() {
            return Err(PortalError::Config("portal.login_url is not set".into()));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl PortalClient for ChromePortal {
    async fn submit(&self, file: &Path) -> UploadOutcome {
        let mut session = ChromeSession::new(self.config.clone());
        run_upload(&mut session, file).await
    }
}

pub struct ChromeSession {
    config: PortalConfig,
    driver_process: Option<Child>,
    driver: Option<WebDriver>,
}

impl ChromeSession {
    pub fn new(config: PortalConfig) -> Self {
        Self {
            config,
            driver_process: None,
            driver: None,
        }
    }

    fn driver(&self) -> Result<&WebDriver, PortalError> {
        self.driver.as_ref().ok_or(PortalError::NotLaunched)
    }

    fn capabilities(&self) -> Result<thirtyfour::ChromeCapabilities, PortalError> {
        let mut caps = DesiredCapabilities::chrome();
        if let Some(binary) = &self.config.chrome_binary {
            caps.set_binary(&binary.to_string_lossy())?;
        }
        if self.config.headless {
            caps.set_headless()?;
        }
        caps.set_no_sandbox()?;
        caps.set_disable_gpu()?;
        caps.set_disable_dev_shm_usage()?;
        caps.add_arg("--disable-popup-blocking")?;
        caps.add_arg("--start-maximized")?;
        Ok(caps)
    }

    /// Poll for `locator` until `condition` holds
    async fn wait_for(
        &self,
        locator: Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<WebElement, PortalError> {
        let driver = self.driver()?;
        let found = tokio::time::timeout(timeout, async {
            loop {
                if let Ok(elem) = driver.find(locator.by()).await {
                    let ready = match condition {
                        Condition::Present => true,
                        Condition::Visible => elem.is_displayed().await.unwrap_or(false),
                        Condition::Clickable => elem.is_clickable().await.unwrap_or(false),
                    };
                    if ready {
                        return elem;
                    }
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await;

        found.map_err(|_| timeout_error(locator, timeout))
    }

    async fn wait_all_present(&self, locator: Locator, timeout: Duration) -> Result<Vec<WebElement>, PortalError> {
        let driver = self.driver()?;
        let found = tokio::time::timeout(timeout, async {
            loop {
                if let Ok(elems) = driver.find_all(locator.by()).await {
                    if !elems.is_empty() {
                        return elems;
                    }
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await;

        found.map_err(|_| timeout_error(locator, timeout))
    }

    /// Scroll into view and click through JavaScript; ExtJS overlays swallow
    /// native clicks on these widgets
    async fn js_click(&self, elem: &WebElement) -> Result<(), PortalError> {
        let driver = self.driver()?;
        driver.execute(SCROLL_INTO_VIEW, vec![elem.to_json()?]).await?;
        driver.execute(JS_CLICK, vec![elem.to_json()?]).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<WebDriver, PortalError> {
        let url = format!("http://localhost:{}", self.config.chromedriver_port);
        let caps = self.capabilities()?;

        let connected = tokio::time::timeout(DRIVER_STARTUP, async {
            loop {
                match WebDriver::new(&url, caps.clone()).await {
                    Ok(driver) => return Ok(driver),
                    Err(e) => {
                        debug!("chromedriver not ready yet: {}", e);
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                }
            }
        })
        .await;

        match connected {
            Ok(result) => result,
            Err(_) => Err(PortalError::Launch(format!("chromedriver did not answer on {}", url))),
        }
    }
}

#[async_trait]
impl PortalSession for ChromeSession {
    async fn launch(&mut self) -> Result<(), PortalError> {
        let child = Command::new(&self.config.chromedriver_path)
            .arg(format!("--port={}", self.config.chromedriver_port))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PortalError::Launch(format!(
                    "could not start {}: {}",
                    self.config.chromedriver_path.display(),
                    e
                ))
            })?;
        self.driver_process = Some(child);

        let driver = self.connect().await?;
        self.driver = Some(driver);
        info!("browser session started");
        Ok(())
    }

    async fn login(&mut self) -> Result<(), PortalError> {
        let driver = self.driver()?;
        driver.goto(self.config.login_url.as_str()).await?;

        let code = format!("{}{}", self.config.operator_code, ENTER);
        driver.find(selectors::OPERATOR_CODE.by()).await?.send_keys(code).await?;
        driver
            .find(selectors::PASSWORD.by())
            .await?
            .send_keys(self.config.password.as_str())
            .await?;
        driver.find(selectors::LOGIN_BUTTON.by()).await?.click().await?;

        debug!("login submitted");
        Ok(())
    }

    async fn navigate_to_upload_page(&mut self) -> Result<(), PortalError> {
        let timeout = self.config.wait_timeout();

        self.wait_for(selectors::ORDER_APP_TILE, Condition::Clickable, timeout).await?.click().await?;

        let driver = self.driver()?;
        let windows = driver.windows().await?;
        let app_window = windows
            .get(1)
            .cloned()
            .ok_or_else(|| PortalError::Page("order application did not open a second window".into()))?;
        driver.switch_to_window(app_window).await?;

        self.wait_for(selectors::MENU_BUTTON, Condition::Clickable, timeout).await?.click().await?;

        let order_menu = self.wait_for(selectors::ORDER_MENU, Condition::Visible, timeout).await?;
        self.driver()?
            .action_chain()
            .move_to_element_center(&order_menu)
            .perform()
            .await?;

        self.wait_for(selectors::BULK_ENTRY_ITEM, Condition::Clickable, timeout).await?.click().await?;
        tokio::time::sleep(MENU_SETTLE).await;

        debug!("bulk entry page open");
        Ok(())
    }

    async fn upload_file(&mut self, file: &Path) -> Result<UploadAck, PortalError> {
        let absolute = std::fs::canonicalize(file)?;
        let driver = self.driver()?;

        driver
            .find(selectors::FILE_INPUT.by())
            .await?
            .send_keys(absolute.to_string_lossy().as_ref())
            .await?;
        driver.find(selectors::IMPORT_BUTTON.by()).await?.click().await?;

        self.wait_for(selectors::CONFIRM_BUTTON, Condition::Clickable, self.config.wait_timeout())
            .await?
            .click()
            .await?;
        tokio::time::sleep(CONFIRM_SETTLE).await;

        match self.wait_for(selectors::INPUT_ERROR_PANEL, Condition::Visible, INPUT_ERROR_WAIT).await {
            Ok(_) => {
                tokio::time::sleep(INPUT_ERROR_WAIT).await;
                Ok(UploadAck::InputError)
            }
            Err(PortalError::Timeout { .. }) => Ok(UploadAck::Accepted),
            Err(e) => Err(e),
        }
    }

    async fn extract_results(&mut self) -> Result<(), PortalError> {
        let timeout = self.config.result_timeout();

        let checkers = self.wait_all_present(selectors::ROW_CHECKER, timeout).await?;
        info!(rows = checkers.len(), "selecting result rows");

        for (idx, checker) in checkers.iter().enumerate() {
            if let Err(e) = self.js_click(checker).await {
                warn!(row = idx + 1, "could not tick result row: {}", e);
            }
            tokio::time::sleep(CHECKER_PAUSE).await;
        }

        let label = self.wait_for(selectors::CSV_LABEL, Condition::Present, timeout).await?;
        let radio_id = label
            .attr("for")
            .await?
            .ok_or_else(|| PortalError::Page("CSV label has no target input".into()))?;
        let radio = self.driver()?.find(thirtyfour::By::Id(radio_id.as_str())).await?;
        self.js_click(&radio).await?;

        let export = self.wait_for(selectors::EXPORT_BUTTON, Condition::Clickable, timeout).await?;
        self.js_click(&export).await?;
        tokio::time::sleep(EXPORT_SETTLE).await;

        Ok(())
    }

    async fn close(&mut self) {
        match self.driver.take() {
            Some(driver) => {
                if let Err(e) = driver.quit().await {
                    warn!("browser did not quit cleanly: {}", e);
                } else {
                    info!("browser closed");
                }
            }
            None => debug!("browser was never started, nothing to close"),
        }

        if let Some(mut child) = self.driver_process.take() {
            let _ = child.kill().await;
        }
    }
}

fn timeout_error(locator: Locator, after: Duration) -> PortalError {
    PortalError::Timeout {
        what: locator.describe(),
        after,
    }
}
