//! Portal login

use tracing::{info, warn};

use crate::config::{Config, SelectorConfig};
use crate::error::{RegistrateError, Result};
use crate::probe::Poller;
use crate::security::PortalLogin;
use crate::tools::PageDriver;

/// Drives the login form once per run
#[derive(Debug, Clone)]
pub struct SessionController {
    signup_url: String,
    selectors: SelectorConfig,
    poller: Poller,
}

impl SessionController {
    pub fn new(config: &Config) -> Self {
        Self {
            signup_url: config.portal.signup_url.clone(),
            selectors: config.portal.selectors.clone(),
            poller: Poller::new(config.probe.poll_interval(), config.probe.login_timeout()),
        }
    }

    /// Open the portal, submit the login form and wait for the course search.
    ///
    /// Success only means the form was submitted and the search box showed
    /// up; wrong credentials are not detected here. On timeout the driver is
    /// closed before [`RegistrateError::AuthTimeout`] is returned.
    pub async fn login(&self, driver: &dyn PageDriver, login: &PortalLogin) -> Result<()> {
        info!(backend = driver.backend(), "Opening {}", self.signup_url);
        driver.navigate(&self.signup_url).await?;

        if !self.poller.element(driver, &self.selectors.submit).await? {
            return Err(self.abort(driver, "login form").await);
        }

        driver.type_text(&self.selectors.username, &login.username).await?;
        driver.type_text(&self.selectors.password, &login.password).await?;
        driver.click(&self.selectors.submit).await?;

        if !self.poller.element(driver, &self.selectors.search_box).await? {
            return Err(self.abort(driver, "course search").await);
        }

        info!(user = %login.username, "Logged in");
        Ok(())
    }

    async fn abort(&self, driver: &dyn PageDriver, waiting_for: &str) -> RegistrateError {
        warn!("Gave up waiting for the {} after {:?}", waiting_for, self.poller.timeout());
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser: {}", e);
        }
        RegistrateError::AuthTimeout(self.poller.timeout())
    }
}
