//! One registration check, from stored courses to sent notifications

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RegistrateError;
use crate::messaging::{self, DispatchReport};
use crate::probe::{ProbeReport, Prober, SessionController};
use crate::security::{CredentialStore, PortalLogin};
use crate::storage::{CourseStore, CsvCourseStore};
use crate::tools::{self, PageDriver};
use crate::types::Course;

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunSummary {
    pub probes: ProbeReport,
    pub dispatch: DispatchReport,
}

/// Log in and probe `courses` in order on an already running browser.
///
/// The driver is left open; closing it is the caller's job, except after an
/// [`RegistrateError::AuthTimeout`], where it has already been closed.
pub async fn check_courses(
    config: &Config,
    driver: &dyn PageDriver,
    login: &PortalLogin,
    courses: &[Course],
) -> std::result::Result<ProbeReport, RegistrateError> {
    SessionController::new(config).login(driver, login).await?;
    Prober::new(config).probe_all(driver, courses).await
}

/// Run a full check with the configured stores, browser and channels
pub async fn run(config: &Config) -> Result<RunSummary> {
    config.validate()?;

    let credentials = CredentialStore::new(config.storage.credentials_path()?).load()?;
    credentials.validate_for(&config.notify.channels)?;
    let login = credentials.portal_login()?;
    let notifiers = messaging::build_notifiers(config, &credentials, &config.notify.channels)?;

    let courses = CsvCourseStore::new(config.storage.courses_path()?)?.load()?;
    let incomplete = courses.incomplete();
    info!(tracked = courses.len(), incomplete = incomplete.len(), "Starting registration check");

    let probes = if incomplete.is_empty() {
        info!("No incomplete courses to check, not starting a browser");
        ProbeReport::default()
    } else {
        let driver = tools::launch(&config.browser).await?;
        let result = check_courses(config, driver.as_ref(), &login, &incomplete).await;

        if let Err(e) = driver.close().await {
            warn!("Failed to close browser: {:#}", e);
        }
        result?
    };

    let dispatch = messaging::dispatch(&notifiers, probes.available().as_slice()).await;

    info!(
        available = probes.available().len(),
        notified = dispatch.delivered.len(),
        notify_failures = dispatch.failures.len(),
        "Run finished: {}",
        probes.summary()
    );

    Ok(RunSummary { probes, dispatch })
}
