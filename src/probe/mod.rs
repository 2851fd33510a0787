//! Per-course probe loop
//!
//! For every incomplete course, in list order, the prober searches the portal,
//! opens the first result and classifies the exam-slot view. The browser tab
//! is shared state: probes never run concurrently and every probe leaves the
//! page refreshed for the next one.

pub mod classifier;
pub mod poll;
pub mod session;

pub use classifier::{Marker, PageClassifier};
pub use poll::Poller;
pub use session::SessionController;

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, SelectorConfig};
use crate::error::{RegistrateError, Result};
use crate::tools::PageDriver;
use crate::types::{AvailableCourses, Course, ProbeOutcome};

/// What the search view showed after typing a course code
enum SearchState {
    NoResults,
    Results,
}

/// Runs the probe state machine for one course at a time
#[derive(Debug, Clone)]
pub struct Prober {
    selectors: SelectorConfig,
    classifier: PageClassifier,
    search: Poller,
    slot: Poller,
    settle_delay: Duration,
}

impl Prober {
    pub fn new(config: &Config) -> Self {
        let probe = &config.probe;
        Self {
            selectors: config.portal.selectors.clone(),
            classifier: PageClassifier::new(config.markers.clone()),
            search: Poller::new(probe.poll_interval(), probe.search_timeout()),
            slot: Poller::new(probe.poll_interval(), probe.slot_timeout()),
            settle_delay: probe.settle_delay(),
        }
    }

    /// Probe one course and return its outcome.
    ///
    /// A missing search box is [`RegistrateError::ElementNotFound`]; a search
    /// that shows neither "no results" nor a result row in time is a
    /// [`RegistrateError::SearchTimeout`]. An exam-slot view that never
    /// shows a known marker resolves to [`ProbeOutcome::TimedOut`].
    pub async fn probe(&self, driver: &dyn PageDriver, course: &Course) -> Result<ProbeOutcome> {
        let code = course.code();
        let search_timeout = || RegistrateError::SearchTimeout {
            code: code.to_string(),
            timeout: self.search.timeout(),
        };

        if !self.search.element(driver, &self.selectors.search_box).await? {
            return Err(RegistrateError::ElementNotFound {
                selector: self.selectors.search_box.clone(),
                timeout: self.search.timeout(),
            });
        }

        debug!(code, "Searching");
        driver.type_text(&self.selectors.search_box, code).await?;
        tokio::time::sleep(self.settle_delay).await;

        let classifier = &self.classifier;
        let first_result = self.selectors.first_result.as_str();
        let state = self
            .search
            .until(move || async move {
                if classifier.detect(driver, &[Marker::NoResults]).await?.is_some() {
                    return Ok(Some(SearchState::NoResults));
                }
                Ok(driver
                    .element_present(first_result)
                    .await?
                    .then_some(SearchState::Results))
            })
            .await?
            .ok_or_else(search_timeout)?;

        if let SearchState::NoResults = state {
            driver.refresh().await?;
            return Ok(ProbeOutcome::NotFound);
        }

        if classifier
            .detect(driver, &[Marker::SignupClosed])
            .await?
            .is_some()
        {
            driver.refresh().await?;
            return Ok(ProbeOutcome::SignupClosed);
        }

        driver.click(first_result).await?;

        let outcome = self
            .slot
            .until(move || async move {
                Ok(classifier
                    .detect(driver, &Marker::SLOT_PRIORITY)
                    .await?
                    .and_then(Marker::slot_outcome))
            })
            .await?;

        let outcome = outcome.unwrap_or_else(|| {
            warn!(code, "Exam-slot view showed no known marker within {:?}", self.slot.timeout());
            ProbeOutcome::TimedOut
        });

        driver.refresh().await?;
        Ok(outcome)
    }

    /// Probe every course in order, stopping at the first fatal error
    pub async fn probe_all(&self, driver: &dyn PageDriver, courses: &[Course]) -> Result<ProbeReport> {
        let mut report = ProbeReport::default();

        for course in courses {
            let outcome = self.probe(driver, course).await?;
            info!(code = course.code(), outcome = %outcome, "Probed course");
            report.push(course.clone(), outcome);
        }

        Ok(report)
    }
}

/// Outcomes of one run, in probe order
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    results: Vec<(Course, ProbeOutcome)>,
    available: AvailableCourses,
}

impl ProbeReport {
    fn push(&mut self, course: Course, outcome: ProbeOutcome) {
        self.available.record(&course, outcome);
        self.results.push((course, outcome));
    }

    pub fn results(&self) -> &[(Course, ProbeOutcome)] {
        &self.results
    }

    pub fn available(&self) -> &AvailableCourses {
        &self.available
    }

    pub fn count(&self, outcome: ProbeOutcome) -> usize {
        self.results.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// e.g. `3 probed: 1 available, 2 not_found`
    pub fn summary(&self) -> String {
        let order = [
            ProbeOutcome::Available,
            ProbeOutcome::Unavailable,
            ProbeOutcome::SignupClosed,
            ProbeOutcome::NotInProgram,
            ProbeOutcome::NotFound,
            ProbeOutcome::TimedOut,
        ];
        let parts: Vec<String> = order
            .iter()
            .filter_map(|outcome| match self.count(*outcome) {
                0 => None,
                n => Some(format!("{} {}", n, outcome)),
            })
            .collect();

        if parts.is_empty() {
            format!("{} probed", self.results.len())
        } else {
            format!("{} probed: {}", self.results.len(), parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(code: &str) -> Course {
        Course::new(code, "", false).unwrap()
    }

    #[test]
    fn test_report_keeps_only_available() {
        let mut report = ProbeReport::default();
        report.push(course("CS101"), ProbeOutcome::Available);
        report.push(course("CS202"), ProbeOutcome::NotFound);
        report.push(course("CS303"), ProbeOutcome::TimedOut);

        assert_eq!(report.results().len(), 3);
        let codes: Vec<&str> = report.available().as_slice().iter().map(Course::code).collect();
        assert_eq!(codes, vec!["CS101"]);
    }

    #[test]
    fn test_summary() {
        let mut report = ProbeReport::default();
        assert_eq!(report.summary(), "0 probed");

        report.push(course("CS101"), ProbeOutcome::NotFound);
        report.push(course("CS202"), ProbeOutcome::Available);
        report.push(course("CS303"), ProbeOutcome::NotFound);
        assert_eq!(report.summary(), "3 probed: 1 available, 2 not_found");
        assert_eq!(report.count(ProbeOutcome::NotFound), 2);
    }
}
