//! Page classification by marker phrase
//!
//! The portal exposes no machine-readable state, so a page is classified by
//! searching its rendered HTML for configured literal phrases.

use anyhow::Result;

use crate::config::MarkerConfig;
use crate::tools::PageDriver;
use crate::types::ProbeOutcome;

/// A page state recognised by its marker phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The search filter matched nothing
    NoResults,
    /// The course is listed but its sign-up is closed
    SignupClosed,
    /// Exam-slot view: signing up is not possible
    Unable,
    /// Exam-slot view: a slot can be selected
    Available,
    /// Exam-slot view: the course is outside the student's programme
    NotInProgram,
}

impl Marker {
    /// Exam-slot markers in tie-break order; the first match wins
    pub const SLOT_PRIORITY: [Marker; 3] = [Marker::Unable, Marker::Available, Marker::NotInProgram];

    /// Outcome a slot-view marker resolves to
    pub fn slot_outcome(self) -> Option<ProbeOutcome> {
        match self {
            Marker::Unable => Some(ProbeOutcome::Unavailable),
            Marker::Available => Some(ProbeOutcome::Available),
            Marker::NotInProgram => Some(ProbeOutcome::NotInProgram),
            Marker::NoResults | Marker::SignupClosed => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageClassifier {
    markers: MarkerConfig,
}

impl PageClassifier {
    pub fn new(markers: MarkerConfig) -> Self {
        Self { markers }
    }

    pub fn phrase(&self, marker: Marker) -> &str {
        match marker {
            Marker::NoResults => &self.markers.no_results,
            Marker::SignupClosed => &self.markers.signup_closed,
            Marker::Unable => &self.markers.unable,
            Marker::Available => &self.markers.available,
            Marker::NotInProgram => &self.markers.not_in_program,
        }
    }

    /// First of `candidates`, in the given order, whose phrase occurs in `html`
    pub fn detect_in(&self, html: &str, candidates: &[Marker]) -> Option<Marker> {
        candidates
            .iter()
            .copied()
            .find(|marker| html.contains(self.phrase(*marker)))
    }

    /// Classify the page currently shown by `driver`
    pub async fn detect(
        &self,
        driver: &dyn PageDriver,
        candidates: &[Marker],
    ) -> Result<Option<Marker>> {
        let html = driver.page_html().await?;
        Ok(self.detect_in(&html, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PageClassifier {
        PageClassifier::new(MarkerConfig::default())
    }

    #[test]
    fn test_detects_each_slot_marker() {
        let c = classifier();
        let page = |text: &str| format!("<ion-content><p>{}</p></ion-content>", text);

        assert_eq!(
            c.detect_in(&page("Helaas, je kunt je niet inschrijven"), &Marker::SLOT_PRIORITY),
            Some(Marker::Unable)
        );
        assert_eq!(
            c.detect_in(&page("Selecteer een toetsgelegenheid"), &Marker::SLOT_PRIORITY),
            Some(Marker::Available)
        );
        assert_eq!(
            c.detect_in(
                &page("Deze cursus maakt geen deel uit van je programma"),
                &Marker::SLOT_PRIORITY
            ),
            Some(Marker::NotInProgram)
        );
        assert_eq!(c.detect_in(&page("Laden..."), &Marker::SLOT_PRIORITY), None);
    }

    #[test]
    fn test_priority_order_breaks_ties() {
        let html = "Selecteer een toetsgelegenheid ... Helaas";
        assert_eq!(
            classifier().detect_in(html, &Marker::SLOT_PRIORITY),
            Some(Marker::Unable)
        );
        // Candidate order is the only thing that decides
        assert_eq!(
            classifier().detect_in(html, &[Marker::Available, Marker::Unable]),
            Some(Marker::Available)
        );
    }

    #[test]
    fn test_custom_phrases() {
        let c = PageClassifier::new(MarkerConfig {
            no_results: "No search results".to_string(),
            ..MarkerConfig::default()
        });
        assert_eq!(
            c.detect_in("<div>No search results</div>", &[Marker::NoResults]),
            Some(Marker::NoResults)
        );
        assert_eq!(c.detect_in("Geen zoekresultaten", &[Marker::NoResults]), None);
    }

    #[test]
    fn test_slot_outcomes() {
        assert_eq!(Marker::Available.slot_outcome(), Some(ProbeOutcome::Available));
        assert_eq!(Marker::Unable.slot_outcome(), Some(ProbeOutcome::Unavailable));
        assert_eq!(Marker::NotInProgram.slot_outcome(), Some(ProbeOutcome::NotInProgram));
        assert_eq!(Marker::NoResults.slot_outcome(), None);
    }
}
