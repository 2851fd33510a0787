//! Shared types used across modules
//!
//! Courses are validated once at construction; there is no way to build a
//! `Course` or `CourseSet` that bypasses those checks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{RegistrateError, Result};

/// A tracked course
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    code: String,
    name: String,
    completed: bool,
}

impl Course {
    /// Create a course. The code is trimmed and must not be empty.
    pub fn new(code: impl Into<String>, name: impl Into<String>, completed: bool) -> Result<Self> {
        let code = code.into().trim().to_string();
        if code.is_empty() {
            return Err(RegistrateError::InvalidCourse(
                "course code must not be empty".to_string(),
            ));
        }
        if code.contains(char::is_whitespace) {
            return Err(RegistrateError::InvalidCourse(format!(
                "course code '{}' contains whitespace",
                code
            )));
        }

        Ok(Self {
            code,
            name: name.into().trim().to_string(),
            completed,
        })
    }

    /// Search key used on the portal
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl std::fmt::Display for Course {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.name)
        }
    }
}

/// Ordered collection of courses with unique codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseSet {
    courses: Vec<Course>,
}

impl CourseSet {
    /// Build a set, rejecting duplicate codes (case-insensitive).
    pub fn new(courses: Vec<Course>) -> Result<Self> {
        let mut seen = HashSet::new();
        for course in &courses {
            if !seen.insert(code_key(&course.code)) {
                return Err(RegistrateError::InvalidCourse(format!(
                    "duplicate course code '{}'",
                    course.code
                )));
            }
        }
        Ok(Self { courses })
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Course> {
        self.courses.iter()
    }

    pub fn get(&self, code: &str) -> Option<&Course> {
        self.position(code).map(|idx| &self.courses[idx])
    }

    /// Courses still eligible for probing, in their original order
    pub fn incomplete(&self) -> Vec<Course> {
        self.courses
            .iter()
            .filter(|course| !course.completed)
            .cloned()
            .collect()
    }

    /// Append a course; fails when the code is already tracked.
    pub fn add(&mut self, course: Course) -> Result<()> {
        if self.position(&course.code).is_some() {
            return Err(RegistrateError::InvalidCourse(format!(
                "course '{}' is already tracked",
                course.code
            )));
        }
        self.courses.push(course);
        Ok(())
    }

    /// Mark a course completed so it is no longer probed.
    pub fn complete(&mut self, code: &str) -> Result<()> {
        let idx = self.position(code).ok_or_else(|| unknown_course(code))?;
        self.courses[idx].completed = true;
        Ok(())
    }

    pub fn remove(&mut self, code: &str) -> Result<Course> {
        let idx = self.position(code).ok_or_else(|| unknown_course(code))?;
        Ok(self.courses.remove(idx))
    }

    fn position(&self, code: &str) -> Option<usize> {
        let key = code_key(code);
        self.courses
            .iter()
            .position(|course| code_key(&course.code) == key)
    }
}

/// Comparison key for course codes; every uniqueness check goes through it
fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}

fn unknown_course(code: &str) -> RegistrateError {
    RegistrateError::InvalidCourse(format!("course '{}' is not tracked", code))
}

impl std::fmt::Display for CourseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self.courses.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Classification of one probe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    NotFound,
    SignupClosed,
    Unavailable,
    Available,
    NotInProgram,
    TimedOut,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::NotFound => "not_found",
            ProbeOutcome::SignupClosed => "signup_closed",
            ProbeOutcome::Unavailable => "unavailable",
            ProbeOutcome::Available => "available",
            ProbeOutcome::NotInProgram => "not_in_program",
            ProbeOutcome::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Courses found open for sign-up during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableCourses {
    courses: Vec<Course>,
}

impl AvailableCourses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe result. Only `Available` outcomes are kept, and a course
    /// is kept at most once. Returns whether the course was appended.
    pub fn record(&mut self, course: &Course, outcome: ProbeOutcome) -> bool {
        if outcome != ProbeOutcome::Available {
            return false;
        }
        if self.courses.iter().any(|c| c.code == course.code) {
            return false;
        }
        self.courses.push(course.clone());
        true
    }

    pub fn as_slice(&self) -> &[Course] {
        &self.courses
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(code: &str, name: &str, completed: bool) -> Course {
        Course::new(code, name, completed).unwrap()
    }

    #[test]
    fn test_course_requires_code() {
        assert!(Course::new("", "Nameless", false).is_err());
        assert!(Course::new("   ", "", false).is_err());
        assert!(Course::new("CS 101", "", false).is_err());

        let c = Course::new("  CS101 ", " Algorithms ", false).unwrap();
        assert_eq!(c.code(), "CS101");
        assert_eq!(c.name(), "Algorithms");
    }

    #[test]
    fn test_course_display() {
        assert_eq!(course("CS101", "Algorithms", false).to_string(), "CS101: Algorithms");
        assert_eq!(course("CS202", "", true).to_string(), "CS202");
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let result = CourseSet::new(vec![course("CS101", "", false), course("cs101", "", true)]);
        assert!(result.is_err());

        let mut set = CourseSet::new(vec![course("CS101", "", false)]).unwrap();
        assert!(set.add(course("CS101", "again", false)).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_non_ascii_codes_share_one_uniqueness_rule() {
        let mut set = CourseSet::new(vec![course("ÉTU101", "", false)]).unwrap();

        assert!(set.add(course("étu101", "", false)).is_err());
        assert_eq!(set.len(), 1);
        assert!(set.get("étu101").is_some());

        set.complete("étu101").unwrap();
        assert!(set.get("ÉTU101").unwrap().is_completed());
        assert!(CourseSet::new(set.iter().cloned().collect()).is_ok());
    }

    #[test]
    fn test_incomplete_keeps_order() {
        let set = CourseSet::new(vec![
            course("A1", "", false),
            course("B2", "", true),
            course("C3", "", false),
            course("D4", "", true),
            course("E5", "", false),
        ])
        .unwrap();

        let codes: Vec<String> = set.incomplete().iter().map(|c| c.code().to_string()).collect();
        assert_eq!(codes, vec!["A1", "C3", "E5"]);
    }

    #[test]
    fn test_incomplete_scenario() {
        let set = CourseSet::new(vec![
            course("CS101", "Algorithms", false),
            course("CS202", "", true),
        ])
        .unwrap();

        let incomplete = set.incomplete();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].code(), "CS101");
    }

    #[test]
    fn test_complete_and_remove() {
        let mut set = CourseSet::new(vec![course("CS101", "", false), course("CS202", "", false)]).unwrap();

        set.complete("cs101").unwrap();
        assert!(set.get("CS101").unwrap().is_completed());
        assert_eq!(set.incomplete().len(), 1);

        let removed = set.remove("CS202").unwrap();
        assert_eq!(removed.code(), "CS202");
        assert!(set.complete("CS202").is_err());
    }

    #[test]
    fn test_available_only_records_available() {
        let c = course("CS101", "", false);
        let mut available = AvailableCourses::new();

        for outcome in [
            ProbeOutcome::NotFound,
            ProbeOutcome::SignupClosed,
            ProbeOutcome::Unavailable,
            ProbeOutcome::NotInProgram,
            ProbeOutcome::TimedOut,
        ] {
            assert!(!available.record(&c, outcome));
        }
        assert!(available.is_empty());

        assert!(available.record(&c, ProbeOutcome::Available));
        assert!(!available.record(&c, ProbeOutcome::Available));
        assert_eq!(available.len(), 1);
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(ProbeOutcome::NotInProgram.to_string(), "not_in_program");
        assert_eq!(ProbeOutcome::TimedOut.as_str(), "timed_out");
    }
}
