//! Course list persistence
//!
//! Courses live in a CSV file with the columns `Code,Name,Completed`. Files
//! written by older versions carry an unnamed leading index column; it is
//! skipped on read and never written back.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{RegistrateError, Result};
use crate::types::{Course, CourseSet};

const HEADER: [&str; 3] = ["Code", "Name", "Completed"];

/// Persistence boundary for the tracked course list
pub trait CourseStore {
    fn load(&self) -> Result<CourseSet>;
    fn save(&self, courses: &CourseSet) -> Result<()>;
}

/// CSV-backed course store
#[derive(Debug, Clone)]
pub struct CsvCourseStore {
    path: PathBuf,
}

impl CsvCourseStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(RegistrateError::config(format!(
                "course file must be a .csv, got '{}'",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CourseStore for CsvCourseStore {
    fn load(&self) -> Result<CourseSet> {
        if !self.path.exists() {
            warn!("No course file at {}, starting with an empty list", self.path.display());
            return Ok(CourseSet::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(storage_error)?;

        let headers = reader.headers().map_err(storage_error)?.clone();
        let offset = column_offset(&headers)?;

        let mut courses = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(storage_error)?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let code = record.get(offset).unwrap_or("");
            let name = record.get(offset + 1).unwrap_or("");
            let completed = match record.get(offset + 2) {
                Some(value) => parse_bool(value).ok_or_else(|| {
                    RegistrateError::Storage(format!(
                        "row {}: '{}' is not a valid Completed value",
                        line + 2,
                        value
                    ))
                })?,
                None => false,
            };

            courses.push(Course::new(code, name, completed)?);
        }

        let set = CourseSet::new(courses)?;
        info!(count = set.len(), "Loaded courses from {}", self.path.display());
        Ok(set)
    }

    fn save(&self, courses: &CourseSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(storage_error)?;
            }
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path).map_err(storage_error)?;
            writer.write_record(HEADER).map_err(storage_error)?;
            for course in courses.iter() {
                writer
                    .write_record([
                        course.code(),
                        course.name(),
                        if course.is_completed() { "true" } else { "false" },
                    ])
                    .map_err(storage_error)?;
            }
            writer.flush().map_err(storage_error)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(storage_error)?;

        info!(count = courses.len(), "Saved courses to {}", self.path.display());
        Ok(())
    }
}

/// Index of the `Code` column; 1 when an unnamed index column precedes it.
fn column_offset(headers: &csv::StringRecord) -> Result<usize> {
    let position = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("code"));

    match position {
        Some(idx) if idx <= 1 => Ok(idx),
        Some(idx) => Err(RegistrateError::Storage(format!(
            "unexpected Code column at position {}",
            idx + 1
        ))),
        None => Err(RegistrateError::Storage(
            "course file has no Code column".to_string(),
        )),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

fn storage_error(err: impl std::fmt::Display) -> RegistrateError {
    RegistrateError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CsvCourseStore {
        CsvCourseStore::new(dir.path().join("courses.csv")).unwrap()
    }

    #[test]
    fn test_rejects_non_csv_path() {
        assert!(matches!(
            CsvCourseStore::new("courses.json"),
            Err(RegistrateError::Configuration(_))
        ));
        assert!(CsvCourseStore::new("Courses.CSV").is_ok());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = store_in(&dir).load().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_reads_indexed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            ",Code,Name,Completed\n0,CSE1100,Object-Oriented Programming,False\n1,CSE1200,,True\n",
        )
        .unwrap();

        let set = store.load().unwrap();
        let courses: Vec<&Course> = set.iter().collect();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].code(), "CSE1100");
        assert_eq!(courses[0].name(), "Object-Oriented Programming");
        assert!(!courses[0].is_completed());
        assert_eq!(courses[1].name(), "");
        assert!(courses[1].is_completed());
    }

    #[test]
    fn test_invalid_completed_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "Code,Name,Completed\nCS101,Algorithms,maybe\n").unwrap();

        assert!(matches!(store.load(), Err(RegistrateError::Storage(_))));
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "Code,Name,Completed\nCS101,,false\nCS101,,true\n").unwrap();

        assert!(matches!(store.load(), Err(RegistrateError::InvalidCourse(_))));
    }

    #[test]
    fn test_names_with_commas_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let set = CourseSet::new(vec![
            Course::new("WI1000", "Calculus, part \"one\"", false).unwrap(),
        ])
        .unwrap();

        store.save(&set).unwrap();
        assert_eq!(store.load().unwrap(), set);
        assert!(!dir.path().join("courses.csv.tmp").exists());
    }
}
