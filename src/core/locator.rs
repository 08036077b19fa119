// ordertail - core/locator.rs
//
// File Locator: resolves the single currently-active log file under the
// rotating `<root>/node_order_statuses/hourly/<YYYYMMDD>/<H>` layout.

use crate::util::constants::{HOURLY_SUBPATH, MAX_HOUR, MIN_HOUR};
use crate::util::error::LocatorError;
use std::fs;
use std::path::{Path, PathBuf};

/// Stateless resolver over a rooted hourly directory layout. Holds no
/// cursor or cache; every call performs a fresh directory scan so that
/// rotation is visible immediately to every caller.
#[derive(Debug, Clone)]
pub struct Locator {
    root: PathBuf,
}

impl Locator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the path of the file currently being appended to, or `None`
    /// if no valid date/hour partition exists yet. Absence is routine —
    /// callers MUST treat it as "try again later," never as fatal.
    pub fn current_file(&self) -> Result<Option<PathBuf>, LocatorError> {
        let hourly_root = self.root.join(HOURLY_SUBPATH);

        let date_dirs = match read_dir_names(&hourly_root) {
            Ok(names) => names,
            Err(LocatorErrorOrAbsent::Absent) => return Ok(None),
            Err(LocatorErrorOrAbsent::Error(e)) => return Err(e),
        };

        let mut valid_dates: Vec<String> = date_dirs
            .into_iter()
            .filter(|name| is_valid_calendar_date(name))
            .collect();
        valid_dates.sort();

        // Walk dates from most recent to least recent; skip any date
        // directory that turns out to have no valid hour file.
        while let Some(date) = valid_dates.pop() {
            let date_dir = hourly_root.join(&date);
            let hour_files = match read_dir_names(&date_dir) {
                Ok(names) => names,
                Err(LocatorErrorOrAbsent::Absent) => continue,
                Err(LocatorErrorOrAbsent::Error(e)) => return Err(e),
            };

            let max_hour = hour_files
                .iter()
                .filter_map(|name| name.parse::<u32>().ok())
                .filter(|h| (MIN_HOUR..=MAX_HOUR).contains(h))
                .max();

            if let Some(hour) = max_hour {
                return Ok(Some(date_dir.join(hour.to_string())));
            }
        }

        Ok(None)
    }
}

enum LocatorErrorOrAbsent {
    Absent,
    Error(LocatorError),
}

/// List the entry names of a directory, treating "does not exist" as
/// `Absent` rather than an error, and anything else (permission denied,
/// not a directory) as a genuine `LocatorError`.
fn read_dir_names(dir: &Path) -> Result<Vec<String>, LocatorErrorOrAbsent> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LocatorErrorOrAbsent::Absent)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LocatorErrorOrAbsent::Error(LocatorError::PermissionDenied {
                path: dir.to_path_buf(),
                source: e,
            }))
        }
        Err(_) => return Err(LocatorErrorOrAbsent::Absent),
    };

    let mut names = Vec::new();
    for entry in entries.flatten() {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

/// A valid date directory name is exactly 8 ASCII digits parsing as a
/// real calendar date (`YYYYMMDD`). Non-matching names are ignored
/// silently, per the locator's layout contract.
fn is_valid_calendar_date(name: &str) -> bool {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let year: i32 = match name[0..4].parse() {
        Ok(y) => y,
        Err(_) => return false,
    };
    let month: u32 = match name[4..6].parse() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let day: u32 = match name[6..8].parse() {
        Ok(d) => d,
        Err(_) => return false,
    };
    chrono::NaiveDate::from_ymd_opt(year, month, day).is_some()
}
