//! Marker table of a dataset.
//!
//! Parses the `MarkerFile.mrk` written by the acquisition software. Each marker
//! class contributes a list of `(trial, time)` events in file order. A dataset
//! without a marker file simply has no markers.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, VprojError};

pub const MARKER_FILE_NAME: &str = "MarkerFile.mrk";

/// One occurrence of a marker: trial index and time in seconds from the
/// trial's sync point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerEvent {
    pub trial: usize,
    pub time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Markers {
    marks: HashMap<String, Vec<MarkerEvent>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    Mark,
    Num,
    List,
}

impl Markers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `MarkerFile.mrk` from a dataset directory. A missing file yields
    /// an empty table.
    pub fn load(dataset_dir: &Path) -> Result<Self> {
        let path = dataset_dir.join(MARKER_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No marker file in {}", dataset_dir.display());
                Ok(Self::new())
            }
            Err(e) => Err(VprojError::Io(e)),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut markers = Self::new();
        let mut lines = content.lines();
        let mut state = ParseState::Start;
        let mut name = String::new();
        let mut count = 0usize;

        while let Some(line) = lines.next() {
            let key = line.split(':').next().unwrap_or("");
            match state {
                ParseState::Start => {
                    if key == "CLASSGROUPID" {
                        state = ParseState::Mark;
                    }
                }
                ParseState::Mark => {
                    if key == "NAME" {
                        name = next_token(&mut lines, "marker name")?.to_string();
                        state = ParseState::Num;
                    }
                }
                ParseState::Num => {
                    if key == "NUMBER OF SAMPLES" {
                        let token = next_token(&mut lines, "sample count")?;
                        count = token.parse().map_err(|_| {
                            VprojError::Format(format!(
                                "Bad sample count '{}' for marker {}",
                                token, name
                            ))
                        })?;
                        state = ParseState::List;
                    }
                }
                ParseState::List => {
                    // This line opens the list; the next one is its column header.
                    lines.next();
                    for _ in 0..count {
                        let row = lines.next().ok_or_else(|| {
                            VprojError::Format(format!("Marker {} ends early", name))
                        })?;
                        let event = parse_event(row, &name)?;
                        markers.add(&name, event);
                    }
                    state = ParseState::Start;
                }
            }
        }

        Ok(markers)
    }

    pub fn add(&mut self, name: &str, event: MarkerEvent) {
        self.marks.entry(name.to_string()).or_default().push(event);
    }

    /// Events for a marker in file order, empty for an unknown name.
    pub fn get(&self, name: &str) -> &[MarkerEvent] {
        self.marks.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sorted marker names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.marks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

fn next_token<'a>(lines: &mut std::str::Lines<'a>, what: &str) -> Result<&'a str> {
    lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .ok_or_else(|| VprojError::Format(format!("Marker file is missing the {}", what)))
}

fn parse_event(row: &str, name: &str) -> Result<MarkerEvent> {
    let mut fields = row.split_whitespace();
    let bad = || VprojError::Format(format!("Bad sample line '{}' for marker {}", row.trim(), name));
    let trial = fields
        .next()
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(bad)?;
    let time = fields
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(bad)?;
    Ok(MarkerEvent { trial, time })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "PATH OF DATASET:
/data/subj01.ds


NUMBER OF MARKERS:
2


CLASSGROUPID:
3
NAME:
stim
COMMENT:

COLOR:
blue
EDITABLE:
Yes
CLASSID:
1
NUMBER OF SAMPLES:
3
LIST OF SAMPLES:
TRIAL NUMBER\t\tTIME FROM SYNC POINT (in seconds)
                  +0\t\t\t\t     +1.5000000000e-01
                  +0\t\t\t\t     +2.0000000000e+00
                  +2\t\t\t\t     +5.0000000000e-01


CLASSGROUPID:
3
NAME:
resp
COMMENT:

NUMBER OF SAMPLES:
1
LIST OF SAMPLES:
TRIAL NUMBER\t\tTIME FROM SYNC POINT (in seconds)
                  +1\t\t\t\t     -2.5000000000e-01

";

    #[test]
    fn test_parse_marker_classes() {
        let markers = Markers::parse(SAMPLE).unwrap();
        assert_eq!(markers.names(), vec!["resp", "stim"]);

        let stim = markers.get("stim");
        assert_eq!(stim.len(), 3);
        assert_eq!(stim[0], MarkerEvent { trial: 0, time: 0.15 });
        assert_eq!(stim[1], MarkerEvent { trial: 0, time: 2.0 });
        assert_eq!(stim[2], MarkerEvent { trial: 2, time: 0.5 });

        assert_eq!(markers.get("resp"), &[MarkerEvent { trial: 1, time: -0.25 }]);
    }

    #[test]
    fn test_unknown_marker_is_empty() {
        let markers = Markers::parse(SAMPLE).unwrap();
        assert!(markers.get("nope").is_empty());
    }

    #[test]
    fn test_truncated_list_is_error() {
        let truncated = "CLASSGROUPID:\n3\nNAME:\nstim\nNUMBER OF SAMPLES:\n2\nLIST OF SAMPLES:\nTRIAL NUMBER\n +0 +0.1\n";
        assert!(Markers::parse(truncated).is_err());
    }

    #[test]
    fn test_missing_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let markers = Markers::load(dir.path()).unwrap();
        assert!(markers.is_empty());
    }
}
