//! Segment resolution: labels + time window → ordered, equal-length windows.

use crate::error::{Result, VprojError};
use crate::recording::RecordingReader;
use crate::types::{round_half_up, Segment, TimeWindow};

/// Occurrences of one label, as `(trial, sample offset)` pairs, and the
/// segment length they were cut with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentList {
    pub occurrences: Vec<(usize, usize)>,
    pub seg_len: usize,
}

/// Finds where a label occurs inside the recording
pub trait SegmentLookup {
    /// Occurrences of `label` for the window, in discovery order. Unknown
    /// labels yield an empty list.
    fn segment_list(&self, label: &str, window: TimeWindow) -> Result<SegmentList>;
}

/// Segments of a run, sorted by `(trial, offset)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    pub segments: Vec<Segment>,
    pub seg_len: usize,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Per-row labels in output order
    pub fn trial_marks(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.label.clone()).collect()
    }

    /// Number of distinct trials, i.e. filter passes needed in sorted order
    pub fn distinct_trials(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for segment in &self.segments {
            if last != Some(segment.trial) {
                count += 1;
                last = Some(segment.trial);
            }
        }
        count
    }
}

/// Segment length in samples for a window, rejecting empty windows.
pub fn window_len(window: TimeWindow, sample_rate: f64) -> Result<usize> {
    let len = window.sample_len(sample_rate);
    if len <= 0 {
        return Err(VprojError::InvalidParameter(format!(
            "Time window [{}, {}] is empty at {} Hz",
            window.t0, window.t1, sample_rate
        )));
    }
    Ok(len as usize)
}

/// Resolve every label into segments and merge them into one ordered plan.
///
/// All lookups run before anything is emitted, so a label whose segment length
/// disagrees with the window fails the run without producing output.
pub fn resolve_segments(
    labels: &[String],
    window: TimeWindow,
    sample_rate: f64,
    lookup: &dyn SegmentLookup,
) -> Result<SegmentPlan> {
    let seg_len = window_len(window, sample_rate)?;

    let mut lists = Vec::with_capacity(labels.len());
    for label in labels {
        let list = lookup.segment_list(label, window)?;
        if list.seg_len != seg_len {
            return Err(VprojError::Validation(format!(
                "Label '{}' yields segments of {} samples, expected {}",
                label, list.seg_len, seg_len
            )));
        }
        log::info!("Label '{}': {} segments", label, list.occurrences.len());
        lists.push((label, list));
    }

    let mut segments: Vec<Segment> = lists
        .into_iter()
        .flat_map(|(label, list)| {
            list.occurrences
                .into_iter()
                .map(move |(trial, offset)| Segment {
                    trial,
                    offset,
                    label: label.clone(),
                })
        })
        .collect();

    // Stable: equal (trial, offset) keep label discovery order.
    segments.sort_by_key(|s| (s.trial, s.offset));

    Ok(SegmentPlan { segments, seg_len })
}

/// Segment lookup driven by the recording's marker table
pub struct MarkerSegmentLookup<'a, R: RecordingReader + ?Sized> {
    reader: &'a R,
}

impl<'a, R: RecordingReader + ?Sized> MarkerSegmentLookup<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }
}

impl<R: RecordingReader + ?Sized> SegmentLookup for MarkerSegmentLookup<'_, R> {
    fn segment_list(&self, label: &str, window: TimeWindow) -> Result<SegmentList> {
        let sample_rate = self.reader.sample_rate();
        let seg_len = window_len(window, sample_rate)?;
        let num_samples = self.reader.num_samples();
        if seg_len > num_samples {
            return Err(VprojError::InvalidParameter(format!(
                "Time window [{}, {}] spans {} samples, trials hold {}",
                window.t0, window.t1, seg_len, num_samples
            )));
        }
        let num_trials = self.reader.num_trials();
        let pre_trigger = self.reader.pre_trigger_samples() as i64;

        let mut occurrences = Vec::new();
        for event in self.reader.marker_events(label) {
            let start = round_half_up((event.time + window.t0) * sample_rate)
                .checked_add(pre_trigger)
                .filter(|&start| start >= 0);
            let end = start.and_then(|start| start.checked_add(seg_len as i64));
            let (Some(start), Some(end)) = (start, end) else {
                log::warn!(
                    "Dropping '{}' at trial {} t={}: window does not fit in the trial",
                    label,
                    event.trial,
                    event.time
                );
                continue;
            };
            if event.trial >= num_trials || end > num_samples as i64 {
                log::warn!(
                    "Dropping '{}' at trial {} t={}: window does not fit in the trial",
                    label,
                    event.trial,
                    event.time
                );
                continue;
            }
            occurrences.push((event.trial, start as usize));
        }

        Ok(SegmentList {
            occurrences,
            seg_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{MarkerEvent, Markers};
    use crate::recording::TrialData;
    use std::collections::HashMap;

    struct FixedLookup {
        lists: HashMap<String, SegmentList>,
    }

    impl FixedLookup {
        fn new(entries: &[(&str, &[(usize, usize)], usize)]) -> Self {
            let lists = entries
                .iter()
                .map(|(label, occ, len)| {
                    (
                        label.to_string(),
                        SegmentList {
                            occurrences: occ.to_vec(),
                            seg_len: *len,
                        },
                    )
                })
                .collect();
            Self { lists }
        }
    }

    impl SegmentLookup for FixedLookup {
        fn segment_list(&self, label: &str, window: TimeWindow) -> Result<SegmentList> {
            Ok(self.lists.get(label).cloned().unwrap_or(SegmentList {
                occurrences: Vec::new(),
                seg_len: window.sample_len(100.0) as usize,
            }))
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_and_sort() {
        let lookup = FixedLookup::new(&[
            ("A", &[(1, 10), (0, 50)], 100),
            ("B", &[(0, 20), (1, 5)], 100),
        ]);
        let plan =
            resolve_segments(&labels(&["A", "B"]), TimeWindow::new(0.0, 1.0), 100.0, &lookup)
                .unwrap();

        let order: Vec<(usize, usize, &str)> = plan
            .segments
            .iter()
            .map(|s| (s.trial, s.offset, s.label.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, 20, "B"), (0, 50, "A"), (1, 5, "B"), (1, 10, "A")]
        );
        assert_eq!(plan.seg_len, 100);
        assert_eq!(plan.distinct_trials(), 2);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let lookup = FixedLookup::new(&[
            ("A", &[(0, 30), (2, 0)], 100),
            ("B", &[(0, 30), (2, 0)], 100),
        ]);
        let plan =
            resolve_segments(&labels(&["A", "B"]), TimeWindow::new(0.0, 1.0), 100.0, &lookup)
                .unwrap();
        assert_eq!(plan.trial_marks(), labels(&["A", "B", "A", "B"]));
    }

    #[test]
    fn test_per_label_order_preserved() {
        let lookup = FixedLookup::new(&[
            ("A", &[(0, 0), (0, 40), (3, 7)], 100),
            ("B", &[(1, 0), (2, 0)], 100),
        ]);
        let plan =
            resolve_segments(&labels(&["A", "B"]), TimeWindow::new(0.0, 1.0), 100.0, &lookup)
                .unwrap();
        let a_rows: Vec<(usize, usize)> = plan
            .segments
            .iter()
            .filter(|s| s.label == "A")
            .map(|s| (s.trial, s.offset))
            .collect();
        assert_eq!(a_rows, vec![(0, 0), (0, 40), (3, 7)]);
    }

    #[test]
    fn test_length_mismatch_is_validation_error() {
        let lookup = FixedLookup::new(&[("A", &[(0, 0)], 100), ("B", &[(1, 0)], 99)]);
        let result =
            resolve_segments(&labels(&["A", "B"]), TimeWindow::new(0.0, 1.0), 100.0, &lookup);
        assert!(matches!(result, Err(VprojError::Validation(_))));
    }

    #[test]
    fn test_empty_labels() {
        let lookup = FixedLookup::new(&[]);
        let plan = resolve_segments(&[], TimeWindow::new(0.0, 0.5), 100.0, &lookup).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.seg_len, 50);
    }

    #[test]
    fn test_empty_window_rejected() {
        let lookup = FixedLookup::new(&[]);
        assert!(resolve_segments(&[], TimeWindow::new(1.0, 1.0), 100.0, &lookup).is_err());
    }

    struct MarkerOnly {
        markers: Markers,
        pre_trigger: usize,
    }

    impl RecordingReader for MarkerOnly {
        fn sample_rate(&self) -> f64 {
            100.0
        }
        fn num_samples(&self) -> usize {
            200
        }
        fn num_channels(&self) -> usize {
            1
        }
        fn num_trials(&self) -> usize {
            2
        }
        fn pre_trigger_samples(&self) -> usize {
            self.pre_trigger
        }
        fn read_trial(&self, _trial: usize) -> Result<TrialData> {
            Ok(vec![vec![0.0; 200]])
        }
        fn marker_events(&self, label: &str) -> Vec<MarkerEvent> {
            self.markers.get(label).to_vec()
        }
    }

    #[test]
    fn test_marker_lookup_offsets_and_bounds() {
        let mut markers = Markers::new();
        for (trial, time) in [(0, 0.2), (1, 0.5), (1, 1.5), (5, 0.1), (0, -0.3)] {
            markers.add("A", MarkerEvent { trial, time });
        }
        let reader = MarkerOnly {
            markers,
            pre_trigger: 0,
        };
        let lookup = MarkerSegmentLookup::new(&reader);

        let list = lookup.segment_list("A", TimeWindow::new(0.0, 1.0)).unwrap();
        // t=1.5 overruns the trial, trial 5 does not exist, t=-0.3 starts before it
        assert_eq!(list.occurrences, vec![(0, 20), (1, 50)]);
        assert_eq!(list.seg_len, 100);

        assert!(lookup
            .segment_list("missing", TimeWindow::new(0.0, 1.0))
            .unwrap()
            .occurrences
            .is_empty());
    }

    #[test]
    fn test_marker_lookup_rejects_window_longer_than_trial() {
        let mut markers = Markers::new();
        markers.add("A", MarkerEvent { trial: 0, time: 0.5 });
        let reader = MarkerOnly {
            markers,
            pre_trigger: 0,
        };
        let lookup = MarkerSegmentLookup::new(&reader);

        let result = resolve_segments(
            &labels(&["A"]),
            TimeWindow::new(0.0, 1e300),
            100.0,
            &lookup,
        );
        assert!(matches!(result, Err(VprojError::InvalidParameter(_))));
        assert!(lookup.segment_list("A", TimeWindow::new(0.0, 2.5)).is_err());
        // Exactly one trial long still fits at offset 0
        let list = lookup.segment_list("A", TimeWindow::new(-0.5, 1.5)).unwrap();
        assert_eq!(list.occurrences, vec![(0, 0)]);
    }

    #[test]
    fn test_marker_lookup_drops_far_offsets() {
        let mut markers = Markers::new();
        markers.add("A", MarkerEvent { trial: 0, time: 1e300 });
        markers.add("A", MarkerEvent { trial: 0, time: -1e300 });
        markers.add("A", MarkerEvent { trial: 1, time: 0.0 });
        let reader = MarkerOnly {
            markers,
            pre_trigger: 0,
        };
        let list = MarkerSegmentLookup::new(&reader)
            .segment_list("A", TimeWindow::new(0.0, 1.0))
            .unwrap();
        assert_eq!(list.occurrences, vec![(1, 0)]);
    }

    #[test]
    fn test_marker_lookup_pre_trigger() {
        let mut markers = Markers::new();
        markers.add("A", MarkerEvent { trial: 0, time: -0.3 });
        let reader = MarkerOnly {
            markers,
            pre_trigger: 50,
        };
        let lookup = MarkerSegmentLookup::new(&reader);
        let list = lookup.segment_list("A", TimeWindow::new(-0.1, 0.4)).unwrap();
        assert_eq!(list.occurrences, vec![(0, 10)]);
        assert_eq!(list.seg_len, 50);
    }
}
