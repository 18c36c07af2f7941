//! The interchange file: filtered segments plus the run metadata that
//! produced them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::{FilteredTrial, TrialFilterCache};
use crate::container::{read_container, ContainerKind, ContainerWriter, Payload};
use crate::error::{Result, VprojError};
use crate::recording::RecordingReader;
use crate::segments::SegmentPlan;
use crate::types::{Band, NumericKind, TimeWindow};

/// Run metadata stored with the filtered segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeHeader {
    pub sample_rate: f64,
    pub band: [f64; 2],
    pub time: [f64; 2],
    /// Labels requested for the run, in request order
    pub marks: Vec<String>,
    pub noise: bool,
    pub hilbert: bool,
    /// Label of each payload row
    pub trialmarks: Vec<String>,
}

impl InterchangeHeader {
    pub fn new(
        sample_rate: f64,
        band: Band,
        window: TimeWindow,
        marks: Vec<String>,
        noise: bool,
        hilbert: bool,
        plan: &SegmentPlan,
    ) -> Self {
        Self {
            sample_rate,
            band: band.as_array(),
            time: window.as_array(),
            marks,
            noise,
            hilbert,
            trialmarks: plan.trial_marks(),
        }
    }

    pub fn numeric_kind(&self) -> NumericKind {
        NumericKind::from_hilbert(self.hilbert)
    }
}

/// Interchange file as read back: header and `(segments, channels, seg_len)`
/// payload
#[derive(Debug, Clone, PartialEq)]
pub struct InterchangeFile {
    pub header: InterchangeHeader,
    pub payload: Payload,
}

impl InterchangeFile {
    pub fn read(path: &Path) -> Result<Self> {
        let (header, payload): (InterchangeHeader, Payload) =
            read_container(path, ContainerKind::Interchange)?;

        if payload.kind() != header.numeric_kind() {
            return Err(VprojError::Format(format!(
                "{}: header says hilbert={} but payload is {:?}",
                path.display(),
                header.hilbert,
                payload.kind()
            )));
        }
        if header.trialmarks.len() != payload.dims[0] {
            return Err(VprojError::Format(format!(
                "{}: {} row labels for {} rows",
                path.display(),
                header.trialmarks.len(),
                payload.dims[0]
            )));
        }

        Ok(Self { header, payload })
    }

    pub fn num_segments(&self) -> usize {
        self.payload.dims[0]
    }

    pub fn num_channels(&self) -> usize {
        self.payload.dims[1]
    }

    pub fn seg_len(&self) -> usize {
        self.payload.dims[2]
    }
}

/// Cut every planned segment out of its filtered trial and write them, in
/// plan order, as one interchange file.
pub fn write_interchange<R: RecordingReader + ?Sized>(
    path: &Path,
    header: &InterchangeHeader,
    plan: &SegmentPlan,
    cache: &mut TrialFilterCache<'_, R>,
    num_channels: usize,
) -> Result<PathBuf> {
    let kind = cache.output_kind();
    if kind != header.numeric_kind() {
        return Err(VprojError::InvalidParameter(format!(
            "Filter produces {:?} output but header says hilbert={}",
            kind, header.hilbert
        )));
    }

    let seg_len = plan.seg_len;
    let mut writer = ContainerWriter::create(
        path,
        ContainerKind::Interchange,
        header,
        kind,
        [plan.len(), num_channels, seg_len],
    )?;

    for segment in &plan.segments {
        let range = segment.offset..segment.offset + seg_len;
        match cache.get(segment.trial)? {
            FilteredTrial::Real(rows) => {
                let mut row = Vec::with_capacity(num_channels * seg_len);
                for channel in rows {
                    row.extend_from_slice(slice_channel(channel.as_slice(), &range, segment.trial)?);
                }
                writer.write_real_row(&row)?;
            }
            FilteredTrial::Complex(rows) => {
                let mut row = Vec::with_capacity(num_channels * seg_len);
                for channel in rows {
                    row.extend_from_slice(slice_channel(channel.as_slice(), &range, segment.trial)?);
                }
                writer.write_complex_row(&row)?;
            }
        }
    }

    log::info!(
        "Wrote {} segments ({} channels × {} samples) to {}",
        plan.len(),
        num_channels,
        seg_len,
        path.display()
    );
    writer.finish()
}

fn slice_channel<'a, T>(
    channel: &'a [T],
    range: &std::ops::Range<usize>,
    trial: usize,
) -> Result<&'a [T]> {
    channel.get(range.clone()).ok_or_else(|| {
        VprojError::InvalidParameter(format!(
            "Segment {}..{} exceeds trial {} ({} samples)",
            range.start,
            range.end,
            trial,
            channel.len()
        ))
    })
}
