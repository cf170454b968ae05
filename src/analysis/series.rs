use std::ops::Range;

use chrono::{Local, NaiveDateTime};

use crate::analysis::error::{Result, StabilityError};
use crate::analysis::preprocess::boxcar_average;
use crate::analysis::units::{self, convert, convert_seconds, convert_time, DataKind, Units};

/// Timestamp layouts accepted from instrument logs, most common first.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses textual timestamps, remembering which format matched last.
///
/// The remembered format is only tried first; a miss falls back to the full list.
#[derive(Clone, Debug, Default)]
pub struct TimestampParser {
    hint: Option<usize>,
}

impl TimestampParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_format(&self) -> Option<&'static str> {
        self.hint.map(|idx| TIMESTAMP_FORMATS[idx])
    }

    pub fn parse(&mut self, text: &str) -> Result<NaiveDateTime> {
        let text = text.trim();
        if let Some(idx) = self.hint {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMATS[idx]) {
                return Ok(parsed);
            }
        }
        for (idx, format) in TIMESTAMP_FORMATS.iter().enumerate() {
            if Some(idx) == self.hint {
                continue;
            }
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                self.hint = Some(idx);
                return Ok(parsed);
            }
        }
        Err(StabilityError::UnknownTimestampFormat(text.to_string()))
    }
}

/// A timestamp as handed over by a provider: raw text or already parsed.
#[derive(Clone, Debug, PartialEq)]
pub enum Timestamp {
    Text(String),
    Parsed(NaiveDateTime),
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Timestamp::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Timestamp::Parsed(value)
    }
}

/// Equally spaced measurement series with optional timestamps and temperatures.
#[derive(Clone, Debug)]
pub struct Series {
    data: Vec<f64>,
    temp1: Vec<f64>,
    temp2: Vec<f64>,
    timestamps: Vec<NaiveDateTime>,
    tau0: Option<f64>,
    start_time: NaiveDateTime,
    data_units: Units,
    kind: DataKind,
    clean_len: usize, // samples already handed to the provider
    parser: TimestampParser,
}

impl Series {
    pub fn new(kind: DataKind, data_units: Units) -> Self {
        Self {
            data: Vec::new(),
            temp1: Vec::new(),
            temp2: Vec::new(),
            timestamps: Vec::new(),
            tau0: None,
            start_time: Local::now().naive_local(),
            data_units,
            kind,
            clean_len: 0,
            parser: TimestampParser::new(),
        }
    }

    /// Builds a series from plain samples at a fixed interval.
    pub fn from_samples(
        kind: DataKind,
        data_units: Units,
        tau0: f64,
        samples: Vec<f64>,
    ) -> Result<Self> {
        let mut series = Self::new(kind, data_units).with_tau0(tau0)?;
        series.data = samples;
        Ok(series)
    }

    pub fn with_tau0(mut self, tau0: f64) -> Result<Self> {
        if !(tau0 > 0.0) {
            return Err(StabilityError::InvalidSampling(format!(
                "tau0 must be positive, got {tau0}"
            )));
        }
        self.tau0 = Some(tau0);
        Ok(self)
    }

    pub fn with_parser(mut self, parser: TimestampParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable access for callers that explicitly want in-place preprocessing.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn temperatures(&self) -> (&[f64], &[f64]) {
        (&self.temp1, &self.temp2)
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn data_units(&self) -> Units {
        self.data_units
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn parser(&self) -> &TimestampParser {
        &self.parser
    }

    /// Sample interval in seconds, either declared or inferred from the timestamps.
    pub fn tau0(&self) -> Result<f64> {
        if let Some(tau0) = self.tau0 {
            return Ok(tau0);
        }
        let n = self.timestamps.len();
        if n < 2 {
            return Err(StabilityError::InvalidSampling(
                "tau0 unknown and fewer than two timestamps to infer it".into(),
            ));
        }
        let span = units::seconds_between(&self.timestamps[0], &self.timestamps[n - 1]);
        let tau0 = span / (n - 1) as f64;
        if tau0 > 0.0 {
            Ok(tau0)
        } else {
            Err(StabilityError::InvalidSampling(format!(
                "inferred tau0 {tau0} is not positive"
            )))
        }
    }

    pub fn append(
        &mut self,
        value: f64,
        temp1: Option<f64>,
        temp2: Option<f64>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        let n = self.data.len();
        check_parallel(n, self.temp1.len(), temp1.is_some())?;
        check_parallel(n, self.temp2.len(), temp2.is_some())?;
        check_parallel(n, self.timestamps.len(), timestamp.is_some())?;
        let parsed = timestamp.map(|t| self.resolve(t)).transpose()?;

        self.data.push(value);
        self.temp1.extend(temp1);
        self.temp2.extend(temp2);
        if let Some(stamp) = parsed {
            self.push_timestamp(stamp);
        }
        Ok(())
    }

    pub fn append_batch(
        &mut self,
        values: &[f64],
        temp1: Option<&[f64]>,
        temp2: Option<&[f64]>,
        timestamps: Option<&[Timestamp]>,
    ) -> Result<()> {
        let n = self.data.len();
        check_parallel(n, self.temp1.len(), temp1.is_some())?;
        check_parallel(n, self.temp2.len(), temp2.is_some())?;
        check_parallel(n, self.timestamps.len(), timestamps.is_some())?;
        let provided = [
            temp1.map(<[f64]>::len),
            temp2.map(<[f64]>::len),
            timestamps.map(<[Timestamp]>::len),
        ];
        for actual in provided.into_iter().flatten() {
            if actual != values.len() {
                return Err(StabilityError::LengthMismatch {
                    expected: values.len(),
                    actual,
                });
            }
        }
        let parsed = match timestamps {
            Some(stamps) => stamps
                .iter()
                .cloned()
                .map(|t| self.resolve(t))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        self.data.extend_from_slice(values);
        self.temp1.extend_from_slice(temp1.unwrap_or_default());
        self.temp2.extend_from_slice(temp2.unwrap_or_default());
        for stamp in parsed {
            self.push_timestamp(stamp);
        }
        Ok(())
    }

    /// Copies `first..=last`, optionally boxcar-averaged, or just the newest point.
    pub fn select(
        &self,
        first: usize,
        last: usize,
        averaging: usize,
        latest_only: bool,
    ) -> Result<Series> {
        let n = self.data.len();
        if n == 0 {
            return Err(StabilityError::SeriesTooShort {
                required: 1,
                actual: 0,
            });
        }
        if averaging == 0 {
            return Err(StabilityError::InvalidSampling(
                "averaging must be at least 1".into(),
            ));
        }
        let range = if latest_only {
            n - 1..n
        } else {
            let last = last.min(n - 1);
            if first > last {
                return Err(StabilityError::InvalidSampling(format!(
                    "selection start {first} is past end {last}"
                )));
            }
            first..last + 1
        };
        let k = if latest_only { 1 } else { averaging };

        let mut out = self.empty_like();
        out.data = boxcar_average(&self.data[range.clone()], k)?;
        if !self.temp1.is_empty() {
            out.temp1 = boxcar_average(&self.temp1[range.clone()], k)?;
        }
        if !self.temp2.is_empty() {
            out.temp2 = boxcar_average(&self.temp2[range.clone()], k)?;
        }
        if !self.timestamps.is_empty() {
            out.timestamps = self.timestamps[range]
                .iter()
                .step_by(k)
                .take(out.data.len())
                .copied()
                .collect();
        }
        out.tau0 = self.tau0.map(|tau0| tau0 * k as f64);
        if let Some(first_stamp) = out.timestamps.first() {
            out.start_time = *first_stamp;
        }
        Ok(out)
    }

    /// Samples scaled by `scale`, shifted by `offset`, then converted to `required` units.
    pub fn get_data(
        &self,
        required: Units,
        scale: Option<f64>,
        offset: Option<f64>,
        gain_ref: Option<f64>,
    ) -> Result<Vec<f64>> {
        let scale = scale.unwrap_or(1.0);
        let offset = offset.unwrap_or(0.0);
        let adjusted: Vec<f64> = self.data.iter().map(|v| v * scale + offset).collect();
        convert(&adjusted, self.data_units, required, gain_ref)
    }

    /// Time axis in `required` units. Without timestamps it is synthesised from tau0.
    pub fn get_time(&self, required: Units) -> Result<Vec<f64>> {
        if !required.is_time() {
            return Err(StabilityError::UnsupportedConversion {
                from: Units::Seconds,
                to: required,
            });
        }
        if !self.timestamps.is_empty() {
            return convert_time(&self.timestamps, required);
        }
        let tau0 = self.tau0()?;
        let seconds: Vec<f64> = (0..self.data.len()).map(|i| i as f64 * tau0).collect();
        if required == Units::LocalTime {
            let start = self.start_time.and_utc().timestamp_micros() as f64 * 1e-6;
            return Ok(seconds.into_iter().map(|s| start + s).collect());
        }
        convert_seconds(&seconds, required)
    }

    /// Indices not yet written to the provider.
    pub fn dirty_range(&self) -> Range<usize> {
        self.clean_len.min(self.data.len())..self.data.len()
    }

    pub fn mark_clean(&mut self) {
        self.clean_len = self.data.len();
    }

    fn empty_like(&self) -> Series {
        Series {
            data: Vec::new(),
            temp1: Vec::new(),
            temp2: Vec::new(),
            timestamps: Vec::new(),
            tau0: self.tau0,
            start_time: self.start_time,
            data_units: self.data_units,
            kind: self.kind,
            clean_len: 0,
            parser: self.parser.clone(),
        }
    }

    fn resolve(&mut self, timestamp: Timestamp) -> Result<NaiveDateTime> {
        match timestamp {
            Timestamp::Parsed(parsed) => Ok(parsed),
            Timestamp::Text(text) => self.parser.parse(&text),
        }
    }

    fn push_timestamp(&mut self, stamp: NaiveDateTime) {
        if self.timestamps.is_empty() {
            self.start_time = stamp;
        }
        self.timestamps.push(stamp);
    }
}

/// A parallel sequence must either be absent throughout or track the data 1-to-1.
fn check_parallel(data_len: usize, parallel_len: usize, provided: bool) -> Result<()> {
    let expected = if provided { data_len } else { 0 };
    if parallel_len != expected {
        return Err(StabilityError::LengthMismatch {
            expected,
            actual: parallel_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp(sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 7, 14)
            .unwrap()
            .and_hms_opt(8, 0, sec)
            .unwrap()
    }

    #[test]
    fn parser_remembers_matching_format() {
        let mut parser = TimestampParser::new();
        let parsed = parser.parse("2023-07-14T08:00:05.250").unwrap();
        assert_eq!(parsed, stamp(5) + chrono::Duration::milliseconds(250));
        assert_eq!(parser.last_format(), Some("%Y-%m-%dT%H:%M:%S%.f"));
        // A different layout still parses; the hint is only a first guess.
        let parsed = parser.parse("07/14/2023 08:00:09.000").unwrap();
        assert_eq!(parsed, stamp(9));
        assert!(matches!(
            parser.parse("yesterday at noon"),
            Err(StabilityError::UnknownTimestampFormat(_))
        ));
    }

    #[test]
    fn whole_second_stamps_use_fractional_formats() {
        let mut parser = TimestampParser::new();
        assert_eq!(parser.parse("2023-07-14 08:00:07").unwrap(), stamp(7));
        assert_eq!(parser.last_format(), Some("%Y-%m-%d %H:%M:%S%.f"));
        assert_eq!(parser.parse("2023-07-14T08:00:08").unwrap(), stamp(8));
        assert_eq!(parser.last_format(), Some("%Y-%m-%dT%H:%M:%S%.f"));
    }

    #[test]
    fn seeded_parser_carries_into_series() {
        let mut parser = TimestampParser::new();
        parser.parse("14.07.2023 08:00:00.000").unwrap();
        let mut series = Series::new(DataKind::Power, Units::MilliWatts).with_parser(parser);
        assert_eq!(series.parser().last_format(), Some("%d.%m.%Y %H:%M:%S%.f"));

        series
            .append(1.0, None, None, Some("14.07.2023 08:00:03.500".into()))
            .unwrap();
        assert_eq!(
            series.timestamps()[0],
            stamp(3) + chrono::Duration::milliseconds(500)
        );
        assert_eq!(series.parser().last_format(), Some("%d.%m.%Y %H:%M:%S%.f"));
    }

    #[test]
    fn data_mut_unwraps_phase_in_place() {
        let mut series = Series::from_samples(
            DataKind::Phase,
            Units::Degrees,
            1.0,
            vec![170.0, -175.0, -160.0],
        )
        .unwrap();
        crate::analysis::preprocess::unwrap_phase_in_place(
            series.data_mut(),
            crate::analysis::preprocess::DEGREES_PERIOD,
        );
        assert_eq!(series.data(), &[170.0, 185.0, 200.0]);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn tau0_inferred_from_timestamps() {
        let mut series = Series::new(DataKind::Power, Units::Dbm);
        for (i, sec) in [0, 2, 4, 6].into_iter().enumerate() {
            series
                .append(i as f64, None, None, Some(stamp(sec).into()))
                .unwrap();
        }
        assert!((series.tau0().unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(series.start_time(), stamp(0));
        assert_eq!(series.get_time(Units::Seconds).unwrap(), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn tau0_missing_without_timestamps() {
        let mut series = Series::new(DataKind::Voltage, Units::Volts);
        series.append(1.0, None, None, None).unwrap();
        assert!(matches!(series.tau0(), Err(StabilityError::InvalidSampling(_))));
        assert!(Series::new(DataKind::Voltage, Units::Volts).with_tau0(0.0).is_err());
    }

    #[test]
    fn parallel_sequences_stay_aligned() {
        let mut series = Series::new(DataKind::Amplitude, Units::Amplitude);
        series.append(1.0, Some(20.0), None, None).unwrap();
        // Dropping the temperature on a later point would misalign the sequences.
        assert!(matches!(
            series.append(2.0, None, None, None),
            Err(StabilityError::LengthMismatch { .. })
        ));
        assert!(matches!(
            series.append_batch(&[2.0, 3.0], Some(&[21.0]), None, None),
            Err(StabilityError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
        series
            .append_batch(&[2.0, 3.0], Some(&[21.0, 22.0]), None, None)
            .unwrap();
        assert_eq!(series.temperatures().0, &[20.0, 21.0, 22.0]);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn bad_timestamp_leaves_series_untouched() {
        let mut series = Series::new(DataKind::Power, Units::MilliWatts);
        let stamps = [Timestamp::from("2023-07-14 08:00:00"), Timestamp::from("garbage")];
        assert!(series.append_batch(&[1.0, 2.0], None, None, Some(&stamps)).is_err());
        assert!(series.is_empty());
    }

    #[test]
    fn select_averages_and_subsamples_timestamps() {
        let mut series = Series::new(DataKind::Power, Units::MilliWatts)
            .with_tau0(1.0)
            .unwrap();
        let stamps: Vec<Timestamp> = (0..7).map(|s| stamp(s).into()).collect();
        series
            .append_batch(&[1.0, 3.0, 5.0, 7.0, 9.0, 11.0, 13.0], None, None, Some(&stamps))
            .unwrap();
        let averaged = series.select(0, usize::MAX, 2, false).unwrap();
        assert_eq!(averaged.data(), &[2.0, 6.0, 10.0]);
        assert_eq!(averaged.timestamps(), &[stamp(0), stamp(2), stamp(4)]);
        assert_eq!(averaged.tau0().unwrap(), 2.0);

        let latest = series.select(0, 3, 4, true).unwrap();
        assert_eq!(latest.data(), &[13.0]);
        assert_eq!(latest.timestamps(), &[stamp(6)]);

        let window = series.select(2, 4, 1, false).unwrap();
        assert_eq!(window.data(), &[5.0, 7.0, 9.0]);
        assert_eq!(window.start_time(), stamp(2));
        assert!(series.select(0, 3, 0, false).is_err());
    }

    #[test]
    fn get_data_applies_scale_offset_then_units() {
        let series =
            Series::from_samples(DataKind::Power, Units::Watts, 1.0, vec![0.5, 1.0]).unwrap();
        let dbm = series.get_data(Units::Dbm, Some(2.0), None, None).unwrap();
        assert!((dbm[0] - 30.0).abs() < 1e-12);
        let mw = series.get_data(Units::MilliWatts, None, Some(0.5), None).unwrap();
        assert_eq!(mw, vec![1000.0, 1500.0]);
        assert!(series.get_data(Units::Degrees, None, None, None).is_err());
    }

    #[test]
    fn dirty_range_tracks_unwritten_tail() {
        let mut series =
            Series::from_samples(DataKind::Gain, Units::Volts, 0.5, vec![1.0, 2.0]).unwrap();
        assert_eq!(series.dirty_range(), 0..2);
        series.mark_clean();
        assert!(series.dirty_range().is_empty());
        series.append(3.0, None, None, None).unwrap();
        assert_eq!(series.dirty_range(), 2..3);
        assert_eq!(series.get_time(Units::Milliseconds).unwrap(), vec![0.0, 500.0, 1000.0]);
    }

    #[test]
    fn time_axis_rejects_data_units() {
        let series = Series::new(DataKind::Power, Units::Dbm);
        assert!(matches!(
            series.get_time(Units::Volts),
            Err(StabilityError::UnsupportedConversion { to: Units::Volts, .. })
        ));
    }
}
