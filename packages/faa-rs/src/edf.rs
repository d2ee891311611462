// EDF (European Data Format) reader/writer
// Specification: https://www.edfplus.info/specs/edf.html

use crate::error::{FAAError, Result};
use crate::types::{ChannelDescriptor, MultichannelRecording};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MAIN_HEADER_BYTES: usize = 256;
const SIGNAL_HEADER_BYTES: usize = 256;
const DIGITAL_MIN: i64 = -32768;
const DIGITAL_MAX: i64 = 32767;
const ANNOTATION_LABEL: &str = "EDF Annotations";
const DEFAULT_UNIT: &str = "uV";

#[derive(Debug, Clone, Serialize)]
pub struct EDFHeader {
    pub version: String,              // 8 bytes
    pub patient_id: String,           // 80 bytes
    pub recording_id: String,         // 80 bytes
    pub start_date: String,           // 8 bytes: dd.mm.yy
    pub start_time: String,           // 8 bytes: hh.mm.ss
    pub header_bytes: usize,          // 8 bytes
    pub reserved: String,             // 44 bytes: "EDF+C"/"EDF+D" for EDF+
    pub num_data_records: i64,        // 8 bytes: -1 while unknown
    pub duration_of_data_record: f64, // 8 bytes, seconds
    pub num_signals: usize,           // 4 bytes
}

impl EDFHeader {
    /// Start of recording; EDF years 85-99 are 1985-1999, 00-84 are 2000-2084
    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        let mut date = self.start_date.split('.').map(|p| p.trim().parse::<u32>().ok());
        let (day, month, yy) = (date.next()??, date.next()??, date.next()??);
        let year = if yy >= 85 { 1900 + yy } else { 2000 + yy };

        let mut time = self.start_time.split('.').map(|p| p.trim().parse::<u32>().ok());
        let (h, m, s) = (time.next()??, time.next()??, time.next()??);

        Some(NaiveDateTime::new(
            NaiveDate::from_ymd_opt(year as i32, month, day)?,
            NaiveTime::from_hms_opt(h, m, s)?,
        ))
    }

    pub fn is_edf_plus(&self) -> bool {
        self.reserved.starts_with("EDF+")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EDFSignalHeader {
    pub label: String,                 // 16 bytes
    pub transducer_type: String,       // 80 bytes
    pub physical_dimension: String,    // 8 bytes
    pub physical_minimum: f64,         // 8 bytes
    pub physical_maximum: f64,         // 8 bytes
    pub digital_minimum: i64,          // 8 bytes
    pub digital_maximum: i64,          // 8 bytes
    pub prefiltering: String,          // 80 bytes
    pub num_samples_per_record: usize, // 8 bytes
    pub reserved: String,              // 32 bytes
}

impl EDFSignalHeader {
    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.num_samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        let digital_range = (self.digital_maximum - self.digital_minimum) as f64;
        if digital_range == 0.0 {
            return 1.0;
        }
        (self.physical_maximum - self.physical_minimum) / digital_range
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }

    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

/// Memory-mapped EDF file with parsed headers
pub struct EDFFile {
    mmap: Mmap,
    pub header: EDFHeader,
    pub signal_headers: Vec<EDFSignalHeader>,
    num_records: usize,
}

fn text(bytes: &[u8], start: usize, len: usize) -> String {
    String::from_utf8_lossy(&bytes[start..start + len])
        .trim()
        .to_string()
}

fn number<T: std::str::FromStr>(bytes: &[u8], start: usize, len: usize, what: &str) -> Result<T> {
    let raw = text(bytes, start, len);
    raw.parse::<T>()
        .map_err(|_| FAAError::ParseError(format!("Invalid {} '{}'", what, raw)))
}

impl EDFFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // The mapping is read-only and dropped with the struct
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < MAIN_HEADER_BYTES {
            return Err(FAAError::ParseError(format!(
                "{}: file is shorter than an EDF header",
                path.display()
            )));
        }

        let header = Self::parse_header(&mmap)?;
        let expected_header = MAIN_HEADER_BYTES + header.num_signals * SIGNAL_HEADER_BYTES;
        if mmap.len() < expected_header {
            return Err(FAAError::ParseError(format!(
                "{}: header declares {} signals but file has {} bytes",
                path.display(),
                header.num_signals,
                mmap.len()
            )));
        }
        let signal_headers = Self::parse_signal_headers(&mmap, header.num_signals)?;

        let record_bytes: usize = signal_headers
            .iter()
            .map(|s| s.num_samples_per_record * 2)
            .sum();
        let available = if record_bytes == 0 {
            0
        } else {
            mmap.len().saturating_sub(header.header_bytes) / record_bytes
        };
        let num_records = if header.num_data_records < 0 {
            available
        } else if header.num_data_records as usize > available {
            log::warn!(
                "{}: header declares {} data records, only {} present",
                path.display(),
                header.num_data_records,
                available
            );
            available
        } else {
            header.num_data_records as usize
        };

        log::debug!(
            "EDF header parsed: {} signals, {} records of {} s",
            header.num_signals,
            num_records,
            header.duration_of_data_record
        );

        Ok(Self {
            mmap,
            header,
            signal_headers,
            num_records,
        })
    }

    fn parse_header(bytes: &[u8]) -> Result<EDFHeader> {
        let header = EDFHeader {
            version: text(bytes, 0, 8),
            patient_id: text(bytes, 8, 80),
            recording_id: text(bytes, 88, 80),
            start_date: text(bytes, 168, 8),
            start_time: text(bytes, 176, 8),
            header_bytes: number(bytes, 184, 8, "header size")?,
            reserved: text(bytes, 192, 44),
            num_data_records: number(bytes, 236, 8, "number of data records")?,
            duration_of_data_record: number(bytes, 244, 8, "record duration")?,
            num_signals: number(bytes, 252, 4, "number of signals")?,
        };

        if !(header.duration_of_data_record > 0.0) {
            return Err(FAAError::ParseError(format!(
                "Record duration must be positive, got {}",
                header.duration_of_data_record
            )));
        }
        Ok(header)
    }

    fn parse_signal_headers(bytes: &[u8], ns: usize) -> Result<Vec<EDFSignalHeader>> {
        // Fields are stored column-wise: all labels, then all transducers, ...
        let base = MAIN_HEADER_BYTES;
        let column = |offset: usize, width: usize, i: usize| base + ns * offset + i * width;

        (0..ns)
            .map(|i| {
                Ok(EDFSignalHeader {
                    label: text(bytes, column(0, 16, i), 16),
                    transducer_type: text(bytes, column(16, 80, i), 80),
                    physical_dimension: text(bytes, column(96, 8, i), 8),
                    physical_minimum: number(bytes, column(104, 8, i), 8, "physical minimum")?,
                    physical_maximum: number(bytes, column(112, 8, i), 8, "physical maximum")?,
                    digital_minimum: number(bytes, column(120, 8, i), 8, "digital minimum")?,
                    digital_maximum: number(bytes, column(128, 8, i), 8, "digital maximum")?,
                    prefiltering: text(bytes, column(136, 80, i), 80),
                    num_samples_per_record: number(bytes, column(216, 8, i), 8, "samples per record")?,
                    reserved: text(bytes, column(224, 32, i), 32),
                })
            })
            .collect()
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_records as f64 * self.header.duration_of_data_record
    }

    /// Physical samples of one signal across all records
    pub fn read_signal(&self, signal_index: usize) -> Result<Vec<f64>> {
        let sh = self.signal_headers.get(signal_index).ok_or_else(|| {
            FAAError::InvalidParameter(format!("Signal index {} out of bounds", signal_index))
        })?;

        let record_bytes: usize = self
            .signal_headers
            .iter()
            .map(|s| s.num_samples_per_record * 2)
            .sum();
        let signal_offset: usize = self.signal_headers[..signal_index]
            .iter()
            .map(|s| s.num_samples_per_record * 2)
            .sum();

        let gain = sh.gain();
        let offset = sh.offset();
        let ns = sh.num_samples_per_record;
        let mut samples = Vec::with_capacity(ns * self.num_records);

        for record in 0..self.num_records {
            let start = self.header.header_bytes + record * record_bytes + signal_offset;
            let chunk = &self.mmap[start..start + ns * 2];
            samples.extend(
                chunk
                    .chunks_exact(2)
                    .map(|b| gain * i16::from_le_bytes([b[0], b[1]]) as f64 + offset),
            );
        }
        Ok(samples)
    }

    /// All data signals sharing the first data signal's rate. Annotation
    /// signals and signals at other rates are skipped with a warning.
    pub fn to_recording(&self) -> Result<MultichannelRecording> {
        crate::profile_scope!("edf_to_recording");
        let duration = self.header.duration_of_data_record;
        let data_signals: Vec<usize> = (0..self.signal_headers.len())
            .filter(|&i| !self.signal_headers[i].is_annotation())
            .collect();

        let first = *data_signals.first().ok_or_else(|| {
            FAAError::InvalidRecording("EDF file contains no data signals".to_string())
        })?;
        let rate = self.signal_headers[first].sample_frequency(duration);

        let mut channels = Vec::new();
        let mut data = Vec::new();
        for idx in data_signals {
            let sh = &self.signal_headers[idx];
            let fs = sh.sample_frequency(duration);
            if (fs - rate).abs() > 1e-9 {
                log::warn!(
                    "Skipping signal {} at {} Hz (recording rate {} Hz)",
                    sh.label,
                    fs,
                    rate
                );
                continue;
            }
            if channels.iter().any(|c: &ChannelDescriptor| c.name == sh.label) {
                log::warn!("Skipping duplicate signal label {}", sh.label);
                continue;
            }
            channels.push(ChannelDescriptor::signal(sh.label.clone()).with_unit(&sh.physical_dimension));
            data.push(self.read_signal(idx)?);
        }

        MultichannelRecording::new(channels, data, rate)
    }
}

/// Check existence and extension, then parse the file into a recording
pub fn load_recording(path: &Path) -> Result<(EDFHeader, MultichannelRecording)> {
    if !path.exists() {
        return Err(FAAError::FileNotFound(path.display().to_string()));
    }
    let is_edf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("edf"))
        .unwrap_or(false);
    if !is_edf {
        return Err(FAAError::UnsupportedFileType(path.display().to_string()));
    }

    let edf = EDFFile::open(path)?;
    let recording = edf.to_recording()?;
    log::info!(
        "Loaded {}: {} channels, {} samples at {} Hz",
        path.display(),
        recording.n_channels(),
        recording.n_samples(),
        recording.sampling_rate()
    );
    Ok((edf.header.clone(), recording))
}

/// Shortest decimal representation of `value` that fits `width` characters
fn fit_number(value: f64, width: usize) -> Result<String> {
    let plain = format!("{}", value);
    if plain.len() <= width {
        return Ok(plain);
    }
    for precision in (0..width).rev() {
        let s = format!("{:.*}", precision, value);
        if s.len() <= width {
            return Ok(s);
        }
    }
    Err(FAAError::InvalidParameter(format!(
        "Value {} does not fit an EDF header field",
        value
    )))
}

fn write_field<W: Write>(out: &mut W, s: &str, width: usize) -> Result<()> {
    let mut buffer = vec![b' '; width];
    let bytes: Vec<u8> = s.bytes().filter(|b| b.is_ascii() && !b.is_ascii_control()).collect();
    let len = bytes.len().min(width);
    buffer[..len].copy_from_slice(&bytes[..len]);
    out.write_all(&buffer)?;
    Ok(())
}

/// Write `recording` as EDF with one data record per second of signal.
///
/// Each channel's physical range is taken from its data and its dimension
/// from the channel unit (`uV` when unknown); the last record is
/// zero-padded. Identification and start time come from `template` when
/// given.
pub fn write_edf(
    path: &Path,
    recording: &MultichannelRecording,
    template: Option<&EDFHeader>,
) -> Result<()> {
    let fs = recording.sampling_rate();
    let samples_per_record = (fs.round() as usize).max(1);
    let record_duration = samples_per_record as f64 / fs;
    let n_samples = recording.n_samples();
    let num_records = n_samples.div_ceil(samples_per_record);

    let mut signal_headers = Vec::with_capacity(recording.n_channels());
    for (ch, row) in recording.channels().iter().zip(recording.data()) {
        let (mut lo, mut hi) = row
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !lo.is_finite() || !hi.is_finite() {
            lo = -1.0;
            hi = 1.0;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            lo -= 1.0;
            hi += 1.0;
        }

        let physical_minimum: f64 = fit_number(lo, 8)?.parse().unwrap_or(lo);
        let physical_maximum: f64 = fit_number(hi, 8)?.parse().unwrap_or(hi);
        signal_headers.push(EDFSignalHeader {
            label: ch.name.clone(),
            transducer_type: String::new(),
            physical_dimension: ch.unit.clone().unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            physical_minimum,
            physical_maximum,
            digital_minimum: DIGITAL_MIN,
            digital_maximum: DIGITAL_MAX,
            prefiltering: String::new(),
            num_samples_per_record: samples_per_record,
            reserved: String::new(),
        });
    }

    let ns = signal_headers.len();
    let (patient_id, recording_id, start_date, start_time) = match template {
        Some(h) => (
            h.patient_id.clone(),
            h.recording_id.clone(),
            h.start_date.clone(),
            h.start_time.clone(),
        ),
        None => (
            "X X X X".to_string(),
            "Startdate X X X X".to_string(),
            "01.01.85".to_string(),
            "00.00.00".to_string(),
        ),
    };

    let mut out = BufWriter::new(File::create(path)?);

    write_field(&mut out, "0", 8)?;
    write_field(&mut out, &patient_id, 80)?;
    write_field(&mut out, &recording_id, 80)?;
    write_field(&mut out, &start_date, 8)?;
    write_field(&mut out, &start_time, 8)?;
    write_field(&mut out, &(MAIN_HEADER_BYTES + ns * SIGNAL_HEADER_BYTES).to_string(), 8)?;
    write_field(&mut out, "", 44)?;
    write_field(&mut out, &num_records.to_string(), 8)?;
    write_field(&mut out, &fit_number(record_duration, 8)?, 8)?;
    write_field(&mut out, &ns.to_string(), 4)?;

    for sh in &signal_headers {
        write_field(&mut out, &sh.label, 16)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.transducer_type, 80)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.physical_dimension, 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &fit_number(sh.physical_minimum, 8)?, 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &fit_number(sh.physical_maximum, 8)?, 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.digital_minimum.to_string(), 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.digital_maximum.to_string(), 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.prefiltering, 80)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.num_samples_per_record.to_string(), 8)?;
    }
    for sh in &signal_headers {
        write_field(&mut out, &sh.reserved, 32)?;
    }

    for record in 0..num_records {
        let start = record * samples_per_record;
        for (sh, row) in signal_headers.iter().zip(recording.data()) {
            let gain = sh.gain();
            let offset = sh.offset();
            for t in start..start + samples_per_record {
                let digital = match row.get(t) {
                    Some(&v) if v.is_finite() => {
                        ((v - offset) / gain).round().clamp(DIGITAL_MIN as f64, DIGITAL_MAX as f64)
                            as i16
                    }
                    Some(_) => 0,
                    None => ((0.0 - offset) / gain)
                        .round()
                        .clamp(DIGITAL_MIN as f64, DIGITAL_MAX as f64) as i16,
                };
                out.write_all(&digital.to_le_bytes())?;
            }
        }
    }

    out.flush()?;
    log::info!(
        "Wrote {} ({} channels, {} records)",
        path.display(),
        ns,
        num_records
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recording() -> MultichannelRecording {
        let fs = 100.0;
        let channels = vec![ChannelDescriptor::signal("Fp1"), ChannelDescriptor::signal("Status")];
        let data = vec![
            (0..250).map(|i| 50.0 * (i as f64 / fs * 6.0).sin()).collect(),
            vec![3.0; 250],
        ];
        MultichannelRecording::new(channels, data, fs).unwrap()
    }

    #[test]
    fn test_signal_header_calculations() {
        let header = EDFSignalHeader {
            label: "Test".to_string(),
            transducer_type: String::new(),
            physical_dimension: "uV".to_string(),
            physical_minimum: -100.0,
            physical_maximum: 100.0,
            digital_minimum: -32768,
            digital_maximum: 32767,
            prefiltering: String::new(),
            num_samples_per_record: 256,
            reserved: String::new(),
        };
        assert_eq!(header.sample_frequency(1.0), 256.0);
        assert!((header.gain() - 200.0 / 65535.0).abs() < 1e-15);
        assert!((header.gain() * 32767.0 + header.offset() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_number() {
        assert_eq!(fit_number(-100.0, 8).unwrap(), "-100");
        assert_eq!(fit_number(0.123456789, 8).unwrap(), "0.123457");
        assert!(fit_number(-123.456789, 8).unwrap().len() <= 8);
        assert!(fit_number(1e12, 8).is_err());
    }

    #[test]
    fn test_start_datetime() {
        let mut header = EDFHeader {
            version: "0".to_string(),
            patient_id: String::new(),
            recording_id: String::new(),
            start_date: "17.04.01".to_string(),
            start_time: "09.30.15".to_string(),
            header_bytes: 256,
            reserved: String::new(),
            num_data_records: 1,
            duration_of_data_record: 1.0,
            num_signals: 0,
        };
        let dt = header.start_datetime().unwrap();
        assert_eq!(dt.to_string(), "2001-04-17 09:30:15");

        header.start_date = "17.04.99".to_string();
        assert_eq!(header.start_datetime().unwrap().date().to_string(), "1999-04-17");

        header.start_time = "garbage".to_string();
        assert!(header.start_datetime().is_none());
    }

    #[test]
    fn test_write_then_read_preserves_shape_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.edf");
        let rec = sample_recording();
        write_edf(&path, &rec, None).unwrap();

        let (header, loaded) = load_recording(&path).unwrap();
        assert_eq!(header.num_data_records, 3);
        assert_eq!(loaded.channel_names(), vec!["Fp1", "Status"]);
        assert_eq!(loaded.sampling_rate(), 100.0);
        // 2.5 s padded to three 1-s records
        assert_eq!(loaded.n_samples(), 300);

        let step = 100.0 / 65535.0;
        for (a, b) in rec.data()[0].iter().zip(&loaded.data()[0]) {
            assert!((a - b).abs() <= step, "{} vs {}", a, b);
        }
        assert!(loaded.data()[1][..250].iter().all(|v| (v - 3.0).abs() < 1e-3));
    }

    #[test]
    fn test_physical_dimension_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.edf");
        let channels = vec![
            ChannelDescriptor::signal("Fp1").with_unit("mV"),
            ChannelDescriptor::signal("Status"),
        ];
        let rec = MultichannelRecording::new(channels, vec![vec![0.5; 200], vec![1.0; 200]], 100.0).unwrap();
        write_edf(&first, &rec, None).unwrap();

        let (header, loaded) = load_recording(&first).unwrap();
        assert_eq!(loaded.channels()[0].unit.as_deref(), Some("mV"));
        assert_eq!(loaded.channels()[1].unit.as_deref(), Some("uV"));

        let second = dir.path().join("second.edf");
        write_edf(&second, &loaded, Some(&header)).unwrap();
        let reread = EDFFile::open(&second).unwrap();
        assert_eq!(reread.signal_headers[0].physical_dimension, "mV");
    }

    #[test]
    fn test_load_rejects_missing_and_wrong_extension() {
        assert!(matches!(
            load_recording(Path::new("/nonexistent/file.edf")),
            Err(FAAError::FileNotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        assert!(matches!(
            load_recording(&txt),
            Err(FAAError::UnsupportedFileType(_))
        ));

        let short = dir.path().join("short.edf");
        std::fs::write(&short, b"0       ").unwrap();
        assert!(matches!(load_recording(&short), Err(FAAError::ParseError(_))));
    }
}
