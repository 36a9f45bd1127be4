//! Building [`ScanRecord`]s from flattened DICOM headers.

use camino::Utf8Path;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use si_core::{AcqDim, ApproxVector, ComplexComponent, Fingerprint, ScanRecord};

use crate::header::Header;

// Vendor private attributes.
const PHILIPS_TURBO_FACTOR: Tag = Tag(0x2005, 0x1444);
const PHILIPS_EPI_FACTOR: Tag = Tag(0x2001, 0x1013);
const PHILIPS_INVERSION_TIME: Tag = Tag(0x2001, 0x101B);
const GE_PULSE_SEQUENCE_NAME: Tag = Tag(0x0019, 0x109C);
const PULSE_SEQUENCE_NAME: Tag = Tag(0x0018, 0x9005);

/// Builds the record for one series (or sub-series) from its first header.
#[must_use]
pub fn dicom_record(
    header: &Header,
    series_uid: &str,
    source_path: &Utf8Path,
    num_files: u32,
    multi_frame: bool,
) -> ScanRecord {
    let owned = |tag| header.str(tag).map(str::to_owned);

    let mut record = ScanRecord::new(
        series_uid,
        header.str(tags::STUDY_INSTANCE_UID).unwrap_or_default(),
        source_path,
    );
    record.num_files = num_files;
    record.multi_frame = multi_frame;

    record.institution = owned(tags::INSTITUTION_NAME);
    record.manufacturer = header
        .str(tags::MANUFACTURER)
        .and_then(|m| m.split_whitespace().next())
        .map(str::to_uppercase);
    record.scanner_model = owned(tags::MANUFACTURER_MODEL_NAME);
    record.device_id = owned(tags::DEVICE_SERIAL_NUMBER);
    record.series_description = owned(tags::SERIES_DESCRIPTION)
        .or_else(|| owned(tags::PROTOCOL_NAME))
        .unwrap_or_default();
    record.study_description = owned(tags::STUDY_DESCRIPTION);
    record.acq_datetime = series_datetime(header);
    record.field_strength = header.float(tags::MAGNETIC_FIELD_STRENGTH);
    record.acq_dimension = header
        .str(tags::MR_ACQUISITION_TYPE)
        .and_then(|dim| dim.parse::<AcqDim>().ok());
    record.slice_spacing = header.float(tags::SPACING_BETWEEN_SLICES);
    record.slice_thickness = header.float(tags::SLICE_THICKNESS);
    record.flip_angle = header.float(tags::FLIP_ANGLE);
    record.repetition_time = header.float(tags::REPETITION_TIME);
    record.echo_time = header.float(tags::ECHO_TIME);
    record.inversion_time = header.float(tags::INVERSION_TIME);
    record.trigger_time = header.float(tags::TRIGGER_TIME);
    record.echo_train_length = header
        .int(tags::ECHO_TRAIN_LENGTH)
        .and_then(|v| u32::try_from(v).ok());
    record.sequence_type = header.upper_list(tags::SCANNING_SEQUENCE);
    record.sequence_variant = header.upper_list(tags::SEQUENCE_VARIANT);
    record.scan_options = header.upper_list(tags::SCAN_OPTIONS);
    record.image_type = header.upper_list(tags::IMAGE_TYPE);
    record.series_number = header.int(tags::SERIES_NUMBER);
    record.complex = complex_component(header);
    record.body_part_examined = owned(tags::BODY_PART_EXAMINED);
    record.contrast_agent = owned(tags::CONTRAST_BOLUS_AGENT).or_else(|| {
        header
            .has_sequence(tags::CONTRAST_BOLUS_AGENT_SEQUENCE)
            .then(|| "CONTRAST".to_owned())
    });
    record.orientation = header
        .floats(tags::IMAGE_ORIENTATION_PATIENT)
        .map(ApproxVector::new);
    record.position = header
        .floats(tags::IMAGE_POSITION_PATIENT)
        .map(ApproxVector::new);
    record.sequence_name = owned(tags::SEQUENCE_NAME)
        .or_else(|| owned(PULSE_SEQUENCE_NAME))
        .or_else(|| owned(GE_PULSE_SEQUENCE_NAME));

    apply_philips_private(header, &mut record);
    apply_geometry(header, &mut record);
    record
}

/// Returns the sub-series identity of a header.
#[must_use]
pub fn dicom_fingerprint(header: &Header) -> Fingerprint {
    Fingerprint {
        orientation: header
            .floats(tags::IMAGE_ORIENTATION_PATIENT)
            .map(ApproxVector::new),
        repetition_time: header.float(tags::REPETITION_TIME),
        flip_angle: header.float(tags::FLIP_ANGLE),
        echo_time: header.float(tags::ECHO_TIME),
        trigger_time: header.float(tags::TRIGGER_TIME),
        inversion_time: header.float(tags::INVERSION_TIME),
        complex: complex_component(header),
        image_type: header.upper_list(tags::IMAGE_TYPE),
    }
}

fn complex_component(header: &Header) -> Option<ComplexComponent> {
    if let Some(component) = header
        .str(tags::COMPLEX_IMAGE_COMPONENT)
        .and_then(|c| c.parse().ok())
    {
        return Some(component);
    }
    let image_type = header.upper_list(tags::IMAGE_TYPE);
    let has = |short: &str, long: &str| image_type.iter().any(|t| t == short || t == long);
    if has("M", "MAGNITUDE") {
        Some(ComplexComponent::Magnitude)
    } else if has("P", "PHASE") {
        Some(ComplexComponent::Phase)
    } else if has("R", "REAL") {
        Some(ComplexComponent::Real)
    } else if has("I", "IMAGINARY") {
        Some(ComplexComponent::Imaginary)
    } else {
        None
    }
}

/// Combines series date (`YYYYMMDD`) and time (`HHMMSS[.ffffff]`).
fn series_datetime(header: &Header) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(header.str(tags::SERIES_DATE)?, "%Y%m%d").ok()?;
    let time = header
        .str(tags::SERIES_TIME)
        .and_then(|t| {
            let whole = t.split('.').next().unwrap_or(t);
            let padded = format!("{whole:0<6}");
            NaiveTime::parse_from_str(padded.get(..6)?, "%H%M%S").ok()
        })
        .unwrap_or_default();
    Some(date.and_time(time))
}

fn apply_philips_private(header: &Header, record: &mut ScanRecord) {
    if let Some(turbo) = header
        .int(PHILIPS_TURBO_FACTOR)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
    {
        record.echo_train_length = Some(turbo);
    }
    if let Some(epi) = header
        .int(PHILIPS_EPI_FACTOR)
        .and_then(|v| u32::try_from(v).ok())
    {
        record.epi_factor = Some(epi);
    }
    #[allow(clippy::float_cmp)]
    let zero_inversion = record.inversion_time == Some(0.0);
    if zero_inversion && header.contains(PHILIPS_INVERSION_TIME) {
        if let Some(ti) = header.float(PHILIPS_INVERSION_TIME) {
            record.inversion_time = Some(ti);
        }
        if record.trigger_time.is_some()
            && record.series_description.to_lowercase().contains("mp2rage")
        {
            record.inversion_time = record.trigger_time.take();
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

/// Derives field of view and acquired resolution from the matrices.
fn apply_geometry(header: &Header, record: &mut ScanRecord) {
    let Some(matrix) = header.uints(tags::ACQUISITION_MATRIX) else {
        return;
    };
    let &[freq_rows, freq_cols, phase_rows, phase_cols] = matrix.as_slice() else {
        return;
    };
    let acquisition = if freq_cols == 0 {
        vec![freq_rows, phase_cols]
    } else {
        vec![phase_rows, freq_cols]
    };
    let recon_matrix = vec![
        header
            .int(tags::COLUMNS)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        header
            .int(tags::ROWS)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
    ];

    if let Some(spacing) = header.floats(tags::PIXEL_SPACING) {
        let fov: Vec<f64> = spacing
            .iter()
            .zip(&recon_matrix)
            .map(|(res, num)| res * f64::from(*num))
            .collect();
        record.acquired_resolution = Some(
            fov.iter()
                .zip(&acquisition)
                .map(|(fov, num)| {
                    if *num == 0 {
                        0.0
                    } else {
                        round_to(fov / f64::from(*num), 5)
                    }
                })
                .collect(),
        );
        record.field_of_view = Some(fov.iter().map(|v| round_to(*v, 2)).collect());
        record.recon_resolution = Some(spacing.iter().map(|v| round_to(*v, 5)).collect());
    }
    record.acquisition_matrix = Some(acquisition);
    record.recon_matrix = Some(recon_matrix);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        let mut header = Header::default();
        header.set(tags::STUDY_INSTANCE_UID, ["1.2.3"]);
        header.set(tags::MANUFACTURER, ["Philips Medical Systems"]);
        header.set(tags::PROTOCOL_NAME, ["WIP sT1W_3D_TFE"]);
        header.set(tags::SERIES_DATE, ["20240301"]);
        header.set(tags::SERIES_TIME, ["0915"]);
        header.set(tags::MR_ACQUISITION_TYPE, ["3D"]);
        header.set(tags::IMAGE_TYPE, ["ORIGINAL", "PRIMARY", "M", "FFE"]);
        header.set(tags::ACQUISITION_MATRIX, ["0", "256", "240", "0"]);
        header.set(tags::ROWS, ["512"]);
        header.set(tags::COLUMNS, ["512"]);
        header.set(tags::PIXEL_SPACING, ["0.5", "0.5"]);
        header.set(tags::INVERSION_TIME, ["0"]);
        header.set(PHILIPS_INVERSION_TIME, ["900"]);
        header.set(PHILIPS_TURBO_FACTOR, ["180"]);
        header.set(
            tags::IMAGE_ORIENTATION_PATIENT,
            ["0", "1", "0", "0", "0", "-1"],
        );
        header
    }

    #[test]
    fn test_dicom_record_fields() {
        let record = dicom_record(&header(), "1.2.3.4", Utf8Path::new("1.2.3.4"), 180, false);
        assert_eq!(record.study_uid, "1.2.3");
        assert_eq!(record.manufacturer.as_deref(), Some("PHILIPS"));
        assert_eq!(record.series_description, "WIP sT1W_3D_TFE");
        assert_eq!(record.acq_dimension, Some(AcqDim::ThreeD));
        assert_eq!(record.complex, Some(ComplexComponent::Magnitude));
        assert_eq!(record.inversion_time, Some(900.0));
        assert_eq!(record.echo_train_length, Some(180));
        assert_eq!(record.num_files, 180);
        assert_eq!(
            record.acq_datetime.map(|t| t.to_string()).as_deref(),
            Some("2024-03-01 09:15:00")
        );
        assert_eq!(record.plane(), si_core::Orientation::Sagittal);
    }

    #[test]
    fn test_geometry_uses_phase_columns() {
        let record = dicom_record(&header(), "1", Utf8Path::new("1"), 1, false);
        assert_eq!(record.acquisition_matrix, Some(vec![240, 256]));
        assert_eq!(record.recon_matrix, Some(vec![512, 512]));
        assert_eq!(record.field_of_view, Some(vec![256.0, 256.0]));
        assert_eq!(
            record.acquired_resolution,
            Some(vec![round_to(256.0 / 240.0, 5), 1.0])
        );
    }

    #[test]
    fn test_mp2rage_moves_trigger_to_inversion() {
        let mut h = header();
        h.set(tags::PROTOCOL_NAME, ["MP2RAGE"]);
        h.set(tags::TRIGGER_TIME, ["700"]);
        let record = dicom_record(&h, "1", Utf8Path::new("1"), 1, false);
        assert_eq!(record.inversion_time, Some(700.0));
        assert_eq!(record.trigger_time, None);
    }

    #[test]
    fn test_complex_from_explicit_component() {
        let mut h = header();
        h.set(tags::COMPLEX_IMAGE_COMPONENT, ["PHASE"]);
        assert_eq!(dicom_fingerprint(&h).complex, Some(ComplexComponent::Phase));
    }

    #[test]
    fn test_missing_date_gives_no_timestamp() {
        let mut h = header();
        h.remove(tags::SERIES_DATE);
        let record = dicom_record(&h, "1", Utf8Path::new("1"), 1, false);
        assert!(record.acq_datetime.is_none());
    }
}
