//! PAR header reading.
//!
//! A PAR file is a text header with `.`-prefixed general information lines
//! (`. Protocol name : T1W_3D`) followed by one whitespace-separated row per
//! stored image. Only the first image row is needed to describe the series.

use std::collections::BTreeMap;

use camino::Utf8Path;
use chrono::NaiveDateTime;
use si_core::{AcqDim, ApproxVector, ComplexComponent, ScanRecord};

use crate::error::ReadError;

// Image row columns (v4.2 layout).
const COL_IMAGE_TYPE_MR: usize = 4;
const COL_RECON_RESOLUTION: usize = 9;
const COL_SLICE_THICKNESS: usize = 22;
const COL_SLICE_GAP: usize = 23;
const COL_SLICE_ORIENTATION: usize = 25;
const COL_PIXEL_SPACING: usize = 28;
const COL_ECHO_TIME: usize = 30;
const COL_FLIP_ANGLE: usize = 35;
const COL_TURBO_FACTOR: usize = 39;
const COL_INVERSION_DELAY: usize = 40;
const COL_CONTRAST_AGENT: usize = 49;

/// A parsed PAR header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParHeader {
    general: BTreeMap<String, String>,
    first_image: Vec<String>,
    image_rows: usize,
}

/// Normalizes a general information key: the text before any `(`, `[` or
/// `<`, lower-cased with single spaces.
fn normalize_key(raw: &str) -> String {
    let cut = raw.find(['(', '[', '<']).map_or(raw, |i| &raw[..i]);
    cut.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ParHeader {
    /// Parses header text.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Par`] if the header has no image rows.
    pub fn parse(text: &str, path: &Utf8Path) -> Result<Self, ReadError> {
        let mut header = Self::default();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(info) = trimmed.strip_prefix('.') {
                if let Some((key, value)) = info.split_once(':') {
                    header
                        .general
                        .insert(normalize_key(key), value.trim().to_owned());
                }
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.first().is_some_and(|t| t.parse::<u32>().is_ok()) {
                if header.image_rows == 0 {
                    header.first_image = tokens.iter().map(|t| (*t).to_owned()).collect();
                }
                header.image_rows += 1;
            }
        }
        if header.image_rows == 0 {
            return Err(ReadError::par(path, 0, "no image rows"));
        }
        if header.first_image.len() <= COL_TURBO_FACTOR {
            return Err(ReadError::par(
                path,
                0,
                format!("image rows have {} columns", header.first_image.len()),
            ));
        }
        Ok(header)
    }

    /// Returns a general information value by normalized key.
    #[must_use]
    pub fn general(&self, key: &str) -> Option<&str> {
        self.general.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn general_numbers(&self, key: &str) -> Vec<f64> {
        self.general(key)
            .map(|v| v.split_whitespace().filter_map(|t| t.parse().ok()).collect())
            .unwrap_or_default()
    }

    fn general_int(&self, key: &str) -> Option<i64> {
        self.general(key).and_then(|v| v.parse().ok())
    }

    fn image(&self, column: usize) -> Option<f64> {
        self.first_image.get(column).and_then(|t| t.parse().ok())
    }

    /// Returns the number of image rows.
    #[must_use]
    pub const fn image_rows(&self) -> usize {
        self.image_rows
    }

    /// Builds the series record.
    ///
    /// The series UID is the file stem and the study UID its first three
    /// components.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_record(&self, series_uid: &str, source_path: &Utf8Path) -> ScanRecord {
        let study_uid = series_uid.split('.').take(3).collect::<Vec<_>>().join(".");
        let mut record = ScanRecord::new(series_uid, study_uid, source_path);
        let to_u32 = |v: i64| u32::try_from(v).ok();

        record.manufacturer = Some("PHILIPS".to_owned());
        record.study_description = self.general("examination name").map(str::to_owned);
        record.series_description = self
            .general("protocol name")
            .unwrap_or_default()
            .to_owned();
        record.series_number = self.general_int("acquisition nr");
        record.sequence_name = self.general("technique").map(str::to_owned);
        record.acq_dimension = self.general("scan mode").and_then(|mode| {
            if mode.eq_ignore_ascii_case("MS") {
                Some(AcqDim::TwoD)
            } else {
                mode.parse().ok()
            }
        });
        record.recon_number = self.general_int("reconstruction nr").and_then(to_u32);
        record.mt_contrast = self.general_int("mtc") == Some(1);
        record.epi_factor = self.general_int("epi factor").and_then(to_u32);
        record.diffusion = self.general_int("diffusion") == Some(1);
        record.acq_datetime = self.general("examination date/time").and_then(|v| {
            NaiveDateTime::parse_from_str(v, "%Y.%m.%d / %H:%M:%S").ok()
        });
        record.repetition_time = self.general_numbers("repetition time").first().copied();
        record.image_type = if record.recon_number == Some(1) {
            vec!["ORIGINAL".to_owned(), "PRIMARY".to_owned()]
        } else {
            vec!["ORIGINAL".to_owned(), "SECONDARY".to_owned()]
        };
        record.num_files = self
            .general_int("max. number of slices/locations")
            .and_then(to_u32)
            .unwrap_or(0);
        let acquisition: Vec<u32> = self
            .general_numbers("scan resolution")
            .iter()
            .take(2)
            .map(|v| *v as u32)
            .collect();

        let mut orientation = self.general_numbers("angulation midslice");
        if let Some(plane) = self.image(COL_SLICE_ORIENTATION) {
            orientation.push(plane);
        }
        if orientation.len() == 4 {
            record.orientation = Some(ApproxVector::new(orientation));
        }
        let position = self.general_numbers("off centre midslice");
        if !position.is_empty() {
            record.position = Some(ApproxVector::new(position));
        }

        record.echo_time = self.image(COL_ECHO_TIME);
        record.flip_angle = self.image(COL_FLIP_ANGLE);
        let max_echoes = self
            .general_int("max. number of echoes")
            .and_then(to_u32)
            .unwrap_or(1)
            .max(1);
        record.echo_train_length = Some(match self.image(COL_TURBO_FACTOR) {
            Some(turbo) if turbo > 0.0 => (turbo as u32) / max_echoes,
            _ => 1,
        });
        record.inversion_time = self.image(COL_INVERSION_DELAY);
        record.contrast_agent = self
            .first_image
            .get(COL_CONTRAST_AGENT)
            .filter(|agent| !agent.is_empty() && agent.as_str() != "-")
            .cloned();
        record.complex = Some(match self.image(COL_IMAGE_TYPE_MR).map(|v| v as i64) {
            Some(1) => ComplexComponent::Real,
            Some(2) => ComplexComponent::Imaginary,
            Some(3) => ComplexComponent::Phase,
            _ => ComplexComponent::Magnitude,
        });

        let thickness = self.image(COL_SLICE_THICKNESS);
        record.slice_thickness = thickness;
        record.slice_spacing = thickness.map(|t| t + self.image(COL_SLICE_GAP).unwrap_or(0.0));

        let recon_matrix: Vec<u32> = (0..2)
            .filter_map(|i| self.image(COL_RECON_RESOLUTION + i))
            .map(|v| v as u32)
            .collect();
        let recon_res: Vec<f64> = (0..2)
            .filter_map(|i| self.image(COL_PIXEL_SPACING + i))
            .collect();
        let fov: Vec<f64> = recon_res
            .iter()
            .zip(&recon_matrix)
            .map(|(res, num)| res * f64::from(*num))
            .collect();
        record.acquired_resolution = Some(
            fov.iter()
                .zip(&acquisition)
                .filter(|(_, num)| **num > 0)
                .map(|(fov, num)| fov / f64::from(*num))
                .collect(),
        );
        record.field_of_view = Some(fov);
        record.recon_matrix = Some(recon_matrix);
        record.recon_resolution = Some(recon_res);
        record.acquisition_matrix = Some(acquisition);
        record
    }
}

/// Reads a PAR header and builds its record.
///
/// # Errors
///
/// Returns [`ReadError::Io`] if the file cannot be read and
/// [`ReadError::Par`] if it is malformed.
pub fn read_par(path: &Utf8Path, source_path: &Utf8Path) -> Result<ScanRecord, ReadError> {
    let text = std::fs::read(path).map_err(|e| ReadError::io(path, e))?;
    let header = ParHeader::parse(&String::from_utf8_lossy(&text), path)?;
    let series_uid = path.file_stem().unwrap_or_default();
    let record = header.to_record(series_uid, source_path);
    if record.num_files > 0 && header.image_rows() < record.num_files as usize {
        tracing::warn!(
            path = %path,
            rows = header.image_rows(),
            slices = record.num_files,
            "PAR header looks truncated"
        );
    }
    Ok(record)
}


#[cfg(test)]
mod tests {
    use super::fixtures::par_text;
    use super::*;
    use si_core::Orientation;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" Scan resolution  (x, y) "), "scan resolution");
        assert_eq!(normalize_key("MTC               <0=no 1=yes> ?"), "mtc");
        assert_eq!(normalize_key("Max. number of slices/locations"), "max. number of slices/locations");
    }

    #[test]
    fn test_par_record() {
        let header = ParHeader::parse(&par_text("T1W_3D_TFE", 1, 3), Utf8Path::new("x.par")).unwrap();
        assert_eq!(header.image_rows(), 3);
        let record = header.to_record("2.25.77.5.1", Utf8Path::new("2.25.77.5.1.par"));

        assert_eq!(record.study_uid, "2.25.77");
        assert_eq!(record.series_description, "T1W_3D_TFE");
        assert_eq!(record.series_number, Some(5));
        assert_eq!(record.acq_dimension, Some(AcqDim::ThreeD));
        assert_eq!(record.sequence_name.as_deref(), Some("T1TFE"));
        assert_eq!(record.image_type, vec!["ORIGINAL", "PRIMARY"]);
        assert_eq!(record.num_files, 3);
        assert_eq!(record.echo_time, Some(3.7));
        assert_eq!(record.flip_angle, Some(8.0));
        assert_eq!(record.inversion_time, Some(900.0));
        assert_eq!(record.echo_train_length, Some(180));
        assert_eq!(record.slice_spacing, Some(1.0));
        assert_eq!(record.complex, Some(ComplexComponent::Magnitude));
        assert_eq!(record.plane(), Orientation::Sagittal);
        assert_eq!(record.position_z(), Some(-3.0));
        assert!(record.contrast_agent.is_none());
        assert_eq!(
            record.acq_datetime.map(|t| t.to_string()).as_deref(),
            Some("2023-11-02 14:05:09")
        );
    }

    #[test]
    fn test_secondary_reconstruction_image_type() {
        let header = ParHeader::parse(&par_text("T1", 2, 1), Utf8Path::new("x.par")).unwrap();
        let record = header.to_record("1.2.3.4", Utf8Path::new("1.2.3.4.par"));
        assert_eq!(record.recon_number, Some(2));
        assert_eq!(record.image_type, vec!["ORIGINAL", "SECONDARY"]);
    }

    #[test]
    fn test_parse_rejects_header_without_images() {
        let text = ".    Protocol name   :   T1\n";
        let err = ParHeader::parse(text, Utf8Path::new("x.par")).unwrap_err();
        assert!(matches!(err, ReadError::Par { .. }));
    }

    #[test]
    fn test_read_par_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("2.25.1.2.3.par");
        std::fs::write(&path, par_text("sWIP T2", 1, 2)).unwrap();
        let record = read_par(&path, Utf8Path::new("2.25.1.2.3.par")).unwrap();
        assert_eq!(record.series_uid, "2.25.1.2.3");
        assert_eq!(record.study_uid, "2.25.1");
        assert_eq!(record.series_description, "sWIP T2");
    }
}
