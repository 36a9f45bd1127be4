//! DICOM file reading.
//!
//! [`read_dicom`] opens a file up to its pixel data, checks that it is an MR
//! image this tool converts, and returns one [`Header`] per frame. Enhanced
//! multi-frame files are split by merging the shared and per-frame functional
//! groups over the top-level data set and mapping enhanced-only attributes
//! onto their classic equivalents.
//!
//! [`is_duplicate`] backs the sorter's deduplication.

use camino::{Utf8Path, Utf8PathBuf};
use dicom::core::Tag;
use dicom::core::header::Header as _;
use dicom::core::value::Value;
use dicom::dictionary_std::tags;
use dicom::object::{InMemDicomObject, OpenFileOptions};

use crate::error::ReadError;
use crate::header::Header;

/// SOP class UID of classic MR Image Storage.
pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

/// SOP class UID of Enhanced MR Image Storage.
pub const ENHANCED_MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4.1";

const SHARED_FUNCTIONAL_GROUPS: Tag = Tag(0x5200, 0x9229);
const PER_FRAME_FUNCTIONAL_GROUPS: Tag = Tag(0x5200, 0x9230);

// Top-level attributes that do not describe a single frame.
const FRAME_EXCLUDED: [Tag; 7] = [
    SHARED_FUNCTIONAL_GROUPS,
    PER_FRAME_FUNCTIONAL_GROUPS,
    Tag(0x0020, 0x9222), // DimensionIndexSequence
    Tag(0x0028, 0x0008), // NumberOfFrames
    Tag(0x0008, 0x9154), // SourceImageEvidenceSequence
    Tag(0x0008, 0x9092), // ReferencedImageEvidenceSequence
    Tag(0x7FE0, 0x0010), // PixelData
];

// Attributes that legitimately differ between two copies of one instance.
const VOLATILE: [Tag; 8] = [
    Tag(0x0008, 0x0012), // InstanceCreationDate
    Tag(0x0008, 0x0013), // InstanceCreationTime
    Tag(0x0008, 0x0018), // SOPInstanceUID
    Tag(0x0008, 0x0022), // AcquisitionDate
    Tag(0x0008, 0x0023), // ContentDate
    Tag(0x0008, 0x002A), // AcquisitionDateTime
    Tag(0x0008, 0x0032), // AcquisitionTime
    Tag(0x0008, 0x0033), // ContentTime
];

// Enhanced MR attributes mapped onto classic ones.
const EFFECTIVE_ECHO_TIME: Tag = Tag(0x0018, 0x9082);
const ECHO_PULSE_SEQUENCE: Tag = Tag(0x0018, 0x9008);
const INVERSION_RECOVERY: Tag = Tag(0x0018, 0x9009);
const ECHO_PLANAR_PULSE_SEQUENCE: Tag = Tag(0x0018, 0x9018);
const SEGMENTED_K_SPACE_TRAVERSAL: Tag = Tag(0x0018, 0x9033);
const MAGNETIZATION_TRANSFER: Tag = Tag(0x0018, 0x9020);
const STEADY_STATE_PULSE_SEQUENCE: Tag = Tag(0x0018, 0x9017);
const SPOILING: Tag = Tag(0x0018, 0x9016);
const OVERSAMPLING_PHASE: Tag = Tag(0x0018, 0x9029);
const RECTILINEAR_PHASE_ENCODE_REORDERING: Tag = Tag(0x0018, 0x9034);
const FRAME_TYPE: Tag = Tag(0x0008, 0x9007);
const PARTIAL_FOURIER_DIRECTION: Tag = Tag(0x0018, 0x9036);
const SPATIAL_PRESATURATION: Tag = Tag(0x0018, 0x9027);
const SPECTRALLY_SELECTED_SUPPRESSION: Tag = Tag(0x0018, 0x9025);
const FLOW_COMPENSATION: Tag = Tag(0x0018, 0x9010);

/// Header data of one DICOM file.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomFile {
    /// Where the file was read from.
    pub path: Utf8PathBuf,
    /// SOP class UID.
    pub sop_class: String,
    /// Series instance UID.
    pub series_uid: String,
    /// Instance number, if recorded.
    pub instance_number: Option<i64>,
    /// Instance creation date and time, concatenated for ordering.
    pub creation: String,
    /// One header per frame; a single entry for classic files.
    pub frames: Vec<Header>,
}

impl DicomFile {
    /// Returns `true` for Enhanced MR files.
    #[must_use]
    pub fn is_multi_frame(&self) -> bool {
        self.sop_class == ENHANCED_MR_IMAGE_STORAGE
    }
}

fn open_header(path: &Utf8Path) -> Result<dicom::object::DefaultDicomObject, ReadError> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| ReadError::dicom(path, e))
}

/// Reads the header of one DICOM file.
///
/// # Errors
///
/// Returns [`ReadError::Dicom`] if the file does not parse,
/// [`ReadError::Unsupported`] if it is not an (Enhanced) MR image, and
/// [`ReadError::MissingAttribute`] if it has no series instance UID.
pub fn read_dicom(path: &Utf8Path) -> Result<DicomFile, ReadError> {
    let file = open_header(path)?;
    let top = Header::from_object(&file, &[]);

    let sop_class = top
        .str(tags::SOP_CLASS_UID)
        .map(str::to_owned)
        .unwrap_or_else(|| {
            file.meta()
                .media_storage_sop_class_uid
                .trim_end_matches(['\0', ' '])
                .to_owned()
        });
    if sop_class != MR_IMAGE_STORAGE && sop_class != ENHANCED_MR_IMAGE_STORAGE {
        return Err(ReadError::unsupported(
            path,
            format!("SOP class {sop_class} is not an MR image"),
        ));
    }
    let series_uid = top
        .str(tags::SERIES_INSTANCE_UID)
        .ok_or_else(|| ReadError::missing(path, "SeriesInstanceUID"))?
        .to_owned();
    let instance_number = top.int(tags::INSTANCE_NUMBER);
    let creation = format!(
        "{}{}",
        top.str(tags::INSTANCE_CREATION_DATE).unwrap_or_default(),
        top.str(tags::INSTANCE_CREATION_TIME).unwrap_or_default()
    );

    let frames = if sop_class == ENHANCED_MR_IMAGE_STORAGE {
        split_frames(&file, path)?
    } else {
        vec![top]
    };

    Ok(DicomFile {
        path: path.to_owned(),
        sop_class,
        series_uid,
        instance_number,
        creation,
        frames,
    })
}

fn sequence_items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    match obj.element(tag).map(|elem| elem.value()) {
        Ok(Value::Sequence(seq)) => seq.items(),
        _ => &[],
    }
}

fn split_frames(obj: &InMemDicomObject, path: &Utf8Path) -> Result<Vec<Header>, ReadError> {
    let base = Header::from_object(obj, &FRAME_EXCLUDED);
    let shared = sequence_items(obj, SHARED_FUNCTIONAL_GROUPS);
    let per_frame = sequence_items(obj, PER_FRAME_FUNCTIONAL_GROUPS);
    if per_frame.is_empty() {
        return Err(ReadError::unsupported(
            path,
            "enhanced MR image has no per-frame functional groups",
        ));
    }

    Ok(per_frame
        .iter()
        .map(|frame| {
            let mut header = base.clone();
            if let Some(group) = shared.first() {
                header.overlay_flattened(group);
            }
            header.overlay_flattened(frame);
            map_enhanced(&mut header);
            header
        })
        .collect())
}

fn has_value_other_than(header: &Header, tag: Tag, default: &str) -> bool {
    header.str(tag).is_some_and(|v| v != default)
}

/// Rewrites enhanced-only attributes of a flattened frame as the classic
/// scanning sequence, sequence variant and scan options tags.
fn map_enhanced(header: &mut Header) {
    if let Some(values) = header.values(EFFECTIVE_ECHO_TIME).map(<[String]>::to_vec) {
        header.set(tags::ECHO_TIME, values);
    }

    let mut scanning = header.upper_list(tags::SCANNING_SEQUENCE);
    if let Some(echo) = header.str(ECHO_PULSE_SEQUENCE) {
        if echo != "SPIN" {
            scanning.push("GR".to_owned());
        }
        if echo != "GRADIENT" {
            scanning.push("SE".to_owned());
        }
    }
    if header.str(INVERSION_RECOVERY) == Some("YES") {
        scanning.push("IR".to_owned());
    }
    if header.str(ECHO_PLANAR_PULSE_SEQUENCE) == Some("YES") {
        scanning.push("EP".to_owned());
    }
    scanning.sort();
    scanning.dedup();
    header.set(tags::SCANNING_SEQUENCE, scanning);

    let mut variant = header.upper_list(tags::SEQUENCE_VARIANT);
    if has_value_other_than(header, SEGMENTED_K_SPACE_TRAVERSAL, "SINGLE") {
        variant.push("SK".to_owned());
    }
    if has_value_other_than(header, MAGNETIZATION_TRANSFER, "NONE") {
        variant.push("MTC".to_owned());
    }
    match header.str(STEADY_STATE_PULSE_SEQUENCE) {
        Some("TIME_REVERSED") => variant.push("TRSS".to_owned()),
        Some(v) if v != "NONE" => variant.push("SS".to_owned()),
        _ => {}
    }
    if has_value_other_than(header, SPOILING, "NONE") {
        variant.push("SP".to_owned());
    }
    if has_value_other_than(header, OVERSAMPLING_PHASE, "NONE") {
        variant.push("OSP".to_owned());
    }
    if variant.is_empty() {
        variant.push("NONE".to_owned());
    }
    variant.sort();
    variant.dedup();
    header.set(tags::SEQUENCE_VARIANT, variant);

    let mut options = header.upper_list(tags::SCAN_OPTIONS);
    if has_value_other_than(header, RECTILINEAR_PHASE_ENCODE_REORDERING, "LINEAR") {
        options.push("PER".to_owned());
    }
    if let Some(kind) = header.values(FRAME_TYPE).and_then(|v| v.get(2)) {
        if kind.starts_with("CARD") {
            options.push("CG".to_owned());
        }
        if kind.ends_with("RESP_GATED") {
            options.push("RG".to_owned());
        }
    }
    match header.str(PARTIAL_FOURIER_DIRECTION) {
        Some("PHASE") => options.push("PFP".to_owned()),
        Some("FREQUENCY") => options.push("PFF".to_owned()),
        _ => {}
    }
    if has_value_other_than(header, SPATIAL_PRESATURATION, "NONE") {
        options.push("SP".to_owned());
    }
    if header
        .str(SPECTRALLY_SELECTED_SUPPRESSION)
        .is_some_and(|v| v.starts_with("FAT"))
    {
        options.push("FS".to_owned());
    }
    if has_value_other_than(header, FLOW_COMPENSATION, "NONE") {
        options.push("FC".to_owned());
    }
    options.sort();
    options.dedup();
    header.set(tags::SCAN_OPTIONS, options);
}

/// Returns `true` if two objects agree on every attribute except pixel data
/// and the creation, instance UID and acquisition/content timestamps.
#[must_use]
pub fn headers_match(a: &InMemDicomObject, b: &InMemDicomObject) -> bool {
    let compared = |obj: &InMemDicomObject| {
        obj.iter()
            .filter(|elem| {
                let tag = elem.tag();
                tag != tags::PIXEL_DATA && !VOLATILE.contains(&tag)
            })
            .count()
    };
    if compared(a) != compared(b) {
        return false;
    }
    a.iter()
        .filter(|elem| elem.tag() != tags::PIXEL_DATA && !VOLATILE.contains(&elem.tag()))
        .all(|elem| {
            b.element(elem.tag())
                .is_ok_and(|other| other.value() == elem.value())
        })
}

/// Returns `true` if `later` is a copy of `earlier`: equal headers (see
/// [`headers_match`]) and identical pixel data.
///
/// # Errors
///
/// Returns [`ReadError::Dicom`] if either file does not parse.
pub fn is_duplicate(earlier: &Utf8Path, later: &Utf8Path) -> Result<bool, ReadError> {
    if !headers_match(&*open_header(earlier)?, &*open_header(later)?) {
        return Ok(false);
    }
    let open = |path: &Utf8Path| {
        OpenFileOptions::new()
            .open_file(path)
            .map_err(|e| ReadError::dicom(path, e))
    };
    let (a, b) = (open(earlier)?, open(later)?);
    let pixels_a = a.element(tags::PIXEL_DATA).ok().map(|e| e.value());
    let pixels_b = b.element(tags::PIXEL_DATA).ok().map(|e| e.value());
    Ok(pixels_a == pixels_b)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory DICOM objects written to disk for tests.

    use camino::Utf8Path;
    use dicom::core::value::{DataSetSequence, PrimitiveValue};
    use dicom::core::{DataElement, Tag, VR};
    use dicom::dictionary_std::tags;
    use dicom::object::{FileMetaTableBuilder, InMemDicomObject};

    pub fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }

    pub fn put_strs(obj: &mut InMemDicomObject, tag: Tag, vr: VR, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|s| (*s).to_owned()).collect();
        obj.put(DataElement::new(tag, vr, PrimitiveValue::Strs(values.into())));
    }

    pub fn put_items(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
        obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
    }

    /// A classic MR slice with typical brain T2 attributes.
    pub fn mr_slice(series_uid: &str, instance: u32) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, super::MR_IMAGE_STORAGE);
        put_str(
            &mut obj,
            tags::SOP_INSTANCE_UID,
            VR::UI,
            &format!("{series_uid}.{instance}"),
        );
        put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3");
        put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, series_uid);
        put_str(&mut obj, tags::INSTANCE_NUMBER, VR::IS, &instance.to_string());
        put_str(&mut obj, tags::INSTANCE_CREATION_TIME, VR::TM, "101500");
        put_str(&mut obj, tags::MANUFACTURER, VR::LO, "GE MEDICAL SYSTEMS");
        put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, "AX T2 FSE");
        put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, "4");
        put_str(&mut obj, tags::SERIES_DATE, VR::DA, "20240301");
        put_str(&mut obj, tags::SERIES_TIME, VR::TM, "101500.25");
        put_strs(&mut obj, tags::IMAGE_TYPE, VR::CS, &["ORIGINAL", "PRIMARY", "OTHER"]);
        put_strs(&mut obj, tags::SCANNING_SEQUENCE, VR::CS, &["SE"]);
        put_str(&mut obj, tags::MR_ACQUISITION_TYPE, VR::CS, "2D");
        put_str(&mut obj, tags::REPETITION_TIME, VR::DS, "4000");
        put_str(&mut obj, tags::ECHO_TIME, VR::DS, "90");
        put_str(&mut obj, tags::FLIP_ANGLE, VR::DS, "90");
        put_str(&mut obj, tags::ECHO_TRAIN_LENGTH, VR::IS, "16");
        put_str(&mut obj, tags::SLICE_THICKNESS, VR::DS, "5");
        put_str(&mut obj, tags::SPACING_BETWEEN_SLICES, VR::DS, "6");
        put_strs(&mut obj, tags::PIXEL_SPACING, VR::DS, &["0.5", "0.5"]);
        obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(512_u16)));
        obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(512_u16)));
        obj.put(DataElement::new(
            tags::ACQUISITION_MATRIX,
            VR::US,
            PrimitiveValue::U16(vec![256_u16, 0, 0, 192].into()),
        ));
        put_strs(
            &mut obj,
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            &["1", "0", "0", "0", "1", "0"],
        );
        put_strs(
            &mut obj,
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            &["-120", "-120", &(f64::from(instance) * 6.0).to_string()],
        );
        obj
    }

    pub fn with_pixels(mut obj: InMemDicomObject, fill: u8) -> InMemDicomObject {
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(vec![fill; 16]),
        ));
        obj
    }

    pub fn write(obj: InMemDicomObject, path: &Utf8Path) {
        let sop_class = obj
            .element(tags::SOP_CLASS_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let instance = obj
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "1.2.3.4".to_owned());
        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax("1.2.840.10008.1.2.1")
                    .media_storage_sop_class_uid(sop_class)
                    .media_storage_sop_instance_uid(instance),
            )
            .unwrap();
        file.write_to_file(path).unwrap();
    }
}
