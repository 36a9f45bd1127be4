//! DICOM and PAR/REC fixtures written to disk for tests.

use camino::Utf8Path;
use dicom::core::value::{DataSetSequence, PrimitiveValue};
use dicom::core::{DataElement, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};

const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
const ENHANCED_MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4.1";

pub fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_strs(obj: &mut InMemDicomObject, tag: Tag, vr: VR, values: &[&str]) {
    let values: Vec<String> = values.iter().map(|s| (*s).to_owned()).collect();
    obj.put(DataElement::new(tag, vr, PrimitiveValue::Strs(values.into())));
}

fn put_items(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

/// A classic axial MR slice.
pub fn mr_slice(series_uid: &str, instance: u32, echo_time: f64) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, MR_IMAGE_STORAGE);
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
    put_str(&mut obj, tags::MANUFACTURER, VR::LO, "SIEMENS");
    put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, "t2_tse_tra");
    put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, "3");
    put_str(&mut obj, tags::SERIES_DATE, VR::DA, "20240301");
    put_str(&mut obj, tags::SERIES_TIME, VR::TM, "101500");
    put_strs(&mut obj, tags::IMAGE_TYPE, VR::CS, &["ORIGINAL", "PRIMARY", "M"]);
    put_strs(&mut obj, tags::SCANNING_SEQUENCE, VR::CS, &["SE"]);
    put_str(&mut obj, tags::MR_ACQUISITION_TYPE, VR::CS, "2D");
    put_str(&mut obj, tags::REPETITION_TIME, VR::DS, "5000");
    put_str(&mut obj, tags::ECHO_TIME, VR::DS, &echo_time.to_string());
    put_str(&mut obj, tags::FLIP_ANGLE, VR::DS, "150");
    put_str(&mut obj, tags::SLICE_THICKNESS, VR::DS, "4");
    put_strs(&mut obj, tags::PIXEL_SPACING, VR::DS, &["0.5", "0.5"]);
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
        &["-120", "-120", &(f64::from(instance) * 4.0).to_string()],
    );
    obj
}

/// An Enhanced MR file with one frame per echo time.
pub fn enhanced(series_uid: &str, echo_times: &[f64]) -> InMemDicomObject {
    let mut obj = mr_slice(series_uid, 1, echo_times.first().copied().unwrap_or(10.0));
    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, ENHANCED_MR_IMAGE_STORAGE);
    obj.remove_element(tags::ECHO_TIME);
    let frames = echo_times
        .iter()
        .map(|te| {
            let mut echo = InMemDicomObject::new_empty();
            echo.put(DataElement::new(
                Tag(0x0018, 0x9082),
                VR::FD,
                PrimitiveValue::from(*te),
            ));
            let mut frame = InMemDicomObject::new_empty();
            put_items(&mut frame, tags::MR_ECHO_SEQUENCE, vec![echo]);
            frame
        })
        .collect();
    put_items(&mut obj, Tag(0x5200, 0x9230), frames);
    obj
}

pub fn write(obj: InMemDicomObject, path: &Utf8Path) {
    let text = |tag| {
        obj.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default()
    };
    let (sop_class, instance) = (text(tags::SOP_CLASS_UID), text(tags::SOP_INSTANCE_UID));
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

/// A PAR header with `slices` image rows.
pub fn par_text(protocol: &str, slices: usize) -> String {
    let mut text = String::from("# === GENERAL INFORMATION ===\n");
    text.push_str(&format!(".    Protocol name                      :   {protocol}\n"));
    text.push_str(".    Examination date/time              :   2023.11.02 / 14:05:09\n");
    text.push_str(".    Acquisition nr                     :   5\n");
    text.push_str(".    Reconstruction nr                  :   1\n");
    text.push_str(".    Scan mode                          :   3D\n");
    text.push_str(".    Repetition time [ms]               :   8.100\n");
    text.push_str("# === IMAGE INFORMATION ===\n");
    for slice in 1..=slices {
        text.push_str(&format!(
            "{slice} 1 1 1 0 2 {idx} 16 100 256 256 0 1 1 100 200 \
             0 0 0 0 0 0 1.000 0.000 0 2 0 0 0.938 0.938 3.70 0 0 0 1 8.00 \
             0 0 0 180 900.0 1 1 0 0 0 0 0 0 -\n",
            idx = slice - 1
        ));
    }
    text
}
