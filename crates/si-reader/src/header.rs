//! A flattened, string-valued view of a DICOM data set.
//!
//! dicom-rs keeps nested sequences as a tree. Classification only needs leaf
//! values, and enhanced multi-frame files store them several levels deep in
//! functional group sequences, so [`Header`] keeps one value list per tag and
//! lets later layers overwrite earlier ones.

use std::collections::{BTreeMap, BTreeSet};

use dicom::core::header::Header as _;
use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::{Tag, VR};
use dicom::object::InMemDicomObject;
use smallvec::SmallVec;

/// Values of one attribute, trimmed, in VM order.
pub type AttrValues = SmallVec<[String; 2]>;

/// Longest unknown-VR value that is still interpreted as text.
const MAX_UNKNOWN_TEXT: usize = 64;

/// Leaf attributes of a data set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    attrs: BTreeMap<Tag, AttrValues>,
    sequences: BTreeSet<Tag>,
}

impl Header {
    /// Builds a header from the top level of `obj`, skipping `excluded` tags.
    ///
    /// Sequences are not descended into; only their presence is recorded.
    #[must_use]
    pub fn from_object(obj: &InMemDicomObject, excluded: &[Tag]) -> Self {
        let mut header = Self::default();
        for elem in obj.iter() {
            let tag = elem.tag();
            if excluded.contains(&tag) {
                continue;
            }
            match elem.value() {
                Value::Primitive(value) => {
                    if let Some(values) = leaf_values(elem.vr(), value) {
                        header.attrs.insert(tag, values);
                    }
                }
                Value::Sequence(_) => {
                    header.sequences.insert(tag);
                }
                Value::PixelSequence(_) => {}
            }
        }
        header
    }

    /// Overlays every leaf attribute of `obj`, descending into sequences.
    pub fn overlay_flattened(&mut self, obj: &InMemDicomObject) {
        for elem in obj.iter() {
            match elem.value() {
                Value::Primitive(value) => {
                    if let Some(values) = leaf_values(elem.vr(), value) {
                        self.attrs.insert(elem.tag(), values);
                    }
                }
                Value::Sequence(seq) => {
                    for item in seq.items() {
                        self.overlay_flattened(item);
                    }
                }
                Value::PixelSequence(_) => {}
            }
        }
    }

    /// Returns every value of `tag`.
    #[must_use]
    pub fn values(&self, tag: Tag) -> Option<&[String]> {
        self.attrs.get(&tag).map(SmallVec::as_slice)
    }

    /// Returns `true` if `tag` holds at least one value.
    #[must_use]
    pub fn contains(&self, tag: Tag) -> bool {
        self.values(tag).is_some_and(|v| !v.is_empty())
    }

    /// Returns `true` if the top level held the sequence `tag`.
    #[must_use]
    pub fn has_sequence(&self, tag: Tag) -> bool {
        self.sequences.contains(&tag)
    }

    /// Returns the first value of `tag` if it is non-empty.
    #[must_use]
    pub fn str(&self, tag: Tag) -> Option<&str> {
        self.values(tag)
            .and_then(<[String]>::first)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Returns the non-empty values of `tag`, upper-cased.
    #[must_use]
    pub fn upper_list(&self, tag: Tag) -> Vec<String> {
        self.values(tag)
            .unwrap_or_default()
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase())
            .collect()
    }

    /// Returns the first value of `tag` as a float.
    #[must_use]
    pub fn float(&self, tag: Tag) -> Option<f64> {
        self.str(tag).and_then(|s| s.parse().ok())
    }

    /// Returns every value of `tag` as floats, or `None` if any fails to parse.
    #[must_use]
    pub fn floats(&self, tag: Tag) -> Option<Vec<f64>> {
        let values = self.values(tag)?;
        if values.is_empty() {
            return None;
        }
        values.iter().map(|s| s.parse().ok()).collect()
    }

    /// Returns the first value of `tag` as an integer.
    ///
    /// Decimal text with an integral value (`"3.0"`) is accepted.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn int(&self, tag: Tag) -> Option<i64> {
        let text = self.str(tag)?;
        text.parse().ok().or_else(|| {
            let value: f64 = text.parse().ok()?;
            (value.fract() == 0.0).then_some(value as i64)
        })
    }

    /// Returns every value of `tag` as unsigned integers.
    #[must_use]
    pub fn uints(&self, tag: Tag) -> Option<Vec<u32>> {
        let values = self.values(tag)?;
        if values.is_empty() {
            return None;
        }
        values.iter().map(|s| s.parse().ok()).collect()
    }

    /// Replaces the values of `tag`.
    pub fn set<I, S>(&mut self, tag: Tag, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .insert(tag, values.into_iter().map(Into::into).collect());
    }

    /// Removes `tag`, returning its values.
    pub fn remove(&mut self, tag: Tag) -> Option<AttrValues> {
        self.attrs.remove(&tag)
    }
}

fn leaf_values(vr: VR, value: &PrimitiveValue) -> Option<AttrValues> {
    match vr {
        VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::OV => None,
        VR::UN => unknown_as_text(value),
        _ => Some(
            value
                .to_multi_str()
                .iter()
                .map(|s| trim_value(s).to_owned())
                .collect(),
        ),
    }
}

/// Private tags in implicit-VR files arrive as raw bytes. Short printable
/// values are numeric strings (IS/DS) and are worth keeping.
fn unknown_as_text(value: &PrimitiveValue) -> Option<AttrValues> {
    let PrimitiveValue::U8(bytes) = value else {
        return None;
    };
    if bytes.len() > MAX_UNKNOWN_TEXT
        || !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ' || *b == 0)
    {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    Some(text.split('\\').map(|s| trim_value(s).to_owned()).collect())
}

fn trim_value(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}
