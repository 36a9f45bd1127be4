//! Intra-series identity of an image.
//!
//! Files of one series UID that share a [`Fingerprint`] were produced by the
//! same acquisition settings. The sorter splits a UID into sub-series on
//! fingerprint changes, and the resolver uses [`Fingerprint::differing_fields`]
//! to pick a disambiguation strategy.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::name::ComplexComponent;
use super::vector::{ApproxVector, VECTOR_EPSILON};

/// A field participating in the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintField {
    /// Image orientation vector.
    Orientation,
    /// Repetition time.
    RepetitionTime,
    /// Flip angle.
    FlipAngle,
    /// Echo time.
    EchoTime,
    /// Trigger time.
    TriggerTime,
    /// Inversion time.
    InversionTime,
    /// Complex-image component.
    ComplexComponent,
    /// Image type tags.
    ImageType,
}

impl FingerprintField {
    /// Every field, in comparison order.
    pub const ALL: [Self; 8] = [
        Self::Orientation,
        Self::RepetitionTime,
        Self::FlipAngle,
        Self::EchoTime,
        Self::TriggerTime,
        Self::InversionTime,
        Self::ComplexComponent,
        Self::ImageType,
    ];
}

/// The acquisition settings that identify a sub-series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Image orientation vector.
    pub orientation: Option<ApproxVector>,
    /// Repetition time (ms).
    pub repetition_time: Option<f64>,
    /// Flip angle (degrees).
    pub flip_angle: Option<f64>,
    /// Echo time (ms).
    pub echo_time: Option<f64>,
    /// Trigger time (ms).
    pub trigger_time: Option<f64>,
    /// Inversion time (ms).
    pub inversion_time: Option<f64>,
    /// Complex-image component.
    pub complex: Option<ComplexComponent>,
    /// Image type tags, upper-case.
    pub image_type: Vec<String>,
}

/// A hashable, totally ordered form of a [`Fingerprint`].
///
/// Floats are snapped to the same grid as [`ApproxVector::quantized`], so two
/// fingerprints with equal keys compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FingerprintKey {
    orientation: Option<SmallVec<[i64; 6]>>,
    scalars: [Option<i64>; 5],
    complex: Option<ComplexComponent>,
    image_type: Vec<String>,
}

#[allow(clippy::cast_possible_truncation)] // acquisition times and angles are small
fn quantize(value: Option<f64>) -> Option<i64> {
    value.map(|v| (v / (2.0 * VECTOR_EPSILON)).round() as i64)
}

fn scalar_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= VECTOR_EPSILON,
        _ => false,
    }
}

impl Fingerprint {
    /// Returns the grouping key.
    #[must_use]
    pub fn key(&self) -> FingerprintKey {
        FingerprintKey {
            orientation: self.orientation.as_ref().map(ApproxVector::quantized),
            scalars: [
                quantize(self.repetition_time),
                quantize(self.flip_angle),
                quantize(self.echo_time),
                quantize(self.trigger_time),
                quantize(self.inversion_time),
            ],
            complex: self.complex,
            image_type: self.image_type.clone(),
        }
    }

    /// Returns `true` if `field` matches between `self` and `other`.
    #[must_use]
    pub fn field_eq(&self, other: &Self, field: FingerprintField) -> bool {
        match field {
            FingerprintField::Orientation => self.orientation == other.orientation,
            FingerprintField::RepetitionTime => {
                scalar_eq(self.repetition_time, other.repetition_time)
            }
            FingerprintField::FlipAngle => scalar_eq(self.flip_angle, other.flip_angle),
            FingerprintField::EchoTime => scalar_eq(self.echo_time, other.echo_time),
            FingerprintField::TriggerTime => scalar_eq(self.trigger_time, other.trigger_time),
            FingerprintField::InversionTime => {
                scalar_eq(self.inversion_time, other.inversion_time)
            }
            FingerprintField::ComplexComponent => self.complex == other.complex,
            FingerprintField::ImageType => self.image_type == other.image_type,
        }
    }

    /// Returns the fields on which any member of `group` differs from the
    /// first, in [`FingerprintField::ALL`] order.
    ///
    /// # Examples
    ///
    /// ```
    /// use si_core::{Fingerprint, FingerprintField};
    ///
    /// let short = Fingerprint { echo_time: Some(8.0), ..Fingerprint::default() };
    /// let long = Fingerprint { echo_time: Some(80.0), ..Fingerprint::default() };
    /// assert_eq!(
    ///     Fingerprint::differing_fields(&[&short, &long]),
    ///     vec![FingerprintField::EchoTime]
    /// );
    /// ```
    #[must_use]
    pub fn differing_fields(group: &[&Self]) -> Vec<FingerprintField> {
        let Some((first, rest)) = group.split_first() else {
            return Vec::new();
        };
        FingerprintField::ALL
            .into_iter()
            .filter(|field| rest.iter().any(|other| !first.field_eq(other, *field)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Fingerprint {
        Fingerprint {
            orientation: Some(ApproxVector::from([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
            repetition_time: Some(2000.0),
            flip_angle: Some(90.0),
            echo_time: Some(12.0),
            trigger_time: None,
            inversion_time: None,
            complex: Some(ComplexComponent::Magnitude),
            image_type: vec!["ORIGINAL".to_owned(), "PRIMARY".to_owned()],
        }
    }

    #[test]
    fn test_key_equal_for_close_values() {
        let a = base();
        let mut b = base();
        b.echo_time = Some(12.00001);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_differs_on_image_type() {
        let a = base();
        let mut b = base();
        b.image_type.push("M".to_owned());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_differing_fields_multiple() {
        let a = base();
        let mut b = base();
        b.inversion_time = Some(900.0);
        b.complex = Some(ComplexComponent::Phase);
        assert_eq!(
            Fingerprint::differing_fields(&[&a, &b]),
            vec![
                FingerprintField::InversionTime,
                FingerprintField::ComplexComponent
            ]
        );
    }

    #[test]
    fn test_differing_fields_identical() {
        let a = base();
        assert!(Fingerprint::differing_fields(&[&a, &a.clone()]).is_empty());
        assert!(Fingerprint::differing_fields(&[]).is_empty());
    }
}
