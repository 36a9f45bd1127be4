//! Compiled text patterns shared by the filter and the classifier.
//!
//! The `regex` crate has no look-around, so the few rules that need it are
//! expressed as a plain match plus a check on the surrounding text
//! ([`contains_not_followed_by`], [`contains_not_preceded_by`],
//! [`matches_not_preceded_by`]).

use std::sync::OnceLock;

use regex::Regex;
use si_core::BodyPart;

use crate::error::NamingError;

/// Series-description fragments of localizer, survey and calibration scans.
pub const LOCALIZER_WORDS: [&str; 7] = [
    "loc",
    "survey",
    "scout",
    "3-pl",
    "scanogram",
    "smartbrain",
    "pride",
];

/// Series-description fragments that mark a post-contrast acquisition.
pub const POST_CONTRAST_WORDS: [&str; 7] = ["post", "+c", "gad", "gd", "pstc", "+ c", "c+"];

const CALIBRATION: &str = r"cal(?:\W|ibration|$)";
const T2_MAP: &str = r"t2.?map";
const SPGR_NAME: &str = r"t1.?[tf]fe|fl3d1";
const TFE_NAME: &str = r"t1.?tfe";
const INVERSION_DESC: &str = r"flair|stir|mp.?rage|bravo";
const THORACIC: &str = r"thor|t[ -]?sp|t.?spine";
const CERVICAL_ABBREV: &str = r"c[ -]?sp|c.?spine";

/// Body-part table, tried in order; the first hit wins.
const BODY_PARTS: [(&str, BodyPart, Option<Guard>); 8] = [
    (r"brain|^br_", BodyPart::Brain, None),
    (r"ct[ -]?spine", BodyPart::Spine, None),
    (
        r"cerv|c[ -]?sp|c.?spine|msma",
        BodyPart::CSpine,
        Some(Guard::Thoracic),
    ),
    (r"thor|t[ -]?sp|t.?spine", BodyPart::TSpine, Some(Guard::Cervical)),
    (r"lumb|l[ -]?sp|l.?spine", BodyPart::LSpine, None),
    (
        r"\sc.?tl?(?:\s+|$)|^sp_|t1.ax.vibe|t1.vibe.tra|ax.t1.vibe",
        BodyPart::Spine,
        None,
    ),
    (r"orbit|thin|^on_", BodyPart::Orbits, None),
    (r"spine", BodyPart::Spine, None),
];

/// A study-description check that turns a spine-level hit back into a
/// plain `SPINE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The study mentions the thoracic spine.
    Thoracic,
    /// The study mentions the cervical spine.
    Cervical,
}

/// One row of the body-part table.
#[derive(Debug)]
pub struct BodyPattern {
    /// Pattern matched against the search string.
    pub regex: Regex,
    /// Body part on a hit.
    pub part: BodyPart,
    /// Optional study-description override.
    pub guard: Option<Guard>,
}

/// Every compiled pattern used while naming.
#[derive(Debug)]
pub struct Patterns {
    /// `cal` followed by a non-word character, `ibration`, or the end.
    pub calibration: Regex,
    /// T2 map image types.
    pub t2_map: Regex,
    /// Spoiled gradient-echo sequence names.
    pub spgr_name: Regex,
    /// Turbo field echo sequence names.
    pub tfe_name: Regex,
    /// Descriptions implying an inversion pulse.
    pub inversion_desc: Regex,
    /// Thoracic spine mentions.
    pub thoracic: Regex,
    /// Abbreviated cervical spine mentions.
    pub cervical_abbrev: Regex,
    /// Body-part table.
    pub body_parts: Vec<BodyPattern>,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn compile(pattern: &'static str) -> Result<Regex, NamingError> {
    Regex::new(pattern).map_err(|source| NamingError::Pattern { pattern, source })
}

impl Patterns {
    fn compile() -> Result<Self, NamingError> {
        let body_parts = BODY_PARTS
            .iter()
            .map(|(pattern, part, guard)| {
                Ok(BodyPattern {
                    regex: compile(pattern)?,
                    part: *part,
                    guard: *guard,
                })
            })
            .collect::<Result<Vec<_>, NamingError>>()?;
        Ok(Self {
            calibration: compile(CALIBRATION)?,
            t2_map: compile(T2_MAP)?,
            spgr_name: compile(SPGR_NAME)?,
            tfe_name: compile(TFE_NAME)?,
            inversion_desc: compile(INVERSION_DESC)?,
            thoracic: compile(THORACIC)?,
            cervical_abbrev: compile(CERVICAL_ABBREV)?,
            body_parts,
        })
    }

    /// Returns `true` if `study` triggers `guard`.
    #[must_use]
    pub fn guard_matches(&self, guard: Guard, study: &str) -> bool {
        match guard {
            Guard::Thoracic => self.thoracic.is_match(study),
            Guard::Cervical => {
                study.contains("cerv") || matches_not_preceded_by(&self.cervical_abbrev, study, "ci")
            }
        }
    }

    /// Returns `true` if a description names a calibration scan (`cal` not
    /// preceded by `cervi`).
    #[must_use]
    pub fn is_calibration(&self, description: &str) -> bool {
        matches_not_preceded_by(&self.calibration, description, "cervi")
    }
}

/// Returns the compiled patterns.
///
/// Patterns are compiled once and cached for all subsequent calls. This
/// function is thread-safe.
///
/// # Errors
///
/// Returns [`NamingError::Pattern`] if a pattern fails to compile.
pub fn patterns() -> Result<&'static Patterns, NamingError> {
    if let Some(patterns) = PATTERNS.get() {
        return Ok(patterns);
    }
    let compiled = Patterns::compile()?;
    Ok(PATTERNS.get_or_init(|| compiled))
}

/// Returns `true` if `needle` occurs in `text` without `forbidden` right
/// after it.
#[must_use]
pub fn contains_not_followed_by(text: &str, needle: &str, forbidden: &str) -> bool {
    text.match_indices(needle)
        .any(|(start, _)| !text[start + needle.len()..].starts_with(forbidden))
}

/// Returns `true` if `needle` occurs in `text` without `forbidden` right
/// before it.
#[must_use]
pub fn contains_not_preceded_by(text: &str, needle: &str, forbidden: &str) -> bool {
    text.match_indices(needle)
        .any(|(start, _)| !text[..start].ends_with(forbidden))
}

/// Returns `true` if `regex` matches at some position of `text` not preceded
/// by `forbidden`.
///
/// Every start position is tried, so a rejected match does not hide an
/// overlapping one further on.
#[must_use]
pub fn matches_not_preceded_by(regex: &Regex, text: &str, forbidden: &str) -> bool {
    let mut pos = 0;
    while pos <= text.len() {
        let Some(found) = regex.find_at(text, pos) else {
            return false;
        };
        if !text[..found.start()].ends_with(forbidden) {
            return true;
        }
        pos = found.start() + text[found.start()..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
