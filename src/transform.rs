//! Turns fetch query parameters into a resize/format directive.
//!
//! Parsing never fails: a dimension that is not an integer is simply left
//! out, and an unknown format is passed through for the codec to reject.

use serde::Deserialize;
use utoipa::IntoParams;

/// Raw `?w=&h=&format=` query. Kept as strings so the extractor never
/// rejects a request over a malformed number.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransformQuery {
    /// Target width in pixels.
    pub w: Option<String>,
    /// Target height in pixels.
    pub h: Option<String>,
    /// Output encoding, e.g. `png`, `jpeg`, `webp`.
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub allow_upscale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    pub resize: Option<Resize>,
    pub format: Option<String>,
}

impl Directive {
    pub fn build(
        raw_width: Option<&str>,
        raw_height: Option<&str>,
        raw_format: Option<&str>,
    ) -> Self {
        let width = raw_width.and_then(parse_dimension);
        let height = raw_height.and_then(parse_dimension);
        let resize = (width.is_some() || height.is_some()).then_some(Resize {
            width,
            height,
            allow_upscale: false,
        });
        let format = raw_format
            .filter(|format| !format.is_empty())
            .map(str::to_string);
        Self { resize, format }
    }
}

impl From<&TransformQuery> for Directive {
    fn from(query: &TransformQuery) -> Self {
        Self::build(
            query.w.as_deref(),
            query.h.as_deref(),
            query.format.as_deref(),
        )
    }
}

/// Leading-digits integer parse: `" 120px"` is 120, `"3.7"` is 3.
/// Zero, negatives, overflow and inputs without leading digits are `None`.
fn parse_dimension(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    match unsigned[..end].parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(value) => Some(value),
    }
}
