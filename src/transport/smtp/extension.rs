//! ESMTP feature map: parses the multi-line EHLO reply into
//! `lowercase-keyword -> FeatureValue`.

use std::collections::HashMap;

/// A feature's advertised value: either present with no parameters, or
/// present with a trailing parameter string (kept verbatim, already trimmed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureValue {
    Present,
    WithParams(String),
}

impl FeatureValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Present => None,
            FeatureValue::WithParams(s) => Some(s),
        }
    }
}

/// The parsed capability set advertised by the last successful EHLO.
#[derive(Clone, Debug, Default)]
pub struct Features(HashMap<String, FeatureValue>);

impl Features {
    pub fn new() -> Self {
        Features(HashMap::new())
    }

    /// Parses `data` (the EHLO reply body, LF-joined lines) into a feature
    /// map. Lines that don't match `^(?:\d+[-=]?)\s*?(\S+)(?:\s+(.*))?$` are
    /// silently ignored, matching the source parser's tolerance of stray
    /// banner lines some servers interleave with capability lines.
    pub fn parse(data: &str) -> Self {
        let mut features = HashMap::new();
        for line in data.split('\n') {
            if let Some((keyword, value)) = parse_feature_line(line) {
                features.insert(keyword, value);
            }
        }
        Features(features)
    }

    pub fn get(&self, keyword: &str) -> Option<&FeatureValue> {
        self.0.get(&keyword.to_lowercase())
    }

    /// Returns whether `keyword` was advertised.
    ///
    /// Preserved intentionally inverted relative to its name: this mirrors a
    /// documented quirk in the reference implementation, where the check is
    /// actually `features[k] === undefined`. Nothing in this crate currently
    /// calls it; flip the sign only with a deliberate product decision, not
    /// as an incidental fix.
    pub fn has_extn(&self, keyword: &str) -> bool {
        self.get(keyword).is_none()
    }

    pub fn supports(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_feature_line(line: &str) -> Option<(String, FeatureValue)> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = rest.strip_prefix('-').or_else(|| rest.strip_prefix('=')).unwrap_or(rest);
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }

    let mut parts = rest.splitn(2, char::is_whitespace);
    let keyword = parts.next()?.to_lowercase();
    if keyword.is_empty() {
        return None;
    }
    let value = match parts.next().map(str::trim) {
        Some(s) if !s.is_empty() => FeatureValue::WithParams(s.to_string()),
        _ => FeatureValue::Present,
    };
    Some((keyword, value))
}
