//! # Diff-match-patch codec
//!
//! Encodes and decodes the textual patch format carried by `diffMatchPatch`
//! patches:
//!
//! ```text
//! @@ -1,5 +1,11 @@
//!  Hello
//! + world
//! ```
//!
//! Offsets count Unicode scalar values. Hunks are applied at their expected
//! location when the base text matches there, otherwise at the nearest exact
//! occurrence of the hunk's base text. A hunk whose base text cannot be found
//! fails instead of being mangled into the document.

use crate::error::DmpError;

/// Number of context characters kept around a change
const CONTEXT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Equal(String),
    Delete(String),
    Insert(String),
}

impl Diff {
    fn text(&self) -> &str {
        match self {
            Diff::Equal(t) | Diff::Delete(t) | Diff::Insert(t) => t,
        }
    }
}

/// One hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmpPatch {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl DmpPatch {
    /// Text the hunk expects to find
    pub fn source_text(&self) -> String {
        self.diffs
            .iter()
            .filter(|d| !matches!(d, Diff::Insert(_)))
            .map(Diff::text)
            .collect()
    }

    /// Text the hunk leaves behind
    pub fn target_text(&self) -> String {
        self.diffs
            .iter()
            .filter(|d| !matches!(d, Diff::Delete(_)))
            .map(Diff::text)
            .collect()
    }

    /// Offset of the first changed character, skipping leading context
    pub fn change_start(&self) -> usize {
        let context = match self.diffs.first() {
            Some(Diff::Equal(t)) => t.chars().count(),
            _ => 0,
        };
        self.start1 + context
    }

    /// Net change in text length
    pub fn length_delta(&self) -> isize {
        self.length2 as isize - self.length1 as isize
    }
}

/// Diff two strings as common prefix, changed middle, common suffix
pub fn diff_main(old: &str, new: &str) -> Vec<Diff> {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let mut diffs = Vec::new();
    let collect = |chars: &[char]| chars.iter().collect::<String>();
    if prefix > 0 {
        diffs.push(Diff::Equal(collect(&old_chars[..prefix])));
    }
    if old_chars.len() - suffix > prefix {
        diffs.push(Diff::Delete(collect(&old_chars[prefix..old_chars.len() - suffix])));
    }
    if new_chars.len() - suffix > prefix {
        diffs.push(Diff::Insert(collect(&new_chars[prefix..new_chars.len() - suffix])));
    }
    if suffix > 0 {
        diffs.push(Diff::Equal(collect(&old_chars[old_chars.len() - suffix..])));
    }
    diffs
}

/// Build the patch list turning `old` into `new`
pub fn make_patches(old: &str, new: &str) -> Vec<DmpPatch> {
    if old == new {
        return Vec::new();
    }

    let mut diffs = diff_main(old, new);

    // Trim the equalities down to the context margin
    let mut start = 0;
    if let Some(Diff::Equal(prefix)) = diffs.first_mut() {
        let chars: Vec<char> = prefix.chars().collect();
        let keep = chars.len().min(CONTEXT);
        start = chars.len() - keep;
        *prefix = chars[start..].iter().collect();
    }
    let has_change = diffs.len() > 1;
    if let Some(Diff::Equal(suffix)) = diffs.last_mut() {
        if has_change {
            let chars: Vec<char> = suffix.chars().collect();
            let keep = chars.len().min(CONTEXT);
            *suffix = chars[..keep].iter().collect();
        }
    }

    let length1 = diffs
        .iter()
        .filter(|d| !matches!(d, Diff::Insert(_)))
        .map(|d| d.text().chars().count())
        .sum();
    let length2 = diffs
        .iter()
        .filter(|d| !matches!(d, Diff::Delete(_)))
        .map(|d| d.text().chars().count())
        .sum();

    vec![DmpPatch {
        diffs,
        start1: start,
        start2: start,
        length1,
        length2,
    }]
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

/// Serialize hunks to patch text
pub fn patches_to_text(patches: &[DmpPatch]) -> String {
    let mut out = String::new();
    for patch in patches {
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            coords(patch.start1, patch.length1),
            coords(patch.start2, patch.length2)
        ));
        for diff in &patch.diffs {
            let (sign, text) = match diff {
                Diff::Equal(t) => (' ', t),
                Diff::Delete(t) => ('-', t),
                Diff::Insert(t) => ('+', t),
            };
            out.push(sign);
            out.push_str(&encode(text));
            out.push('\n');
        }
    }
    out
}

/// Convenience: diff two strings straight to patch text
pub fn make_patch_text(old: &str, new: &str) -> String {
    patches_to_text(&make_patches(old, new))
}

fn parse_coords(s: &str, header: &str) -> Result<(usize, usize), DmpError> {
    let bad = || DmpError::InvalidHeader(header.to_string());
    match s.split_once(',') {
        Some((start, len)) => {
            let start: usize = start.parse().map_err(|_| bad())?;
            let len: usize = len.parse().map_err(|_| bad())?;
            if len == 0 {
                Ok((start, 0))
            } else {
                Ok((start.checked_sub(1).ok_or_else(bad)?, len))
            }
        }
        None => {
            let start: usize = s.parse().map_err(|_| bad())?;
            Ok((start.checked_sub(1).ok_or_else(bad)?, 1))
        }
    }
}

/// Parse patch text into hunks
pub fn parse_patches(text: &str) -> Result<Vec<DmpPatch>, DmpError> {
    let mut patches: Vec<DmpPatch> = Vec::new();

    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@ -") {
            let inner = header
                .strip_suffix(" @@")
                .ok_or_else(|| DmpError::InvalidHeader(line.to_string()))?;
            let (left, right) = inner
                .split_once(" +")
                .ok_or_else(|| DmpError::InvalidHeader(line.to_string()))?;
            let (start1, length1) = parse_coords(left, line)?;
            let (start2, length2) = parse_coords(right, line)?;
            patches.push(DmpPatch {
                diffs: Vec::new(),
                start1,
                start2,
                length1,
                length2,
            });
            continue;
        }

        let current = patches
            .last_mut()
            .ok_or_else(|| DmpError::InvalidLine(line.to_string()))?;
        let mut chars = line.chars();
        let sign = chars.next();
        let body = decode(chars.as_str())?;
        match sign {
            Some(' ') => current.diffs.push(Diff::Equal(body)),
            Some('-') => current.diffs.push(Diff::Delete(body)),
            Some('+') => current.diffs.push(Diff::Insert(body)),
            _ => return Err(DmpError::InvalidLine(line.to_string())),
        }
    }

    Ok(patches)
}

fn find_nearest(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .filter(|&i| haystack[i..i + needle.len()] == *needle)
        .min_by_key(|&i| i.abs_diff(expected))
}

/// Apply hunks to `text`
pub fn apply_patches(patches: &[DmpPatch], text: &str) -> Result<String, DmpError> {
    let mut chars: Vec<char> = text.chars().collect();
    let mut drift: isize = 0;

    for (hunk, patch) in patches.iter().enumerate() {
        let source: Vec<char> = patch.source_text().chars().collect();
        let target: Vec<char> = patch.target_text().chars().collect();
        let expected = (patch.start2 as isize + drift).clamp(0, chars.len() as isize) as usize;

        let location = if source.is_empty() {
            Some(expected)
        } else {
            find_nearest(&chars, &source, expected)
        };
        let location = location.ok_or(DmpError::BaseMismatch { hunk })?;

        chars.splice(location..location + source.len(), target);
        drift = location as isize - patch.start2 as isize;
    }

    Ok(chars.into_iter().collect())
}

/// Parse and apply patch text in one step
pub fn apply_patch_text(patch_text: &str, text: &str) -> Result<String, DmpError> {
    apply_patches(&parse_patches(patch_text)?, text)
}

const UNESCAPED: &str = ";,/?:@&=+$-_.!~*'()# ";

fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || UNESCAPED.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

fn decode(text: &str) -> Result<String, DmpError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text
                .get(i + 1..i + 3)
                .ok_or_else(|| DmpError::InvalidEncoding(text.to_string()))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| DmpError::InvalidEncoding(text.to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| DmpError::InvalidEncoding(text.to_string()))
}
