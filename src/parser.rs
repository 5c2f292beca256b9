//! Barcode Parser — turns the assembler's raw buffer into a formatted
//! barcode string plus a structured set of positional fields.
//!
//! Deliberately hand-written rather than built on the `regex` crate: the
//! grammar is thin enough that a small set of byte-oriented scanning
//! helpers reads as clearly as a regex and avoids pinning the crate to one
//! regex dialect's lookahead semantics.

use chrono::NaiveDate;

/// Length of the leading run of ASCII letters, if it is at least `min`.
fn take_letters(s: &[u8], min: usize) -> Option<usize> {
    let len = s.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    (len >= min).then_some(len)
}

/// Length of the leading run of ASCII digits, if it is at least `min`.
fn take_digits(s: &[u8], min: usize) -> Option<usize> {
    let len = s.iter().take_while(|b| b.is_ascii_digit()).count();
    (len >= min).then_some(len)
}

/// Matches a single `ITEM-QTY` token prefix: `LETTERS(>=2) DIGITS(>=1) "-" DIGITS(>=1)`.
/// Returns the number of bytes consumed from the front of `s`.
fn match_item_qty_prefix(s: &[u8]) -> Option<usize> {
    let letters = take_letters(s, 2)?;
    let digits1 = take_digits(&s[letters..], 1)?;
    let after_digits1 = letters + digits1;
    if s.get(after_digits1).copied() != Some(b'-') {
        return None;
    }
    let digits2 = take_digits(&s[after_digits1 + 1..], 1)?;
    Some(after_digits1 + 1 + digits2)
}

/// True if `s` opens with two `ITEM-QTY` tokens back to back, joined either
/// by direct concatenation or by a single `~` — the two ways the scanner
/// can emit a multi-item child blob.
fn starts_with_child_blob(s: &[u8]) -> bool {
    let Some(first_len) = match_item_qty_prefix(s) else {
        return false;
    };
    let rest = &s[first_len..];
    if match_item_qty_prefix(rest).is_some() {
        return true;
    }
    rest.first() == Some(&b'~') && match_item_qty_prefix(&rest[1..]).is_some()
}

/// Finds the byte offset of the parent/child boundary hyphen: the first
/// `-` in `raw` whose remainder opens with a child blob.
fn find_boundary(raw: &str) -> Option<usize> {
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'-' && starts_with_child_blob(&bytes[i + 1..]) {
            return Some(i);
        }
    }
    None
}

/// Formats one child token (already trimmed of leading `-`/spaces) into
/// `ITEM_QTY`, upper-casing the item part. Returns `None` if the token
/// doesn't fully match `([A-Za-z]{2,}\d+)-(\d+)`.
fn format_child_token(token: &str) -> Option<String> {
    let bytes = token.as_bytes();
    let letters = take_letters(bytes, 2)?;
    let digits1 = take_digits(&bytes[letters..], 1)?;
    let item_end = letters + digits1;
    if bytes.get(item_end).copied() != Some(b'-') {
        return None;
    }
    let digits2 = take_digits(&bytes[item_end + 1..], 1)?;
    if item_end + 1 + digits2 != bytes.len() {
        return None; // token must fully match, no trailing garbage
    }
    let item = token[..item_end].to_uppercase();
    let qty = &token[item_end + 1..];
    Some(format!("{item}_{qty}"))
}

/// Stage 1 of the parser: produces the formatted barcode string from the
/// assembler's raw buffer.
pub fn format_barcode(raw: &str) -> String {
    let raw = raw.trim();
    let Some(boundary) = find_boundary(raw) else {
        return raw.trim_end_matches(['-', ' ']).trim().to_string();
    };

    let parent = raw[..boundary].trim_end_matches(['-', ' ']).trim().to_string();
    let child_region = raw[boundary..].trim_start_matches(['-', ' ']);
    let child_region = child_region.replace('~', "|");

    // Insert a `|` between a digit and a following item-qty token that
    // isn't already separated, so direct concatenation tokenizes the same
    // way as a `~`-joined child blob.
    let child_region = insert_token_separators(&child_region);

    let children: Vec<String> = child_region
        .split('|')
        .filter_map(|tok| format_child_token(tok.trim_matches(['-', ' '])))
        .collect();

    if children.is_empty() {
        parent
    } else {
        format!("{parent} [{}]", children.join("|"))
    }
}

/// Inserts `|` between any digit immediately followed by
/// `LETTERS(>=2) DIGITS "-" DIGITS` — the concatenated-token case.
fn insert_token_separators(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len() + 4);
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        out.push(b as char);
        if b.is_ascii_digit() && match_item_qty_prefix(&bytes[i + 1..]).is_some() {
            out.push('|');
        }
        i += 1;
    }
    out
}

/// Positional fields extracted from the parent barcode text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentFields {
    pub stowage: Option<String>,
    pub flight_no: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub dacs_class: Option<String>,
    pub leg: Option<String>,
    pub gally: Option<String>,
    pub block_no: Option<String>,
    pub container_code: Option<String>,
    pub des: Option<String>,
    pub dacs_ac_type: Option<String>,
}

/// Returns the parent portion of a formatted barcode: everything before a
/// `[` if present, else the whole string, trimmed.
pub fn parent_text(formatted: &str) -> &str {
    match formatted.find('[') {
        Some(idx) => formatted[..idx].trim(),
        None => formatted.trim(),
    }
}

/// Stage 2 of the parser: splits the parent text on `-` and assigns
/// positional fields. Never fails; missing or malformed segments stay
/// `None`.
pub fn parse_parent_fields(parent: &str) -> ParentFields {
    let segments: Vec<&str> = parent.split('-').collect();
    let get = |i: usize| segments.get(i).map(|s| s.to_string());

    ParentFields {
        stowage: get(0),
        flight_no: get(1),
        order_date: segments.get(2).and_then(|s| parse_order_date(s)),
        dacs_class: get(3),
        leg: get(4),
        gally: get(5),
        block_no: get(6),
        container_code: get(7),
        des: get(8),
        dacs_ac_type: get(9),
    }
}

/// Parses `dd.mm.yy` with a pivot year of 79: `yy <= 79` maps to `2000+yy`,
/// otherwise `1900+yy`. Any malformed input yields `None` rather than
/// failing the pipeline.
fn parse_order_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('.');
    let dd: u32 = parts.next()?.parse().ok()?;
    let mm: u32 = parts.next()?.parse().ok()?;
    let yy: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let yyyy = if yy <= 79 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(yyyy, mm, dd)
}
