//! Repairs encoding artifacts in server text before it reaches the UI.
//!
//! Historical conversation logs were written through a mismatched
//! Latin-1/UTF-8 round-trip, so stored text can arrive as mojibake
//! ("CafÃ©" for "Café"). Repair is detect-then-undo: text without the
//! suspect markers passes through untouched, and a repair that still looks
//! garbled is discarded rather than guessed at a second time.

use std::borrow::Cow;

use crate::models::TravelPayload;

/// Byte-sequence markers that UTF-8 text read as Latin-1 leaves behind.
const MOJIBAKE_MARKERS: &[&str] = &["Ã", "â€", "â‚", "Â", "ï¿"];

pub fn looks_garbled(text: &str) -> bool {
    MOJIBAKE_MARKERS.iter().any(|m| text.contains(m))
}

/// Undo one Latin-1/UTF-8 mis-decode, or return the input unchanged.
///
/// Idempotent: clean text is untouched, and repaired text contains no
/// markers so a second pass is a no-op.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    if !looks_garbled(text) {
        return Cow::Borrowed(text);
    }

    // Re-read each scalar value as the Windows-1252 byte it was decoded
    // from. A character with no byte equivalent means the text never went
    // through that round-trip, so the heuristic does not apply.
    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match cp1252_byte(ch) {
            Some(b) => bytes.push(b),
            None => return Cow::Borrowed(text),
        }
    }

    match String::from_utf8(bytes) {
        Ok(repaired) if !looks_garbled(&repaired) => Cow::Owned(repaired),
        _ => Cow::Borrowed(text),
    }
}

// Windows-1252 places printable punctuation in the 0x80..0x9F block that
// Latin-1 reserves for control codes; everything else matches Latin-1.
fn cp1252_byte(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if cp <= 0xFF {
        return Some(cp as u8);
    }
    let b = match ch {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(b)
}

/// Owned-string convenience for wire decoding paths.
pub fn clean_text(text: &str) -> String {
    repair_mojibake(text).into_owned()
}

/// Repair every free-text field of a structured payload in place.
pub fn scrub_payload(payload: &mut TravelPayload) {
    fix_opt(&mut payload.city);
    fix_opt(&mut payload.summary);
    fix_opt(&mut payload.error);

    if let Some(flights) = payload.flights.as_mut() {
        for flight in flights {
            fix_opt(&mut flight.airline);
            fix_opt(&mut flight.origin);
            fix_opt(&mut flight.destination);
            fix_opt(&mut flight.duration);
            fix(&mut flight.currency);
        }
    }
    if let Some(hotels) = payload.hotels.as_mut() {
        for hotel in hotels {
            fix_opt(&mut hotel.name);
            fix_opt(&mut hotel.address);
            fix(&mut hotel.currency);
        }
    }
    if let Some(pois) = payload.pois.as_mut() {
        for poi in pois {
            fix_opt(&mut poi.name);
            fix_opt(&mut poi.description);
        }
    }
    if let Some(plan) = payload.daily_plan.as_mut() {
        for day in plan {
            for activity in &mut day.activities {
                fix(activity);
            }
        }
    }
    if let Some(budget) = payload.budget.as_mut() {
        fix(&mut budget.currency);
    }
}

fn fix(text: &mut String) {
    if let Cow::Owned(repaired) = repair_mojibake(text) {
        *text = repaired;
    }
}

fn fix_opt(text: &mut Option<String>) {
    if let Some(text) = text.as_mut() {
        fix(text);
    }
}

/// Prefer the first non-empty alternative of a divergently-named field,
/// defaulting to an explicit empty string rather than propagating absence.
pub fn first_non_empty(primary: Option<&str>, fallback: Option<&str>) -> String {
    match primary {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => fallback.unwrap_or_default().to_string(),
    }
}
