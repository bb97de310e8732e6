//! Primary-script detection, used to recognize likely transliterations
//! (e.g. a Cyrillic artist name matched against a Latinized API result).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Cyrillic,
    Chinese,
    Japanese,
    Korean,
    Arabic,
    Hebrew,
    Greek,
    Thai,
    Devanagari,
    Unknown,
}

fn script_of_char(c: char) -> Option<Script> {
    match c as u32 {
        0x0041..=0x024F => Some(Script::Latin),
        0x0400..=0x04FF => Some(Script::Cyrillic),
        0x4E00..=0x9FFF | 0x3400..=0x4DBF => Some(Script::Chinese),
        0x3040..=0x309F | 0x30A0..=0x30FF => Some(Script::Japanese),
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Some(Script::Korean),
        0x0600..=0x06FF | 0x0750..=0x077F => Some(Script::Arabic),
        0x0590..=0x05FF => Some(Script::Hebrew),
        0x0370..=0x03FF => Some(Script::Greek),
        0x0E00..=0x0E7F => Some(Script::Thai),
        0x0900..=0x097F => Some(Script::Devanagari),
        _ => None,
    }
}

/// Returns the most frequently occurring script among `text`'s alphabetic
/// characters, or `Unknown` if none is recognized.
pub fn detect_primary_script(text: &str) -> Script {
    let mut counts: [u32; 10] = [0; 10];
    let index = |s: Script| -> usize {
        match s {
            Script::Latin => 0,
            Script::Cyrillic => 1,
            Script::Chinese => 2,
            Script::Japanese => 3,
            Script::Korean => 4,
            Script::Arabic => 5,
            Script::Hebrew => 6,
            Script::Greek => 7,
            Script::Thai => 8,
            Script::Devanagari => 9,
            Script::Unknown => unreachable!("Unknown is never counted"),
        }
    };

    for c in text.chars() {
        if let Some(script) = script_of_char(c) {
            counts[index(script)] += 1;
        }
    }

    let (best_idx, best_count) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, count)| **count)
        .expect("counts is non-empty");

    if *best_count == 0 {
        return Script::Unknown;
    }

    match best_idx {
        0 => Script::Latin,
        1 => Script::Cyrillic,
        2 => Script::Chinese,
        3 => Script::Japanese,
        4 => Script::Korean,
        5 => Script::Arabic,
        6 => Script::Hebrew,
        7 => Script::Greek,
        8 => Script::Thai,
        9 => Script::Devanagari,
        _ => unreachable!(),
    }
}

const NON_LATIN_SCRIPTS: &[Script] = &[
    Script::Cyrillic,
    Script::Chinese,
    Script::Japanese,
    Script::Korean,
    Script::Arabic,
    Script::Hebrew,
    Script::Greek,
    Script::Thai,
    Script::Devanagari,
];

/// `true` iff exactly one of `a`, `b` is Latin and the other is a named
/// non-Latin script (a likely transliteration pair, not an unrelated name).
pub fn is_cross_script(a: &str, b: &str) -> bool {
    let script_a = detect_primary_script(a);
    let script_b = detect_primary_script(b);

    let a_latin = script_a == Script::Latin;
    let b_latin = script_b == Script::Latin;
    let a_non_latin = NON_LATIN_SCRIPTS.contains(&script_a);
    let b_non_latin = NON_LATIN_SCRIPTS.contains(&script_b);

    (a_latin && b_non_latin) || (a_non_latin && b_latin)
}
