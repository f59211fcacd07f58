use crate::models::DetectedLanguage;

const HEBREW_BLOCK: std::ops::RangeInclusive<char> = '\u{0590}'..='\u{05FF}';

/// Detect the dominant language of an OCR result.
///
/// Scanned Hebrew medical records routinely mix Hebrew body text with
/// English lab values and drug names, so detection is a script-ratio
/// heuristic over letter characters rather than a full classifier. A
/// modest share of Hebrew letters is enough to call the text Hebrew,
/// because general-purpose engines tend to mangle Hebrew into sparse
/// fragments.
///
/// Returns `Unknown` instead of failing: digits-and-noise pages are a
/// normal OCR outcome, not an error.
pub fn detect_language(text: &str) -> DetectedLanguage {
    let mut hebrew = 0usize;
    let mut latin = 0usize;
    let mut letters = 0usize;

    for c in text.chars() {
        if HEBREW_BLOCK.contains(&c) {
            hebrew += 1;
            letters += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
            letters += 1;
        } else if c.is_alphabetic() {
            letters += 1;
        }
    }

    if letters == 0 {
        return DetectedLanguage::Unknown;
    }

    let scripted = hebrew + latin;
    if scripted == 0 {
        return DetectedLanguage::Unknown;
    }

    if hebrew as f32 / scripted as f32 >= 0.15 {
        DetectedLanguage::He
    } else if latin > 0 {
        DetectedLanguage::En
    } else {
        DetectedLanguage::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_hebrew() {
        assert_eq!(detect_language("שלום עולם"), DetectedLanguage::He);
        assert_eq!(
            detect_language("המטופל מתלונן על כאבי גב תחתון"),
            DetectedLanguage::He
        );
    }

    #[test]
    fn test_detect_english() {
        assert_eq!(
            detect_language("Patient presents with lower back pain"),
            DetectedLanguage::En
        );
    }

    #[test]
    fn test_mixed_text_leans_hebrew() {
        // Hebrew narrative with embedded English lab names should still
        // read as Hebrew.
        assert_eq!(
            detect_language("בדיקת MRI הדגימה בלט דיסק L4-L5 עם לחץ על שורש העצב"),
            DetectedLanguage::He
        );
    }

    #[test]
    fn test_trace_hebrew_in_english_text_stays_english() {
        let text = "Patient was seen at the occupational clinic for follow up. \
                    Blood pressure was within normal limits and the treadmill \
                    stress test was completed without complications. א";
        assert_eq!(detect_language(text), DetectedLanguage::En);
    }

    #[test]
    fn test_no_letters_is_unknown() {
        assert_eq!(detect_language(""), DetectedLanguage::Unknown);
        assert_eq!(detect_language("1234 --- !!!"), DetectedLanguage::Unknown);
        assert_eq!(detect_language("   \n\t"), DetectedLanguage::Unknown);
    }

    #[test]
    fn test_non_latin_non_hebrew_is_unknown() {
        assert_eq!(detect_language("Привет мир"), DetectedLanguage::Unknown);
    }
}
