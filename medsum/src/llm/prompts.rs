//! Prompt templates for the summarization driver.
//!
//! Templates use `format!()` interpolation; a missing variable is a
//! compile error rather than a runtime surprise.

/// Built-in instruction prompt for occupational-medicine summaries of
/// mixed Hebrew/English medical records. Used whenever the caller does
/// not supply an instruction of their own.
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
פעל/י כרופא/ה תעסוקתי/ת בכיר/ה.
	•	התבסס על המידע הקיים במסמכים רפואיים מצורפים (בעברית ובאנגלית).
	•	ערוך סיכום מקצועי, מובנה ותמציתי של המסמכים, הכולל אבחנות, טיפולים, מגבלות והשלכות על כשירות תעסוקתית.
	•	כלול פרטים מזהים כגון שם המטופל, גיל ועיסוק, בהינתן שהמערכת מקומית ותואמת רגולציה.
	•	ציין אם חלק מהמידע חסר או בלתי קריא בעקבות זיהוי תווים אופטי (OCR).
	•	סכם את ההיסטוריה הרפואית לפי ציר זמן, ושלב את הסיפור הקליני, ההדמייתי והמעבדתי באופן ברור ומובנה.
	•	חלק את הסיכום לפסקאות לפי נושאים רפואיים. הימנע מהשערות לא מבוססות, והתמקד במסר תעסוקתי ברור עבור מקבל ההחלטה.
	•	וודא שהסיכום כתוב בשפה מקצועית, ברורה, רפואית ותעסוקתית כאחד.

לבסוף המלץ האם מגיעה נכות, חלקית או מלאה, ולאיזו תקופה.";

/// Build the request for one chunk. Every chunk prompt is independent;
/// no context is carried over from earlier chunks.
pub fn chunk_summary_prompt(instruction: &str, part: usize, total: usize, chunk: &str) -> String {
    format!("{instruction}\n\nText to summarize (Part {part} of {total}):\n{chunk}\n\nSummary:")
}
