//! # Model Output Parsing
//!
//! Language models wrap answers in markdown fences and labels more often than
//! they are asked not to. These helpers recover the payload.

use regex::Regex;

/// Returns the body of the first ```` ```{lang} ```` block, else of the first bare
/// fenced block, else the trimmed text itself.
pub fn strip_code_fence(text: &str, lang: &str) -> Result<String, regex::Error> {
    let tagged = Regex::new(&format!(r"(?s)```{}\s*(.*?)```", regex::escape(lang)))?;
    if let Some(body) = tagged.captures(text).and_then(|caps| caps.get(1)) {
        return Ok(body.as_str().trim().to_string());
    }

    let bare = Regex::new(r"(?s)```(?:[A-Za-z0-9_-]*\n)?(.*?)```")?;
    Ok(bare
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.trim().to_string()))
}

/// Turns a raw model reply into a SQL candidate.
///
/// Removes a fenced block wrapper, a leading `SQL Query:` label (any case), and a
/// single trailing `;`.
pub fn clean_sql_response(raw: &str) -> Result<String, regex::Error> {
    let fenced = strip_code_fence(raw, "sql")?;
    let mut sql = fenced.trim();

    const LABEL: &str = "sql query:";
    if sql
        .get(..LABEL.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(LABEL))
    {
        sql = sql[LABEL.len()..].trim();
    }

    if let Some(stripped) = sql.strip_suffix(';') {
        sql = stripped.trim();
    }
    Ok(sql.to_string())
}
