//! User-facing output: ranked-hit rendering, span highlighting, and JSON
//! emission. The engine hands over data; everything ANSI lives here.

use owo_colors::OwoColorize;

use crate::models::JsonHit;

/// Display an error message to the user in red, without logger noise.
pub fn error(message: &str) {
    eprintln!("{}", message.red());
}

/// Render one ranked hit line: `rank. score path[:line]`.
pub fn hit_line(rank: usize, score: f64, path: &str, line: Option<usize>) -> String {
    let location = match line {
        Some(line) => format!("{}:{}", path, line),
        None => path.to_string(),
    };
    format!("{:>2}. {:>8.4}  {}", rank, score, location)
}

/// Weave ANSI highlights into `text` at the given byte spans.
///
/// Spans must be sorted and non-overlapping (the snippet builder guarantees
/// both). With `color` off the text passes through untouched.
pub fn highlight(text: &str, spans: &[(usize, usize)], color: bool) -> String {
    if !color || spans.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + spans.len() * 16);
    let mut cursor = 0;
    for &(start, end) in spans {
        if start >= end || end > text.len() || start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(&format!("{}", (&text[start..end]).red().bold()));
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Emit the JSON record array for `--json` output.
pub fn print_json(hits: &[JsonHit]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(hits)?);
    Ok(())
}
