//! Parse HTTP response header lines.

/// Fields of a response head relevant to ranged downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code from the last `HTTP/` status line (after redirects).
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    /// Inclusive `(start, end)` from `Content-Range: bytes start-end/total`.
    pub content_range: Option<(u64, u64)>,
    /// `total` from `Content-Range`, when not `*`.
    pub content_range_total: Option<u64>,
}

/// Parse collected header lines. Only headers after the last status line count,
/// so redirect hops do not leak into the final response.
pub fn parse_headers(lines: &[String]) -> ResponseHead {
    let start = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("HTTP/"))
        .unwrap_or(0);
    let mut head = ResponseHead::default();

    for line in &lines[start..] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            head.status = parse_http_status(line);
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                if let Some((range, total)) = parse_content_range(value) {
                    head.content_range = range;
                    head.content_range_total = total;
                }
            }
        }
    }
    head
}

/// Status code from a status line such as `HTTP/1.1 206 Partial Content`.
pub fn parse_http_status(line: &str) -> Option<u32> {
    line.split_whitespace()
        .nth(1)
        .and_then(|c| c.parse::<u32>().ok())
}

/// Parse a `Content-Range` value: `bytes 0-99/1000`, `bytes 0-99/*`, `bytes */1000`.
/// Returns `(range, total)`; `None` if the unit is not `bytes` or the value is malformed.
pub fn parse_content_range(value: &str) -> Option<(Option<(u64, u64)>, Option<u64>)> {
    let value = value.trim();
    let rest = value
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes "))
        .map(|_| value[6..].trim())?;
    let (range, total) = rest.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let range = match range.trim() {
        "*" => None,
        r => {
            let (a, b) = r.split_once('-')?;
            let start = a.trim().parse::<u64>().ok()?;
            let end = b.trim().parse::<u64>().ok()?;
            if start > end {
                return None;
            }
            Some((start, end))
        }
    };
    Some((range, total))
}
