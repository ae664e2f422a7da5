//! Response status line and headers.

/// Status and headers of the final response header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(status: u32) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length, if present and a non-negative integer.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Non-empty `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.header("location").map(str::trim).filter(|v| !v.is_empty())
    }

    /// 3xx status or a `Location` header.
    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status) || self.location().is_some()
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Parses raw header lines as collected by a header callback.
    ///
    /// Only the last block is used: interim responses (`100 Continue`, proxy
    /// `CONNECT` replies) each start with their own status line.
    pub fn parse(lines: &[String]) -> Option<Self> {
        let start = lines.iter().rposition(|l| l.starts_with("HTTP/"))?;
        let mut block = lines[start..].iter();
        let status = block
            .next()?
            .split_whitespace()
            .nth(1)?
            .parse::<u32>()
            .ok()?;

        let headers = block
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Some(Self { status, headers })
    }
}
