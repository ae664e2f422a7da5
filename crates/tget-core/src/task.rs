//! Download tasks and the request template shared by every task of a run.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::channel::Request;
use crate::orchestrator::SetupError;

/// Identifier of a task: its index in the input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request settings applied to every task (method, extra headers, cookies, body).
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Option<String>,
    pub body: Option<Vec<u8>>,
    pub user_agent: Option<String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            cookies: None,
            body: None,
            user_agent: None,
        }
    }
}

/// One unit of work: download one URL into one file under `target_dir`.
///
/// Immutable once built; workers only read it.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    url: Url,
    method: String,
    headers: Vec<(String, String)>,
    cookies: Option<String>,
    body: Option<Vec<u8>>,
    target_dir: PathBuf,
}

impl Task {
    /// Builds a task from a raw URL string. Only `http` and `https` URLs are accepted.
    pub fn new(
        id: TaskId,
        raw_url: &str,
        template: &RequestTemplate,
        target_dir: &Path,
    ) -> Result<Self, SetupError> {
        let raw_url = raw_url.trim();
        let url = Url::parse(raw_url).map_err(|e| SetupError::InvalidUrl {
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SetupError::InvalidUrl {
                url: raw_url.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        let mut headers = template.headers.clone();
        if let Some(agent) = &template.user_agent {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("user-agent"));
            headers.push(("User-Agent".to_string(), agent.clone()));
        }

        let method = if template.method.trim().is_empty() {
            "GET".to_string()
        } else {
            template.method.trim().to_ascii_uppercase()
        };

        Ok(Self {
            id,
            url,
            method,
            headers,
            cookies: template.cookies.clone().filter(|c| !c.is_empty()),
            body: template.body.clone().filter(|b| !b.is_empty()),
            target_dir: target_dir.to_path_buf(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// The request this task issues on its channel (no range; the transfer adds it).
    pub fn request(&self) -> Request {
        let mut headers = self.headers.clone();
        if let Some(cookies) = &self.cookies {
            headers.push(("Cookie".to_string(), cookies.clone()));
        }
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body: self.body.clone(),
            range_start: None,
        }
    }
}

/// Builds one task per URL, numbering them in input order.
pub fn build_tasks(
    urls: &[String],
    template: &RequestTemplate,
    target_dir: &Path,
) -> Result<Vec<Task>, SetupError> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| Task::new(TaskId(i), url, template, target_dir))
        .collect()
}

/// Parses a header argument: `Name: value` or `Name=value`.
///
/// Only the first separator splits; the rest belongs to the value. A name
/// without a value yields an empty value. Returns `None` for an empty name.
pub fn parse_header_arg(arg: &str) -> Option<(String, String)> {
    let colon = arg.find(':');
    let equals = arg.find('=');
    let split_at = match (colon, equals) {
        (Some(c), Some(e)) => Some(c.min(e)),
        (c, e) => c.or(e),
    };
    let (name, value) = match split_at {
        Some(i) => (&arg[..i], &arg[i + 1..]),
        None => (arg, ""),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
