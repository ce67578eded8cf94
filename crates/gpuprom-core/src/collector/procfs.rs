//! Parsers for the `/proc` files the process fact cache reads.
//!
//! These are pure functions over file contents so they can be tested with
//! string inputs.

use std::sync::LazyLock;

use regex::Regex;

static DOCKER_CGROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/docker/([0-9a-f]+)").expect("valid cgroup regex"));

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Extracts system boot time (`btime`, seconds since epoch) from `/proc/stat`.
pub fn parse_boot_time(content: &str) -> Result<u64, ParseError> {
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() == Some("btime") {
            return parts
                .next()
                .ok_or_else(|| ParseError::new("btime without value"))?
                .parse()
                .map_err(|_| ParseError::new("invalid btime"));
        }
    }
    Err(ParseError::new("btime not found in stat"))
}

/// Extracts `starttime` (field 22, clock ticks after boot) from
/// `/proc/[pid]/stat`.
///
/// Fields are counted after the closing parenthesis of `comm`, which may
/// itself contain spaces and parentheses.
pub fn parse_stat_starttime(content: &str) -> Result<u64, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    // Field 3 (state) is the first one after ')', so field 22 is index 19.
    content[close_paren + 1..]
        .split_whitespace()
        .nth(19)
        .ok_or_else(|| ParseError::new("missing field starttime"))?
        .parse()
        .map_err(|_| ParseError::new("invalid starttime"))
}

/// Finds the docker container id in `/proc/[pid]/cgroup` content.
///
/// Returns `None` for processes that are not in a docker cgroup.
pub fn parse_docker_container_id(content: &str) -> Option<String> {
    DOCKER_CGROUP_RE
        .captures(content)
        .map(|c| c[1].to_string())
}
