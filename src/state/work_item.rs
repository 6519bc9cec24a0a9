//! Crawl candidates and their interchange text form
//!
//! The interchange format is one item per line:
//! `stateCode \t priority \t sourceUri \t targetUri`, where `stateCode` is a
//! string of single-character issue flags (possibly empty).

use crate::state::FetchStatus;
use crate::url::extract_domain;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use url::Url;

/// Priority value meaning "never fetch"
pub const NEVER_PRIORITY: u32 = u32::MAX;

/// Independent reasons an item should not be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Issues {
    /// Target has no usable host (`M`)
    pub malformed: bool,
    /// robots.txt disallows the target (`R`)
    pub blocked_by_robots: bool,
    /// Priority is above the configured ceiling (`H`)
    pub priority_too_low: bool,
    /// No fetcher handles the scheme (`U`)
    pub unsupported_scheme: bool,
    /// Cheap heuristics say the target is not worth fetching (`P`)
    pub probably_blocked: bool,
    /// Host is on a blocked domain list (`L`)
    pub domain_blocked: bool,
}

impl Issues {
    /// True if any flag is set
    pub fn any(&self) -> bool {
        self.malformed
            || self.blocked_by_robots
            || self.priority_too_low
            || self.unsupported_scheme
            || self.probably_blocked
            || self.domain_blocked
    }

    /// Encodes the set flags as a state code (empty when clean)
    pub fn code(&self) -> String {
        [
            ('R', self.blocked_by_robots),
            ('M', self.malformed),
            ('H', self.priority_too_low),
            ('U', self.unsupported_scheme),
            ('P', self.probably_blocked),
            ('L', self.domain_blocked),
        ]
        .iter()
        .filter(|(_, set)| *set)
        .map(|(c, _)| *c)
        .collect()
    }

    /// Decodes a state code; unknown characters make the code invalid
    pub fn from_code(code: &str) -> Option<Self> {
        let mut issues = Self::default();
        for c in code.chars() {
            match c {
                'R' => issues.blocked_by_robots = true,
                'M' => issues.malformed = true,
                'H' => issues.priority_too_low = true,
                'U' => issues.unsupported_scheme = true,
                'P' => issues.probably_blocked = true,
                'L' => issues.domain_blocked = true,
                _ => return None,
            }
        }
        Some(issues)
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        if code.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", code)
        }
    }
}

/// One candidate link to fetch
///
/// Equality and hashing use the target URI only.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The URI to fetch
    pub target: Url,

    /// The page the link was found on
    pub source: Option<Url>,

    /// Resolved address of the target host
    pub ip: Option<IpAddr>,

    /// Lower is sooner; [`NEVER_PRIORITY`] means never
    pub priority: u32,

    /// Reasons not to fetch
    pub issues: Issues,

    /// Monotonic sequence assigned when the item's batch is flushed
    pub sequence: u64,

    /// Lifecycle status
    pub status: FetchStatus,

    /// Visited before, but long enough ago to be due again
    pub revisit: bool,
}

impl WorkItem {
    /// Creates an unenriched item
    pub fn new(target: Url, source: Option<Url>) -> Self {
        Self {
            target,
            source,
            ip: None,
            priority: 0,
            issues: Issues::default(),
            sequence: 0,
            status: FetchStatus::Unknown,
            revisit: false,
        }
    }

    /// Lowercased target host, if any
    pub fn host(&self) -> Option<String> {
        extract_domain(&self.target).filter(|h| !h.is_empty())
    }

    /// True if the link points back at the host it was found on
    pub fn is_same_host_link(&self) -> bool {
        match (&self.source, self.host()) {
            (Some(source), Some(host)) => extract_domain(source).as_deref() == Some(host.as_str()),
            _ => false,
        }
    }

    /// True if the item must never be fetched
    pub fn is_never(&self) -> bool {
        self.priority == NEVER_PRIORITY
    }

    /// Moves the item to `next` if the transition is legal
    pub fn advance(&mut self, next: FetchStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Formats the item as an interchange line (no trailing newline)
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.issues.code(),
            self.priority,
            self.source.as_ref().map(Url::as_str).unwrap_or(""),
            self.target
        )
    }

    /// Parses an interchange line; anything unparseable yields `None`
    ///
    /// ```
    /// use crawlgate::WorkItem;
    ///
    /// let item = WorkItem::from_line("R\t12\thttp://a.org/\thttp://b.org/x").unwrap();
    /// assert!(item.issues.blocked_by_robots);
    /// assert_eq!(item.priority, 12);
    /// assert!(WorkItem::from_line("garbage").is_none());
    /// ```
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.split('\t');

        let code = fields.next()?;
        let priority = fields.next()?.trim().parse::<u32>().ok()?;
        let source = fields.next()?.trim();
        let target = fields.next()?.trim();
        if fields.next().is_some() {
            return None;
        }

        let issues = Issues::from_code(code.trim())?;
        let source = if source.is_empty() {
            None
        } else {
            Some(Url::parse(source).ok()?)
        };
        let target = Url::parse(target).ok()?;

        let mut item = Self::new(target, source);
        item.priority = priority;
        item.issues = issues;
        Some(item)
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for WorkItem {}

impl Hash for WorkItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} p={}]", self.target, self.issues, self.priority)
    }
}
