//! Redis key layout shared by every producer and worker.
//!
//! All keys live under one root (`resque` by default) and are built by joining
//! segments with [`DELIMITER`]. Segment values coming from callers (queue names,
//! worker ids) are escaped so that two different segment lists can never map
//! to the same key, e.g. worker `a:started` and the started record of worker `a`.

use std::borrow::Cow;

/// Default root prefix for every key.
pub const DEFAULT_NAMESPACE: &str = "resque";

/// Delimiter between key segments.
pub const DELIMITER: char = ':';

/// Set of every queue name that has ever been pushed to.
pub const QUEUES_KEY: &str = "queues";

/// Set of known worker identities.
pub const WORKERS_KEY: &str = "workers";

/// Prefix segment for queue lists: `<root>:queue:<name>`.
pub const QUEUE_PREFIX: &str = "queue";

/// Prefix segment for per-worker records: `<root>:worker:<id>`.
pub const WORKER_PREFIX: &str = "worker";

/// Suffix segment of the worker start timestamp record.
pub const STARTED_SUFFIX: &str = "started";

/// Prefix segment for counters: `<root>:stats:<kind>`.
pub const STATS_PREFIX: &str = "stats";

pub const STAT_PROCESSED: &str = "processed";
pub const STAT_FAILED: &str = "failed";

/// Name of the queue holding failure records. Its length is the global failed count.
pub const FAILED_QUEUE: &str = "failed";

/// Deterministic mapping from logical resources to store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    root: String,
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyNamespace {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Join segments under the root, escaping each one.
    pub fn key<I, S>(&self, segments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = escape_segment(&self.root).into_owned();
        for segment in segments {
            key.push(DELIMITER);
            key.push_str(&escape_segment(segment.as_ref()));
        }
        key
    }

    /// `<root>:queue:<name>`
    pub fn queue(&self, name: &str) -> String {
        self.key([QUEUE_PREFIX, name])
    }

    /// `<root>:queues`
    pub fn queues(&self) -> String {
        self.key([QUEUES_KEY])
    }

    /// `<root>:workers`
    pub fn workers(&self) -> String {
        self.key([WORKERS_KEY])
    }

    /// `<root>:worker:<id>`, the status record
    pub fn worker_status(&self, worker_id: &str) -> String {
        self.key([WORKER_PREFIX, worker_id])
    }

    /// `<root>:worker:<id>:started`
    pub fn worker_started(&self, worker_id: &str) -> String {
        self.key([WORKER_PREFIX, worker_id, STARTED_SUFFIX])
    }

    /// `<root>:stats:processed`
    pub fn processed(&self) -> String {
        self.key([STATS_PREFIX, STAT_PROCESSED])
    }

    /// `<root>:stats:processed:<id>`
    pub fn worker_processed(&self, worker_id: &str) -> String {
        self.key([STATS_PREFIX, STAT_PROCESSED, worker_id])
    }

    /// `<root>:stats:failed:<id>`
    pub fn worker_failed(&self, worker_id: &str) -> String {
        self.key([STATS_PREFIX, STAT_FAILED, worker_id])
    }

    /// `<root>:queue:failed`
    pub fn failed_queue(&self) -> String {
        self.queue(FAILED_QUEUE)
    }
}

/// Percent-escape `%` and the delimiter. Plain names pass through unchanged,
/// so the common case produces exactly the documented key layout.
fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(['%', DELIMITER]) {
        return Cow::Borrowed(segment);
    }

    let mut escaped = String::with_capacity(segment.len() + 8);
    for ch in segment.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            DELIMITER => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_layout() {
        let keys = KeyNamespace::default();
        assert_eq!(keys.queue("mailer"), "resque:queue:mailer");
        assert_eq!(keys.queues(), "resque:queues");
        assert_eq!(keys.workers(), "resque:workers");
        assert_eq!(keys.worker_status("w1"), "resque:worker:w1");
        assert_eq!(keys.worker_started("w1"), "resque:worker:w1:started");
        assert_eq!(keys.processed(), "resque:stats:processed");
        assert_eq!(keys.worker_processed("w1"), "resque:stats:processed:w1");
        assert_eq!(keys.worker_failed("w1"), "resque:stats:failed:w1");
        assert_eq!(keys.failed_queue(), "resque:queue:failed");
    }

    #[test]
    fn test_custom_root() {
        let keys = KeyNamespace::new("staging");
        assert_eq!(keys.queue("high"), "staging:queue:high");
    }

    #[test]
    fn test_delimiter_in_worker_id_cannot_collide() {
        let keys = KeyNamespace::default();
        // Without escaping both would be "resque:worker:a:started".
        assert_ne!(keys.worker_status("a:started"), keys.worker_started("a"));
        assert_eq!(
            keys.worker_status("host:1:mailer"),
            "resque:worker:host%3A1%3Amailer"
        );
    }

    #[test]
    fn test_escape_character_is_itself_escaped() {
        let keys = KeyNamespace::default();
        assert_ne!(keys.queue("a%3Ab"), keys.queue("a:b"));
        assert_eq!(keys.queue("50%"), "resque:queue:50%25");
    }

    #[test]
    fn test_empty_segment_list_is_root() {
        let keys = KeyNamespace::default();
        assert_eq!(keys.key(Vec::<String>::new()), "resque");
    }
}
