//! Unique machine identifiers
//!
//! Identifiers look like `<prefix>-<sanitized-name>-<6 hex chars>`. The random
//! suffix is drawn fresh on each attempt and checked against the engine's
//! live machine list; after [`MAX_ATTEMPTS`] collisions generation gives up.

use crate::config::MAX_IDENTIFIER_LEN;
use crate::executor::Verb;
use crate::{Error, Result};

pub const MAX_ATTEMPTS: u32 = 3;

/// Used when the logical name sanitizes to nothing
pub const DEFAULT_NAME: &str = "default";

const SUFFIX_LEN: usize = 6;

/// Names the engine currently knows. Queried on every attempt, never cached.
pub trait CollisionSet {
    fn contains(&self, name: &str) -> Result<bool>;
}

/// Source of the 3 random bytes behind each suffix
pub trait SuffixSource {
    fn next_bytes(&self) -> [u8; 3];
}

/// Draws from the OS CSPRNG via a v4 UUID, whose leading bytes are fully random
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_bytes(&self) -> [u8; 3] {
        let id = uuid::Uuid::new_v4();
        let bytes = id.as_bytes();
        [bytes[0], bytes[1], bytes[2]]
    }
}

/// Lowercase, collapse every run of non-alphanumerics into one hyphen and
/// trim hyphens from both ends. Idempotent.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if out.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        out
    }
}

pub struct NameGenerator {
    prefix: String,
    suffixes: Box<dyn SuffixSource>,
}

impl NameGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_suffix_source(prefix, Box::new(RandomSuffix))
    }

    pub fn with_suffix_source(prefix: impl Into<String>, suffixes: Box<dyn SuffixSource>) -> Self {
        Self {
            prefix: prefix.into(),
            suffixes,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce an identifier for `logical_name` that `taken` does not contain
    pub fn generate(&self, logical_name: &str, taken: &dyn CollisionSet) -> Result<String> {
        let base = self.name_segment(logical_name)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = format!("{}-{}-{}", self.prefix, base, self.suffix());
            if !taken.contains(&candidate)? {
                tracing::debug!("generated identifier {} on attempt {}", candidate, attempt);
                return Ok(candidate);
            }
            tracing::warn!(
                "identifier {} already exists (attempt {}/{})",
                candidate,
                attempt,
                MAX_ATTEMPTS
            );
        }

        Err(Error::Collision {
            logical_name: logical_name.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Sanitized name, cut so the whole identifier fits the length ceiling.
    /// Only this segment is shortened; prefix and suffix stay intact.
    fn name_segment(&self, logical_name: &str) -> Result<String> {
        let budget = MAX_IDENTIFIER_LEN
            .checked_sub(self.prefix.len() + SUFFIX_LEN + 2)
            .filter(|b| *b > 0)
            .ok_or_else(|| Error::Precondition {
                verb: Verb::Create.to_string(),
                machine: logical_name.to_string(),
                detail: format!(
                    "name prefix '{}' leaves no room for a machine name",
                    self.prefix
                ),
            })?;

        let mut segment = sanitize(logical_name);
        if segment.len() > budget {
            // sanitized output is ASCII, byte truncation is safe
            segment.truncate(budget);
            let trimmed = segment.trim_end_matches('-').len();
            segment.truncate(trimmed);
        }
        Ok(segment)
    }

    fn suffix(&self) -> String {
        self.suffixes
            .next_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};

    struct Scripted(Mutex<VecDeque<[u8; 3]>>);

    impl Scripted {
        fn new(seq: &[[u8; 3]]) -> Box<Self> {
            Box::new(Self(Mutex::new(seq.iter().copied().collect())))
        }
    }

    impl SuffixSource for Scripted {
        fn next_bytes(&self) -> [u8; 3] {
            self.0.lock().pop_front().expect("suffix script exhausted")
        }
    }

    struct Taken {
        names: HashSet<String>,
        queries: Mutex<u32>,
    }

    impl Taken {
        fn new(names: &[&str]) -> Self {
            Self {
                names: names.iter().map(|s| s.to_string()).collect(),
                queries: Mutex::new(0),
            }
        }
    }

    impl CollisionSet for Taken {
        fn contains(&self, name: &str) -> Result<bool> {
            *self.queries.lock() += 1;
            Ok(self.names.contains(name))
        }
    }

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize("web--server"), "web-server");
        assert_eq!(sanitize("web_server"), "web-server");
        assert_eq!(sanitize("ubuntu_db 01"), "ubuntu-db-01");
        assert_eq!(sanitize("  My Box!! "), "my-box");
        assert_eq!(sanitize("--a--"), "a");
        assert_eq!(sanitize(""), "default");
        assert_eq!(sanitize("___"), "default");
        assert_eq!(sanitize("héllo"), "h-llo");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for input in ["web--server", "Web_Server", "a  b", "", "x-y-z", "--", "ÄÖÜ", "db.01"] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_generate_without_collisions() {
        let gen = NameGenerator::with_suffix_source("vagrant", Scripted::new(&[[0xa3, 0xb2, 0xc1]]));
        let taken = Taken::new(&[]);
        let name = gen.generate("ubuntu_db 01", &taken).unwrap();
        assert_eq!(name, "vagrant-ubuntu-db-01-a3b2c1");
        assert_eq!(*taken.queries.lock(), 1);
    }

    #[test]
    fn test_second_attempt_success() {
        let gen = NameGenerator::with_suffix_source(
            "vagrant",
            Scripted::new(&[[0, 0, 1], [0, 0, 2]]),
        );
        let taken = Taken::new(&["vagrant-default-000001"]);
        let name = gen.generate("", &taken).unwrap();
        assert_eq!(name, "vagrant-default-000002");
        assert_eq!(*taken.queries.lock(), 2);
    }

    #[test]
    fn test_third_collision_raises() {
        let gen = NameGenerator::with_suffix_source(
            "vagrant",
            Scripted::new(&[[0, 0, 1], [0, 0, 2], [0, 0, 3]]),
        );
        let taken = Taken::new(&[
            "vagrant-web-000001",
            "vagrant-web-000002",
            "vagrant-web-000003",
        ]);
        let err = gen.generate("web", &taken).unwrap_err();
        match err {
            Error::Collision { logical_name, attempts } => {
                assert_eq!(logical_name, "web");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*taken.queries.lock(), 3);
    }

    #[test]
    fn test_never_returns_taken_name() {
        let gen = NameGenerator::new("vagrant");
        let taken = Taken::new(&["vagrant-web-000000"]);
        for _ in 0..50 {
            let name = gen.generate("web", &taken).unwrap();
            assert!(!taken.names.contains(&name));
            assert!(name.starts_with("vagrant-web-"));
            let suffix = &name["vagrant-web-".len()..];
            assert_eq!(suffix.len(), 6);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_long_names_truncate_name_segment_only() {
        let gen = NameGenerator::with_suffix_source("vagrant", Scripted::new(&[[0xde, 0xad, 0x01]]));
        let long = "a".repeat(40) + "-" + &"b".repeat(40);
        let name = gen.generate(&long, &Taken::new(&[])).unwrap();

        assert!(name.len() <= MAX_IDENTIFIER_LEN);
        assert!(name.starts_with("vagrant-aaaa"));
        assert!(name.ends_with("-dead01"));
    }

    #[test]
    fn test_truncation_does_not_leave_double_hyphen() {
        // budget for the name segment is 63 - 7 - 8 = 48 characters
        let gen = NameGenerator::with_suffix_source("vagrant", Scripted::new(&[[1, 2, 3]]));
        let logical = format!("{}-tail", "x".repeat(47));
        let name = gen.generate(&logical, &Taken::new(&[])).unwrap();
        assert_eq!(name, format!("vagrant-{}-010203", "x".repeat(47)));
        assert!(!name.contains("--"));
    }

    #[test]
    fn test_collision_query_errors_propagate() {
        struct Broken;
        impl CollisionSet for Broken {
            fn contains(&self, _: &str) -> Result<bool> {
                Err(Error::Timeout {
                    verb: "list".into(),
                    machine: "engine".into(),
                    timeout: std::time::Duration::from_secs(30),
                })
            }
        }

        let gen = NameGenerator::new("vagrant");
        assert!(matches!(gen.generate("web", &Broken), Err(Error::Timeout { .. })));
    }

    #[test]
    fn test_oversized_prefix_is_precondition_failure() {
        let gen = NameGenerator::new("p".repeat(55));
        assert!(matches!(
            gen.generate("web", &Taken::new(&[])),
            Err(Error::Precondition { .. })
        ));
    }
}
