//! Waiting for a machine to accept remote commands

use crate::engine::MachineInfo;
use crate::{Error, Result};
use std::time::Duration;

/// Per-machine detail lookup used while polling
pub trait MachineInfoSource {
    /// `Ok(None)` means the engine does not show the machine yet
    fn machine_info(&self, name: &str) -> Result<Option<MachineInfo>>;
}

/// Blocks the calling thread between polls
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self::with_sleeper(interval, timeout, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(interval: Duration, timeout: Duration, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            interval,
            timeout,
            sleeper,
        }
    }

    /// Number of info queries that fit in the ceiling (at least one)
    pub fn max_polls(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let polls = (self.timeout.as_secs_f64() / self.interval.as_secs_f64()).ceil() as u32;
        polls.max(1)
    }

    /// Poll until the engine reports the machine running.
    ///
    /// A machine that is not visible yet, or whose info lacks a running
    /// status, is retried; any failure of the query itself is returned
    /// immediately.
    pub fn wait_for_ready(&self, identifier: &str, source: &dyn MachineInfoSource) -> Result<bool> {
        let max_polls = self.max_polls();
        tracing::info!(
            "waiting for {} to become ready (every {}s, up to {}s)",
            identifier,
            self.interval.as_secs(),
            self.timeout.as_secs()
        );

        for poll in 1..=max_polls {
            match source.machine_info(identifier)? {
                Some(info) if info.is_running() => {
                    tracing::info!("{} is ready after {} poll(s)", identifier, poll);
                    return Ok(true);
                }
                Some(info) => {
                    tracing::debug!(
                        "{} not ready yet (status: {})",
                        identifier,
                        info.status.as_deref().unwrap_or("<none>")
                    );
                }
                None => tracing::debug!("{} not visible to the engine yet", identifier),
            }

            if poll < max_polls {
                self.sleeper.sleep(self.interval);
            }
        }

        Err(Error::NotReady {
            machine: identifier.to_string(),
            waited: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.lock().push(duration);
        }
    }

    struct Replies {
        replies: Mutex<VecDeque<Result<Option<MachineInfo>>>>,
        fallback: Option<MachineInfo>,
        queries: Mutex<u32>,
    }

    impl Replies {
        fn new(replies: Vec<Result<Option<MachineInfo>>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                queries: Mutex::new(0),
            }
        }

        fn always(info: Option<MachineInfo>) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: info,
                queries: Mutex::new(0),
            }
        }
    }

    impl MachineInfoSource for Replies {
        fn machine_info(&self, _name: &str) -> Result<Option<MachineInfo>> {
            *self.queries.lock() += 1;
            match self.replies.lock().pop_front() {
                Some(reply) => reply,
                None => Ok(self.fallback.clone()),
            }
        }
    }

    fn status(s: &str) -> Result<Option<MachineInfo>> {
        Ok(Some(MachineInfo {
            name: Some("vagrant-web-abcdef".into()),
            status: Some(s.into()),
        }))
    }

    fn poller(sleeper: &CountingSleeper) -> ReadinessPoller {
        ReadinessPoller::with_sleeper(
            Duration::from_secs(2),
            Duration::from_secs(120),
            Box::new(sleeper.clone()),
        )
    }

    #[test]
    fn test_ready_after_two_intervals() {
        let sleeper = CountingSleeper::default();
        let source = Replies::new(vec![status("starting"), status("starting"), status("running")]);

        assert!(poller(&sleeper).wait_for_ready("vagrant-web-abcdef", &source).unwrap());
        assert_eq!(*source.queries.lock(), 3);
        assert_eq!(*sleeper.slept.lock(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn test_absent_and_statusless_are_retried() {
        let sleeper = CountingSleeper::default();
        let source = Replies::new(vec![
            Ok(None),
            Ok(Some(MachineInfo::default())),
            status("running"),
        ]);

        assert!(poller(&sleeper).wait_for_ready("vagrant-web-abcdef", &source).unwrap());
        assert_eq!(*source.queries.lock(), 3);
    }

    #[test]
    fn test_ceiling_raises_not_ready() {
        let sleeper = CountingSleeper::default();
        let source = Replies::always(None);

        let err = poller(&sleeper)
            .wait_for_ready("vagrant-web-abcdef", &source)
            .unwrap_err();
        match err {
            Error::NotReady { machine, waited } => {
                assert_eq!(machine, "vagrant-web-abcdef");
                assert_eq!(waited, Duration::from_secs(120));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*source.queries.lock(), 60);
        assert_eq!(sleeper.slept.lock().len(), 59);
    }

    #[test]
    fn test_query_failure_propagates_immediately() {
        let sleeper = CountingSleeper::default();
        let source = Replies::new(vec![
            status("starting"),
            Err(Error::Timeout {
                verb: "info".into(),
                machine: "vagrant-web-abcdef".into(),
                timeout: Duration::from_secs(30),
            }),
        ]);

        let err = poller(&sleeper)
            .wait_for_ready("vagrant-web-abcdef", &source)
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(*source.queries.lock(), 2);
        assert_eq!(sleeper.slept.lock().len(), 1);
    }

    #[test]
    fn test_max_polls() {
        let p = ReadinessPoller::new(Duration::from_secs(2), Duration::from_secs(120));
        assert_eq!(p.max_polls(), 60);
        let p = ReadinessPoller::new(Duration::from_secs(3), Duration::from_secs(10));
        assert_eq!(p.max_polls(), 4);
        let p = ReadinessPoller::new(Duration::ZERO, Duration::from_secs(10));
        assert_eq!(p.max_polls(), 1);
    }
}
