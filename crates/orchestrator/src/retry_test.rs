#[cfg(test)]
mod retry_tests {
    use std::time::Duration;

    use crate::retry::RetryPolicy;
    use dispatch_core::DispatchConfig;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_backoff_is_exponential_up_to_cap() {
        let policy = policy_without_jitter();

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(16));
        // 超过上限后封顶
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_non_decreasing() {
        let policy = policy_without_jitter();

        let mut previous = Duration::ZERO;
        for attempt in 1..=8 {
            let delay = policy.backoff_delay(attempt);
            assert!(
                delay >= previous,
                "第{attempt}次退避 {delay:?} 小于前一次 {previous:?}"
            );
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..policy_without_jitter()
        };

        for attempt in 1..=5 {
            let unjittered = policy_without_jitter().backoff_delay(attempt).as_secs_f64();
            for _ in 0..100 {
                let delay = policy.backoff_delay(attempt).as_secs_f64();
                assert!(delay >= unjittered * 0.8 - f64::EPSILON);
                assert!(delay <= unjittered * 1.2 + f64::EPSILON);
            }
        }
    }

    #[test]
    fn test_attempt_budget() {
        let policy = policy_without_jitter();

        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
        assert!(!policy.has_attempts_remaining(4));
    }

    #[test]
    fn test_from_config() {
        let config = DispatchConfig::default();
        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.jitter_factor, 0.2);
    }
}
