//! Property-based test generators using proptest.

use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for short printable ASCII content that the store accepts.
pub fn content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9 .,!?'-]{0,79}").expect("Invalid regex")
}

/// Strategy for non-blank Unicode content of at most `max_chars` characters.
pub fn unicode_content_strategy(max_chars: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 1..=max_chars.max(1))
        .prop_map(|chars| chars.into_iter().collect::<String>())
        .prop_filter("content must not be blank", |s| !s.trim().is_empty())
}

/// Strategy for content longer than `max_chars` characters.
pub fn oversized_content_strategy(max_chars: usize) -> impl Strategy<Value = String> {
    (1usize..64).prop_map(move |extra| "x".repeat(max_chars + extra))
}

/// Strategy for a sequence of posts.
pub fn post_batch_strategy(max_posts: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(content_strategy(), 0..=max_posts)
}

/// Strategy for a set of 1-based mirror commit attempts that should fail,
/// drawn from the first `attempts` calls.
pub fn failure_plan_strategy(attempts: u64) -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::vec(any::<bool>(), attempts.min(64) as usize).prop_map(|flags| {
        flags
            .into_iter()
            .zip(1u64..)
            .filter_map(|(fail, attempt)| fail.then_some(attempt))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_content_strategy() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let content = content_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!content.trim().is_empty());
            assert!(content.chars().count() <= 80);
        }
    }

    #[test]
    fn test_unicode_content_strategy() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let content = unicode_content_strategy(20)
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(content.chars().count() <= 20);
            assert!(!content.trim().is_empty());
        }
    }

    #[test]
    fn test_oversized_content_strategy() {
        let mut runner = TestRunner::default();
        let content = oversized_content_strategy(10)
            .new_tree(&mut runner)
            .unwrap()
            .current();
        assert!(content.len() > 10);
    }

    #[test]
    fn test_failure_plan_strategy() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let plan = failure_plan_strategy(5).new_tree(&mut runner).unwrap().current();
            assert!(plan.iter().all(|a| (1..=5).contains(a)));
        }
    }
}
