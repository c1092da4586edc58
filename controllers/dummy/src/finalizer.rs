//! Finalizers registered by this controller and list helpers
//!
//! The token is defined once here; both the code that adds it and the code
//! that removes it refer to the same constant.

/// Blocks deletion of a Dummy until its Pod has been cleaned up
pub const DUMMY_FINALIZER: &str = "dummy.finalizer.interview.com";

/// True if `token` is present
pub fn contains(finalizers: &[String], token: &str) -> bool {
    finalizers.iter().any(|f| f == token)
}

/// Finalizer list with `token` appended (unchanged if already present)
pub fn with(finalizers: &[String], token: &str) -> Vec<String> {
    let mut list = finalizers.to_vec();
    if !contains(&list, token) {
        list.push(token.to_string());
    }
    list
}

/// Finalizer list with every occurrence of `token` removed, order preserved
pub fn without(finalizers: &[String], token: &str) -> Vec<String> {
    finalizers.iter().filter(|f| *f != token).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_with_appends_once() {
        let once = with(&list(&["other"]), DUMMY_FINALIZER);
        assert_eq!(once, list(&["other", DUMMY_FINALIZER]));
        let twice = with(&once, DUMMY_FINALIZER);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_without_keeps_foreign_finalizers() {
        let removed = without(&list(&["a", DUMMY_FINALIZER, "b"]), DUMMY_FINALIZER);
        assert_eq!(removed, list(&["a", "b"]));
        assert!(!contains(&removed, DUMMY_FINALIZER));
    }

    #[test]
    fn test_without_missing_token_is_identity() {
        let original = list(&["a", "b"]);
        assert_eq!(without(&original, DUMMY_FINALIZER), original);
    }
}
