// ============================================================================
// Topic Matching - AMQP topic-exchange binding semantics
// ============================================================================
//
// Keys and patterns are dot-separated words. In a pattern `*` matches
// exactly one word and `#` matches zero or more words.
//
// ============================================================================

pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            // `#` swallows 0..=n words
            (0..=key.len()).any(|skip| matches_words(rest, &key[skip..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => matches_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && matches_words(rest, key_rest)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("order.paid", "order.paid"));
        assert!(!topic_matches("order.paid", "order.created"));
        assert!(!topic_matches("order.paid", "order.paid.extra"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("order.*", "order.created"));
        assert!(topic_matches("*.succeeded", "payment.succeeded"));
        assert!(!topic_matches("order.*", "order"));
        assert!(!topic_matches("order.*", "order.a.b"));
    }

    #[test]
    fn test_hash_matches_any_suffix() {
        assert!(topic_matches("#", "payment.succeeded"));
        assert!(topic_matches("order.#", "order"));
        assert!(topic_matches("order.#", "order.paid"));
        assert!(topic_matches("order.#.done", "order.a.b.done"));
        assert!(!topic_matches("order.#", "payment.succeeded"));
    }
}
