//! MQTT topic filter validation and matching.
//!
//! Subscriptions may use the single-level (`+`) and multi-level (`#`)
//! wildcards. Matching follows the MQTT 3.1.1 rules, including the rule that
//! wildcards at the first level never match topics starting with `$`.

/// Returns `true` if `filter` is a well-formed MQTT topic filter.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    levels.iter().enumerate().all(|(index, level)| match *level {
        "#" => index == last,
        "+" => true,
        other => !other.contains('#') && !other.contains('+'),
    })
}

/// Returns `true` if `topic` is matched by `filter`.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {},
            (Some(expected), Some(actual)) if expected == actual => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}
