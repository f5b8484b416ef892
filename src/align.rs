use std::collections::HashMap;

use tracing::warn;

/// Pairs quarter labels with values by position.
///
/// When the rows have different lengths only the common prefix is kept; the
/// surplus on either side is dropped. A row missing leading columns therefore
/// shifts its values onto the wrong quarters, so a mismatch is logged.
pub fn align<V: Clone>(header: &[String], values: &[V]) -> HashMap<String, V> {
    if header.len() != values.len() {
        warn!(
            quarters = header.len(),
            values = values.len(),
            "header and value rows differ in length, truncating to the shorter"
        );
    }
    header
        .iter()
        .cloned()
        .zip(values.iter().cloned())
        .collect()
}
