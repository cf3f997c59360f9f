use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod accept_encoding;
pub mod conditionals;
pub mod content_disposition;
pub mod entity_tag;
pub mod range;

/// HTTP dates carry whole seconds; resource mtimes usually carry more.
/// Validators that compare against a date must drop the sub-second part
/// first or equal timestamps will spuriously mismatch.
pub(crate) fn truncate_to_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}
