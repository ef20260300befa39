//! UUIDv7 helpers.
//!
//! Note ids and event ids are UUIDv7, so ids sort by creation order.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// ```
/// use notesync_core::uuid_utils::new_v7;
///
/// let a = new_v7();
/// let b = new_v7();
/// assert!(a < b);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_version_7() {
        assert_eq!(new_v7().get_version_num(), 7);
    }
}
