//! Record identity generation.

use std::sync::Arc;
use uuid::Uuid;

use crate::model::RecordId;

/// Generates fresh, unique record identifiers.
pub trait IdGenerator: Send + Sync {
    /// A new identifier, never equal to the reserved pending-response id.
    fn next_id(&self) -> RecordId;
}

/// Random v4 UUID identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> RecordId {
        RecordId::new(Uuid::new_v4().to_string())
    }
}

impl<T: IdGenerator + ?Sized> IdGenerator for Arc<T> {
    fn next_id(&self) -> RecordId {
        (**self).next_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidGenerator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(!a.is_pending_response());
    }
}
