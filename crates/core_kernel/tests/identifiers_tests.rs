//! Unit tests for the lifecycle identifiers
//!
//! Tests cover creation, parsing, conversion and display formatting.

use core_kernel::{TransactionId, UnitOfWorkId};
use uuid::Uuid;

mod unit_of_work_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let id1 = UnitOfWorkId::new();
        let id2 = UnitOfWorkId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_prefix() {
        assert_eq!(UnitOfWorkId::prefix(), "UOW");
    }

    #[test]
    fn test_from_str_with_prefix() {
        let original = UnitOfWorkId::new();
        let parsed: UnitOfWorkId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_str_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: UnitOfWorkId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_json_serialization_is_transparent() {
        let id = UnitOfWorkId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let deserialized: UnitOfWorkId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}

mod transaction_id_tests {
    use super::*;

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = TransactionId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TransactionId::new_v7();

        let uuid1: Uuid = id1.into();
        let uuid2: Uuid = id2.into();
        assert!(uuid1 < uuid2);
    }

    #[test]
    fn test_display_format() {
        let id = TransactionId::new();
        assert!(id.to_string().starts_with("TXN-"));
    }

    #[test]
    fn test_invalid_string_is_rejected() {
        let parsed = "TXN-not-a-uuid".parse::<TransactionId>();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_prefix() {
        assert_eq!(TransactionId::prefix(), "TXN");
    }
}
