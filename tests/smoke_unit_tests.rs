//! Smoke screen unit tests across the crate's building blocks
//!
//! Happy-path checks of the value types, ports and helpers in isolation from
//! the workflow scenarios.

use campus_inventory::{
    ErrorKind, WorkflowError,
    auth::{Action, Authorizer, Grant, Module, PolicyMatrix, Scope, ScopeContext},
    config::EngineConfig,
    events::DomainEvent,
    sla::{Priority, SlaStatus, calculate_deadline, check_sla_status},
    types::{Actor, Amount, TimeStamp},
    utils::{document_number, new_uuid_to_bech32, to_json, token_digest},
};
use chrono::{Datelike, Duration, Timelike};
use std::str::FromStr;

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids carry their readable prefix ahead of the bech32 separator
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("asg_").unwrap();
        assert!(encoded.starts_with("asg_1"));
        assert!(encoded.len() > 10);
    }

    /// Consecutive ids never collide
    #[test]
    fn generates_unique_ids() {
        let a = new_uuid_to_bech32("tkt_").unwrap();
        let b = new_uuid_to_bech32("tkt_").unwrap();
        assert_ne!(a, b);
    }

    /// An hrp needs at least one character
    #[test]
    fn rejects_an_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn document_numbers_have_prefix_year_and_sequence() {
        assert_eq!(document_number("BRW", 2026, 1), "BRW-2026-00001");
        assert_eq!(document_number("REQ", 2027, 42), "REQ-2027-00042");
    }

    #[test]
    fn token_digest_hides_the_raw_token() {
        let digest = token_digest("sig_1abc");
        assert!(!digest.contains("sig_1abc"));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

// TYPES MODULE TESTS
mod types_tests {
    use super::*;

    /// `new_with` pins every calendar field
    #[test]
    fn timestamp_from_fields() {
        let ts = TimeStamp::new_with(2026, 9, 1, 14, 30, 5).to_datetime_utc();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2026, 9, 1));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (14, 30, 5));
    }

    /// Timestamps survive the CBOR record encoding to the nanosecond
    #[test]
    fn timestamp_cbor_round_trip() {
        let ts = TimeStamp::new();
        let bytes = minicbor::to_vec(ts).unwrap();
        let back: TimeStamp = minicbor::decode(&bytes).unwrap();
        assert_eq!(ts, back);
    }

    /// Amounts are exact decimals: 0.1 + 0.2 is 0.3
    #[test]
    fn amounts_do_not_drift() {
        let sum = Amount::from_str("0.1").unwrap() + Amount::from_str("0.2").unwrap();
        assert_eq!(sum, Amount::from_str("0.3").unwrap());
    }

    /// Amounts cross the JSON boundary as decimal strings
    #[test]
    fn amount_serializes_as_string() {
        let json = serde_json::to_string(&Amount::from_scaled(12345, 2)).unwrap();
        assert_eq!(json, "\"123.45\"");
    }

    #[test]
    fn amount_display_is_normalized() {
        assert_eq!(Amount::from_scaled(50000, 2).to_string(), "500");
        assert_eq!(Amount::from_scaled(1999, 2).round_money().to_string(), "19.99");
    }

    #[test]
    fn actor_builder() {
        let actor = Actor::new("u1").with_department("science").with_role("hod");
        assert_eq!(actor.department.as_deref(), Some("science"));
        assert_eq!(actor.roles, vec!["hod".to_string()]);
    }
}

// PORTS AND CONFIG TESTS
mod ports_tests {
    use super::*;

    #[test]
    fn global_grant_reaches_every_record() {
        let policy = PolicyMatrix::new().grant("admin", Grant::all(Module::Assets, Scope::Global));
        let admin = Actor::new("a1").with_role("admin");

        assert!(policy.can_perform(&admin, Module::Assets, Action::Create, &ScopeContext::global()));
        assert!(!policy.can_perform(&admin, Module::Borrow, Action::Create, &ScopeContext::global()));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let policy = PolicyMatrix::new();
        let nobody = Actor::new("n1").with_role("visitor");
        assert!(!policy.has_module_access(&nobody, Module::Tickets));
    }

    #[test]
    fn config_defaults_round_trip_through_toml() {
        let config = EngineConfig::from_toml_str("default_location = \"annex\"").unwrap();
        assert_eq!(config.default_location, "annex");
        assert_eq!(config.signature_token_ttl_minutes, 1440);
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let err = EngineConfig::from_toml_str("storage_retries = \"many\"").unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("here.toml"));
    }
}

// SLA AND EVENTS TESTS
mod sla_tests {
    use super::*;

    /// The urgent reference points: 5 min, 110 min, and one second past 2 h
    #[test]
    fn urgent_reference_points() {
        let t = TimeStamp::new_with(2026, 9, 1, 8, 0, 0);
        let deadline = calculate_deadline(Priority::Urgent, t);
        assert_eq!(deadline, t.plus(Duration::hours(2)));

        let at = |d: Duration| check_sla_status(t, Some(deadline), t.plus(d));
        assert_eq!(at(Duration::minutes(5)), Some(SlaStatus::WithinSla));
        assert_eq!(at(Duration::minutes(110)), Some(SlaStatus::AtRisk));
        assert_eq!(
            at(Duration::hours(2) + Duration::seconds(1)),
            Some(SlaStatus::Breached)
        );
    }

    #[test]
    fn no_deadline_no_status() {
        let t = TimeStamp::new();
        assert_eq!(check_sla_status(t, None, t), None);
    }

    #[test]
    fn sla_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SlaStatus::AtRisk).unwrap(), "\"at_risk\"");
    }

    #[test]
    fn events_render_as_tagged_json() {
        let event = DomainEvent::SlaBreached {
            ticket_number: "TKT-2026-00009".into(),
            sla_deadline: TimeStamp::new_with(2026, 9, 1, 10, 0, 0),
        };
        let json = to_json(&event).unwrap();
        assert!(json.contains("\"event\":\"sla_breached\""));
        assert!(json.contains("TKT-2026-00009"));
    }
}
