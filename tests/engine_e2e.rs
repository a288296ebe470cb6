use steepdesk::engine::{CodeCheck, CodeRejection, EngineError, Redemption, ReferralEngine};
use steepdesk::store::CodeStatus;

#[test]
fn registration_issues_id_and_three_available_codes() {
    let mut engine = ReferralEngine::in_memory();

    let reg = engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();

    assert_eq!(reg.customer_id, "JO4567");
    assert_eq!(
        reg.referral_codes,
        ["JO4567R1".to_string(), "JO4567R2".to_string(), "JO4567R3".to_string()]
    );
    assert_eq!(reg.customer.referrals_completed, 0);
    assert!(!reg.customer.discount_earned);
    assert_eq!(reg.customer.referred_by, "Direct Customer");
    assert!(reg.persisted);

    let owned = engine.ledger().by_owner("JO4567");
    assert_eq!(owned.len(), 3);
    assert!(owned.iter().all(|c| c.status == CodeStatus::Available));
}

#[test]
fn second_registration_with_same_identity_is_rejected() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();

    // Different formatting, same derived id.
    let err = engine
        .register_customer("  john doe ", "077-123-4567", None)
        .unwrap_err();
    match err {
        EngineError::DuplicateCustomer { customer_id } => assert_eq!(customer_id, "JO4567"),
        other => panic!("expected DuplicateCustomer, got {other:?}"),
    }
    assert_eq!(engine.customer_count(), 1);
}

#[test]
fn referred_registration_credits_the_owner_not_the_newcomer() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();

    let reg = engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
        .unwrap();

    assert_eq!(reg.customer.referred_by, "Referred by John Doe");

    let owner = engine.customers().get("JO4567").unwrap();
    assert_eq!(owner.referrals_completed, 1);
    assert!(!owner.discount_earned);

    // The newcomer's own fresh codes are untouched.
    let newcomer = engine.customers().get("JA6543").unwrap();
    assert_eq!(newcomer.referrals_completed, 0);
    assert!(engine
        .ledger()
        .by_owner("JA6543")
        .iter()
        .all(|c| c.status == CodeStatus::Available));

    // The redeemed row carries the consumer's identity and a timestamp.
    let row = engine.ledger().get_code("JO4567R1").unwrap();
    assert_eq!(row.status, CodeStatus::Used);
    assert_eq!(row.used_by_customer_id, "JA6543");
    assert_eq!(row.used_by_name, "Jane Roe");
    assert_eq!(row.used_by_phone, "0759876543");
    assert!(!row.date_used.is_empty());
}

#[test]
fn redemption_is_one_way_and_never_double_counts() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();
    engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
        .unwrap();

    let before = engine.customers().get("JO4567").unwrap().referrals_completed;

    for _ in 0..3 {
        let outcome = engine
            .redeem_code("JO4567R1", "XX0000", "Someone Else", "0000")
            .unwrap();
        assert!(matches!(outcome, Redemption::AlreadyUsed { .. }));
    }

    let after = engine.customers().get("JO4567").unwrap().referrals_completed;
    assert_eq!(before, after);
    assert_eq!(after, 1);

    // The original consumer is still on the row.
    let row = engine.ledger().get_code("JO4567R1").unwrap();
    assert_eq!(row.used_by_name, "Jane Roe");
}

#[test]
fn three_redemptions_earn_the_discount_and_it_sticks() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();

    let friends = [
        ("Jane Roe", "0751111111", "JO4567R1"),
        ("Kate Lee", "0752222222", "JO4567R2"),
        ("Lily May", "0753333333", "JO4567R3"),
    ];
    for (i, (name, phone, code)) in friends.iter().enumerate() {
        engine.register_customer(name, phone, Some(code)).unwrap();
        let owner = engine.customers().get("JO4567").unwrap();
        assert_eq!(owner.referrals_completed as usize, i + 1);
        assert_eq!(owner.discount_earned, i + 1 >= 3);
    }

    // Further reads and recounts never revert the flag.
    engine.update_referral_progress("JO4567");
    let owner = engine.customers().get("JO4567").unwrap();
    assert_eq!(owner.referrals_completed, 3);
    assert!(owner.discount_earned);
}

#[test]
fn code_validation_precedence_is_fixed() {
    let mut engine = ReferralEngine::in_memory();

    // Blank: valid, no owner.
    assert_eq!(engine.validate_referral_code(""), CodeCheck::NotProvided);

    // Malformed beats absent: slot 9 is outside 1-3.
    assert_eq!(
        engine.validate_referral_code("ZZ0000R9"),
        CodeCheck::Rejected(CodeRejection::BadFormat)
    );

    // Well-formed but absent from an empty ledger.
    assert_eq!(
        engine.validate_referral_code("AB1234R1"),
        CodeCheck::Rejected(CodeRejection::NotFound)
    );

    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();
    engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
        .unwrap();

    // Used code names its consumer.
    assert_eq!(
        engine.validate_referral_code("JO4567R1"),
        CodeCheck::Rejected(CodeRejection::AlreadyUsed {
            used_by: "Jane Roe".to_string()
        })
    );

    // Available code returns the owner identity.
    match engine.validate_referral_code("JO4567R2") {
        CodeCheck::Valid { owner } => {
            assert_eq!(owner.customer_id, "JO4567");
            assert_eq!(owner.name, "John Doe");
            assert_eq!(owner.phone, "0771234567");
        }
        other => panic!("expected Valid, got {other:?}"),
    }
}

#[test]
fn registering_with_used_code_fails_without_side_effects() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();
    engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
        .unwrap();

    let err = engine
        .register_customer("Kate Lee", "0752222222", Some("JO4567R1"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidCode(CodeRejection::AlreadyUsed { .. })
    ));
    assert_eq!(engine.customer_count(), 2);

    let owner = engine.customers().get("JO4567").unwrap();
    assert_eq!(owner.referrals_completed, 1);
}

#[test]
fn validation_errors_aggregate_and_block_registration() {
    let mut engine = ReferralEngine::in_memory();
    let err = engine.register_customer(" x ", "12", None).unwrap_err();
    match err {
        EngineError::Validation { messages } => {
            assert_eq!(messages.len(), 2);
        }
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(engine.customer_count(), 0);
}

#[test]
fn lookup_returns_profile_with_code_breakdown() {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();
    engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R3"))
        .unwrap();

    let profile = engine.get_customer_info("john").unwrap();
    assert_eq!(profile.customer.customer_id, "JO4567");
    assert_eq!(profile.codes.len(), 3);
    assert_eq!(profile.codes[2].status, CodeStatus::Used);
    assert!(profile.codes[2].used_info.starts_with("Used by Jane Roe"));
    assert_eq!(profile.codes[0].used_info, "Available for sharing");

    assert!(matches!(
        engine.get_customer_info("nobody at all"),
        Err(EngineError::NotFound { .. })
    ));
}
