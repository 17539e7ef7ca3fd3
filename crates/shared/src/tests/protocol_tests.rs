use serde_json::json;

use super::*;
use crate::domain::{
    find_unit_type, InstitutionId, OrganizationId, ParentKind, INSTITUTION_UNIT_TYPES,
};

fn institution_type(key: &str) -> &'static UnitType {
    find_unit_type(ParentKind::Institution, key).expect("known type")
}

#[test]
fn listing_accepts_bare_arrays_and_envelopes() {
    let bare = listing_items(json!([{ "id": 1 }, { "id": 2 }])).expect("bare");
    let enveloped =
        listing_items(json!({ "count": 2, "results": [{ "id": 1 }, { "id": 2 }] })).expect("env");
    assert_eq!(bare, enveloped);

    assert!(listing_items(json!({ "detail": "nope" })).is_none());
    assert!(listing_items(json!("text")).is_none());
}

#[test]
fn decodes_type_specific_code_field() {
    let unit = decode_unit(
        institution_type("faculty"),
        ParentRef::Institution(InstitutionId(9)),
        json!({
            "id": 12,
            "name": "Engineering",
            "faculty_code": "ENG",
            "approval_status": "pending",
            "created_by_email": "dean@example.edu",
            "institution": 9
        }),
    )
    .expect("decode");

    assert_eq!(unit.id, UnitId(12));
    assert_eq!(unit.unit_type, "faculty");
    assert_eq!(unit.code.as_deref(), Some("ENG"));
    assert_eq!(unit.approval_status, ApprovalStatus::Pending);
    assert_eq!(unit.parent, ParentRef::Institution(InstitutionId(9)));
    assert!(unit.address.is_none());
}

#[test]
fn missing_status_decodes_as_approved_and_generic_code_is_used() {
    let team_type = find_unit_type(ParentKind::Organization, "team").expect("team");
    let unit = decode_unit(
        team_type,
        ParentRef::Organization(OrganizationId(3)),
        json!({ "id": 1, "name": "Platform", "code": 42, "organisation": { "id": 3 } }),
    )
    .expect("decode");

    assert_eq!(unit.approval_status, ApprovalStatus::Approved);
    assert_eq!(unit.code.as_deref(), Some("42"));
    assert_eq!(unit.parent, ParentRef::Organization(OrganizationId(3)));
}

#[test]
fn branch_records_keep_their_address() {
    let unit = decode_unit(
        &INSTITUTION_UNIT_TYPES[0],
        ParentRef::Institution(InstitutionId(1)),
        json!({ "id": 2, "name": "North", "branch_code": "N1", "city": "Leeds" }),
    )
    .expect("decode");

    let address = unit.address.expect("address");
    assert_eq!(address.city.as_deref(), Some("Leeds"));
    assert!(address.postal_code.is_none());
}

#[test]
fn record_without_id_is_a_decode_error() {
    let err = decode_unit(
        institution_type("office"),
        ParentRef::Institution(InstitutionId(1)),
        json!({ "name": "Registry" }),
    )
    .expect_err("must fail");
    assert!(err.to_string().contains("office"));
}

#[test]
fn create_payload_maps_code_and_parent_fields() {
    let payload = encode_new_unit(
        institution_type("department"),
        ParentRef::Institution(InstitutionId(4)),
        &NewUnit {
            name: "Physics".into(),
            code: "PHY".into(),
            description: None,
            address: Some(BranchAddress {
                city: Some("ignored".into()),
                ..BranchAddress::default()
            }),
        },
    );

    assert_eq!(
        payload,
        json!({ "name": "Physics", "department_code": "PHY", "institution": 4 })
    );
}

#[test]
fn branch_create_payload_carries_address_fields() {
    let branch = find_unit_type(ParentKind::Organization, "branch").expect("branch");
    let payload = encode_new_unit(
        branch,
        ParentRef::Organization(OrganizationId(8)),
        &NewUnit {
            name: "Harbour".into(),
            code: "HB".into(),
            description: Some("Waterfront office".into()),
            address: Some(BranchAddress {
                address: Some("1 Quay St".into()),
                city: Some("Cork".into()),
                country: Some("IE".into()),
                postal_code: None,
            }),
        },
    );

    assert_eq!(payload["branch_code"], "HB");
    assert_eq!(payload["organisation"], 8);
    assert_eq!(payload["city"], "Cork");
    assert_eq!(payload["description"], "Waterfront office");
    assert!(payload.get("postal_code").is_none());
}

#[test]
fn patch_only_sends_present_fields() {
    let patch = UnitPatch {
        code: Some("DIV-2".into()),
        ..UnitPatch::default()
    };
    assert!(!patch.is_empty());
    assert_eq!(
        encode_unit_patch(institution_type("division"), &patch),
        json!({ "division_code": "DIV-2" })
    );
    assert!(UnitPatch::default().is_empty());
}

#[test]
fn member_collection_normalizes_non_lists_to_empty() {
    assert!(decode_members(json!({ "detail": "x" })).expect("decode").is_empty());
    assert!(decode_members(json!(null)).expect("decode").is_empty());

    let members = decode_members(json!({
        "results": [{ "id": 1, "user_name": "a", "user_email": "a@x", "role": "admin" }]
    }))
    .expect("decode");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, MemberRole::Admin);
}
