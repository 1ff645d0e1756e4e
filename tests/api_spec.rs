use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use flagkeeper::api::create_router;
use flagkeeper::config::Config;
use flagkeeper::db::Database;
use flagkeeper::identity::StaticTokens;
use flagkeeper::models::*;
use serde_json::json;
use uuid::Uuid;

const ALICE: &str = "Bearer alice-token";
const BOB: &str = "Bearer bob-token";

struct Fixture {
    server: TestServer,
    alice: Uuid,
    bob: Uuid,
}

fn setup() -> Fixture {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let config = Config {
        tokens: StaticTokens::default()
            .with_token("alice-token", alice)
            .with_token("bob-token", bob),
        ..Config::default()
    };

    let app = create_router(Arc::new(db), &config);
    Fixture {
        server: TestServer::new(app).expect("Failed to create test server"),
        alice,
        bob,
    }
}

async fn create_organization(server: &TestServer) -> Organization {
    server
        .post("/api/v1/organizations")
        .add_header("Authorization", ALICE)
        .json(&CreateOrganizationInput {
            name: "Acme".to_string(),
        })
        .await
        .json::<Organization>()
}

async fn create_flag(server: &TestServer, organization_id: Uuid) -> FeatureFlag {
    server
        .post(&format!("/api/v1/organizations/{}/flags", organization_id))
        .add_header("Authorization", ALICE)
        .json(&CreateFlagInput {
            name: "dark-mode".to_string(),
            flag_type: FlagType::Boolean,
            default_value: "false".to_string(),
            rules: vec![],
        })
        .await
        .json::<FeatureFlag>()
}

async fn add_bob(fixture: &Fixture, organization_id: Uuid, level: PermissionLevel) {
    fixture
        .server
        .post(&format!("/api/v1/organizations/{}/members", organization_id))
        .add_header("Authorization", ALICE)
        .json(&AddMemberInput {
            user_id: fixture.bob,
            permission_level: level,
        })
        .await
        .assert_status(StatusCode::CREATED);
}

mod authentication {
    use super::*;

    #[tokio::test]
    async fn health_is_public() {
        let fixture = setup();

        let response = fixture.server.get("/api/v1/health").await;

        response.assert_status_ok();
    }

    #[tokio::test]
    async fn requests_without_token_are_rejected() {
        let fixture = setup();

        let response = fixture
            .server
            .post("/api/v1/organizations")
            .json(&json!({ "name": "Acme" }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens_are_rejected() {
        let fixture = setup();

        fixture
            .server
            .get(&format!("/api/v1/organizations/{}", Uuid::new_v4()))
            .add_header("Authorization", "Bearer nope")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        fixture
            .server
            .get(&format!("/api/v1/organizations/{}", Uuid::new_v4()))
            .add_header("Authorization", "Basic dXNlcjpwYXNz")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

mod organizations {
    use super::*;

    #[tokio::test]
    async fn creator_becomes_sole_admin() {
        let fixture = setup();

        let response = fixture
            .server
            .post("/api/v1/organizations")
            .add_header("Authorization", ALICE)
            .json(&CreateOrganizationInput {
                name: "Acme".to_string(),
            })
            .await;

        response.assert_status(StatusCode::CREATED);
        let org: Organization = response.json();
        assert!(org.id.is_some());
        assert_eq!(org.members.len(), 1);
        assert_eq!(org.members[0].user_id, fixture.alice);
        assert_eq!(org.members[0].permission_level, PermissionLevel::Admin);
    }

    #[tokio::test]
    async fn non_members_are_forbidden() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;

        let response = fixture
            .server
            .get(&format!("/api/v1/organizations/{}", org.id.unwrap()))
            .add_header("Authorization", BOB)
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_organization_is_not_found() {
        let fixture = setup();

        let response = fixture
            .server
            .get(&format!("/api/v1/organizations/{}", Uuid::new_v4()))
            .add_header("Authorization", ALICE)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_manages_members() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let id = org.id.unwrap();
        add_bob(&fixture, id, PermissionLevel::ReadOnly).await;

        let response = fixture
            .server
            .put(&format!("/api/v1/organizations/{}/members/{}", id, fixture.bob))
            .add_header("Authorization", ALICE)
            .json(&SetPermissionInput {
                permission_level: PermissionLevel::Collaborator,
            })
            .await;
        response.assert_status_ok();
        let org: Organization = response.json();
        assert_eq!(
            org.member(fixture.bob).unwrap().permission_level,
            PermissionLevel::Collaborator
        );

        let response = fixture
            .server
            .delete(&format!("/api/v1/organizations/{}/members/{}", id, fixture.bob))
            .add_header("Authorization", ALICE)
            .await;
        response.assert_status_ok();
        assert!(response.json::<Organization>().member(fixture.bob).is_none());
    }

    #[tokio::test]
    async fn duplicate_member_is_a_conflict() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;

        let response = fixture
            .server
            .post(&format!("/api/v1/organizations/{}/members", org.id.unwrap()))
            .add_header("Authorization", ALICE)
            .json(&AddMemberInput {
                user_id: fixture.alice,
                permission_level: PermissionLevel::ReadOnly,
            })
            .await;

        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn only_admins_manage_invites() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let id = org.id.unwrap();
        add_bob(&fixture, id, PermissionLevel::Collaborator).await;

        fixture
            .server
            .post(&format!("/api/v1/organizations/{}/invites", id))
            .add_header("Authorization", BOB)
            .json(&InviteInput {
                email: "carol@example.com".to_string(),
            })
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = fixture
            .server
            .post(&format!("/api/v1/organizations/{}/invites", id))
            .add_header("Authorization", ALICE)
            .json(&InviteInput {
                email: "carol@example.com".to_string(),
            })
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Organization>().invites[0].status, InviteStatus::Pending);

        let response = fixture
            .server
            .post(&format!("/api/v1/organizations/{}/invites/cancel", id))
            .add_header("Authorization", ALICE)
            .json(&InviteInput {
                email: "carol@example.com".to_string(),
            })
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Organization>().invites[0].status, InviteStatus::Cancelled);
    }
}

mod flags {
    use super::*;

    #[tokio::test]
    async fn creates_flag_with_draft_revision() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;

        let response = fixture
            .server
            .post(&format!("/api/v1/organizations/{}/flags", org.id.unwrap()))
            .add_header("Authorization", ALICE)
            .json(&json!({
                "name": "dark-mode",
                "type": "boolean",
                "default_value": "false",
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let flag: FeatureFlag = response.json();
        assert_eq!(flag.version, 1);
        assert_eq!(flag.user_id, fixture.alice);
        assert_eq!(flag.revisions.len(), 1);
        assert_eq!(flag.revisions[0].status, RevisionStatus::Draft);
    }

    #[tokio::test]
    async fn rejects_values_of_the_wrong_type() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;

        let response = fixture
            .server
            .post(&format!("/api/v1/organizations/{}/flags", org.id.unwrap()))
            .add_header("Authorization", ALICE)
            .json(&json!({ "name": "limit", "type": "number", "default_value": "many" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lists_empty_organization() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;

        let response = fixture
            .server
            .get(&format!("/api/v1/organizations/{}/flags", org.id.unwrap()))
            .add_header("Authorization", ALICE)
            .await;

        response.assert_status_ok();
        assert!(response.json::<Vec<FeatureFlag>>().is_empty());
    }

    #[tokio::test]
    async fn read_only_members_can_read_but_not_write() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let id = org.id.unwrap();
        let flag = create_flag(&fixture.server, id).await;
        add_bob(&fixture, id, PermissionLevel::ReadOnly).await;

        let response = fixture
            .server
            .get(&format!("/api/v1/organizations/{}/flags", id))
            .add_header("Authorization", BOB)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Vec<FeatureFlag>>().len(), 1);

        fixture
            .server
            .get(&format!("/api/v1/flags/{}", flag.id.unwrap()))
            .add_header("Authorization", BOB)
            .await
            .assert_status_ok();

        fixture
            .server
            .post(&format!("/api/v1/flags/{}/revisions", flag.id.unwrap()))
            .add_header("Authorization", BOB)
            .json(&CreateRevisionInput {
                default_value: "true".to_string(),
                rules: vec![],
            })
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_flags() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;

        fixture
            .server
            .get(&format!("/api/v1/flags/{}", flag.id.unwrap()))
            .add_header("Authorization", BOB)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rename_changes_the_name() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;

        let response = fixture
            .server
            .put(&format!("/api/v1/flags/{}", flag.id.unwrap()))
            .add_header("Authorization", ALICE)
            .json(&RenameFlagInput {
                name: "night-mode".to_string(),
            })
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<FeatureFlag>().name, "night-mode");
    }
}

mod revisions {
    use super::*;

    #[tokio::test]
    async fn promoting_keeps_a_single_live_revision() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;
        let flag_id = flag.id.unwrap();

        fixture
            .server
            .post(&format!(
                "/api/v1/flags/{}/revisions/{}/promote",
                flag_id, flag.revisions[0].id
            ))
            .add_header("Authorization", ALICE)
            .await
            .assert_status_ok();

        let response = fixture
            .server
            .post(&format!("/api/v1/flags/{}/revisions", flag_id))
            .add_header("Authorization", ALICE)
            .json(&CreateRevisionInput {
                default_value: "true".to_string(),
                rules: vec![],
            })
            .await;
        response.assert_status(StatusCode::CREATED);
        let second = response.json::<FeatureFlag>().revisions[1].id;

        let response = fixture
            .server
            .post(&format!("/api/v1/flags/{}/revisions/{}/promote", flag_id, second))
            .add_header("Authorization", ALICE)
            .await;
        response.assert_status_ok();

        let flag: FeatureFlag = response.json();
        let live: Vec<_> = flag
            .revisions
            .iter()
            .filter(|r| r.status == RevisionStatus::Live)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, second);
        assert_eq!(flag.revisions[0].status, RevisionStatus::Archived);
    }

    #[tokio::test]
    async fn drafts_are_editable_until_promoted() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;
        let flag_id = flag.id.unwrap();
        let revision_id = flag.revisions[0].id;
        let rule = Rule {
            predicate: "user.beta".to_string(),
            value: "true".to_string(),
            env: "staging".to_string(),
            is_enabled: true,
        };

        let response = fixture
            .server
            .put(&format!("/api/v1/flags/{}/revisions/{}", flag_id, revision_id))
            .add_header("Authorization", ALICE)
            .json(&UpdateRevisionInput {
                default_value: Some("true".to_string()),
                rules: Some(vec![rule.clone()]),
            })
            .await;
        response.assert_status_ok();
        let flag: FeatureFlag = response.json();
        assert_eq!(flag.revisions[0].default_value, "true");
        assert_eq!(flag.revisions[0].rules, vec![rule]);

        fixture
            .server
            .post(&format!("/api/v1/flags/{}/revisions/{}/archive", flag_id, revision_id))
            .add_header("Authorization", ALICE)
            .await
            .assert_status_ok();

        fixture
            .server
            .put(&format!("/api/v1/flags/{}/revisions/{}", flag_id, revision_id))
            .add_header("Authorization", ALICE)
            .json(&UpdateRevisionInput {
                default_value: Some("false".to_string()),
                rules: None,
            })
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_edit_leaves_draft_unchanged() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;
        let flag_id = flag.id.unwrap();

        fixture
            .server
            .put(&format!(
                "/api/v1/flags/{}/revisions/{}",
                flag_id, flag.revisions[0].id
            ))
            .add_header("Authorization", ALICE)
            .json(&json!({
                "default_value": "true",
                "rules": [{
                    "predicate": "user.beta",
                    "value": "maybe",
                    "env": "staging",
                    "is_enabled": true,
                }],
            }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let found: FeatureFlag = fixture
            .server
            .get(&format!("/api/v1/flags/{}", flag_id))
            .add_header("Authorization", ALICE)
            .await
            .json();
        assert_eq!(found.revisions[0].default_value, "false");
        assert!(found.revisions[0].rules.is_empty());
    }

    #[tokio::test]
    async fn unknown_revision_is_not_found() {
        let fixture = setup();
        let org = create_organization(&fixture.server).await;
        let flag = create_flag(&fixture.server, org.id.unwrap()).await;

        fixture
            .server
            .post(&format!(
                "/api/v1/flags/{}/revisions/{}/promote",
                flag.id.unwrap(),
                Uuid::new_v4()
            ))
            .add_header("Authorization", ALICE)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
