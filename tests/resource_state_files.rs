//! Engine-style lifecycle driven through declaration and state files

use policy_attach::{
    Declaration, InMemoryIdentityService, MemberSet, PolicyAttachmentResource, PrincipalKind,
    ReconcilableResource, RemoteCall, ResourceState,
};
use tempfile::TempDir;

const ARN: &str = "arn:aws:iam::123456789012:policy/readonly";

fn write_declaration(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("attachment.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn service() -> InMemoryIdentityService {
    InMemoryIdentityService::new().with_policy(ARN).with_principals(
        &MemberSet::new()
            .with_users(["alice", "bob"])
            .with_roles(["auditor"])
            .with_groups(["ops", "dev"]),
    )
}

#[test]
fn test_full_lifecycle_through_files() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("attachment.state.json");
    let iam = service();

    // Create
    let decl_path = write_declaration(
        &dir,
        &format!(
            r#"
            name = "readonly"
            policy_arn = "{ARN}"
            users = ["alice"]
            groups = ["ops"]
            "#
        ),
    );
    let declaration = Declaration::load(&decl_path).unwrap();
    let state = ResourceState::load_or_new(&state_path, &declaration.attachment).unwrap();
    assert!(!state.exists());

    let mut resource = PolicyAttachmentResource::from_state(state);
    resource.create(&iam, &declaration).unwrap();
    resource.state().save(&state_path).unwrap();

    // Update from persisted state
    let decl_path = write_declaration(
        &dir,
        &format!(
            r#"
            name = "readonly"
            policy_arn = "{ARN}"
            users = ["alice", "bob"]
            roles = ["auditor"]
            "#
        ),
    );
    let declaration = Declaration::load(&decl_path).unwrap();
    let state = ResourceState::load(&state_path).unwrap();
    assert_eq!(state.id.as_deref(), Some("readonly"));

    let mut resource = PolicyAttachmentResource::from_state(state);
    iam.clear_calls();
    resource.update(&iam, &declaration).unwrap();

    let mutations = iam.mutations();
    assert_eq!(
        mutations,
        vec![
            RemoteCall::attach(PrincipalKind::User, "bob", ARN),
            RemoteCall::attach(PrincipalKind::Role, "auditor", ARN),
            RemoteCall::detach(PrincipalKind::Group, "ops", ARN),
        ]
    );
    assert_eq!(resource.state().members, declaration.members);
    resource.state().save(&state_path).unwrap();

    // Destroy
    let mut resource = PolicyAttachmentResource::from_state(ResourceState::load(&state_path).unwrap());
    resource.delete(&iam).unwrap();
    resource.state().save(&state_path).unwrap();

    let state = ResourceState::load(&state_path).unwrap();
    assert!(!state.exists());
    assert!(iam.attached(ARN).unwrap().is_empty());
}

#[test]
fn test_out_of_band_change_is_reconciled() {
    let iam = service();
    let declaration = Declaration::from_toml_str(&format!(
        r#"
        name = "readonly"
        policy_arn = "{ARN}"
        groups = ["ops"]
        "#
    ))
    .unwrap();

    let mut resource = PolicyAttachmentResource::new(declaration.attachment.clone());
    resource.create(&iam, &declaration).unwrap();

    // Someone attaches the policy to "dev" by hand
    iam.seed_attachment(PrincipalKind::Group, "dev", ARN);

    resource.read(&iam).unwrap();
    assert!(resource.state().members.contains(PrincipalKind::Group, "dev"));

    iam.clear_calls();
    resource.update(&iam, &declaration).unwrap();

    assert_eq!(
        iam.mutations(),
        vec![RemoteCall::detach(PrincipalKind::Group, "dev", ARN)]
    );
    assert_eq!(iam.attached(ARN).unwrap(), declaration.members);
}

#[test]
fn test_policy_deleted_remotely() {
    let iam = service();
    let declaration = Declaration::from_toml_str(&format!(
        r#"
        name = "readonly"
        policy_arn = "{ARN}"
        users = ["alice"]
        "#
    ))
    .unwrap();

    let mut resource = PolicyAttachmentResource::new(declaration.attachment.clone());
    resource.create(&iam, &declaration).unwrap();
    assert!(resource.id().is_some());

    iam.delete_policy(ARN);
    iam.clear_calls();
    resource.read(&iam).unwrap();

    assert!(resource.id().is_none());
    assert_eq!(iam.calls().len(), 1);
}

#[test]
fn test_missing_state_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let declaration = Declaration::from_toml_str(&format!(
        r#"
        name = "readonly"
        policy_arn = "{ARN}"
        users = ["alice"]
        "#
    ))
    .unwrap();

    let state = ResourceState::load_or_new(dir.path().join("none.json"), &declaration.attachment).unwrap();
    assert_eq!(state, ResourceState::new(declaration.attachment));
}
