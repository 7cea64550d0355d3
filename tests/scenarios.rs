use artifact_grid::{
    ArtifactStore, GridConfig, GridError, NamespaceType, Scope, SessionProviderConfig, StorageProviderConfig,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

fn memory_config(sandbox_id: &str) -> GridConfig {
    GridConfig {
        sandbox_id: sandbox_id.to_string(),
        storage_provider: StorageProviderConfig::Memory,
        session_provider: SessionProviderConfig::Memory,
        bucket: "artifacts".to_string(),
        max_retries: 3,
        default_ttl_seconds: 900,
        federation_enabled: false,
        federation_ttl_days: 30,
    }
}

/// S1: blob store/retrieve with exact hash.
#[tokio::test]
async fn s1_blob_store_and_retrieve() {
    let store = ArtifactStore::new(memory_config("sb1")).unwrap();
    let id = store
        .store(Bytes::from_static(b"hello"), "text/plain", "s", None, None, None, None, Scope::Session, None)
        .await
        .unwrap();

    let data = store.retrieve(&id, None, None).await.unwrap();
    assert_eq!(&data[..], b"hello");

    let meta = store.metadata(&id).await.unwrap();
    assert_eq!(meta.bytes, 5);
    assert_eq!(meta.sha256, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
}

/// S2: cross-session retrieve is denied; same-session retrieve still works.
#[tokio::test]
async fn s2_cross_session_deny() {
    let store = ArtifactStore::new(memory_config("sb1")).unwrap();
    let id = store
        .store(Bytes::from_static(b"x"), "text/plain", "s", None, None, Some("s1".to_string()), None, Scope::Session, None)
        .await
        .unwrap();

    let err = store.retrieve(&id, Some("s2"), None).await.unwrap_err();
    assert!(matches!(err, GridError::AccessDenied(_)));

    let data = store.retrieve(&id, Some("s1"), None).await.unwrap();
    assert_eq!(&data[..], b"x");
}

/// S3: multipart happy path.
#[tokio::test]
async fn s3_multipart_happy_path() {
    let store = ArtifactStore::new(memory_config("sb1")).unwrap();
    let record = store
        .initiate_multipart(Some("v.bin".into()), "video/mp4".into(), Scope::User, Some("u".into()), None, None, None)
        .await
        .unwrap();

    let part1 = Bytes::from(vec![0u8; 5 * 1024 * 1024]);
    let part2 = Bytes::from(vec![1u8; 5 * 1024 * 1024]);
    let part3 = Bytes::from(vec![2u8; 128]);

    store.upload_part(&record.upload_id, 1, part1).await.unwrap();
    store.upload_part(&record.upload_id, 2, part2).await.unwrap();
    store.upload_part(&record.upload_id, 3, part3).await.unwrap();

    let artifact_id = store.complete_multipart(&record.upload_id, None).await.unwrap();
    let meta = store.metadata(&artifact_id).await.unwrap();
    assert_eq!(meta.bytes, 5 * 1024 * 1024 * 2 + 128);
}

/// S4: multipart with an undersized middle part fails `complete`, and
/// `abort` afterwards is still well-defined.
#[tokio::test]
async fn s4_multipart_part_too_small() {
    let store = ArtifactStore::new(memory_config("sb1")).unwrap();
    let record = store
        .initiate_multipart(Some("v.bin".into()), "video/mp4".into(), Scope::User, Some("u".into()), None, None, None)
        .await
        .unwrap();

    store.upload_part(&record.upload_id, 1, Bytes::from(vec![0u8; 5 * 1024 * 1024])).await.unwrap();
    store.upload_part(&record.upload_id, 2, Bytes::from(vec![1u8; 1024])).await.unwrap();
    store.upload_part(&record.upload_id, 3, Bytes::from(vec![2u8; 128])).await.unwrap();

    let err = store.complete_multipart(&record.upload_id, None).await.unwrap_err();
    assert!(matches!(err, GridError::PartTooSmall(_)));

    assert!(store.abort_multipart(&record.upload_id).await.unwrap());
}

/// S5: workspace checkpoint/restore.
#[tokio::test]
async fn s5_workspace_checkpoint_restore() {
    let store = ArtifactStore::new(memory_config("sb1")).unwrap();
    let ns = store
        .namespaces()
        .create_namespace(NamespaceType::Workspace, Scope::Sandbox, None, None, None, None)
        .await
        .unwrap();
    let vfs = store.namespaces().get_namespace_vfs(&ns.namespace_id).await.unwrap();

    vfs.write_text("/a.txt", "1").await.unwrap();
    vfs.write_text("/b/c.txt", "2").await.unwrap();

    let checkpoint = store.namespaces().checkpoint_namespace(&ns.namespace_id, Some("v1".into()), None).await.unwrap();

    vfs.write_text("/a.txt", "X").await.unwrap();
    vfs.rm("/b/c.txt").await.unwrap();

    store.namespaces().restore_namespace(&ns.namespace_id, &checkpoint.checkpoint_id).await.unwrap();

    assert_eq!(vfs.read_text("/a.txt").await.unwrap(), "1");
    assert_eq!(vfs.read_text("/b/c.txt").await.unwrap(), "2");
}

/// S6: federation locate across two stores sharing one session provider.
#[tokio::test]
async fn s6_federation_locate() {
    let session = Arc::new(artifact_grid::MemorySessionProvider::new());
    let storage_a = artifact_grid::storage::build_storage_provider(&StorageProviderConfig::Memory).unwrap();
    let storage_b = artifact_grid::storage::build_storage_provider(&StorageProviderConfig::Memory).unwrap();

    let mut config_a = memory_config("A");
    config_a.federation_enabled = true;
    let store_a = ArtifactStore::with_providers(config_a, storage_a, session.clone()).unwrap();

    let mut config_b = memory_config("B");
    config_b.federation_enabled = true;
    let store_b = ArtifactStore::with_providers(config_b, storage_b, session.clone()).unwrap();

    let id = store_a
        .store(Bytes::from_static(b"federated"), "text/plain", "s", None, None, None, None, Scope::Sandbox, None)
        .await
        .unwrap();

    let located = store_b.locate_artifact(&id).await.unwrap().expect("artifact should be discoverable via federation");
    assert_eq!(located.sandbox_id, "A");
}
