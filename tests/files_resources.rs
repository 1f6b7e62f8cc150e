//! File acquisition and temp-file lifecycle.

use httpmock::{Method::GET, MockServer};
use vectorloom::config::WorkerConfig;
use vectorloom::files::{FileError, FileManager};
use vectorloom::resources::ResourceManager;
use vectorloom::types::FileReference;

fn manager(temp_dir: &std::path::Path, max_size: u64) -> (ResourceManager, FileManager) {
    let mut config = WorkerConfig::default().with_temp_dir(temp_dir);
    config.max_temp_file_size = max_size;
    let resources = ResourceManager::new(&config);
    (resources.clone(), FileManager::new(resources))
}

#[tokio::test]
async fn remote_fetch_lands_in_a_tracked_temp_file() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/docs/report.txt");
            then.status(200).body("remote body");
        })
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let (resources, files) = manager(tmp.path(), 1024);
    let reference = FileReference::new(format!("{}/docs/report.txt", server.base_url()), "txt");

    let local;
    {
        let _scope = resources.scope();
        local = files.resolve(&reference, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "remote body");
        assert_eq!(resources.tracked(), 1);
        assert!(local.starts_with(tmp.path()));
    }
    // Scope exit cleans the fetched file on every path.
    assert!(!local.exists());
    assert_eq!(resources.tracked(), 0);
}

#[tokio::test]
async fn http_status_maps_onto_the_error_taxonomy() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone.txt");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/secret.txt");
            then.status(403);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky.txt");
            then.status(502);
        })
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let (_, files) = manager(tmp.path(), 1024);
    let base = server.base_url();

    assert!(matches!(
        files
            .resolve(&FileReference::new(format!("{base}/gone.txt"), "txt"), None)
            .await,
        Err(FileError::NotFound { .. })
    ));
    assert!(matches!(
        files
            .resolve(
                &FileReference::new(format!("{base}/secret.txt"), "txt"),
                None
            )
            .await,
        Err(FileError::AccessDenied { .. })
    ));
    assert!(matches!(
        files
            .resolve(&FileReference::new(format!("{base}/flaky.txt"), "txt"), None)
            .await,
        Err(FileError::Network { .. })
    ));
}

#[tokio::test]
async fn oversized_download_is_rejected_and_cleaned() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/huge.txt");
            then.status(200).body("this body is larger than the cap");
        })
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let (resources, files) = manager(tmp.path(), 8);
    let reference = FileReference::new(format!("{}/huge.txt", server.base_url()), "txt");

    assert!(matches!(
        files.resolve(&reference, None).await,
        Err(FileError::TooLarge { .. })
    ));
    // The partial download does not linger.
    assert_eq!(resources.tracked(), 0);
}

#[tokio::test]
async fn local_files_are_validated_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("doc.txt");
    std::fs::write(&file, "local body").unwrap();

    let (resources, files) = manager(tmp.path(), 1024);
    let reference = FileReference::new(file.to_string_lossy(), "txt");
    let resolved = files.resolve(&reference, None).await.unwrap();
    assert_eq!(resolved, file);
    // Local files are never registered for cleanup.
    assert_eq!(resources.tracked(), 0);

    let mut small = WorkerConfig::default().with_temp_dir(tmp.path());
    small.max_temp_file_size = 4;
    let fm = FileManager::new(ResourceManager::new(&small));
    assert!(matches!(
        fm.resolve(&reference, None).await,
        Err(FileError::TooLarge { .. })
    ));
}
