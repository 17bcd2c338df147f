use keba_control::failsafe::FailsafeConfig;
use keba_control::persistence::{FailsafeStore, JsonFileStore, PersistentState};
use keba_control::station::StationId;

fn config(timeout_seconds: u32) -> FailsafeConfig {
    FailsafeConfig {
        timeout_seconds,
        fallback_current_a: 6.0,
        persist: true,
    }
}

#[tokio::test]
async fn save_and_reload_from_disk() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("state").join("failsafe.json");
    let garage = StationId::new("garage");
    let carport = StationId::new("carport");

    let store = JsonFileStore::new(&path);
    store.save_failsafe(&garage, &config(30)).await.unwrap();
    store.save_failsafe(&carport, &config(90)).await.unwrap();

    // A fresh store reads what the first one wrote
    let reopened = JsonFileStore::new(&path);
    assert_eq!(
        reopened.load_failsafe(&garage).await.unwrap(),
        Some(config(30))
    );
    assert_eq!(
        reopened.load_failsafe(&carport).await.unwrap(),
        Some(config(90))
    );

    reopened.clear_failsafe(&garage).await.unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    let on_disk: PersistentState = serde_json::from_str(&contents).unwrap();
    assert_eq!(on_disk.stations.len(), 1);
    assert!(on_disk.stations.contains_key("carport"));
}

#[tokio::test]
async fn clearing_unknown_station_is_a_no_op() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("failsafe.json");
    let store = JsonFileStore::new(&path);
    store
        .clear_failsafe(&StationId::new("garage"))
        .await
        .unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "{ not json").unwrap();
    let store = JsonFileStore::new(tmp.path());
    let err = store
        .load_failsafe(&StationId::new("garage"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "serialization_error");
}
