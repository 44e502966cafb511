use storage::{sqlite_url_for_path, PreferenceStore, Storage, DARK_MODE_KEY};

#[tokio::test]
async fn dark_mode_flag_survives_reopening_the_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url_for_path(&temp_root.path().join("preferences.db"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.set_bool(DARK_MODE_KEY, true).await.expect("write");
        storage.pool().close().await;
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.get_bool(DARK_MODE_KEY).await.expect("read"),
        Some(true)
    );
}
