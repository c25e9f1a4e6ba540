//! Integration tests for the store against a real on-disk SQLite database.

use std::path::Path;

use catalog_relay::store::{
    AlbumStatus, InsertOutcome, NewAlbum, NewArtist, NewUpload, Page, RecordType, StoreError,
    Track, TrackerCode, TrackerIds,
};
use catalog_relay::{Database, Store};
use chrono::NaiveDate;
use tempfile::TempDir;

async fn open_store(path: &Path) -> Store {
    Store::new(Database::new(path).await.expect("Failed to open database"))
}

fn artist(id: i64) -> NewArtist {
    NewArtist {
        id,
        name: format!("Artist {id}"),
        image_url: String::new(),
        nb_album: 1,
        nb_fan: 10,
    }
}

fn album(id: i64, artist_id: i64) -> NewAlbum {
    let date = NaiveDate::from_ymd_opt(2022, 3, 4).unwrap();
    NewAlbum {
        id,
        artist_id,
        title: format!("Album {id}"),
        image_url: String::new(),
        digital_release_date: date,
        release_date: date,
        record_type: RecordType::Ep,
        genres: vec!["Jazz".to_string()],
        label: "Blue Records".to_string(),
        tracks: vec![Track {
            id: 1,
            title: "So What".to_string(),
            position: 1,
            duration_seconds: 545,
        }],
        contributors: Vec::new(),
        upc: "0000000000001".to_string(),
        status: AlbumStatus::Added,
    }
}

#[tokio::test]
async fn test_state_survives_reopening_the_database() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("relay.db");

    {
        let store = open_store(&path).await;
        store.insert_artist(&artist(1)).await.unwrap();
        store.insert_album(&album(10, 1)).await.unwrap();
        store.transition_album(10, AlbumStatus::Reviewed).await.unwrap();
        store.database().clone().close().await;
    }

    let store = open_store(&path).await;
    let stored = store.require_album(10).await.unwrap();
    assert_eq!(stored.status, AlbumStatus::Reviewed);
    assert_eq!(stored.genres, vec!["Jazz".to_string()]);
    assert_eq!(stored.tracks[0].duration_seconds, 545);
    assert_eq!(
        store.insert_album(&album(10, 1)).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn test_concurrent_transitions_from_same_state_apply_once() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir.path().join("relay.db")).await;
    store.insert_artist(&artist(2)).await.unwrap();
    store.insert_album(&album(20, 2)).await.unwrap();

    let (first, second) = tokio::join!(
        store.transition_album(20, AlbumStatus::Reviewed),
        store.transition_album(20, AlbumStatus::Reviewed),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "first: {first:?}, second: {second:?}");
    let failure = if first.is_err() { first } else { second };
    assert!(matches!(
        failure,
        Err(StoreError::InvalidTransition {
            from: AlbumStatus::Reviewed,
            to: AlbumStatus::Reviewed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_upload_flow_moves_album_between_views() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir.path().join("relay.db")).await;
    let page = Page {
        limit: 10,
        offset: 0,
    };
    store.insert_artist(&artist(3)).await.unwrap();
    store.insert_album(&album(30, 3)).await.unwrap();
    store.transition_album(30, AlbumStatus::Reviewed).await.unwrap();
    store.transition_album(30, AlbumStatus::Downloaded).await.unwrap();
    assert_eq!(store.list_ready_for_upload(page).await.unwrap().len(), 1);

    let upload = store
        .insert_upload(&NewUpload {
            album_id: 30,
            infohash: "ab".repeat(20),
            tracker_code: TrackerCode::Ops,
            upload_parameters: serde_json::json!({"title": "Album 30"}),
            torrent_file: b"d4:infod4:name2:abee".to_vec(),
        })
        .await
        .unwrap();
    let pending = store
        .find_pending_upload(30, TrackerCode::Ops)
        .await
        .unwrap()
        .expect("upload should be pending");
    assert_eq!(pending.id, upload.id);
    assert!(
        store
            .find_pending_upload(30, TrackerCode::Red)
            .await
            .unwrap()
            .is_none()
    );

    store
        .complete_upload(
            upload.id,
            TrackerIds {
                torrent_id: 77,
                group_id: 7,
            },
        )
        .await
        .unwrap();

    assert_eq!(store.require_album(30).await.unwrap().status, AlbumStatus::Uploaded);
    assert!(store.list_ready_for_upload(page).await.unwrap().is_empty());
    assert!(
        store
            .find_pending_upload(30, TrackerCode::Ops)
            .await
            .unwrap()
            .is_none()
    );
    let uploads = store.uploads_for_album(30).await.unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].is_submitted());
    assert_eq!(uploads[0].tracker_code().unwrap(), TrackerCode::Ops);
}
