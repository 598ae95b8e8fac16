// tests/unit_storage_test.rs

use bytes::Bytes;
use http::{HeaderMap, header};
use pixelgate::core::storage::{
    FilesystemStorage, ListOptions, MemoryStorage, Storage,
};

fn list_opts(bucket: &str) -> ListOptions {
    ListOptions {
        bucket: bucket.to_string(),
        prefix: String::new(),
        delimiter: None,
        marker: String::new(),
        max_keys: 1000,
    }
}

#[tokio::test]
async fn test_memory_roundtrip() {
    let storage = MemoryStorage::new();
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "image/jpeg".parse().unwrap());

    let put = storage
        .put("/img.jpg", &headers, Bytes::from_static(b"jpeg-bytes"))
        .await;
    assert!(put.is_success());

    let got = storage.get("/img.jpg").await;
    assert_eq!(got.status, 200);
    assert_eq!(got.content_type(), Some("image/jpeg"));
    assert!(got.etag().is_some());
    assert_eq!(
        got.into_body_bytes().await.unwrap(),
        Bytes::from_static(b"jpeg-bytes")
    );

    let head = storage.head("/img.jpg").await;
    assert_eq!(head.status, 200);
    assert_eq!(head.content_length(), Some(0)); // HEAD carries no body...
    assert_eq!(
        head.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        Some("10") // ...but advertises the object size.
    );

    assert_eq!(storage.delete("/img.jpg").await.status, 200);
    assert_eq!(storage.get("/img.jpg").await.status, 404);
    assert_eq!(storage.delete("/img.jpg").await.status, 404);
}

#[tokio::test]
async fn test_memory_content_type_from_extension() {
    let storage = MemoryStorage::new();
    storage
        .put("/a.png", &HeaderMap::new(), Bytes::from_static(b"png"))
        .await;
    assert_eq!(storage.get("/a.png").await.content_type(), Some("image/png"));
}

#[tokio::test]
async fn test_memory_listing_with_delimiter_and_marker() {
    let storage = MemoryStorage::new();
    for key in ["a.jpg", "photos/1.jpg", "photos/2.jpg", "z.jpg"] {
        storage
            .put(key, &HeaderMap::new(), Bytes::from_static(b"x"))
            .await;
    }

    let mut opts = list_opts("demo");
    opts.delimiter = Some("/".to_string());
    let listing = storage.list(&opts).await.unwrap();
    assert_eq!(listing.name, "demo");
    let keys: Vec<&str> = listing.contents.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a.jpg", "z.jpg"]);
    assert_eq!(listing.common_prefixes, vec!["photos/".to_string()]);

    // Marker skips keys up to and including itself.
    let mut opts = list_opts("demo");
    opts.marker = "photos/1.jpg".to_string();
    let listing = storage.list(&opts).await.unwrap();
    let keys: Vec<&str> = listing.contents.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["photos/2.jpg", "z.jpg"]);

    // max-keys truncates and reports it.
    let mut opts = list_opts("demo");
    opts.max_keys = 2;
    let listing = storage.list(&opts).await.unwrap();
    assert_eq!(listing.contents.len(), 2);
    assert!(listing.is_truncated);
}

#[tokio::test]
async fn test_listing_xml_document() {
    let storage = MemoryStorage::new();
    storage
        .put("/dir/img.jpg", &HeaderMap::new(), Bytes::from_static(b"x"))
        .await;

    let listing = storage.list(&list_opts("demo")).await.unwrap();
    let xml = listing.to_xml();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">"));
    assert!(xml.contains("<Name>demo</Name>"));
    assert!(xml.contains("<Key>dir/img.jpg</Key>"));
    assert!(xml.contains("<StorageClass>STANDARD</StorageClass>"));
    assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
}

#[tokio::test]
async fn test_filesystem_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FilesystemStorage::new(dir.path().to_path_buf());

    let put = storage
        .put(
            "/cats/tabby.jpg",
            &HeaderMap::new(),
            Bytes::from_static(b"tabby"),
        )
        .await;
    assert!(put.is_success());

    let got = storage.get("/cats/tabby.jpg").await;
    assert_eq!(got.status, 200);
    assert_eq!(got.content_type(), Some("image/jpeg"));
    assert!(got.headers.get(header::LAST_MODIFIED).is_some());
    assert_eq!(
        got.into_body_bytes().await.unwrap(),
        Bytes::from_static(b"tabby")
    );

    let head = storage.head("/cats/tabby.jpg").await;
    assert_eq!(head.status, 200);
    assert!(head.etag().is_some());

    assert_eq!(storage.delete("/cats/tabby.jpg").await.status, 200);
    assert_eq!(storage.get("/cats/tabby.jpg").await.status, 404);
}

#[tokio::test]
async fn test_filesystem_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FilesystemStorage::new(dir.path().to_path_buf());

    let response = storage.get("/../etc/passwd").await;
    assert_eq!(response.status, 400);
    let response = storage
        .put("/../escape", &HeaderMap::new(), Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_filesystem_listing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FilesystemStorage::new(dir.path().to_path_buf());
    storage
        .put("/a.jpg", &HeaderMap::new(), Bytes::from_static(b"a"))
        .await;
    storage
        .put("/nested/b.jpg", &HeaderMap::new(), Bytes::from_static(b"b"))
        .await;

    let listing = storage.list(&list_opts("demo")).await.unwrap();
    let keys: Vec<&str> = listing.contents.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a.jpg", "nested/b.jpg"]);

    let mut opts = list_opts("demo");
    opts.prefix = "nested/".to_string();
    let listing = storage.list(&opts).await.unwrap();
    let keys: Vec<&str> = listing.contents.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["nested/b.jpg"]);
}
