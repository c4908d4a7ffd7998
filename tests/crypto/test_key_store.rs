// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tests for device key persistence

use sensor_envelope::crypto::{
    derive_device_keypair, DeviceKeyring, FileKeyStore, KeyStore, StoredKeyPair,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_file_store_persists_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys").join("devices.json");

    let identity = {
        let keyring = DeviceKeyring::new(Arc::new(FileKeyStore::new(&path)));
        keyring.load_or_derive("sensor-001").await.unwrap()
    };
    assert!(path.exists());

    let store = FileKeyStore::new(&path);
    let stored = store.load("sensor-001").await.unwrap().unwrap();
    assert_eq!(stored, identity.to_stored());

    let keyring = DeviceKeyring::new(Arc::new(store));
    assert_eq!(keyring.load_or_derive("sensor-001").await.unwrap(), identity);
}

#[tokio::test]
async fn test_file_store_keeps_other_devices() {
    let dir = TempDir::new().unwrap();
    let store = FileKeyStore::new(dir.path().join("devices.json"));

    let a = derive_device_keypair("sensor-001").unwrap().to_stored();
    let b = derive_device_keypair("sensor-002").unwrap().to_stored();
    store.save("sensor-001", &a).await.unwrap();
    store.save("sensor-002", &b).await.unwrap();

    store.remove("sensor-001").await.unwrap();
    assert!(store.load("sensor-001").await.unwrap().is_none());
    assert_eq!(store.load("sensor-002").await.unwrap(), Some(b));
}

#[tokio::test]
async fn test_file_format_is_camel_case_map() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devices.json");
    let store = FileKeyStore::new(&path);

    let pair = derive_device_keypair("dev-42").unwrap().to_stored();
    store.save("dev-42", &pair).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["dev-42"]["publicKey"], pair.public_key.as_str());
    assert!(json["dev-42"].get("privateKey").is_some());
}

#[tokio::test]
async fn test_tampered_file_entry_is_repaired() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devices.json");
    let store = Arc::new(FileKeyStore::new(&path));

    let bogus = StoredKeyPair {
        public_key: "AAAA".to_string(),
        private_key: "AAAA".to_string(),
    };
    store.save("sensor-001", &bogus).await.unwrap();

    let keyring = DeviceKeyring::new(store.clone());
    let identity = keyring.load_or_derive("sensor-001").await.unwrap();
    assert_eq!(identity, derive_device_keypair("sensor-001").unwrap());

    let repaired = store.load("sensor-001").await.unwrap().unwrap();
    assert_eq!(repaired, identity.to_stored());
}

#[tokio::test]
async fn test_corrupt_file_does_not_block_derivation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devices.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let store = FileKeyStore::new(&path);
    let err = store.load("sensor-001").await.unwrap_err();
    assert_eq!(err.kind(), "storage_error");

    let keyring = DeviceKeyring::new(Arc::new(store));
    let identity = keyring.load_or_derive("sensor-001").await.unwrap();
    assert_eq!(identity, derive_device_keypair("sensor-001").unwrap());
}

#[tokio::test]
async fn test_forget_removes_stored_pair() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileKeyStore::new(dir.path().join("devices.json")));
    let keyring = DeviceKeyring::new(store.clone());

    keyring.load_or_derive("sensor-001").await.unwrap();
    keyring.forget("sensor-001").await.unwrap();
    assert!(store.load("sensor-001").await.unwrap().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_store_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devices.json");
    let store = FileKeyStore::new(&path);

    let pair = derive_device_keypair("sensor-001").unwrap().to_stored();
    store.save("sensor-001", &pair).await.unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    // Rewrites keep the restricted mode
    store.remove("sensor-001").await.unwrap();
    store.save("sensor-002", &pair).await.unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
