//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use medialoc::adapters::FetchError;
use medialoc::{FetchedAsset, Fetcher};

/// Smallest byte prefixes the sniffer recognizes
pub const PNG_A: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, b'a'];
pub const PNG_B: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, b'b'];
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Fetcher serving canned bytes and recording every request
#[derive(Default)]
pub struct StubFetcher {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, link: &str, bytes: &[u8]) {
        self.assets
            .lock()
            .unwrap()
            .insert(link.to_string(), bytes.to_vec());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, link: &str) -> Result<FetchedAsset, FetchError> {
        self.requests.lock().unwrap().push(link.to_string());
        match self.assets.lock().unwrap().get(link) {
            Some(bytes) => Ok(FetchedAsset::from_bytes(bytes.clone())),
            None => Err(FetchError::Status {
                url: link.to_string(),
                status: 404,
            }),
        }
    }
}
