//! NVS (Non-Volatile Storage) backed key-value store.
//!
//! Every `set_*` commits before returning, so a value survives a power cut
//! as soon as the call succeeds.

use std::sync::{Mutex, PoisonError};

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{EspError, ESP_ERR_NVS_INVALID_LENGTH, ESP_ERR_NVS_TYPE_MISMATCH};
use log::info;

use fanctl_core::store::validate_key;
use fanctl_core::{KvStore, StoreError};

/// NVS namespace holding all controller keys.
pub const NVS_NAMESPACE: &str = "storage";

/// Largest string value read back (names and credentials are at most 64
/// bytes plus the terminator).
const MAX_STR_LEN: usize = 128;

pub struct NvsStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition, namespace: &str) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, namespace, true)?;
        info!("Opened NVS namespace '{}'", namespace);
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }
}

fn map_err(key: &str, e: EspError) -> StoreError {
    let code = e.code();
    if code == ESP_ERR_NVS_TYPE_MISMATCH as i32 || code == ESP_ERR_NVS_INVALID_LENGTH as i32 {
        StoreError::TypeMismatch(key.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

impl KvStore for NvsStore {
    fn get_int(&self, key: &str) -> Result<Option<i32>, StoreError> {
        validate_key(key)?;
        let nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        nvs.get_i32(key).map_err(|e| map_err(key, e))
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        nvs.set_i32(key, value).map_err(|e| map_err(key, e))
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; MAX_STR_LEN];
        nvs.get_str(key, &mut buf)
            .map(|value| value.map(str::to_string))
            .map_err(|e| map_err(key, e))
    }

    fn set_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut nvs = self.nvs.lock().unwrap_or_else(PoisonError::into_inner);
        nvs.set_str(key, value).map_err(|e| map_err(key, e))
    }
}
