//! Process-wide driver registry.
//!
//! Hosts open connections by driver name, which is how the traced driver is
//! handed out without threading it through the application: `install`
//! registers the proxy under [`crate::TRACE_DRIVER_NAME`] and application
//! code opens connections against that name.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::warn;

use crate::driver::{Connection, Driver};

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers `driver` under `name`, replacing any previous registration.
pub fn register(name: &str, driver: Arc<dyn Driver>) {
    let mut drivers = DRIVERS.write().unwrap_or_else(PoisonError::into_inner);
    if drivers.insert(name.to_string(), driver).is_some() {
        warn!("driver {name:?} was already registered; replaced");
    }
}

/// Looks up a registered driver.
pub fn lookup(name: &str) -> Option<Arc<dyn Driver>> {
    DRIVERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
}

/// Opens a connection through the driver registered under `name`.
pub fn open(name: &str, dsn: &str) -> io::Result<Box<dyn Connection>> {
    let driver =
        lookup(name).ok_or_else(|| io::Error::other(format!("unknown driver {name:?}")))?;
    driver.open(dsn)
}
