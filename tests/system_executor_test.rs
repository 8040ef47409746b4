//! The system pool is process-wide, so everything touching its lifecycle
//! lives in this one test binary.

use std::sync::mpsc;
use std::time::Duration;
use veda_dispatch::executor::{init_system, shutdown_system, SystemContext};
use veda_dispatch::prelude::*;

#[test]
fn test_system_pool_lifecycle() {
    let config = Config::builder()
        .num_threads(2)
        .thread_name_prefix("system-test")
        .build()
        .unwrap();
    init_system(config.clone()).unwrap();
    assert_eq!(init_system(config), Err(Error::AlreadyInitialized));

    let (tx, rx) = mpsc::channel();
    defer(move || {
        let name = std::thread::current().name().map(str::to_owned);
        tx.send(name).unwrap();
    })
    .unwrap();

    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert!(name.starts_with("system-test"));

    shutdown_system();

    // a later deferral starts a fresh default pool
    let (tx, rx) = mpsc::channel();
    defer_in(&SystemContext, move || tx.send(()).unwrap()).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    shutdown_system();
}
