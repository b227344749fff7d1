use std::sync::Arc;
use std::time::{Duration, Instant};

use netmidi::sessions::AppleMidiDriver;

/// Bind a driver on a random free port pair.
pub async fn bind_driver(name: &str) -> Arc<AppleMidiDriver> {
    for _ in 0..32 {
        let base = 20_000 + (rand::random::<u16>() % 20_000) & !1;
        if let Ok(driver) = AppleMidiDriver::bind(name, base).await {
            return driver;
        }
    }
    panic!("no free UDP port pair found");
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
