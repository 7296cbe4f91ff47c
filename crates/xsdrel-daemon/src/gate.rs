//! File-ready gate: a file is admitted once it can be opened for shared
//! read and its size has stopped changing between two consecutive samples
//! taken 100 ms apart, or once `ready_wait_ms` elapses (proceed anyway).

use std::path::Path;
use std::time::{Duration, Instant};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

pub async fn wait_until_ready(path: &Path, ready_wait_ms: u64) {
    let deadline = Instant::now() + Duration::from_millis(ready_wait_ms);
    let mut last_size: Option<u64> = None;

    loop {
        let openable_size = match tokio::fs::File::open(path).await {
            Ok(file) => file.metadata().await.ok().map(|m| m.len()),
            Err(_) => None,
        };

        if let (Some(size), Some(prev)) = (openable_size, last_size) {
            if size == prev {
                return;
            }
        }
        last_size = openable_size;

        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(SAMPLE_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn stable_file_is_admitted_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stable.xml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"<Root/>").unwrap();
        }

        let start = Instant::now();
        wait_until_ready(&path, 2000).await;
        assert!(start.elapsed() < Duration::from_millis(1900));
    }

    #[tokio::test]
    async fn missing_file_still_returns_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.xml");

        let start = Instant::now();
        wait_until_ready(&path, 250).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
