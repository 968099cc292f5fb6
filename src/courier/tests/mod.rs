use super::test_helpers::*;
use super::*;
use crate::error::{AdmissionError, CancelError, TransportError};
use crate::types::{ContentId, Destination, Event, JobState, Origin, Placement};
use std::time::Duration;


fn group(id: &str) -> Origin {
    Origin::group(id, "42")
}

fn id(s: &str) -> ContentId {
    ContentId::from(s)
}

/// Wait until nothing is running or waiting
async fn wait_idle(courier: &Courier) {
    let wait = async {
        loop {
            if courier.status().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("courier did not become idle");
}
