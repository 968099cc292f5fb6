//! Fake collaborators and courier construction for tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::collaborators::{Ack, Artifact, ContentFetcher, Packager, Transport};
use crate::config::Config;
use crate::courier::Courier;
use crate::error::{FetchError, PackageError, TransportError};
use crate::types::{ContentId, Destination, Event};

/// Scripted result of one `send`
#[derive(Debug, Clone)]
pub(crate) enum SendOutcome {
    Ok,
    Fail(TransportError),
    /// Never completes; only the local deadline ends it
    Hang,
}

/// Transport that follows a script and records every call
///
/// Once the script runs out every send succeeds.
#[derive(Default)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<SendOutcome>>,
    send_delay: Duration,
    notify_delay: Duration,
    fail_notify: bool,
    sends: Mutex<Vec<(Destination, String, Duration)>>,
    notifications: Mutex<Vec<(Destination, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn scripted(script: impl IntoIterator<Item = SendOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    pub(crate) fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub(crate) fn with_notify_delay(mut self, delay: Duration) -> Self {
        self.notify_delay = delay;
        self
    }

    pub(crate) fn with_failing_notify(mut self) -> Self {
        self.fail_notify = true;
        self
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    /// File names passed to `send`, in call order
    pub(crate) fn sent_names(&self) -> Vec<String> {
        self.sends.lock().unwrap().iter().map(|(_, name, _)| name.clone()).collect()
    }

    pub(crate) fn sent_timeouts(&self) -> Vec<Duration> {
        self.sends.lock().unwrap().iter().map(|(_, _, t)| *t).collect()
    }

    pub(crate) fn sent_destinations(&self) -> Vec<Destination> {
        self.sends.lock().unwrap().iter().map(|(d, _, _)| d.clone()).collect()
    }

    pub(crate) fn notifications(&self) -> Vec<(Destination, String)> {
        self.notifications.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        destination: &Destination,
        file: &Path,
        timeout: Duration,
    ) -> Result<Ack, TransportError> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert!(file.exists(), "uploaded file {name} must exist at send time");
        self.sends
            .lock()
            .unwrap()
            .push((destination.clone(), name, timeout));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(SendOutcome::Ok);
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        let result = match outcome {
            SendOutcome::Ok => Ok(Ack {
                file_id: Some("file-1".to_string()),
            }),
            SendOutcome::Fail(e) => Err(e),
            SendOutcome::Hang => {
                // Dropped by the caller's deadline; in_flight is not decremented
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn notify(&self, destination: &Destination, text: &str) -> Result<(), TransportError> {
        if !self.notify_delay.is_zero() {
            tokio::time::sleep(self.notify_delay).await;
        }
        self.notifications
            .lock()
            .unwrap()
            .push((destination.clone(), text.to_string()));
        if self.fail_notify {
            return Err(TransportError::message("chat unavailable"));
        }
        Ok(())
    }
}

/// Scripted result of one `fetch`
#[derive(Debug, Clone)]
pub(crate) enum FetchOutcome {
    Partial,
    NotFound,
    Failed(String),
}

/// Fetcher that writes a couple of fake pages into the job directory
///
/// Ids can be gated so a test controls when their fetch finishes.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    failures: Mutex<HashMap<ContentId, VecDeque<FetchOutcome>>>,
    gates: Mutex<HashMap<ContentId, Arc<Semaphore>>>,
    calls: Mutex<Vec<ContentId>>,
    work_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    /// Make the next fetches of `id` fail with `outcomes`, in order
    pub(crate) fn fail_with(&self, id: &str, outcomes: impl IntoIterator<Item = FetchOutcome>) {
        self.failures
            .lock()
            .unwrap()
            .insert(ContentId::from(id), outcomes.into_iter().collect());
    }

    /// Hold fetches of `id` until [`release`](Self::release) is called
    pub(crate) fn gate(&self, id: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(ContentId::from(id), Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release(&self, id: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(&ContentId::from(id)) {
            gate.add_permits(1);
        }
    }

    pub(crate) fn calls(&self) -> Vec<ContentId> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, id: &str) -> usize {
        let id = ContentId::from(id);
        self.calls.lock().unwrap().iter().filter(|c| **c == id).count()
    }

    pub(crate) fn work_dirs(&self) -> Vec<PathBuf> {
        self.work_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, id: &ContentId, work_dir: &Path) -> Result<PathBuf, FetchError> {
        self.calls.lock().unwrap().push(id.clone());
        self.work_dirs.lock().unwrap().push(work_dir.to_path_buf());

        let gate = self.gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(FetchOutcome::Partial) => {
                return Err(FetchError::Partial("2 of 40 pages missing".to_string()));
            }
            Some(FetchOutcome::NotFound) => return Err(FetchError::NotFound(id.clone())),
            Some(FetchOutcome::Failed(msg)) => return Err(FetchError::Failed(msg)),
            None => {}
        }

        let pages = work_dir.join("pages");
        tokio::fs::create_dir_all(&pages).await?;
        tokio::fs::write(pages.join("00001.jpg"), b"page one").await?;
        tokio::fs::write(pages.join("00002.jpg"), b"page two").await?;
        Ok(pages)
    }
}

/// Packager that concatenates the fetched pages into `<id>.pdf`
#[derive(Default)]
pub(crate) struct FakePackager {
    fail_ids: Mutex<HashMap<ContentId, String>>,
    calls: Mutex<Vec<ContentId>>,
}

impl FakePackager {
    pub(crate) fn fail_for(&self, id: &str, message: &str) {
        self.fail_ids
            .lock()
            .unwrap()
            .insert(ContentId::from(id), message.to_string());
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Packager for FakePackager {
    async fn package(
        &self,
        id: &ContentId,
        pages_dir: &Path,
        out_dir: &Path,
    ) -> Result<Artifact, PackageError> {
        self.calls.lock().unwrap().push(id.clone());
        let failure = self.fail_ids.lock().unwrap().get(id).cloned();
        if let Some(message) = failure {
            return Err(PackageError::Failed(message));
        }

        let mut entries = tokio::fs::read_dir(pages_dir).await?;
        let mut body = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            body.extend(tokio::fs::read(entry.path()).await?);
        }
        if body.is_empty() {
            return Err(PackageError::Empty(pages_dir.to_path_buf()));
        }

        let path = out_dir.join(format!("{}.pdf", id));
        tokio::fs::write(&path, &body).await?;
        Ok(Artifact::from_file(path).await?)
    }
}

/// A courier wired to fakes, plus the fakes and its work root
pub(crate) struct TestCourier {
    pub(crate) courier: Courier,
    pub(crate) fetcher: Arc<FakeFetcher>,
    pub(crate) packager: Arc<FakePackager>,
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) events: tokio::sync::broadcast::Receiver<Event>,
    pub(crate) _temp_dir: tempfile::TempDir,
}

/// Config used by courier tests: two slots, short delays
pub(crate) fn test_config(work_root: &Path) -> Config {
    let mut config = Config::default();
    config.cleanup.work_root = work_root.to_path_buf();
    config.fetch_retry.initial_delay = Duration::from_millis(10);
    config.upload.backoff = Duration::from_millis(10);
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Build a courier around fresh fakes
pub(crate) async fn create_test_courier(
    configure: impl FnOnce(&mut Config),
    transport: FakeTransport,
) -> TestCourier {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&temp_dir.path().join("work"));
    configure(&mut config);

    let fetcher = Arc::new(FakeFetcher::default());
    let packager = Arc::new(FakePackager::default());
    let transport = Arc::new(transport);

    let courier = Courier::new(
        config,
        fetcher.clone(),
        packager.clone(),
        transport.clone(),
    )
    .await
    .unwrap();
    let events = courier.subscribe();

    TestCourier {
        courier,
        fetcher,
        packager,
        transport,
        events,
        _temp_dir: temp_dir,
    }
}

/// Receive events until `pred` matches one, returning it
pub(crate) async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    mut pred: impl FnMut(&Event) -> bool,
) -> Event {
    let wait = async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("timed out waiting for event")
}

/// Wait until `id` reaches `state`
pub(crate) async fn wait_for_state(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: &str,
    state: crate::types::JobState,
) {
    wait_for_event(events, |e| {
        matches!(e, Event::StateChanged { content_id, state: s, .. } if content_id.as_str() == id && *s == state)
    })
    .await;
}
