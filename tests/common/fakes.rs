//! In-process collaborators built only on the public API

use async_trait::async_trait;
use comic_courier::{
    Ack, Artifact, ContentFetcher, ContentId, Destination, FetchError, PackageError, Packager,
    Transport, TransportError,
};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Copies pages from a library directory (`<library>/<id>/*.jpg`)
pub struct LibraryFetcher {
    library: PathBuf,
    delay: Duration,
}

impl LibraryFetcher {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            delay: Duration::ZERO,
        }
    }

    /// Simulate a slow source
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ContentFetcher for LibraryFetcher {
    async fn fetch(&self, id: &ContentId, work_dir: &Path) -> Result<PathBuf, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let source = self.library.join(id.as_str());
        if !source.is_dir() {
            return Err(FetchError::NotFound(id.clone()));
        }

        let pages = work_dir.join("pages");
        tokio::fs::create_dir_all(&pages).await?;
        let mut entries = tokio::fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            tokio::fs::copy(entry.path(), pages.join(entry.file_name())).await?;
        }
        Ok(pages)
    }
}

/// Concatenates pages in name order into `<id>.pdf`
pub struct ConcatPackager;

#[async_trait]
impl Packager for ConcatPackager {
    async fn package(
        &self,
        id: &ContentId,
        pages_dir: &Path,
        out_dir: &Path,
    ) -> Result<Artifact, PackageError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(pages_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.path());
        }
        if names.is_empty() {
            return Err(PackageError::Empty(pages_dir.to_path_buf()));
        }
        names.sort();

        let mut body = Vec::new();
        for page in names {
            body.extend(tokio::fs::read(page).await?);
        }
        let path = out_dir.join(format!("{}.pdf", id));
        tokio::fs::write(&path, body).await?;
        Ok(Artifact::from_file(path).await?)
    }
}

/// Chat platform stand-in: copies uploads into an inbox directory
pub struct InboxTransport {
    inbox: PathBuf,
    rejections: Mutex<VecDeque<TransportError>>,
    muted: HashSet<Destination>,
    notifications: Mutex<Vec<(Destination, String)>>,
}

impl InboxTransport {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            rejections: Mutex::new(VecDeque::new()),
            muted: HashSet::new(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Reject the next uploads with these errors, in order
    pub fn reject_next(self, errors: impl IntoIterator<Item = TransportError>) -> Self {
        self.rejections.lock().unwrap().extend(errors);
        self
    }

    /// Refuse every upload to `destination`
    pub fn mute(mut self, destination: Destination) -> Self {
        self.muted.insert(destination);
        self
    }

    pub fn notifications(&self) -> Vec<(Destination, String)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Files received so far, sorted by name
    pub fn received(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.inbox)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl Transport for InboxTransport {
    async fn send(
        &self,
        destination: &Destination,
        file: &Path,
        _timeout: Duration,
    ) -> Result<Ack, TransportError> {
        if self.muted.contains(destination) {
            return Err(TransportError::with_code(120, "bot is muted"));
        }
        let rejection = self.rejections.lock().unwrap().pop_front();
        if let Some(error) = rejection {
            return Err(error);
        }

        let name = file.file_name().ok_or_else(|| TransportError::message("no file name"))?;
        tokio::fs::create_dir_all(&self.inbox)
            .await
            .map_err(|e| TransportError::message(e.to_string()))?;
        tokio::fs::copy(file, self.inbox.join(name))
            .await
            .map_err(|e| TransportError::message(e.to_string()))?;
        Ok(Ack {
            file_id: Some(name.to_string_lossy().into_owned()),
        })
    }

    async fn notify(&self, destination: &Destination, text: &str) -> Result<(), TransportError> {
        self.notifications
            .lock()
            .unwrap()
            .push((destination.clone(), text.to_string()));
        Ok(())
    }
}

/// Create `<library>/<id>/` with `pages` small page files
pub fn add_to_library(library: &Path, id: &str, pages: usize) {
    let dir = library.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    for n in 1..=pages {
        std::fs::write(dir.join(format!("{n:05}.jpg")), format!("page {n} of {id}\n")).unwrap();
    }
}
