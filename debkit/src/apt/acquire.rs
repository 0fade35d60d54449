// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The bounded download pool.

Two worker tasks consume a job channel of [Item]s. Each downloaded file is
streamed to the item's destination path, then the item's `done` callback
runs. A callback may verify the payload, populate the shared catalog, and
enqueue further items.

The pending counter is incremented inside the same critical section as the
enqueue. A `done` callback enqueues its children before the worker reports
the parent's completion, so the counter can never be observed at zero while
any transitively scheduled work is outstanding.

There is no cancellation: a failed item is reported through the results
channel and its siblings finish normally.
*/

use {
    crate::{
        apt::cache::Catalog,
        error::{DebError, Result},
    },
    async_trait::async_trait,
    log::debug,
    std::{
        fmt::Display,
        path::PathBuf,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc, Mutex,
        },
    },
    tokio::{fs, io::AsyncWriteExt, sync::mpsc},
};

const WORKERS: usize = 2;
const QUEUE_CAPACITY: usize = 1000;

/// A unit of downloadable work.
#[async_trait]
pub trait Item: Display + Send + Sync {
    /// Absolute URI to fetch.
    fn download_uri(&self) -> String;

    /// Local path the fetched content is written to.
    fn dest_file(&self, uri: &str) -> PathBuf;

    /// Post-processing after a successful download.
    ///
    /// Runs on a worker task; may mutate the catalog and enqueue further
    /// items through `acquire`.
    async fn done(&self, catalog: &Mutex<Catalog>, acquire: &AcquireHandle) -> Result<()>;
}

struct AcquireShared {
    catalog: Arc<Mutex<Catalog>>,
    client: reqwest::Client,
    jobs: mpsc::Sender<Arc<dyn Item>>,
    results: mpsc::Sender<Result<()>>,
    pending: Mutex<usize>,
    hits: AtomicU64,
}

/// Handle through which completed items schedule more work.
#[derive(Clone)]
pub struct AcquireHandle {
    shared: Arc<AcquireShared>,
}

impl AcquireHandle {
    /// Enqueue an item.
    ///
    /// The enqueue and the pending-count increment share one critical
    /// section; see the module notes.
    pub fn add(&self, item: Arc<dyn Item>) {
        let mut pending = self.shared.pending.lock().expect("pending lock");
        self.shared
            .jobs
            .try_send(item)
            .expect("acquire queue over capacity");
        *pending += 1;
    }
}

/// The download pool.
pub struct Acquire {
    handle: AcquireHandle,
    results: mpsc::Receiver<Result<()>>,
}

impl Acquire {
    /// Create a pool bound to a shared catalog and start its workers.
    pub fn new(catalog: Arc<Mutex<Catalog>>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (results_tx, results_rx) = mpsc::channel(QUEUE_CAPACITY);

        let shared = Arc::new(AcquireShared {
            catalog,
            client: reqwest::Client::new(),
            jobs: jobs_tx,
            results: results_tx,
            pending: Mutex::new(0),
            hits: AtomicU64::new(0),
        });

        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));
        for _ in 0..WORKERS {
            tokio::spawn(worker(shared.clone(), jobs_rx.clone()));
        }

        Self {
            handle: AcquireHandle { shared },
            results: results_rx,
        }
    }

    /// A handle for enqueueing items.
    pub fn handle(&self) -> AcquireHandle {
        self.handle.clone()
    }

    /// Enqueue an item.
    pub fn add(&self, item: Arc<dyn Item>) {
        self.handle.add(item);
    }

    /// Download every enqueued item, blocking until the pending count
    /// returns to zero.
    ///
    /// Errors are collected; the joined messages are returned once the
    /// queue drains.
    pub async fn run(mut self) -> Result<()> {
        let mut errors = Vec::new();

        loop {
            {
                let pending = self.handle.shared.pending.lock().expect("pending lock");
                if *pending == 0 {
                    break;
                }
            }

            let result = self
                .results
                .recv()
                .await
                .expect("worker result channel stays open");
            if let Err(error) = result {
                errors.push(error.to_string());
            }

            *self.handle.shared.pending.lock().expect("pending lock") -= 1;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DebError::Acquire(errors.join("\n")))
        }
    }
}

async fn worker(
    shared: Arc<AcquireShared>,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<Arc<dyn Item>>>>,
) {
    loop {
        let item = { jobs.lock().await.recv().await };
        let item = match item {
            Some(item) => item,
            None => break,
        };

        let result = download_item(&shared, item.as_ref()).await;
        if shared.results.send(result).await.is_err() {
            break;
        }
    }
}

async fn download_item(shared: &Arc<AcquireShared>, item: &dyn Item) -> Result<()> {
    let uri = item.download_uri();
    let dest = item.dest_file(&uri);

    let hit = shared.hits.fetch_add(1, Ordering::SeqCst) + 1;

    debug!("fetching {} -> {}", uri, dest.display());

    let mut response = match shared
        .client
        .get(&uri)
        .send()
        .await
        .and_then(|response| response.error_for_status())
    {
        Ok(response) => response,
        Err(error) => {
            println!("Err{}: {}\n\t{}", hit, item, error);
            return Err(error.into());
        }
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&dest)
        .await
        .map_err(|error| DebError::IoPath {
            path: dest.clone(),
            error,
        })?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let size = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
    println!("Get:{} {} [{}]", hit, item, human_size(size));

    item.done(&shared.catalog, &AcquireHandle { shared: shared.clone() })
        .await
}

/// Format a byte count with 1000-based units.
fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1000;

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut remaining = bytes / UNIT;
    while remaining >= UNIT {
        divisor *= UNIT;
        exponent += 1;
        remaining /= UNIT;
    }

    format!(
        "{:.1} {}B",
        bytes as f64 / divisor as f64,
        ['k', 'M', 'G', 'T', 'P', 'E'][exponent]
    )
}
