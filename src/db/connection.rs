use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.jobs.send(Message::Stop).is_err() {
            error!("store worker already gone at shutdown");
        }
        if let Err(panic) = handle.join() {
            error!("store worker panicked: {panic:?}");
        }
    }
}

/// Handle to the SQLite store. All statements run on one worker thread;
/// clones share that thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = db_path.clone();
        let worker = start_worker(move || {
            let conn = Connection::open(&file)?;
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                error!("could not switch {} to WAL: {err}", file.display());
            }
            Ok(conn)
        })?;
        info!("store opened at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(worker),
            db_path: Some(Arc::new(db_path)),
        })
    }

    /// Private in-memory store; gone once the last clone drops.
    pub fn in_memory() -> Result<Self> {
        let worker = start_worker(Connection::open_in_memory)?;
        Ok(Self {
            worker: Arc::new(worker),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref().map(PathBuf::as_path)
    }

    /// Run `task` on the worker thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; nothing to do then.
            let _ = reply.send(task(conn));
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("store worker is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("store worker stopped before answering"))?
    }
}

fn start_worker<F>(open: F) -> Result<Worker>
where
    F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
{
    let (jobs, inbox) = mpsc::channel::<Message>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

    let thread = thread::Builder::new()
        .name("gymproof-db".into())
        .spawn(move || {
            let mut conn = match open()
                .context("failed to open SQLite store")
                .and_then(|mut conn| {
                    run_migrations(&mut conn).context("failed to migrate store")?;
                    Ok(conn)
                }) {
                Ok(conn) => conn,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            serve(&mut conn, inbox);
        })
        .context("failed to spawn store worker")?;

    ready_rx
        .recv()
        .context("store worker exited during startup")??;

    Ok(Worker {
        jobs,
        thread: Mutex::new(Some(thread)),
    })
}

fn serve(conn: &mut Connection, inbox: mpsc::Receiver<Message>) {
    let mut handled = 0u64;
    while let Ok(message) = inbox.recv() {
        match message {
            Message::Run(job) => {
                job(conn);
                handled += 1;
            }
            Message::Stop => break,
        }
    }
    debug!("store worker stopping after {handled} job(s)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn clones_share_one_connection() {
        let db = Database::in_memory().unwrap();
        let other = db.clone();
        db.execute(|conn| {
            conn.execute_batch("CREATE TEMP TABLE scratch (v INTEGER); INSERT INTO scratch VALUES (7);")?;
            Ok(())
        })
        .await
        .unwrap();

        let v: i64 = other
            .execute(|conn| Ok(conn.query_row("SELECT v FROM scratch", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(db.path(), None);
    }

    #[tokio::test]
    async fn file_store_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("gymproof.db");
        let db = Database::new(path.clone()).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let db = Database::in_memory().unwrap();
        let err = db
            .execute(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no_such_table"));
    }
}
