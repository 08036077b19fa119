// ordertail - app/tail.rs
//
// Tail Reader: holds a `(path, byteOffset)` cursor into the file the
// Locator currently resolves, emits newly appended complete lines, and
// survives rotation and truncation. Runs as a tokio task; rotation is
// detected both by a filesystem-notification subscription on the hourly
// directory and by a periodic fallback re-scan.

use crate::config::Tuning;
use crate::core::locator::Locator;
use crate::core::model::TailEvent;
use crate::util::constants::{HOURLY_SUBPATH, MAX_TAIL_PARTIAL_BYTES, MAX_TAIL_READ_BYTES_PER_TICK};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to a running Tail Reader task: the two output channels and the
/// task's join handle. Dropping the receivers does not stop the task;
/// signal `cancel` and await `join` for a clean shutdown.
pub struct TailHandle {
    pub lines: mpsc::Receiver<String>,
    pub events: mpsc::Receiver<TailEvent>,
    pub join: JoinHandle<()>,
}

/// Spawn the Tail Reader as a background tokio task.
pub fn spawn(locator: Locator, tuning: Tuning, cancel: Arc<AtomicBool>) -> TailHandle {
    let (lines_tx, lines_rx) = mpsc::channel(4096);
    let (events_tx, events_rx) = mpsc::channel(256);

    let join = tokio::spawn(run(locator, tuning, cancel, lines_tx, events_tx));

    TailHandle {
        lines: lines_rx,
        events: events_rx,
        join,
    }
}

/// Cursor held by the reader: the file currently being tailed and the
/// offset of the next unread byte.
struct Cursor {
    path: PathBuf,
    offset: u64,
}

async fn run(
    locator: Locator,
    tuning: Tuning,
    cancel: Arc<AtomicBool>,
    lines_tx: mpsc::Sender<String>,
    events_tx: mpsc::Sender<TailEvent>,
) {
    let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();
    let hourly_root = locator.root().join(HOURLY_SUBPATH);

    // Keep the watcher alive for the lifetime of this task; dropping it
    // would stop the filesystem subscription.
    let _watcher = start_rotation_watcher(&hourly_root, wake_tx);

    let mut cursor: Option<Cursor> = None;
    let mut partial: Vec<u8> = Vec::new();
    let poll = std::time::Duration::from_millis(tuning.tail_poll_interval_ms.max(1));
    let mut fallback = tokio::time::interval(std::time::Duration::from_secs(
        tuning.dir_watch_fallback_scan_secs.max(1),
    ));
    fallback.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = wake_rx.recv() => {}
            _ = fallback.tick() => {}
        }

        if tick(&locator, &mut cursor, &mut partial, &lines_tx, &events_tx)
            .await
            .is_err()
        {
            return; // receivers dropped, nothing left to serve
        }
    }
}

/// One iteration of the read protocol (§4.2): re-resolve the current
/// file, handle rotation/truncation, read new bytes, and emit complete
/// lines. Returns `Err(())` only when a downstream channel has closed,
/// signalling the task to stop.
async fn tick(
    locator: &Locator,
    cursor: &mut Option<Cursor>,
    partial: &mut Vec<u8>,
    lines_tx: &mpsc::Sender<String>,
    events_tx: &mpsc::Sender<TailEvent>,
) -> Result<(), ()> {
    let desired = match locator.current_file() {
        Ok(path) => path,
        Err(e) => {
            let _ = events_tx
                .send(TailEvent::TransientError {
                    message: e.to_string(),
                })
                .await;
            return Ok(());
        }
    };

    let Some(desired_path) = desired else {
        return Ok(()); // awaiting current file; try again next cadence
    };

    match cursor {
        None => acquire(cursor, partial, desired_path, events_tx).await,
        Some(c) if c.path != desired_path => {
            let from = c.path.clone();
            acquire(cursor, partial, desired_path, events_tx).await;
            let to = cursor.as_ref().expect("just acquired").path.clone();
            let _ = events_tx.send(TailEvent::Rotated { from, to }).await;
        }
        Some(_) => {}
    }

    let Some(c) = cursor.as_mut() else {
        return Ok(());
    };

    let metadata = match tokio::fs::metadata(&c.path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // File disappeared at the held path: treat as rotation by
            // dropping the cursor so the next tick re-resolves.
            *cursor = None;
            return Ok(());
        }
        Err(e) => {
            let _ = events_tx
                .send(TailEvent::TransientError {
                    message: e.to_string(),
                })
                .await;
            return Ok(());
        }
    };

    let size = metadata.len();

    if size < c.offset {
        c.offset = size;
        let path = c.path.clone();
        partial.clear();
        let _ = events_tx.send(TailEvent::Truncated { path }).await;
        return Ok(());
    }

    if size == c.offset {
        return Ok(()); // nothing new
    }

    let to_read = (size - c.offset).min(MAX_TAIL_READ_BYTES_PER_TICK as u64) as usize;
    let buf = match read_bytes_at(&c.path, c.offset, to_read).await {
        Ok(buf) => buf,
        Err(e) if is_disk_full(&e) => {
            let _ = events_tx.send(TailEvent::DiskFull).await;
            return Ok(());
        }
        Err(e) => {
            let _ = events_tx
                .send(TailEvent::TransientError {
                    message: e.to_string(),
                })
                .await;
            return Ok(());
        }
    };

    let consumed = buf.len() as u64;
    let path = c.path.clone();
    let lines = split_complete_lines(partial, buf);

    if partial.len() > MAX_TAIL_PARTIAL_BYTES {
        tracing::warn!(
            path = %path.display(),
            bytes = partial.len(),
            "partial line exceeds bound, discarding"
        );
        partial.clear();
    }

    let count = lines.len();
    for line in lines {
        if lines_tx.send(line).await.is_err() {
            return Err(());
        }
    }
    c.offset += consumed;

    if count > 0 {
        let _ = events_tx.send(TailEvent::LinesRead { count }).await;
    }

    Ok(())
}

async fn acquire(
    cursor: &mut Option<Cursor>,
    partial: &mut Vec<u8>,
    path: PathBuf,
    events_tx: &mpsc::Sender<TailEvent>,
) {
    partial.clear();
    let offset = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
    let _ = events_tx
        .send(TailEvent::Acquired {
            path: path.clone(),
            offset,
        })
        .await;
    *cursor = Some(Cursor { path, offset });
}

/// Read up to `limit` bytes starting at `offset`, without disturbing any
/// other reader's position (opens its own file handle).
async fn read_bytes_at(path: &PathBuf, offset: u64, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; limit];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

/// Concatenate `leftover` with `new_bytes`, split on newline, and return
/// the complete lines in order. The final fragment (possibly empty) is
/// left in `leftover` for the next call.
fn split_complete_lines(leftover: &mut Vec<u8>, new_bytes: Vec<u8>) -> Vec<String> {
    leftover.extend_from_slice(&new_bytes);

    let mut lines = Vec::new();
    let mut start = 0;
    for i in 0..leftover.len() {
        if leftover[i] == b'\n' {
            lines.push(String::from_utf8_lossy(&leftover[start..i]).into_owned());
            start = i + 1;
        }
    }
    leftover.drain(0..start);
    lines
}

fn is_disk_full(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(28) // ENOSPC
}

/// Start a filesystem-notification subscription on the hourly directory;
/// any event wakes the tail loop for an immediate re-check. Returns
/// `None` if the watcher could not be created (e.g. unsupported
/// platform); the periodic fallback scan still covers rotation in that
/// case.
fn start_rotation_watcher(
    hourly_root: &std::path::Path,
    wake_tx: mpsc::UnboundedSender<()>,
) -> Option<RecommendedWatcher> {
    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = wake_tx.send(());
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to start rotation watcher, relying on fallback scan");
            return None;
        }
    };

    if let Err(e) = watcher.watch(hourly_root, RecursiveMode::Recursive) {
        tracing::warn!(
            path = %hourly_root.display(),
            error = %e,
            "failed to watch hourly directory, relying on fallback scan"
        );
        return None;
    }

    Some(watcher)
}
