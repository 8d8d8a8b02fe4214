use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Joins `handle` but gives up waiting after `timeout`, leaving the thread detached if it
/// hasn't finished. `std::thread::JoinHandle::join` has no built-in timeout, so the join
/// itself is delegated to a throwaway watcher thread and observed through a channel.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    let _ = rx.recv_timeout(timeout);
}
