//! Background dumper
//!
//! Periodically flushes dirty containers until stopped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::RwLock;

use crate::container::Container;

use super::dump_all;

pub(crate) struct Dumper {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Dumper {
    pub(crate) fn spawn(interval: Duration, containers: Arc<RwLock<Vec<Arc<Container>>>>) -> Self {
        let (stop, stopped) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("atlasblob-dumper".to_string())
            .spawn(move || {
                tracing::debug!("Dump thread started, interval {:?}", interval);
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            let snapshot = containers.read().clone();
                            if let Err(e) = dump_all(&snapshot) {
                                tracing::warn!("Background dump failed: {}", e);
                            }
                        }
                        recv(stopped) -> _ => break,
                    }
                }
                tracing::debug!("Dump thread stopped");
            })
            .ok();

        if handle.is_none() {
            tracing::warn!("Could not start dump thread; containers are dumped on close only");
        }

        Self { stop, handle }
    }

    /// Stop the thread and wait for an in-progress dump to finish
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dumper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
