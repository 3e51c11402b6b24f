use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, tick};

use crate::worker::EvictTrigger;

/// Periodically asks the worker to run an eviction sweep.
///
/// Each trigger is a blocking rendezvous send, so a busy worker delays
/// sweeps but never loses one. The timer stops on the first tick after the
/// worker has gone away.
#[derive(Debug)]
pub(crate) struct EvictionTimer {
    interval: Duration,
    evict_tx: Sender<EvictTrigger>,
}

impl EvictionTimer {
    pub(crate) fn new(interval: Duration, evict_tx: Sender<EvictTrigger>) -> Self {
        Self { interval, evict_tx }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tidepool-evict-timer".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        let ticker = tick(self.interval);
        for _ in ticker.iter() {
            if self.evict_tx.send(EvictTrigger).is_err() {
                break;
            }
        }
        tracing::debug!("eviction timer stopped");
    }
}
