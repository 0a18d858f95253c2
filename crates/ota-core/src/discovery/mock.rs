//! Mock service browser for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::traits::{DiscoveryError, ServiceAdvertisement, ServiceBrowser, ServiceListener};

/// How scripted advertisements are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One thread, in script order, honoring each entry's delay.
    Sequential,
    /// One thread per entry, released together to race each other.
    Concurrent,
}

/// Mock browser replaying scripted advertisements.
pub struct MockBrowser {
    script: Mutex<Vec<(Duration, ServiceAdvertisement)>>,
    delivery: Delivery,
    fail_browse: AtomicBool,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    browsed_types: Mutex<Vec<String>>,
}

/// Session handed out by `MockBrowser`; counts its own release.
pub struct MockSession {
    stopped: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::with_delivery(Delivery::Sequential)
    }

    pub fn with_delivery(delivery: Delivery) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            delivery,
            fail_browse: AtomicBool::new(false),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            browsed_types: Mutex::new(Vec::new()),
        }
    }

    /// Queue an advertisement for immediate delivery.
    pub fn advertise(&self, advertisement: ServiceAdvertisement) {
        self.advertise_after(Duration::ZERO, advertisement);
    }

    /// Queue an advertisement delivered `delay` after the previous one.
    pub fn advertise_after(&self, delay: Duration, advertisement: ServiceAdvertisement) {
        self.script.lock().unwrap().push((delay, advertisement));
    }

    /// Make the next `browse` call fail.
    pub fn fail_browse(&self) {
        self.fail_browse.store(true, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn browsed_types(&self) -> Vec<String> {
        self.browsed_types.lock().unwrap().clone()
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBrowser for MockBrowser {
    type Session = MockSession;

    fn browse(
        &self,
        service_type: &str,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<MockSession, DiscoveryError> {
        if self.fail_browse.swap(false, Ordering::SeqCst) {
            return Err(DiscoveryError::BrowseFailed {
                service_type: service_type.to_string(),
                message: "mock browse failure".into(),
            });
        }

        self.browsed_types
            .lock()
            .unwrap()
            .push(service_type.to_string());
        self.opened.fetch_add(1, Ordering::SeqCst);

        let script = self.script.lock().unwrap().clone();
        let stopped = Arc::new(AtomicBool::new(false));

        let workers = match self.delivery {
            Delivery::Sequential => {
                let stopped = stopped.clone();
                vec![thread::spawn(move || {
                    for (delay, advertisement) in script {
                        thread::sleep(delay);
                        if stopped.load(Ordering::SeqCst) {
                            return;
                        }
                        listener.service_added(advertisement);
                    }
                })]
            }
            Delivery::Concurrent => {
                let barrier = Arc::new(Barrier::new(script.len()));
                script
                    .into_iter()
                    .map(|(delay, advertisement)| {
                        let listener = listener.clone();
                        let barrier = barrier.clone();
                        let stopped = stopped.clone();
                        thread::spawn(move || {
                            barrier.wait();
                            thread::sleep(delay);
                            if !stopped.load(Ordering::SeqCst) {
                                listener.service_added(advertisement);
                            }
                        })
                    })
                    .collect()
            }
        };

        Ok(MockSession {
            stopped,
            closed: self.closed.clone(),
            workers,
        })
    }
}

impl MockSession {
    /// Wait for every delivery thread to finish.
    pub fn join(mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
