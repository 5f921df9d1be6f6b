use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::file_path_handler::FilePathHandler;
use crate::fstools::final_path;
use crate::report::FileOutcome;

const IDLE_WAIT: Duration = Duration::from_millis(50);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Paths some worker is currently operating on.
#[derive(Default)]
pub struct InFlight {
    paths: Mutex<HashSet<PathBuf>>,
}

impl InFlight {
    /// Claims all of `paths` or none of them.
    pub fn try_claim(&self, paths: &[PathBuf]) -> bool {
        let mut held = lock(&self.paths);
        if paths.iter().any(|p| held.contains(p)) {
            return false;
        }
        held.extend(paths.iter().cloned());
        true
    }

    pub fn release(&self, paths: &[PathBuf]) {
        let mut held = lock(&self.paths);
        for p in paths {
            held.remove(p);
        }
    }
}

#[derive(Clone, Debug)]
pub enum QueueProcessorMessage {
    Start(PathBuf),
    Finished(PathBuf, FileOutcome),
}

#[derive(Default)]
struct Queue {
    items: VecDeque<PathBuf>,
    producer_done: bool,
}

enum NextItem {
    Work(PathBuf),
    Wait,
    Done,
}

/// A fixed number of worker threads handling paths as the walker produces
/// them. Results go out to every subscriber.
pub struct QueueProcessor {
    handler: FilePathHandler,
    workers: usize,
    container_extension: &'static str,
    queue: Arc<Mutex<Queue>>,
    in_flight: Arc<InFlight>,
    stop: Arc<AtomicBool>,
    subscribers: Vec<Sender<QueueProcessorMessage>>,
}

impl QueueProcessor {
    pub fn new(
        handler: FilePathHandler,
        workers: usize,
        container_extension: &'static str,
        stop: Arc<AtomicBool>,
    ) -> Self {
        QueueProcessor {
            handler,
            workers: workers.max(1),
            container_extension,
            queue: Arc::new(Mutex::new(Queue::default())),
            in_flight: Arc::new(InFlight::default()),
            stop,
            subscribers: vec![],
        }
    }

    pub fn subscribe(&mut self) -> Receiver<QueueProcessorMessage> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Starts the producer and the workers. Subscribers see their channel
    /// close once the last worker has exited.
    pub fn start<I>(self, paths: I) -> Vec<JoinHandle<()>>
    where
        I: Iterator<Item = PathBuf> + Send + 'static,
    {
        let mut handles = vec![];

        let queue = Arc::clone(&self.queue);
        let stop = Arc::clone(&self.stop);
        handles.push(thread::spawn(move || {
            for path in paths {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                lock(&queue).items.push_back(path);
            }
            lock(&queue).producer_done = true;
        }));

        for id in 0..self.workers {
            let worker = Worker {
                id,
                handler: self.handler.clone(),
                container_extension: self.container_extension,
                queue: Arc::clone(&self.queue),
                in_flight: Arc::clone(&self.in_flight),
                stop: Arc::clone(&self.stop),
                subscribers: self.subscribers.clone(),
            };
            handles.push(thread::spawn(move || worker.forever()));
        }

        handles
    }
}

struct Worker {
    id: usize,
    handler: FilePathHandler,
    container_extension: &'static str,
    queue: Arc<Mutex<Queue>>,
    in_flight: Arc<InFlight>,
    stop: Arc<AtomicBool>,
    subscribers: Vec<Sender<QueueProcessorMessage>>,
}

impl Worker {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn publish(&self, msg: QueueProcessorMessage) {
        for tx in &self.subscribers {
            let _ = tx.send(msg.clone());
        }
    }

    fn next_item(&self) -> NextItem {
        let mut q = lock(&self.queue);
        match q.items.pop_front() {
            Some(path) => NextItem::Work(path),
            None if q.producer_done => NextItem::Done,
            None => NextItem::Wait,
        }
    }

    fn defer(&self, path: PathBuf) {
        lock(&self.queue).items.push_back(path);
    }

    fn forever(&self) {
        while !self.should_stop() {
            match self.next_item() {
                NextItem::Done => break,
                NextItem::Wait => thread::sleep(IDLE_WAIT),
                NextItem::Work(path) => {
                    let claim = vec![path.clone(), final_path(&path, self.container_extension)];
                    if !self.in_flight.try_claim(&claim) {
                        debug!("worker {}: {:?} is busy; deferring", self.id, path);
                        self.defer(path);
                        thread::sleep(IDLE_WAIT);
                        continue;
                    }
                    self.publish(QueueProcessorMessage::Start(path.clone()));
                    let outcome = self.handler.handle(&path);
                    self.in_flight.release(&claim);
                    self.publish(QueueProcessorMessage::Finished(path, outcome));
                },
            }
        }
        if self.should_stop() {
            info!("worker {}: stopping", self.id);
        }
    }
}
