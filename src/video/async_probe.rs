use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;

use crate::core::{PlayerConfig, ProcessLauncher, SystemLauncher};
use crate::video::probe::{MediaDescriptor, MediaProbe};

/// Request to probe one media file
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub file_path: PathBuf,
    pub request_id: u64,
}

/// Completed probe for one media file. Probing never fails outright; an
/// unprobeable file carries the default descriptor.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub request_id: u64,
    pub file_path: PathBuf,
    pub descriptor: MediaDescriptor,
}

/// Probes gallery items in the background so the grid never blocks on an
/// external tool invocation.
pub struct AsyncProbeLoader {
    request_sender: mpsc::UnboundedSender<ProbeRequest>,
    result_receiver: Arc<Mutex<mpsc::UnboundedReceiver<ProbeResult>>>,
    next_request_id: Arc<Mutex<u64>>,
}

impl AsyncProbeLoader {
    pub fn new(config: PlayerConfig) -> Self {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<ProbeRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<ProbeResult>();

        // Worker thread with its own runtime; each probe runs on the
        // blocking pool since it waits on a subprocess.
        thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create probe runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let launcher: Arc<dyn ProcessLauncher> = Arc::new(SystemLauncher);
                while let Some(request) = request_rx.recv().await {
                    let result_tx = result_tx.clone();
                    let config = config.clone();
                    let launcher = Arc::clone(&launcher);

                    tokio::task::spawn_blocking(move || {
                        log::debug!("Probing {:?}", request.file_path);
                        let descriptor =
                            MediaProbe::probe(launcher.as_ref(), &config, &request.file_path);

                        let response = ProbeResult {
                            request_id: request.request_id,
                            file_path: request.file_path,
                            descriptor,
                        };

                        if let Err(e) = result_tx.send(response) {
                            log::error!("Failed to send probe result: {}", e);
                        }
                    });
                }
            });
        });

        Self {
            request_sender: request_tx,
            result_receiver: Arc::new(Mutex::new(result_rx)),
            next_request_id: Arc::new(Mutex::new(0)),
        }
    }

    /// Queue a probe (non-blocking) and return its request id.
    pub fn request_probe(&self, file_path: PathBuf) -> u64 {
        let request_id = {
            let mut id = self.next_request_id.lock().unwrap();
            *id += 1;
            *id
        };

        let request = ProbeRequest {
            file_path,
            request_id,
        };

        if let Err(e) = self.request_sender.send(request) {
            log::error!("Failed to send probe request: {}", e);
        }

        request_id
    }

    /// Drain completed probes (non-blocking).
    pub fn completed(&self) -> Vec<ProbeResult> {
        let mut results = Vec::new();

        if let Ok(mut receiver) = self.result_receiver.lock() {
            while let Ok(result) = receiver.try_recv() {
                results.push(result);
            }
        }

        results
    }
}

/// Tracks pending probes so the grid doesn't re-request a file every frame.
pub struct ProbeManager {
    loader: AsyncProbeLoader,
    pending_requests: HashMap<PathBuf, u64>,
}

impl ProbeManager {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            loader: AsyncProbeLoader::new(config),
            pending_requests: HashMap::new(),
        }
    }

    /// Queue a probe unless one is already pending for the file.
    pub fn request_if_needed(&mut self, file_path: PathBuf) -> bool {
        if self.pending_requests.contains_key(&file_path) {
            return false;
        }

        let request_id = self.loader.request_probe(file_path.clone());
        self.pending_requests.insert(file_path, request_id);
        true
    }

    /// Collect finished probes and clear them from the pending set.
    pub fn process_completed(&mut self) -> Vec<ProbeResult> {
        let results = self.loader.completed();

        for result in &results {
            self.pending_requests.remove(&result.file_path);
        }

        results
    }

    pub fn is_pending(&self, file_path: &PathBuf) -> bool {
        self.pending_requests.contains_key(file_path)
    }
}
