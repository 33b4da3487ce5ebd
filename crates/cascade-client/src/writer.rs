//! Result writer — a dedicated worker thread that blocks until the
//! finished buffer arrives, sorts it descending, and persists it as raw
//! machine-native 8-byte values with no header.

use std::path::PathBuf;
use std::sync::mpsc;

use zerocopy::AsBytes;

pub struct ResultWriter {
    tx: mpsc::Sender<Vec<f64>>,
    handle: std::thread::JoinHandle<()>,
}

impl ResultWriter {
    /// Spawn the writer thread. It stays parked on the channel until
    /// `submit` fires (or exits silently if the sender is dropped).
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel::<Vec<f64>>();
        let handle = std::thread::Builder::new()
            .name("result-writer".into())
            .spawn(move || {
                let Ok(mut samples) = rx.recv() else {
                    return;
                };

                samples.sort_unstable_by(|a, b| b.total_cmp(a));

                if let Some(parent) = path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::error!(error = %e, "failed to create output directory");
                        return;
                    }
                }
                match std::fs::write(&path, samples.as_bytes()) {
                    Ok(()) => tracing::info!(
                        path = %path.display(),
                        count = samples.len(),
                        "result written"
                    ),
                    Err(e) => tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to write result"
                    ),
                }
            })
            .expect("failed to spawn result writer");

        Self { tx, handle }
    }

    /// Wake the writer with the finished buffer.
    pub fn submit(&self, samples: Vec<f64>) {
        let _ = self.tx.send(samples);
    }

    /// Wait for the write to finish.
    pub fn finish(self) {
        drop(self.tx);
        let _ = self.handle.join();
    }
}
