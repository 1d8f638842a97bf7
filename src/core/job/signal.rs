// src/core/job/signal.rs

//! The interrupt contract: the first ^C journals the latest state and exits
//! with a resume hint; a second ^C exits immediately without journaling.
//! Remote jobs are never cancelled; they outlive the supervisor and a later
//! `continue` re-attaches to them by job id.

use crate::core::job::journal::{self, JournalDocument};
use crate::core::job::printer;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Shared snapshot of the latest journal document, refreshed by the
/// supervisor after every state transition.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    snapshot: Arc<Mutex<Option<(JournalDocument, PathBuf)>>>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state that a ^C would persist.
    pub fn update(&self, document: JournalDocument, output_directory: PathBuf) {
        *self.snapshot.lock() = Some((document, output_directory));
    }

    /// Installs the ^C handler for the given job. Runs for the remainder of
    /// the process lifetime.
    pub fn install(&self, job_id: &str, ansi: bool) {
        let snapshot = self.snapshot.clone();
        let resume_hint = printer::emph(&format!("ringleader continue {job_id}"), ansi);

        tokio::spawn(async move {
            let mut interrupted = false;
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if interrupted {
                    // Graceless shutdown on the second ^C.
                    std::process::exit(1);
                }
                interrupted = true;

                let snapshot = snapshot.clone();
                let resume_hint = resume_hint.clone();
                // The write runs on a plain thread so a second ^C stays
                // responsive even if the filesystem stalls.
                std::thread::spawn(move || {
                    if let Some((document, output_directory)) = snapshot.lock().clone() {
                        if let Err(e) = journal::write(&document, &output_directory) {
                            warn!("Could not journal on interrupt: {e}");
                        }
                    }
                    println!(
                        "\nShutting down gracefully. Hit ^C again to shut down gracelessly.\n\n\
                         To resume, type {resume_hint}"
                    );
                    std::process::exit(1);
                });
            }
        });
    }
}
