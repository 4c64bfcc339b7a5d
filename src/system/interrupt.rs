// src/system/interrupt.rs

//! Ctrl+C handling for a running sweep.
//!
//! An interrupt does not kill anything by itself. The watcher asks the user whether to
//! exit; only a confirmed exit sets the cancellation token, which the running task and
//! the sweep driver observe. Declining resumes the sweep with the current task intact.

use crate::{CancellationToken, constants::EXIT_PROMPT};
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;

/// Decides whether an interrupt should abort the sweep.
pub trait ExitConfirm: Send + Sync {
    /// Returns `true` to abort. Called from a blocking thread.
    fn confirm_exit(&self) -> bool;
}

/// Asks on the terminal, defaulting to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerConfirm;

impl ExitConfirm for DialoguerConfirm {
    fn confirm_exit(&self) -> bool {
        match Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(EXIT_PROMPT)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                // No usable terminal: a second Ctrl+C or a closed stdin means stop.
                log::warn!("Exit confirmation failed ({}); aborting.", e);
                true
            }
        }
    }
}

/// Aborts on the first interrupt without asking. Used with `--yes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAbort;

impl ExitConfirm for AlwaysAbort {
    fn confirm_exit(&self) -> bool {
        true
    }
}

/// Handle to the background watcher. Dropping it stops watching.
pub struct InterruptWatcher {
    handle: JoinHandle<()>,
}

impl fmt::Debug for InterruptWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptWatcher")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl Drop for InterruptWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a task that turns confirmed Ctrl+C presses into a set cancellation token.
///
/// Must be called from within a tokio runtime.
pub fn spawn_interrupt_watcher(
    token: CancellationToken,
    confirm: Arc<dyn ExitConfirm>,
) -> InterruptWatcher {
    let handle = tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Unable to listen for Ctrl+C: {}", e);
                return;
            }
            log::debug!("Interrupt received, asking for confirmation");
            if handle_interrupt(&token, Arc::clone(&confirm)).await {
                return;
            }
        }
    });
    InterruptWatcher { handle }
}

/// Runs one confirmation round. Returns `true` when the token was set.
async fn handle_interrupt(token: &CancellationToken, confirm: Arc<dyn ExitConfirm>) -> bool {
    let confirmed = tokio::task::spawn_blocking(move || confirm.confirm_exit())
        .await
        .unwrap_or_else(|e| {
            log::warn!("Exit confirmation did not complete ({}); aborting.", e);
            true
        });
    if confirmed {
        log::info!("Exit confirmed, cancelling the sweep");
        token.store(true, Ordering::SeqCst);
    } else {
        log::info!("Exit declined, resuming");
    }
    confirmed
}

// MARK: --- UNIT TESTS ---
