//! Alarm sound playback.
//!
//! The state machine only ever calls [`AudioPlayer::play`] and
//! [`AudioPlayer::stop`], and both return immediately. Playback problems
//! are logged here and never reach the caller: an alarm with a broken
//! speaker still rings, silently.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("sound asset {} not found", .0.display())]
    MissingAsset(PathBuf),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },
}

pub trait AudioPlayer: Send + Sync {
    /// Start looping `sound` until [`stop`](Self::stop). Replaces anything
    /// already playing.
    fn play(&self, sound: &Path);

    /// Stop playback. No-op when nothing is playing.
    fn stop(&self);
}

/// Plays the asset in a loop through an external program such as `aplay`.
pub struct CommandPlayer {
    program: String,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            current: Mutex::new(None),
        }
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, sound: &Path) {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let program = self.program.clone();
        let sound = sound.to_path_buf();
        tokio::spawn(async move {
            if let Err(e) = play_loop(&program, &sound, &token).await {
                warn!(error = %e, "Alarm sound unavailable, ringing silently");
            }
        });
    }

    fn stop(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

/// Run `program sound` back to back until cancelled or it fails.
async fn play_loop(
    program: &str,
    sound: &Path,
    token: &CancellationToken,
) -> Result<(), AudioError> {
    if !tokio::fs::try_exists(sound).await.unwrap_or(false) {
        return Err(AudioError::MissingAsset(sound.to_path_buf()));
    }
    debug!(program, sound = %sound.display(), "Alarm sound started");

    loop {
        let mut child = Command::new(program)
            .arg(sound)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AudioError::Spawn {
                program: program.to_string(),
                source,
            })?;

        tokio::select! {
            _ = token.cancelled() => {
                // kill_on_drop covers the case where this fails.
                let _ = child.kill().await;
                debug!("Alarm sound stopped");
                return Ok(());
            }
            status = child.wait() => {
                let status = status.map_err(|source| AudioError::Spawn {
                    program: program.to_string(),
                    source,
                })?;
                if !status.success() {
                    return Err(AudioError::Exit {
                        program: program.to_string(),
                        status,
                    });
                }
            }
        }
    }
}

/// Player for setups without sound output.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl AudioPlayer for NullPlayer {
    fn play(&self, sound: &Path) {
        debug!(sound = %sound.display(), "Playback disabled");
    }

    fn stop(&self) {}
}
