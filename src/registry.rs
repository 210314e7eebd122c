//! Recording registry: the control surface an HTTP layer drives.
//!
//! One [`Recorder`] per `session:window` key. The map lock is only held to
//! look up or insert entries; each recorder sits behind its own async mutex
//! so operations on one window are serialized while different windows run
//! concurrently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use proc_tree::{CleanupGuard, ProcTreeError, ProcessTreeManager};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::EnvConfig;
use crate::error::RecorderError;
use crate::recorder::{Recorder, RecorderContext};

pub fn recording_key(session_id: &str, window_id: &str) -> String {
    format!("{session_id}:{window_id}")
}

/// Split a key at its first `:`. Window ids never contain one, session names might not.
pub fn parse_recording_key(key: &str) -> Option<(&str, &str)> {
    let (session, window) = key.split_once(':')?;
    if session.is_empty() || window.is_empty() {
        return None;
    }
    Some((session, window))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecording {
    pub session_id: String,
    pub window_id: String,
    pub active_pane: String,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_pane: Option<String>,
}

impl RecordingStatus {
    pub fn idle() -> Self {
        Self {
            recording: false,
            output_path: None,
            active_pane: None,
        }
    }

    fn of(recorder: &Recorder) -> Self {
        Self {
            recording: recorder.is_recording(),
            output_path: recorder.output_path().map(PathBuf::from),
            active_pane: recorder.active_pane().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingListing {
    pub id: String,
    pub session_id: String,
    pub window_id: String,
    pub recording: bool,
    pub output_path: Option<PathBuf>,
    pub active_pane: Option<String>,
}

type SharedRecorder = Arc<AsyncMutex<Recorder>>;

pub struct RecordingRegistry {
    ctx: RecorderContext,
    default_output_dir: PathBuf,
    recorders: Mutex<HashMap<String, SharedRecorder>>,
}

impl std::fmt::Debug for RecordingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRegistry")
            .field("default_output_dir", &self.default_output_dir)
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

impl RecordingRegistry {
    pub fn new(ctx: RecorderContext, default_output_dir: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            default_output_dir: default_output_dir.into(),
            recorders: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env(config: &EnvConfig) -> Self {
        let processes = Arc::new(ProcessTreeManager::new());
        Self::new(
            RecorderContext::from_env(config, processes),
            config.output_dir.clone(),
        )
    }

    pub fn processes(&self) -> &Arc<ProcessTreeManager> {
        &self.ctx.processes
    }

    /// Reap every capture tree if the program receives SIGINT, SIGTERM or SIGHUP.
    pub fn install_cleanup_handlers(&self) -> Result<CleanupGuard, ProcTreeError> {
        proc_tree::install_cleanup_handlers(
            Arc::clone(&self.ctx.processes),
            self.ctx.settings.terminate_timeout,
        )
    }

    /// Keys currently registered, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock_unpoisoned(&self.recorders).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.recorders).is_empty()
    }

    fn get(&self, key: &str) -> Option<SharedRecorder> {
        lock_unpoisoned(&self.recorders).get(key).cloned()
    }

    fn is_current(&self, key: &str, recorder: &SharedRecorder) -> bool {
        self.get(key)
            .is_some_and(|current| Arc::ptr_eq(&current, recorder))
    }

    fn remove_if_current(&self, key: &str, recorder: &SharedRecorder) {
        let mut recorders = lock_unpoisoned(&self.recorders);
        if recorders
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, recorder))
        {
            recorders.remove(key);
        }
    }

    /// Start recording a window, or report the recording already running for it.
    pub async fn create_recording(
        &self,
        request: CreateRecording,
    ) -> Result<RecordingStatus, RecorderError> {
        let key = recording_key(&request.session_id, &request.window_id);
        let output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.default_output_dir.clone());

        loop {
            let recorder = {
                let mut recorders = lock_unpoisoned(&self.recorders);
                Arc::clone(recorders.entry(key.clone()).or_insert_with(|| {
                    Arc::new(AsyncMutex::new(Recorder::new(
                        self.ctx.clone(),
                        request.session_id.clone(),
                        request.window_id.clone(),
                        output_dir.clone(),
                    )))
                }))
            };

            let mut guard = recorder.lock().await;
            // A concurrent stop or failed start may have retired this entry while we waited.
            if !self.is_current(&key, &recorder) {
                continue;
            }
            if guard.is_recording() {
                return Ok(RecordingStatus::of(&guard));
            }

            return match guard.start(&request.active_pane).await {
                Ok(()) => Ok(RecordingStatus::of(&guard)),
                Err(error) => {
                    self.remove_if_current(&key, &recorder);
                    Err(error)
                }
            };
        }
    }

    /// Stop the recording under `key` and forget it.
    pub async fn stop_recording(&self, key: &str) -> Result<RecordingStatus, RecorderError> {
        if parse_recording_key(key).is_none() {
            return Err(RecorderError::InvalidKey {
                key: key.to_string(),
            });
        }
        let recorder = self.get(key).ok_or_else(|| RecorderError::NotFound {
            key: key.to_string(),
        })?;

        let mut guard = recorder.lock().await;
        let output_path = guard.output_path().map(PathBuf::from);
        let stopped = guard.stop().await;
        self.remove_if_current(key, &recorder);

        if !stopped {
            return Err(RecorderError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(RecordingStatus {
            recording: false,
            output_path,
            active_pane: None,
        })
    }

    pub async fn list_recordings(&self) -> Vec<RecordingListing> {
        let entries: Vec<(String, SharedRecorder)> = {
            let recorders = lock_unpoisoned(&self.recorders);
            let mut entries: Vec<_> = recorders
                .iter()
                .map(|(key, recorder)| (key.clone(), Arc::clone(recorder)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };

        let mut listings = Vec::with_capacity(entries.len());
        for (key, recorder) in entries {
            let guard = recorder.lock().await;
            if !guard.is_recording() {
                continue;
            }
            listings.push(RecordingListing {
                id: key,
                session_id: guard.session_id().to_string(),
                window_id: guard.window_id().to_string(),
                recording: true,
                output_path: guard.output_path().map(PathBuf::from),
                active_pane: guard.active_pane().map(str::to_string),
            });
        }
        listings
    }

    pub async fn recording_status(&self, session_id: &str, window_id: &str) -> RecordingStatus {
        match self.get(&recording_key(session_id, window_id)) {
            Some(recorder) => RecordingStatus::of(&*recorder.lock().await),
            None => RecordingStatus::idle(),
        }
    }

    /// Route a focus change to the window's recorder.
    pub async fn switch_pane(
        &self,
        session_id: &str,
        window_id: &str,
        pane: &str,
    ) -> Result<bool, RecorderError> {
        let key = recording_key(session_id, window_id);
        let recorder = self
            .get(&key)
            .ok_or(RecorderError::NotFound { key })?;
        let mut guard = recorder.lock().await;
        guard.switch_pane(pane).await
    }

    /// Stop every recording, then make sure no capture tree outlives us.
    ///
    /// Returns how many recordings were stopped.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<SharedRecorder> = lock_unpoisoned(&self.recorders)
            .drain()
            .map(|(_, recorder)| recorder)
            .collect();

        let mut stopped = 0;
        for recorder in drained {
            if recorder.lock().await.stop().await {
                stopped += 1;
            }
        }

        let processes = Arc::clone(&self.ctx.processes);
        let timeout = self.ctx.settings.terminate_timeout;
        match tokio::task::spawn_blocking(move || processes.terminate_all(timeout)).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("some capture trees survived shutdown"),
            Err(error) => tracing::warn!(%error, "shutdown termination task failed"),
        }
        tracing::info!(stopped, "recording registry shut down");
        stopped
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
