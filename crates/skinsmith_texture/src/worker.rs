// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background rendering.
//!
//! Requests carry a generation number. Submitting bumps the generation,
//! which cancels whatever pass is in flight; the worker skips queued
//! requests that are already superseded, and only the newest generation's
//! result is ever handed back.

use crate::config::{EngineConfig, RenderSettings};
use crate::engine::{RenderOutput, TextureEngine};
use crate::error::{EngineError, Result};
use crate::scheduler::CancelToken;
use parking_lot::RwLock;
use skinsmith_graph::Graph;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the worker thread is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Waiting for requests
    Idle,
    /// Rendering the given generation
    Rendering(u64),
}

/// A queued render
struct RenderRequest {
    generation: u64,
    graph: Arc<Graph>,
    settings: RenderSettings,
}

/// A finished render
#[derive(Debug)]
pub struct RenderResult {
    /// Generation of the request
    pub generation: u64,
    /// Maps, or why the pass failed
    pub output: Result<RenderOutput>,
}

/// Runs a [`TextureEngine`] on its own thread
pub struct RenderWorker {
    request_tx: Option<mpsc::UnboundedSender<RenderRequest>>,
    result_rx: mpsc::UnboundedReceiver<RenderResult>,
    latest: Arc<AtomicU64>,
    status: Arc<RwLock<WorkerStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Start a worker thread owning a new engine
    pub fn spawn(config: EngineConfig) -> Result<Self> {
        let engine = TextureEngine::new(config)?;
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let latest = Arc::new(AtomicU64::new(0));
        let status = Arc::new(RwLock::new(WorkerStatus::Idle));

        let handle = {
            let latest = Arc::clone(&latest);
            let status = Arc::clone(&status);
            std::thread::Builder::new()
                .name("skinsmith-render".to_string())
                .spawn(move || render_worker(engine, request_rx, result_tx, latest, status))
                .map_err(|e| {
                    EngineError::ResourceExhaustion(format!("failed to start render thread: {e}"))
                })?
        };

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            latest,
            status,
            handle: Some(handle),
        })
    }

    /// Queue a render of `graph`; returns its generation.
    ///
    /// Any in-flight or queued older request is superseded.
    pub fn submit(&self, graph: Arc<Graph>, settings: RenderSettings) -> u64 {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(tx) = &self.request_tx {
            let _ = tx.send(RenderRequest {
                generation,
                graph,
                settings,
            });
        }
        generation
    }

    /// Generation of the most recent submit
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Current worker status
    pub fn status(&self) -> WorkerStatus {
        *self.status.read()
    }

    /// Take the result for the latest generation if it is ready.
    ///
    /// Results of superseded generations are discarded.
    pub fn poll(&mut self) -> Option<RenderResult> {
        let mut current = None;
        while let Ok(result) = self.result_rx.try_recv() {
            if let Some(result) = self.keep_if_current(result) {
                current = Some(result);
            }
        }
        current
    }

    /// Block until the result for the latest generation arrives.
    ///
    /// Returns `None` if the worker thread has stopped.
    pub fn wait(&mut self) -> Option<RenderResult> {
        loop {
            let result = self.result_rx.blocking_recv()?;
            if let Some(result) = self.keep_if_current(result) {
                return Some(result);
            }
        }
    }

    fn keep_if_current(&self, result: RenderResult) -> Option<RenderResult> {
        let latest = self.latest_generation();
        if result.generation == latest {
            Some(result)
        } else {
            debug!(
                "Dropping stale render result {} (latest is {})",
                result.generation, latest
            );
            None
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop
        self.request_tx.take();
        self.latest.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Render thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for RenderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorker")
            .field("latest", &self.latest_generation())
            .field("status", &self.status())
            .finish()
    }
}

/// Worker loop: coalesce to the newest request, render, report
fn render_worker(
    mut engine: TextureEngine,
    mut request_rx: mpsc::UnboundedReceiver<RenderRequest>,
    result_tx: mpsc::UnboundedSender<RenderResult>,
    latest: Arc<AtomicU64>,
    status: Arc<RwLock<WorkerStatus>>,
) {
    while let Some(mut request) = request_rx.blocking_recv() {
        while let Ok(newer) = request_rx.try_recv() {
            request = newer;
        }
        if request.generation != latest.load(Ordering::Acquire) {
            continue;
        }

        *status.write() = WorkerStatus::Rendering(request.generation);
        let cancel = CancelToken::for_generation(Arc::clone(&latest), request.generation);
        let output = engine
            .set_settings(request.settings)
            .and_then(|()| engine.render_graph(request.graph, &cancel));
        *status.write() = WorkerStatus::Idle;

        if matches!(output, Err(EngineError::Cancelled)) {
            debug!("Render {} superseded", request.generation);
            continue;
        }
        if result_tx
            .send(RenderResult {
                generation: request.generation,
                output,
            })
            .is_err()
        {
            break;
        }
    }
}
