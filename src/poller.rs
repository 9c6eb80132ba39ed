use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use reqwest::{blocking::Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::status::{PayloadError, PlaybackStatus};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Where the poller gets its playback status from.
pub trait StatusSource: Send + 'static {
    fn fetch_status(&self) -> Result<PlaybackStatus, PollError>;

    fn describe(&self) -> String {
        String::from("status source")
    }
}

pub struct HttpStatusSource {
    client: Client,
    url: String,
}

impl HttpStatusSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PollError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl StatusSource for HttpStatusSource {
    fn fetch_status(&self) -> Result<PlaybackStatus, PollError> {
        let response = self.client.get(&self.url).send()?.error_for_status()?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(PlaybackStatus::idle());
        }

        let body = response.text()?;
        Ok(PlaybackStatus::from_json(&body)?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

enum PollerCommand {
    Shutdown,
}

/// Handle to the background poll loop. The loop fetches once right away,
/// then at a fixed rate until the handle is stopped or dropped.
pub struct PlaybackPoller {
    command_tx: Option<Sender<PollerCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackPoller {
    pub fn spawn<S, F>(source: S, interval: Duration, wake: F) -> (Self, Receiver<PlaybackStatus>)
    where
        S: StatusSource,
        F: Fn() + Send + 'static,
    {
        let (status_tx, status_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            info!(source = %source.describe(), interval_ms = interval.as_millis() as u64, "poller started");
            let mut next_tick = Instant::now();

            loop {
                match source.fetch_status() {
                    Ok(status) => {
                        if status_tx.send(status).is_err() {
                            break;
                        }
                        wake();
                    }
                    Err(err) => warn!(error = %err, "failed to fetch currently playing track"),
                }

                next_tick += interval;
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now;
                }

                match command_rx.recv_timeout(next_tick - now) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(PollerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            debug!("poller stopped");
        });

        (
            Self {
                command_tx: Some(command_tx),
                worker: Some(worker),
            },
            status_rx,
        )
    }

    /// Signals the loop to stop without waiting for an in-flight request.
    pub fn stop(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(PollerCommand::Shutdown);
        }
    }

    /// Stops the loop and waits for the worker to exit.
    pub fn shutdown(mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PlaybackPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
