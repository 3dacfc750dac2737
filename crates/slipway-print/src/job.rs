// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print jobs and their lifecycle.
//
// A job moves strictly forward: created -> queued -> running -> done|failed.
// State lives behind a mutex so transports can query it while the
// dispatcher worker executes the job.  The payload is taken out of the job
// when it starts running and dropped as soon as it has been printed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use image::DynamicImage;
use slipway_core::error::{Result, SlipwayError};
use slipway_core::protocol::{Command, Envelope, RequestKind};
use slipway_core::types::{JobId, JobKind, JobState};
use slipway_document::{decode, normalize, wrap};
use tracing::{debug, error, instrument};

use crate::device::PrinterDevice;
use crate::richtext::{interpret, Directive};

/// Default column count for wrapped text jobs.
pub const DEFAULT_WRAP_WIDTH: usize = 32;

/// What a job prints.
#[derive(Debug)]
enum JobPayload {
    Text { text: String, wrap: bool },
    Image(DynamicImage),
    RichText(Vec<Command>),
}

#[derive(Debug)]
struct JobInner {
    state: JobState,
    completed_at: Option<DateTime<Utc>>,
    payload: Option<JobPayload>,
    last_error: Option<String>,
}

/// A unit of printable work.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    kind: JobKind,
    wrap_width: usize,
    inner: Mutex<JobInner>,
}

impl Job {
    fn with_payload(kind: JobKind, payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            kind,
            wrap_width: DEFAULT_WRAP_WIDTH,
            inner: Mutex::new(JobInner {
                state: JobState::Created,
                completed_at: None,
                payload: Some(payload),
                last_error: None,
            }),
        }
    }

    /// A plain text job, optionally hard-wrapped.
    pub fn text(text: impl Into<String>, wrap: bool) -> Self {
        Self::with_payload(
            JobKind::SimpleText,
            JobPayload::Text {
                text: text.into(),
                wrap,
            },
        )
    }

    /// An image job from an already decoded image.
    pub fn image(image: DynamicImage) -> Self {
        Self::with_payload(JobKind::Image, JobPayload::Image(image))
    }

    /// A rich-text job.
    pub fn rich_text(commands: Vec<Command>) -> Self {
        Self::with_payload(JobKind::RichText, JobPayload::RichText(commands))
    }

    /// Column count used when wrapping text.
    pub fn with_wrap_width(mut self, width: usize) -> Self {
        self.wrap_width = width.max(1);
        self
    }

    /// Build a job from a request envelope.
    ///
    /// Returns `Ok(None)` when the envelope does not describe a printable
    /// job (missing or unknown `type`, or a state query).  Image bytes are
    /// decoded here so that a broken image is reported to the caller
    /// instead of failing later on the worker.
    #[instrument(skip(envelope), fields(kind = ?envelope.kind))]
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>> {
        let job = match envelope.request_kind() {
            Some(RequestKind::SimpleText) => Self::text(
                envelope.text.unwrap_or_default(),
                envelope.wrap.unwrap_or(false),
            ),
            Some(RequestKind::Image) => {
                let bytes = envelope
                    .image_file
                    .ok_or_else(|| SlipwayError::ImageError("image_file is missing".into()))?;
                Self::image(decode(&bytes)?)
            }
            Some(RequestKind::RichText) => Self::rich_text(envelope.commands.unwrap_or_default()),
            Some(RequestKind::QueryJobState) | None => return Ok(None),
        };
        debug!(job_id = %job.id, kind = ?job.kind, "job created");
        Ok(Some(job))
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    /// When the job reached a terminal state.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.lock().completed_at
    }

    /// Why the job failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Mark the job as handed to the dispatcher.
    ///
    /// Only a freshly created job moves; any other state is left alone.
    /// Returns whether the transition happened.
    pub fn queued(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != JobState::Created {
            return false;
        }
        inner.state = JobState::Queued;
        true
    }

    /// Execute the job on `device`.
    ///
    /// Runs only from `Queued`, so a job is executed at most once even when
    /// `run` races with itself.  Returns whether the job was executed.
    #[instrument(skip(self, device), fields(job_id = %self.id, kind = ?self.kind))]
    pub fn run(&self, device: &mut dyn PrinterDevice) -> bool {
        let payload = {
            let mut inner = self.lock();
            if inner.state != JobState::Queued {
                debug!(state = %inner.state, "job not runnable");
                return false;
            }
            inner.state = JobState::Running;
            inner.payload.take()
        };

        let outcome = match payload {
            Some(payload) => {
                panic::catch_unwind(AssertUnwindSafe(|| self.execute(payload, device)))
                    .unwrap_or_else(|panic_info| {
                        Err(SlipwayError::Device(format!(
                            "printer panicked: {}",
                            panic_message(panic_info.as_ref())
                        )))
                    })
            }
            None => Err(SlipwayError::Dispatcher("job has no payload".into())),
        };

        let mut inner = self.lock();
        match outcome {
            Ok(()) => inner.state = JobState::Done,
            Err(e) => {
                error!(error = %e, "job failed");
                inner.state = JobState::Failed;
                inner.last_error = Some(e.to_string());
            }
        }
        inner.completed_at = Some(Utc::now());
        true
    }

    /// Whether the job finished more than `retention` ago.
    pub fn is_reapable(&self, retention: Duration) -> bool {
        self.is_reapable_at(Utc::now(), retention)
    }

    /// [`Job::is_reapable`] against an explicit clock.
    pub fn is_reapable_at(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let inner = self.lock();
        match inner.completed_at {
            Some(at) if inner.state.is_terminal() => now.signed_duration_since(at) > retention,
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn has_payload(&self) -> bool {
        self.lock().payload.is_some()
    }

    fn execute(&self, payload: JobPayload, device: &mut dyn PrinterDevice) -> Result<()> {
        match payload {
            JobPayload::Text { text, wrap: false } => device.execute(&Directive::Print(text)),
            JobPayload::Text { text, wrap: true } => {
                for line in wrap(&text, self.wrap_width) {
                    device.execute(&Directive::Print(format!("{line}\n")))?;
                }
                Ok(())
            }
            JobPayload::Image(image) => {
                let printable = normalize(&image);
                drop(image);
                device.print_image(&printable)
            }
            JobPayload::RichText(commands) => {
                let summary = interpret(device, &commands)?;
                debug!(
                    executed = summary.executed,
                    skipped = summary.skipped,
                    rejected = summary.rejected,
                    "rich-text job interpreted"
                );
                Ok(())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobInner> {
        self.inner.lock().expect("job lock poisoned")
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
