// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request handling shared by both RPC transports.
//
// Every request gets exactly one reply.  Transport-level concerns (framing,
// correlation ids, reply queues) stay in the transports; this module only
// maps an envelope to a reply.

use std::sync::Arc;

use slipway_core::codec;
use slipway_core::error::{Result, SlipwayError};
use slipway_core::protocol::{Envelope, Reply, RequestKind};
use slipway_core::types::{JobId, JobState};
use tracing::{debug, instrument, warn};

use crate::dispatcher::JobDispatcher;
use crate::job::Job;

/// Turn one decoded request into its reply.
#[instrument(skip(dispatcher, envelope), fields(kind = ?envelope.kind))]
pub fn handle_envelope(dispatcher: &JobDispatcher, envelope: Envelope) -> Reply {
    match envelope.request_kind() {
        Some(RequestKind::QueryJobState) => query_job_state(dispatcher, envelope.job_id.as_deref()),
        Some(_) => submit_job(dispatcher, envelope),
        None => {
            let reason = match envelope.kind.as_deref() {
                Some(kind) => format!("unknown request type {kind:?}"),
                None => "request has no type".to_string(),
            };
            debug!(%reason, "request rejected");
            Reply::rejected(reason)
        }
    }
}

/// Decode a request body, handle it and encode the reply.
///
/// A body that does not decode still gets an `error` reply.
pub fn handle_bytes(dispatcher: &JobDispatcher, body: &[u8]) -> Result<Vec<u8>> {
    let reply = match codec::decode::<Envelope>(body) {
        Ok(envelope) => handle_envelope(dispatcher, envelope),
        Err(e) => {
            warn!(error = %e, body_len = body.len(), "undecodable request");
            Reply::error(e.to_string())
        }
    };
    codec::encode(&reply)
}

/// [`handle_bytes`] on the blocking pool.
///
/// Image decoding is CPU bound, so transports call this instead of
/// decoding on a runtime thread.
pub async fn handle_request(dispatcher: Arc<JobDispatcher>, body: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || handle_bytes(&dispatcher, &body))
        .await
        .map_err(|e| SlipwayError::Transport(format!("request handler panicked: {e}")))?
}

fn submit_job(dispatcher: &JobDispatcher, envelope: Envelope) -> Reply {
    let job = match Job::from_envelope(envelope) {
        Ok(Some(job)) => job.with_wrap_width(dispatcher.wrap_width()),
        Ok(None) => return Reply::rejected("request does not describe a job"),
        Err(e) => {
            warn!(error = %e, "job construction failed");
            return Reply::error(e.to_string());
        }
    };

    match dispatcher.submit(job) {
        Ok(id) => {
            let state = dispatcher.state_of(&id).unwrap_or(JobState::Queued);
            Reply::job(id, state)
        }
        Err(e) => {
            warn!(error = %e, "job submission failed");
            Reply::error(e.to_string())
        }
    }
}

fn query_job_state(dispatcher: &JobDispatcher, job_id: Option<&str>) -> Reply {
    let Some(raw) = job_id else {
        return Reply::error("query_job_state requires job_id");
    };
    match JobId::parse(raw).and_then(|id| dispatcher.state_of(&id).map(|state| (id, state))) {
        Some((id, state)) => Reply::job(id, state),
        None => Reply::not_found(raw),
    }
}
