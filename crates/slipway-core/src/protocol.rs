// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire schema shared by the queue RPC and socket RPC transports.
//
// Requests are a single flat map keyed by `type`; every other field is
// optional so that an envelope with an unknown or missing `type` still
// decodes and can be answered with a `rejected` reply instead of a codec
// error.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::types::{JobId, JobState};

/// Wire value of `type` for a plain text job.
pub const TYPE_SIMPLE_TEXT: &str = "simple_text";
/// Wire value of `type` for an image job.
pub const TYPE_IMAGE: &str = "image";
/// Wire value of `type` for a rich-text job.
pub const TYPE_RICH_TEXT: &str = "richtext";
/// Wire value of `type` for a job state query.
pub const TYPE_QUERY_JOB_STATE: &str = "query_job_state";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The recognised values of the `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    SimpleText,
    Image,
    RichText,
    QueryJobState,
}

impl RequestKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            TYPE_SIMPLE_TEXT => Some(Self::SimpleText),
            TYPE_IMAGE => Some(Self::Image),
            TYPE_RICH_TEXT => Some(Self::RichText),
            TYPE_QUERY_JOB_STATE => Some(Self::QueryJobState),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleText => TYPE_SIMPLE_TEXT,
            Self::Image => TYPE_IMAGE,
            Self::RichText => TYPE_RICH_TEXT,
            Self::QueryJobState => TYPE_QUERY_JOB_STATE,
        }
    }
}

/// A request message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
    /// Raw encoded image file (PNG, JPEG, BMP, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Command>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl Envelope {
    pub fn simple_text(text: impl Into<String>, wrap: bool) -> Self {
        Self {
            kind: Some(TYPE_SIMPLE_TEXT.into()),
            text: Some(text.into()),
            wrap: Some(wrap),
            ..Self::default()
        }
    }

    pub fn image(image_file: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: Some(TYPE_IMAGE.into()),
            image_file: Some(ByteBuf::from(image_file.into())),
            ..Self::default()
        }
    }

    pub fn rich_text(commands: Vec<Command>) -> Self {
        Self {
            kind: Some(TYPE_RICH_TEXT.into()),
            commands: Some(commands),
            ..Self::default()
        }
    }

    pub fn query_job_state(job_id: impl Into<String>) -> Self {
        Self {
            kind: Some(TYPE_QUERY_JOB_STATE.into()),
            job_id: Some(job_id.into()),
            ..Self::default()
        }
    }

    /// The recognised request kind, or `None` if `type` is absent or unknown.
    pub fn request_kind(&self) -> Option<RequestKind> {
        self.kind.as_deref().and_then(RequestKind::parse)
    }
}

/// One rich-text command: a bare directive name or a name with arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Bare(String),
    Call {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<Arg>>,
    },
}

impl Command {
    pub fn bare(code: impl Into<String>) -> Self {
        Self::Bare(code.into())
    }

    pub fn call(code: impl Into<String>, args: Vec<Arg>) -> Self {
        Self::Call {
            code: code.into(),
            args: Some(args),
        }
    }

    /// Directive name.
    pub fn code(&self) -> &str {
        match self {
            Self::Bare(code) => code,
            Self::Call { code, .. } => code,
        }
    }

    /// Positional arguments, if any were supplied.
    pub fn args(&self) -> Option<&[Arg]> {
        match self {
            Self::Bare(_) => None,
            Self::Call { args, .. } => args.as_deref(),
        }
    }
}

/// A loosely typed rich-text argument.
///
/// Variant order matters for untagged decoding: lists are tried before raw
/// bytes so that an array of small integers stays a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Arg>),
    Bytes(ByteBuf),
}

impl Arg {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the argument as raw bytes (bitmap data).
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b.to_vec()),
            Self::Text(s) => Some(s.as_bytes().to_vec()),
            Self::List(items) => items
                .iter()
                .map(|item| item.as_int().and_then(|v| u8::try_from(v).ok()))
                .collect(),
            _ => None,
        }
    }

    /// Textual form used by `print`/`println`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Arg::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(ByteBuf::from(value))
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Outcome carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Job accepted, or state query answered.
    Ok,
    /// `type` missing or not a known job type.
    Rejected,
    /// Queried job id is unknown (never existed or already reaped).
    NotFound,
    /// The request could not be processed.
    Error,
}

/// A response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// A job was accepted, or its state was looked up.
    pub fn job(id: JobId, state: JobState) -> Self {
        Self {
            status: ReplyStatus::Ok,
            job_id: Some(id.to_string()),
            state: Some(state),
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Rejected,
            job_id: None,
            state: None,
            error: Some(reason.into()),
        }
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::NotFound,
            job_id: Some(job_id.into()),
            state: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            job_id: None,
            state: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// The job id in typed form, when present and well formed.
    pub fn parsed_job_id(&self) -> Option<JobId> {
        self.job_id.as_deref().and_then(JobId::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn request_kind_recognises_all_wire_types() {
        for kind in [
            RequestKind::SimpleText,
            RequestKind::Image,
            RequestKind::RichText,
            RequestKind::QueryJobState,
        ] {
            assert_eq!(RequestKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RequestKind::parse("fax"), None);
    }

    #[test]
    fn envelope_without_type_still_decodes() {
        #[derive(Serialize)]
        struct Loose {
            text: &'static str,
        }
        let bytes = codec::encode(&Loose { text: "hello" }).expect("encode");
        let env: Envelope = codec::decode(&bytes).expect("decode");
        assert_eq!(env.kind, None);
        assert_eq!(env.request_kind(), None);
        assert_eq!(env.text.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        #[derive(Serialize)]
        struct Extra {
            #[serde(rename = "type")]
            kind: &'static str,
            text: &'static str,
            priority: u8,
        }
        let bytes = codec::encode(&Extra {
            kind: "simple_text",
            text: "hi",
            priority: 3,
        })
        .expect("encode");
        let env: Envelope = codec::decode(&bytes).expect("decode");
        assert_eq!(env.request_kind(), Some(RequestKind::SimpleText));
        assert_eq!(env.wrap, None);
    }

    #[test]
    fn mixed_command_list_decodes_bare_and_call_forms() {
        let commands = vec![
            Command::bare("inverseOn"),
            Command::call("println", vec![Arg::from("hi")]),
            Command::call("feed", vec![Arg::Int(3)]),
            Command::bare("inverseOff"),
        ];
        let bytes = codec::encode(&Envelope::rich_text(commands.clone())).expect("encode");
        let env: Envelope = codec::decode(&bytes).expect("decode");
        assert_eq!(env.commands, Some(commands));
    }

    #[test]
    fn bitmap_argument_accepts_bytes_or_int_list() {
        let list = Arg::List(vec![Arg::Int(0xFF), Arg::Int(0x00), Arg::Int(0x81)]);
        assert_eq!(list.to_bytes(), Some(vec![0xFF, 0x00, 0x81]));

        let out_of_range = Arg::List(vec![Arg::Int(300)]);
        assert_eq!(out_of_range.to_bytes(), None);

        let bytes = Arg::Bytes(ByteBuf::from(vec![1, 2, 3]));
        assert_eq!(bytes.to_bytes(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn reply_omits_absent_fields() {
        let reply = Reply::rejected("unknown type");
        let json = serde_json::to_value(&reply).expect("json");
        assert_eq!(json["status"], "rejected");
        assert!(json.get("job_id").is_none());
        assert!(json.get("state").is_none());
    }

    #[test]
    fn job_reply_carries_parsable_id() {
        let id = JobId::new();
        let reply = Reply::job(id, JobState::Queued);
        assert!(reply.is_ok());
        assert_eq!(reply.parsed_job_id(), Some(id));
        assert_eq!(reply.state, Some(JobState::Queued));
    }
}
