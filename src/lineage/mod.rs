//! Data lineage recording.
//!
//! Every transition of a workflow run that produces or judges an artifact is
//! recorded as an immutable lineage event. Events form a tree per run: the
//! run's `root_id` is shared by all of them and each event points at the
//! node it derives from.
//!
//! ```text
//! RAW_DATA_INPUT ── DQ_CHECK_PASS ── GLUE_BATCH_SPLIT ─┬─ CALCULATION_COMPLETE (batch 0)
//!                                                      ├─ CALCULATION_COMPLETE (batch 1)
//!                                                      └─ ...
//! RAW_DATA_INPUT ── DQ_CHECK_FAIL
//! ```
//!
//! - **LineageRecorder**: effect trait for the lineage service
//! - **LineageClient**: event shaping and bounded retry used by the workflow
//! - **InMemoryLineageLedger**: in-process recorder with ancestry tracing
//! - **HttpLineageRecorder**: JSON-over-HTTP lineage service client

pub mod event;
pub mod http;
pub mod ledger;
pub mod recorder;

pub use event::{LineageAck, LineageAction, LineageEvent, LineageScope};
pub use http::HttpLineageRecorder;
pub use ledger::{InMemoryLineageLedger, LineageRecord};
pub use recorder::{LineageClient, LineageRecorder, TracingLineageRecorder};
