#![forbid(unsafe_code)]

//! Test harness for attrflow: reference model kinds, change recording, and
//! tracing capture.

pub mod fixtures;
pub mod recorder;
pub mod trace_capture;

pub use recorder::ChangeLog;
pub use trace_capture::{TraceCapture, TraceSnapshot};
