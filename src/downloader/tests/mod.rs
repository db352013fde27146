use super::test_helpers::*;
use super::*;
use crate::error::DownloadError;
use crate::types::{MediaKind, PartKind, PartState, StartRequest};
use std::time::Duration;


/// Generous upper bound for asynchronous effects in tests
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
