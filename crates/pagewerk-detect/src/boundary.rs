// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stage boundary — converts a panic inside a stage into a tagged failure.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use pagewerk_core::{FailureCode, FailureStage, Outcome, PageDetectFailure};
use tracing::error;

/// Run `body`, downgrading a panic to `code` at `stage` with the panic payload
/// as the debug message.
pub(crate) fn catch_panic<T>(
    stage: FailureStage,
    code: FailureCode,
    body: impl FnOnce() -> Outcome<T>,
) -> Outcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%stage, %code, message, "Stage panicked");
            Err(PageDetectFailure::new(stage, code, message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "stage panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_normal_outcomes() {
        let ok: Outcome<u8> = catch_panic(FailureStage::Edges, FailureCode::EdgesFailed, || Ok(7));
        assert_eq!(ok.unwrap(), 7);
    }

    #[test]
    fn panic_becomes_tagged_failure() {
        let err = catch_panic::<()>(FailureStage::Order, FailureCode::Unknown, || {
            panic!("index out of range at corner 5")
        })
        .unwrap_err();
        assert_eq!(err.stage, FailureStage::Order);
        assert_eq!(err.code, FailureCode::Unknown);
        assert_eq!(err.message.as_deref(), Some("index out of range at corner 5"));
    }
}
