// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Control-flow signals that unwind a conversation cycle.
///
/// These travel as `anyhow` errors so they compose with ordinary failures;
/// the orchestrator downcasts at its loop boundaries to decide between
/// retrying the cycle (interruption) and terminating (end of input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Signal {
    /// Ctrl-C during a blocking read or stream render.
    #[error("interrupted")]
    Interrupted,
    /// EOF on stdin or an explicit exit command.
    #[error("end of input")]
    EndOfInput,
}

impl Signal {
    /// What signal, if any, does this error carry?
    pub fn from_error(err: &anyhow::Error) -> Option<Signal> {
        err.downcast_ref::<Signal>().copied()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_survive_anyhow_round_trip() {
        let err: anyhow::Error = Signal::Interrupted.into();
        assert_eq!(Signal::from_error(&err), Some(Signal::Interrupted));
        let err: anyhow::Error = Signal::EndOfInput.into();
        assert_eq!(Signal::from_error(&err), Some(Signal::EndOfInput));
    }

    #[test]
    fn ordinary_errors_carry_no_signal() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(Signal::from_error(&err), None);
    }

    #[test]
    fn context_wrapping_preserves_the_signal() {
        use anyhow::Context;
        let err: anyhow::Error = Err::<(), _>(Signal::EndOfInput)
            .context("while reading input")
            .unwrap_err();
        assert_eq!(Signal::from_error(&err), Some(Signal::EndOfInput));
    }
}
