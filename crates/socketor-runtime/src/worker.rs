//! The per-connection worker routine
//!
//! Runs on a raw `clone(2)` context that shares the accept loop's
//! thread-local state. Nothing in here may allocate, log, or panic:
//! buffers are inline `Line`s, formatting goes through `core::fmt` into
//! those buffers, and every failure is recorded as a value.

use socketor_core::{Line, LineConnection, Operation};

use core::fmt::Write;

/// Where a worker gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadOperand,
    Evaluate,
    WriteResponse,
    Close,
}

/// How a worker's exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Not finished (or never started)
    Pending,
    /// Response delivered; carries the computed value
    Served(i32),
    /// Connection closed early without a response
    Faulted(Stage),
}

/// Everything one worker read and wrote
///
/// Owned by the worker while it runs; the accept loop reads it only after
/// the completion flag clears.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub a: Line,
    pub b: Line,
    pub response: Line,
    pub outcome: WorkerOutcome,
}

impl Exchange {
    pub const fn new() -> Self {
        Self {
            a: Line::new(),
            b: Line::new(),
            response: Line::new(),
            outcome: WorkerOutcome::Pending,
        }
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve one request on `conn` and close it
///
/// Reads operand lines A and B, evaluates `A <op> B`, writes
/// `"<A> <op> <B> = <result>"` (cut to the line limit) and closes. The
/// outcome is stored in `ex.outcome` and returned.
pub fn serve<C: LineConnection>(conn: &mut C, op: &Operation, ex: &mut Exchange) -> WorkerOutcome {
    let outcome = match exchange(conn, op, ex) {
        Ok(value) => match conn.close() {
            Ok(()) => WorkerOutcome::Served(value),
            Err(_) => WorkerOutcome::Faulted(Stage::Close),
        },
        Err(stage) => {
            let _ = conn.close();
            WorkerOutcome::Faulted(stage)
        }
    };
    ex.outcome = outcome;
    outcome
}

fn exchange<C: LineConnection>(conn: &mut C, op: &Operation, ex: &mut Exchange) -> Result<i32, Stage> {
    conn.read_line(&mut ex.a).map_err(|_| Stage::ReadOperand)?;
    conn.read_line(&mut ex.b).map_err(|_| Stage::ReadOperand)?;

    let value = op
        .evaluate(ex.a.as_bytes(), ex.b.as_bytes())
        .ok_or(Stage::Evaluate)?;

    format_response(&mut ex.response, &ex.a, op, &ex.b, value);

    conn.write_line(ex.response.as_bytes())
        .map_err(|_| Stage::WriteResponse)?;
    conn.flush().map_err(|_| Stage::WriteResponse)?;
    Ok(value)
}

fn format_response(out: &mut Line, a: &Line, op: &Operation, b: &Line, value: i32) {
    out.clear();
    out.push_bytes(a.as_bytes());
    out.push(b' ');
    out.push_bytes(op.symbol().as_bytes());
    out.push(b' ');
    out.push_bytes(b.as_bytes());
    out.push_bytes(b" = ");
    // Line's fmt::Write truncates and never fails
    let _ = write!(out, "{}", value);
}
