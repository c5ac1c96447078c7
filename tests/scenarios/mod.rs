//! The concrete scenarios and quantified invariants from the specification's testable-properties
//! section, one file per scenario group.

mod close_cascade;
mod echo_one_client;
mod interleaved_clients;
mod large_payload;
mod limit_refusal;
mod veto;
