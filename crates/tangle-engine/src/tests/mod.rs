//! Tests for the tangle-engine crate.

mod helpers;
