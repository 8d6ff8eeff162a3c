//! Unit tests for the shell transport.

mod fixtures;
