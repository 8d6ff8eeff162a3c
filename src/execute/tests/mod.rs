//! Unit tests for the execution façade and discovery.

mod discovery;
mod facade;
mod fixtures;
