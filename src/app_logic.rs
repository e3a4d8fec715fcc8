/*
 * This module provides the application logic layer, centered around `AppHandler`, which
 * turns newline-delimited JSON requests into engine calls and wraps results in response
 * envelopes. Unit tests for `AppHandler` are in `handler_tests.rs`.
 */
pub mod handler;
