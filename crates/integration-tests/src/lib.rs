//! End-to-end tests for the Chitin server live under `tests/`
