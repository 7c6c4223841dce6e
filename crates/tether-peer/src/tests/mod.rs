//! Engine test suites.

mod fetchers;
mod support;
