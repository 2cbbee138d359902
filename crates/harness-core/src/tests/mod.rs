//! Controller tests that spawn real `sh` processes.

#[cfg(unix)]
mod support;
