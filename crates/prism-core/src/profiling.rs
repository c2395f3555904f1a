//! Profiling utilities based on the `puffin` crate.
//!
//! With the `profiling` feature disabled the scope macros compile to nothing.

#[cfg(feature = "profiling")]
pub use puffin::{GlobalProfiler, profile_function, profile_scope};

#[cfg(feature = "profiling")]
static PROFILING_SERVER: std::sync::OnceLock<puffin_http::Server> = std::sync::OnceLock::new();

/// Profiling backend options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingBackend {
    /// Send profiling data to puffin_viewer via HTTP.
    PuffinHttp,
}

/// Initialize profiling with the specified backend.
#[cfg(feature = "profiling")]
pub fn init_profiling(backend: ProfilingBackend) {
    match backend {
        ProfilingBackend::PuffinHttp => {
            puffin::set_scopes_on(true);

            match puffin_http::Server::new("0.0.0.0:8585") {
                Ok(server) => {
                    tracing::info!("Puffin profiler server started on http://0.0.0.0:8585");
                    let _ = PROFILING_SERVER.set(server);
                }
                Err(e) => {
                    tracing::error!("Failed to start puffin server: {}", e);
                }
            }
        }
    }
}

#[cfg(not(feature = "profiling"))]
pub fn init_profiling(_backend: ProfilingBackend) {}

/// Mark the start of a new frame for profiling.
///
/// Call this once per frame in your main loop.
#[cfg(feature = "profiling")]
pub fn new_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profiling"))]
pub fn new_frame() {}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_function {
    () => {};
    ($data:expr) => {};
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($name:expr) => {};
    ($name:expr, $data:expr) => {};
}

#[cfg(not(feature = "profiling"))]
pub use crate::{profile_function, profile_scope};
