//! Synchronous access to asynchronous work.
//!
//! The strategy is fixed when the bridge is built: with no tokio runtime on
//! the current thread the bridge owns a private one; inside a multi-thread
//! runtime it schedules onto that runtime and blocks the caller until the
//! work completes. Either way the caller sees a single blocking [`AsyncBridge::run`].

use crate::util::errors::{EnvError, EnvResult};
use log::debug;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

enum Strategy {
    /// Private runtime, released by [`AsyncBridge::shutdown`].
    Owned(Option<Runtime>),
    /// Runtime driving the surrounding process; never shut down by the bridge.
    Foreign(Handle),
}

pub struct AsyncBridge {
    strategy: Strategy,
}

impl AsyncBridge {
    pub fn new() -> EnvResult<Self> {
        let strategy = match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => {
                    return Err(EnvError::bridge(
                        "cannot block inside a current-thread tokio runtime; \
                         use a multi-thread runtime or call from a plain thread",
                    ));
                }
                _ => {
                    debug!("Async bridge reusing the running tokio runtime");
                    Strategy::Foreign(handle)
                }
            },
            Err(_) => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("mcpgym-bridge")
                    .enable_all()
                    .build()?;
                debug!("Async bridge created a private tokio runtime");
                Strategy::Owned(Some(runtime))
            }
        };

        Ok(Self { strategy })
    }

    /// Whether work runs on a runtime the bridge did not create.
    pub fn is_foreign(&self) -> bool {
        matches!(self.strategy, Strategy::Foreign(_))
    }

    /// Runs `work` to completion, blocking the calling thread.
    pub fn run<F, T>(&self, work: F) -> EnvResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let joined = match &self.strategy {
            Strategy::Owned(Some(runtime)) => runtime.block_on(runtime.spawn(work)),
            Strategy::Owned(None) => return Err(EnvError::bridge("async bridge already shut down")),
            Strategy::Foreign(handle) => {
                let task = handle.spawn(work);
                // Outside a worker thread this simply calls the closure.
                tokio::task::block_in_place(|| handle.block_on(task))
            }
        };
        joined.map_err(|e| EnvError::bridge(format!("bridged task failed: {}", e)))
    }

    /// Releases an owned runtime. A foreign runtime is left untouched.
    pub fn shutdown(&mut self) {
        if let Strategy::Owned(runtime) = &mut self.strategy {
            if let Some(runtime) = runtime.take() {
                runtime.shutdown_background();
                debug!("Async bridge runtime released");
            }
        }
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
