//! The shutdown coordinator (§4.E): LIFO, bounded, idempotent graceful
//! termination of registered components.

use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A component that can be asked to wind down. Implemented by the agent
/// loop driver and by any other long-running collaborator (a worker pool,
/// an event publisher) that needs an ordered teardown slot.
#[async_trait]
pub trait Shutdownable: Send + Sync {
    async fn shutdown(&self) -> crate::error::Result<()>;
}

struct Registration {
    name: String,
    component: std::sync::Arc<dyn Shutdownable>,
    timeout: Duration,
}

/// The aggregate outcome of a shutdown pass: every component that errored
/// or timed out, keyed by name. `Display`s as a comma-joined summary so it
/// reads naturally wrapped in an `anyhow::Error`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownErrors(pub Vec<(String, String)>);

impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "shutdown errors: {joined}")
    }
}

impl std::error::Error for ShutdownErrors {}

impl ShutdownErrors {
    fn into_result(self) -> Result<(), ShutdownErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Tracks registered components and drives ordered, bounded shutdown.
pub struct ShutdownCoordinator {
    registrations: StdMutex<Vec<Registration>>,
    cancel: CancellationToken,
    default_timeout: Duration,
    outcome: AsyncMutex<Option<ShutdownErrors>>,
    completed: Notify,
}

impl ShutdownCoordinator {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registrations: StdMutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            default_timeout,
            outcome: AsyncMutex::new(None),
            completed: Notify::new(),
        }
    }

    /// Register a component; `timeout = Duration::ZERO` means "use the
    /// coordinator's default." Registration order determines shutdown
    /// order (reverse/LIFO).
    pub fn register(&self, name: impl Into<String>, component: std::sync::Arc<dyn Shutdownable>, timeout: Duration) {
        self.registrations.lock().unwrap().push(Registration {
            name: name.into(),
            component,
            timeout,
        });
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn shutdown_context(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the shutdown pass at most once. The `outcome` guard is held
    /// across the entire pass, not just the initial check, so a second
    /// caller arriving while the first is mid-shutdown blocks on the lock
    /// instead of also running every component's `shutdown()`.
    pub async fn shutdown(&self) -> Result<(), ShutdownErrors> {
        let mut guard = self.outcome.lock().await;
        if let Some(outcome) = guard.as_ref() {
            return outcome.clone().into_result();
        }

        self.cancel.cancel();

        let registrations: Vec<Registration> = {
            let regs = self.registrations.lock().unwrap();
            regs.iter()
                .map(|r| Registration {
                    name: r.name.clone(),
                    component: r.component.clone(),
                    timeout: r.timeout,
                })
                .collect()
        };

        let mut errors = Vec::new();
        for registration in registrations.iter().rev() {
            let timeout = if registration.timeout.is_zero() {
                self.default_timeout
            } else {
                registration.timeout
            };

            info!(component = %registration.name, ?timeout, "shutting down component");
            match tokio::time::timeout(timeout, registration.component.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(component = %registration.name, error = %e, "component shutdown failed");
                    errors.push((registration.name.clone(), e.to_string()));
                }
                Err(_) => {
                    let reason = crate::error::Error::ShutdownTimeout {
                        name: registration.name.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    };
                    warn!(component = %registration.name, ?timeout, "component shutdown timed out");
                    errors.push((registration.name.clone(), reason.to_string()));
                }
            }
        }

        let outcome = ShutdownErrors(errors);
        *guard = Some(outcome.clone());
        drop(guard);
        self.completed.notify_waiters();

        outcome.into_result()
    }

    /// Block until a shutdown pass (triggered by this or another caller)
    /// has completed.
    pub async fn wait(&self) {
        loop {
            if self.outcome.lock().await.is_some() {
                return;
            }
            self.completed.notified().await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
