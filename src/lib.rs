//! taskscope - structured concurrency scopes on tokio.
//!
//! A [`Scope`] owns a tree of task nodes and enforces structured completion:
//! it only settles once every child (and transitively every descendant) has
//! reached a terminal state. Cancellation is cooperative and propagates
//! downward only; failure propagation between siblings is pluggable through a
//! [`SupervisorPolicy`]. Values are exposed through single-assignment
//! [`ResultHandle`]s with eager or lazy start.
//!
//! # Quick start
//!
//! ```no_run
//! use taskscope::{Propagating, Scope};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scope = Scope::builder().name("demo").policy(Propagating).build();
//!
//!     scope.launch(|ctx| async move {
//!         ctx.sleep(std::time::Duration::from_millis(50)).await?;
//!         Ok(())
//!     });
//!
//!     let sum = scope.spawn_async(|_ctx| async move { Ok(2 + 2) });
//!
//!     assert_eq!(sum.await_result().await?, 4);
//!     scope.await_all().await?;
//!     scope.cancel_and_wait().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod policy;
pub mod report;
pub mod scope;
pub mod signal;
pub mod task;

pub use error::{AggregateError, TaskError};
pub use handle::{ResultHandle, StartMode};
pub use lifecycle::{LifecycleOwner, OnDestroy};
pub use policy::{FailureAction, Isolating, Propagating, SupervisorPolicy};
pub use report::set_uncaught_error_hook;
pub use scope::{Scope, ScopeBuilder, ScopeState};
pub use signal::CancellationSignal;
pub use task::{TaskContext, TaskHandle, TaskState};
