pub mod context;
pub mod handle;
pub(crate) mod node;
pub mod state;

pub use context::TaskContext;
pub use handle::TaskHandle;
pub use state::TaskState;
