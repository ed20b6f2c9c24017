pub mod compute;
pub mod index;
pub mod oracle;

pub use compute::{ComputeClient, ComputeError};
pub use index::{DocumentIndexClient, IndexError};
pub use oracle::{GeminiClient, Oracle, OracleError, TextGenerator};
