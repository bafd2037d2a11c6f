//! The step parser.
//!
//! A parse runs in segments. Each segment is one run of the multi-path step
//! machine (`machine`) from the start rule over a token stream. The driver
//! (`driver`) turns the winning path's events into nodes, hands embedded
//! regions to their own grammar inside a fresh context, and on failure
//! reports, keeps the partial tree and resynchronizes.

mod actions;
pub use actions::{ActionTable, SemanticActions};

mod options;
pub use options::ParseOptions;

mod machine;

mod driver;
pub use driver::{ParseError, ParseOutcome, StepParser};
