// barcode-relay - long-poll relay for barcode scan events
//
// Layout:
// - changes   - `_changes` response types and the fixed query
// - upstream  - `ChangeFeed` seam and the CouchDB client behind it
// - relay     - waits on the feed and extracts the changed document
// - http      - axum routes
// - server    - listener and graceful shutdown
// - config / logging / error - ambient plumbing

pub mod changes;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod relay;
pub mod server;
pub mod upstream;

pub use changes::{ChangeEnvelope, ChangeQuery, ChangeRecord};
pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use http::create_router;
pub use relay::ChangeRelay;
pub use upstream::{ChangeFeed, CouchChangeFeed};
