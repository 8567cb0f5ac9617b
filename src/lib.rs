//! Scenarist is a scenario compiler and dialog interpreter: authored JSON
//! dialog trees become executable dialog graphs that drive multi-turn
//! conversations over any text channel.
//!
//! # Architecture
//!
//! The pipeline from stored document to reply:
//!
//! 1. **Store** ([`store`]): raw scenario documents, by default a
//!    directory of JSON files.
//! 2. **Load** ([`loader`], [`ast`]): documents are parsed, scenario
//!    `code` is decoded, and dialog trees come out as [`ast::DialogDef`]s.
//! 3. **Normalize** ([`scenario`]): nested dialogs get generated names
//!    and terminal steps; root first steps are marked for variable reset.
//! 4. **Compile** ([`compiler`], [`expr`]): every step becomes an
//!    executable value, every `${...}` field a parsed template or script.
//!    Author mistakes fail here, at load time.
//! 5. **Register** ([`registry`], [`intent`]): compiled dialogs and
//!    intent-regex bindings form one immutable [`loader::DialogTable`]
//!    generation; reloads swap the whole generation atomically.
//! 6. **Converse** ([`runtime`], [`eval`]): per-conversation state plus a
//!    frame stack walk the compiled steps, pausing at prompts, descending
//!    into sub-dialogs, and evaluating expressions against the state.
//!
//! [`system::System`] ties the layers together and is the entry point:
//!
//! ```no_run
//! use std::sync::Arc;
//! use scenarist::store::DirectoryStore;
//! use scenarist::{System, SystemConfig};
//!
//! # async fn run() -> scenarist::InternalResult<()> {
//! let store = Arc::new(DirectoryStore::new("./scenarios"));
//! let system = System::new(SystemConfig::default(), store);
//! system.reload().await?;
//!
//! let reply = system.handle_message("user-1", "hi").await?;
//! for message in reply.messages {
//!     println!("{}", message.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod event_bus;
pub mod expr;
pub mod intent;
pub mod loader;
pub mod registry;
pub mod runtime;
pub mod scenario;
pub mod store;
pub mod system;

pub use config::SystemConfig;
pub use error::{Error, InternalResult};
pub use runtime::{Attachment, InputKind, InputRequest, OutboundMessage, TurnReply};
pub use system::System;
