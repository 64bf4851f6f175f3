//! # scopedb core
//!
//! Entity identity and scope-partitioned persistence for scopedb.
//!
//! This crate provides:
//! - [`EntityId`], a 12-byte identifier with hex and compact text forms
//! - the [`Entity`] model with opt-in change tracking
//! - [`Ref`], an identity-based pointer resolvable against many sources
//! - scope components ([`scope::Scope`], [`scope::Multiscope`],
//!   [`scope::SecondScope`]) for multi-tenant partitioning
//! - the [`ScopedRepository`] contract, implemented by [`Repository`] over
//!   any [`DocumentEngine`]
//! - two engines: [`MemoryEngine`] and the single-file [`LogEngine`]
//!
//! ## Example
//!
//! ```rust
//! use scopedb_core::scope::Scope;
//! use scopedb_core::{
//!     CoreResult, DocumentCodec, Entity, EntityId, EntityMeta, MemoryEngine, Repository,
//!     RepositoryConfig, ScopedEntity, ScopedRepository,
//! };
//! use scopedb_codec::Document;
//!
//! #[derive(Debug, Clone, Default)]
//! struct Tenant {
//!     meta: EntityMeta,
//! }
//!
//! impl Entity for Tenant {
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! #[derive(Debug, Clone, Default)]
//! struct Invoice {
//!     meta: EntityMeta,
//!     scoping: Scope<Tenant>,
//!     total: i64,
//! }
//!
//! impl Entity for Invoice {
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! impl ScopedEntity for Invoice {
//!     type Scoping = Scope<Tenant>;
//!     fn scoping(&self) -> &Self::Scoping { &self.scoping }
//!     fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
//!         (&mut self.meta, &mut self.scoping)
//!     }
//! }
//!
//! impl DocumentCodec for Invoice {
//!     const COLLECTION: &'static str = "invoices";
//!
//!     fn to_document(&self) -> CoreResult<Document> {
//!         let mut doc = Document::new();
//!         doc.set("total", self.total);
//!         Ok(doc)
//!     }
//!
//!     fn from_document(doc: &Document) -> CoreResult<Self> {
//!         Ok(Self { total: doc.require_integer("total")?, ..Self::default() })
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let repo = Repository::new(MemoryEngine::new(), RepositoryConfig::default());
//! let acme = Some(EntityId::generate());
//!
//! let mut invoice = Invoice { total: 120, ..Invoice::default() };
//! repo.insert(acme, &mut invoice).await.unwrap();
//!
//! let id = invoice.id().unwrap().to_hex();
//! let found: Option<Invoice> = repo.by_id(acme, &id).await.unwrap();
//! assert_eq!(found.map(|i| i.total), Some(120));
//!
//! let elsewhere: Option<Invoice> = repo.by_id(Some(EntityId::generate()), &id).await.unwrap();
//! assert!(elsewhere.is_none());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
pub mod engine;
mod entity;
mod error;
pub mod id;
pub mod query;
mod reference;
pub mod repository;
pub mod scope;
pub mod secret;

pub use cancel::CancelToken;
pub use config::{EngineConfig, RepositoryConfig};
pub use engine::{CompactionStats, DocumentCursor, DocumentEngine, LogEngine, MemoryEngine};
pub use entity::{ChangeSet, Entity, EntityMeta, PropertyObserver, ID_PROPERTY};
pub use error::{BoxError, CoreError, CoreResult};
pub use id::{generate_new_id, parse_id, try_parse_id, EntityId, ParsedId};
pub use query::{Filter, FindOptions, Page, SortDirection, SortOrder};
pub use reference::Ref;
pub use repository::{DocumentCodec, Repository, ScopedRepository};
pub use scope::{ScopeComponent, ScopedEntity};
pub use secret::{EncryptedString, FieldCipher, HashedString};
