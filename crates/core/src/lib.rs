//! `sitebook-core`: domain building blocks shared by every SiteBook module.
//!
//! Pure types only: identifiers, money, the aggregate contract and the domain
//! error model. Nothing in here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{require_text, DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::Money;
pub use value_object::ValueObject;
